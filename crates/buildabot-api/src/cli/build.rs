//! `bab build`: compile and validate without touching the hosting service.

use anyhow::Result;
use comfy_table::{Cell, Color};
use console::style;
use serde::Serialize;

use buildabot_core::compiler::CompileOutput;
use buildabot_types::definition::Definition;
use buildabot_types::plan::ReportedError;

use super::output;
use crate::state::AppState;

#[derive(Serialize)]
struct BuildReport<'a> {
    definitions: Vec<&'a Definition>,
    failures: Vec<EntityFailure<'a>>,
}

#[derive(Serialize)]
struct EntityFailure<'a> {
    entity: &'a str,
    error: ReportedError,
}

fn build_report(compiled: &CompileOutput) -> BuildReport<'_> {
    BuildReport {
        definitions: compiled.definitions.values().collect(),
        failures: compiled
            .failures
            .iter()
            .map(|(entity, err)| EntityFailure {
                entity,
                error: ReportedError {
                    kind: err.kind(),
                    message: err.to_string(),
                },
            })
            .collect(),
    }
}

/// Returns whether every entity compiled.
pub async fn run(state: &AppState, json: bool, quiet: bool) -> Result<bool> {
    let Some(compiled) = state.compile().await? else {
        output::nothing_to_do(json)?;
        return Ok(true);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&build_report(&compiled))?);
        return Ok(compiled.is_clean());
    }
    if quiet {
        for (entity, err) in &compiled.failures {
            eprintln!("{entity}: {err}");
        }
        return Ok(compiled.is_clean());
    }

    let mut table = output::table(&["Entity", "Abilities", "Dataset files", "Status", "Detail"]);
    for (entity, definition) in &compiled.definitions {
        table.add_row(vec![
            Cell::new(entity).fg(Color::Cyan),
            Cell::new(definition.abilities.len()),
            Cell::new(definition.dataset_files.len()),
            Cell::new("✓ ok").fg(Color::Green),
            Cell::new(match &definition.deployment {
                Some(record) => format!("deployed as {}", record.name),
                None => "not deployed".to_string(),
            })
            .fg(Color::DarkGrey),
        ]);
    }
    for (entity, err) in &compiled.failures {
        table.add_row(vec![
            Cell::new(entity).fg(Color::Cyan),
            Cell::new("-"),
            Cell::new("-"),
            output::kind_cell(Some(err.kind())),
            Cell::new(err.to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    if compiled.is_clean() {
        println!(
            "  {} {} definition{} valid",
            style("✓").green().bold(),
            style(compiled.definitions.len()).bold(),
            if compiled.definitions.len() == 1 { "" } else { "s" }
        );
    } else {
        println!(
            "  {} {} of {} definitions failed",
            style("⨯").red().bold(),
            style(compiled.failures.len()).red().bold(),
            compiled.entity_count()
        );
    }
    println!();

    Ok(compiled.is_clean())
}
