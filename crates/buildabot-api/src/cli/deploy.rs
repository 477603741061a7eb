//! `bab deploy`: compile, then create or update every bot remotely.

use anyhow::Result;
use comfy_table::{Cell, Color};
use console::style;

use buildabot_core::deploy::deploy;
use buildabot_types::plan::{EntityOutcome, RunSummary};

use super::output;
use crate::state::AppState;

/// Returns whether every entity was created or updated.
pub async fn run(state: &AppState, json: bool, quiet: bool, verbose: bool) -> Result<bool> {
    let Some(compiled) = state.compile().await? else {
        output::nothing_to_do(json)?;
        return Ok(true);
    };

    let remote = state.remote()?;
    let store = state.store();

    let spinner = output::spinner(
        format!(
            "Deploying {} definition{}...",
            compiled.definitions.len(),
            if compiled.definitions.len() == 1 { "" } else { "s" }
        ),
        json || quiet,
    );
    let summary = deploy(&remote, &store, &state.config, &compiled).await;
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if quiet {
        for report in &summary.reports {
            if let Some(err) = &report.error {
                eprintln!("{}: {} ({})", report.entity, err.message, err.kind);
            }
        }
    } else {
        print_summary(&summary);
        output::print_call_tally(&state.calls, verbose);
        println!();
    }

    Ok(!summary.has_failures())
}

fn outcome_cell(outcome: EntityOutcome) -> Cell {
    match outcome {
        EntityOutcome::Created => Cell::new("✓ created").fg(Color::Green),
        EntityOutcome::Updated => Cell::new("✓ updated").fg(Color::Green),
        EntityOutcome::Failed => Cell::new("⨯ failed").fg(Color::Red),
        EntityOutcome::Aborted => Cell::new("○ aborted").fg(Color::Yellow),
    }
}

fn print_summary(summary: &RunSummary) {
    let mut table = output::table(&["Entity", "Remote name", "Outcome", "Error", "Detail"]);
    for report in &summary.reports {
        table.add_row(vec![
            Cell::new(&report.entity).fg(Color::Cyan),
            Cell::new(&report.qualified_name),
            outcome_cell(report.outcome),
            output::kind_cell(report.error.as_ref().map(|e| e.kind)),
            match (&report.error, &report.bot_id) {
                (Some(err), _) => Cell::new(&err.message),
                (None, Some(id)) => Cell::new(id).fg(Color::DarkGrey),
                (None, None) => Cell::new(""),
            },
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} {} created, {} updated, {} failed, {} aborted in {:.1}s",
        if summary.has_failures() {
            style("⚠").yellow().bold()
        } else {
            style("✓").green().bold()
        },
        summary.count(EntityOutcome::Created),
        summary.count(EntityOutcome::Updated),
        summary.count(EntityOutcome::Failed),
        summary.count(EntityOutcome::Aborted),
        summary.duration_secs()
    );
    println!("  {}", style(format!("run {}", summary.run_id)).dim());
}
