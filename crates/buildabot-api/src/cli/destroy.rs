//! `bab destroy`: delete every remote resource tagged as created by build-a-bot.

use anyhow::Result;
use console::style;
use dialoguer::Confirm;

use buildabot_core::teardown::{execute_teardown, plan_teardown};
use buildabot_types::plan::TeardownPlan;

use super::output;
use crate::state::AppState;

/// Returns whether every deletion succeeded.
pub async fn run(
    state: &AppState,
    yes: bool,
    namespace_only: bool,
    json: bool,
    quiet: bool,
    verbose: bool,
) -> Result<bool> {
    let namespace = state.config.namespace();
    if namespace_only && namespace.prefix().is_empty() {
        anyhow::bail!("--namespace-only needs a namespace (set it in buildabot.toml or with --namespace)");
    }

    let remote = state.remote()?;

    let spinner = output::spinner("Looking up remote resources...", json || quiet);
    let plan = plan_teardown(&remote, namespace_only.then_some(&namespace)).await?;
    spinner.finish_and_clear();

    if plan.is_empty() {
        if json {
            println!("{}", serde_json::json!({"deleted": 0, "failures": []}));
        } else if !quiet {
            println!();
            println!("  {} Nothing to delete.", style("i").blue().bold());
            println!();
        }
        return Ok(true);
    }

    if !json && !quiet {
        print_plan(&plan);
    }

    if !yes {
        if json {
            anyhow::bail!("refusing to delete without confirmation; pass --yes");
        }
        if !confirm(&plan)? {
            println!("  Cancelled.");
            return Ok(true);
        }
    }

    let spinner = output::spinner(
        format!("Deleting {} resources...", plan.total()),
        json || quiet,
    );
    let report = execute_teardown(&remote, &plan).await;
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for failure in &report.failures {
            eprintln!("  {} {failure}", style("⨯").red().bold());
        }
        if !quiet {
            println!(
                "  {} Deleted {} of {} resources.",
                if report.failures.is_empty() {
                    style("✓").green().bold()
                } else {
                    style("⚠").yellow().bold()
                },
                report.deleted,
                plan.total()
            );
            output::print_call_tally(&state.calls, verbose);
            println!();
        }
    }

    Ok(report.failures.is_empty())
}

fn print_plan(plan: &TeardownPlan) {
    println!();
    println!("  {} The following will be deleted:", style("⚠").yellow().bold());
    println!();
    for bot in &plan.bots {
        println!("    {} bot {}", style("•").dim(), style(&bot.name).red());
    }
    println!(
        "    {} {} dataset{}, {} skillset{}, {} file{}, {} abilit{}",
        style("•").dim(),
        plan.datasets.len(),
        if plan.datasets.len() == 1 { "" } else { "s" },
        plan.skillsets.len(),
        if plan.skillsets.len() == 1 { "" } else { "s" },
        plan.files.len(),
        if plan.files.len() == 1 { "" } else { "s" },
        plan.abilities.len(),
        if plan.abilities.len() == 1 { "y" } else { "ies" },
    );
    println!();
}

/// Two prompts, the second defaulting to no.
fn confirm(plan: &TeardownPlan) -> Result<bool> {
    let first = Confirm::new()
        .with_prompt(format!(
            "Delete {} remote resources created by build-a-bot?",
            style(plan.total()).red().bold()
        ))
        .default(false)
        .interact()?;
    if !first {
        return Ok(false);
    }

    let second = Confirm::new()
        .with_prompt("This cannot be undone. Are you sure?")
        .default(false)
        .interact()?;
    Ok(second)
}
