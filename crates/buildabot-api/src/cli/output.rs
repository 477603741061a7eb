//! Console helpers shared by the commands.

use std::time::Duration;

use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use buildabot_core::remote::recorder::CallLog;
use buildabot_types::error::ErrorKind;

/// Start a steady spinner, hidden in quiet or JSON mode.
pub fn spinner(message: impl Into<String>, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        header
            .iter()
            .map(|h| Cell::new(h).fg(Color::White))
            .collect::<Vec<_>>(),
    );
    table
}

pub fn kind_cell(kind: Option<ErrorKind>) -> Cell {
    match kind {
        Some(kind) => Cell::new(kind.to_string()).fg(Color::Red),
        None => Cell::new("-").fg(Color::DarkGrey),
    }
}

pub fn nothing_to_do(json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::json!({"entities": 0}));
    } else {
        println!();
        println!("  {} No definitions found, nothing to do.", style("i").blue().bold());
        println!();
    }
    Ok(())
}

/// Request tally, plus the failed calls when verbose.
pub fn print_call_tally(calls: &CallLog, verbose: bool) {
    let (ok, failed) = calls.tally();
    if ok + failed == 0 {
        return;
    }
    println!(
        "  {} {} request{} fulfilled, {} failed",
        style("»").magenta().bold(),
        style(ok).bold(),
        if ok == 1 { "" } else { "s" },
        if failed == 0 {
            style(failed).dim()
        } else {
            style(failed).red().bold()
        }
    );

    if verbose {
        for event in calls.failed() {
            println!(
                "    {} {} {} {}",
                style("⨯").red(),
                event.operation,
                style(&event.target).dim(),
                event.error.as_deref().unwrap_or_default()
            );
        }
    }
}
