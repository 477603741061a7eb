//! build-a-bot CLI entry point.
//!
//! Binary name: `bab`
//!
//! Parses CLI arguments, initializes tracing and configuration, then
//! dispatches to the command handler. Exits non-zero when any entity or
//! deletion failed.

mod cli;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use buildabot_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        json: cli.json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "bab", &mut std::io::stdout());
        shutdown_tracing();
        return Ok(ExitCode::SUCCESS);
    }

    let succeeded = flush_then(run(cli).await, shutdown_tracing)?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run `flush` before handing back `result`, so spans from a failed
/// command are exported too.
fn flush_then<T>(result: anyhow::Result<T>, flush: impl FnOnce()) -> anyhow::Result<T> {
    flush();
    result
}

/// Dispatch a command. Returns whether it succeeded.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let namespace = match &cli.command {
        Commands::Deploy { namespace } | Commands::Destroy { namespace, .. } => namespace.clone(),
        _ => None,
    };
    let state = AppState::init(&cli.project_dir, namespace).await?;
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::Build => cli::build::run(&state, cli.json, cli.quiet).await,
        Commands::Deploy { .. } => cli::deploy::run(&state, cli.json, cli.quiet, verbose).await,
        Commands::Destroy {
            yes,
            namespace_only,
            ..
        } => cli::destroy::run(&state, yes, namespace_only, cli.json, cli.quiet, verbose).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_flush_runs_when_command_fails() {
        let flushed = Cell::new(false);
        let result: anyhow::Result<bool> =
            flush_then(Err(anyhow::anyhow!("no api key")), || flushed.set(true));
        assert!(flushed.get());
        assert_eq!(result.unwrap_err().to_string(), "no api key");
    }

    #[test]
    fn test_flush_runs_on_success() {
        let flushed = Cell::new(false);
        assert!(flush_then(Ok(true), || flushed.set(true)).unwrap());
        assert!(flushed.get());
    }
}
