//! CLI command definitions and dispatch for the `bab` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod build;
pub mod deploy;
pub mod destroy;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Build and deploy ChatBotKit bots from a directory of plain-text definitions.
#[derive(Parser)]
#[command(name = "bab", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Project directory containing `buildabot.toml`.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile and validate every definition without calling the hosting service.
    Build,

    /// Create or update every bot on the hosting service.
    Deploy {
        /// Namespace prefixed to remote names (overrides config).
        #[arg(short, long, env = "BUILDABOT_NAMESPACE")]
        namespace: Option<String>,
    },

    /// Delete every remote resource this tool created.
    Destroy {
        /// Skip both confirmation prompts.
        #[arg(long, short = 'y')]
        yes: bool,

        /// Only delete bots (and what they own) in the configured namespace.
        #[arg(long)]
        namespace_only: bool,

        /// Namespace to restrict to (overrides config).
        #[arg(short, long, env = "BUILDABOT_NAMESPACE")]
        namespace: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_destroy_flags() {
        let cli = Cli::try_parse_from(["bab", "destroy", "--yes", "--namespace-only", "-n", "acme"])
            .unwrap();
        match cli.command {
            Commands::Destroy {
                yes,
                namespace_only,
                namespace,
            } => {
                assert!(yes);
                assert!(namespace_only);
                assert_eq!(namespace.as_deref(), Some("acme"));
            }
            _ => panic!("expected destroy"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bab", "build", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Build));
    }
}
