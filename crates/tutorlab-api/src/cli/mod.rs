//! CLI command definitions for the `tutorlab` binary.
//!
//! Uses clap derive macros for argument parsing. `serve` runs the HTTP API
//! and the nightly scheduler; the other commands are one-shot operator tasks
//! against the same database.

pub mod status;
pub mod sweep;
pub mod users;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use tutorlab_types::user::ExperimentGroup;

/// Tutoring study server.
#[derive(Parser)]
#[command(name = "tutorlab", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "TUTORLAB_OTEL")]
    pub otel: bool,

    /// Path to config.toml (defaults to <data dir>/config.toml).
    #[arg(long, global = true, env = "TUTORLAB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and the nightly reset scheduler.
    Serve {
        /// Port to listen on (overrides config).
        #[arg(long, short)]
        port: Option<u16>,

        /// Host to bind to (overrides config).
        #[arg(long)]
        host: Option<String>,

        /// Do not run the nightly reset scheduler in this process.
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Show today's topic and participant progress.
    Status,

    /// Close yesterday's open sessions now.
    Sweep,

    /// Recount a session's turns from its message log.
    Reconcile {
        /// Session ID.
        session_id: i64,
    },

    /// Add participants.
    SeedUsers {
        /// Student IDs to add.
        #[arg(required = true)]
        students: Vec<String>,

        /// Experiment group (1-4). Inferred from a `groupN` marker in the ID when omitted.
        #[arg(long, short)]
        group: Option<ExperimentGroup>,
    },

    /// Replace a participant's daily quota.
    SetQuota {
        /// Student ID.
        student: String,

        /// Hard cap on turns per day.
        #[arg(long)]
        max_turns: Option<u32>,

        /// Turns after which the day counts as completed.
        #[arg(long)]
        target_turns: Option<u32>,
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

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_seed_users_with_group() {
        let cli = Cli::parse_from(["tutorlab", "seed-users", "s1", "s2", "--group", "group3"]);
        match cli.command {
            Commands::SeedUsers { students, group } => {
                assert_eq!(students, vec!["s1", "s2"]);
                assert_eq!(group, Some(ExperimentGroup::HighDepthLowTurns));
            }
            _ => panic!("expected seed-users"),
        }
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from(["tutorlab", "-v", "serve", "--port", "8080", "--no-scheduler"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Serve {
                port,
                host,
                no_scheduler,
            } => {
                assert_eq!(port, Some(8080));
                assert!(host.is_none());
                assert!(no_scheduler);
            }
            _ => panic!("expected serve"),
        }
    }
}
