//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod backfill;
pub mod history;
pub mod search;
pub mod send;
pub mod serve;
pub mod status;

use std::io::Write;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

/// One-to-one chat with semantic search over message history.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "PARLEY_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST/WebSocket API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Send a message from one user to another.
    Send {
        /// Sender user id.
        #[arg(long)]
        from: i64,

        /// Receiver user id.
        #[arg(long)]
        to: i64,

        /// Message text.
        message: String,
    },

    /// Show the conversation between two users, newest first.
    History {
        /// The user reading the history.
        #[arg(long)]
        user: i64,

        /// The other participant.
        #[arg(long)]
        with: i64,

        /// Maximum messages to show (defaults to `default_history_limit`).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search a user's messages by meaning.
    Search {
        /// The user whose messages are searched.
        #[arg(long)]
        user: i64,

        /// Search text.
        query: String,

        /// Restrict to the conversation with this user.
        #[arg(long)]
        with: Option<i64>,

        /// Maximum results.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Embed stored messages that are not searchable yet.
    Backfill {
        /// Maximum messages to queue.
        #[arg(short, long, default_value = "1000")]
        limit: usize,
    },

    /// Show backend, search capability, and message counts.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Write the completion script for `shell` to `out`.
pub fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "parley", out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_are_generated_for_bash() {
        let cli = Cli::try_parse_from(["parley", "completions", "bash"]).unwrap();
        let Commands::Completions { shell } = cli.command else {
            panic!("expected completions");
        };

        let mut out = Vec::new();
        write_completions(shell, &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("parley"));
        assert!(script.contains("backfill"));
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["parley", "search", "--user", "1", "lunch", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Search { user, query, with, limit } => {
                assert_eq!(user, 1);
                assert_eq!(query, "lunch");
                assert_eq!(with, None);
                assert_eq!(limit, 10);
            }
            _ => panic!("expected search"),
        }
    }
}
