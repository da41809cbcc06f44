//! Parley CLI and REST/WebSocket API entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes the store, embedding model, and chat
//! service, then dispatches to a command or starts the API server.

mod cli;
mod http;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley_api=debug,parley_core=debug,parley_infra=debug",
        _ => "trace",
    };
    parley_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let command = match cli.command {
        // Shell completions don't need app state
        Commands::Completions { shell } => {
            cli::write_completions(shell, &mut std::io::stdout());
            return Ok(());
        }
        command => command,
    };

    let (state, pipeline) = AppState::init().await?;

    let result = match command {
        Commands::Serve { port, host } => {
            cli::serve::serve(state.clone(), &host, port, cli.quiet).await
        }
        Commands::Send { from, to, message } => {
            cli::send::send_message(&state, from, to, &message, cli.json).await
        }
        Commands::History { user, with, limit } => {
            cli::history::show_history(&state, user, with, limit, cli.json).await
        }
        Commands::Search {
            user,
            query,
            with,
            limit,
        } => cli::search::search_messages(&state, user, &query, with, limit, cli.json).await,
        Commands::Backfill { limit } => cli::backfill::backfill(&state, limit, cli.json).await,
        Commands::Status => cli::status::status(&state, cli.json).await,
        Commands::Completions { shell } => {
            cli::write_completions(shell, &mut std::io::stdout());
            Ok(())
        }
    };

    // Let the worker finish queued embeddings before the process exits.
    pipeline.shutdown().await;
    state.db_pool.close().await;
    parley_observe::shutdown_tracing();

    result
}
