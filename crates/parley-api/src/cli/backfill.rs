//! `parley backfill`: queue unembedded messages for the embedding worker.
//!
//! The worker finishes the queued jobs when the pipeline is shut down at
//! the end of the command.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub async fn backfill(state: &AppState, limit: usize, json: bool) -> Result<()> {
    let queued = state.chat_service.backfill(limit).await?;

    if json {
        println!("{}", serde_json::json!({ "queued": queued }));
        return Ok(());
    }

    println!();
    if queued == 0 {
        println!("  {} Every message is already searchable.", style("✓").green().bold());
    } else {
        println!(
            "  {} Embedding {} message{}...",
            style("⚡").bold(),
            style(queued).bold(),
            if queued == 1 { "" } else { "s" }
        );
    }
    println!();

    Ok(())
}
