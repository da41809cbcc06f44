//! System status dashboard command.

use anyhow::{Context, Result};
use console::style;

use parley_core::store::MessageStore;
use parley_core::search::SearchMode;

use crate::state::AppState;

/// Display backend, search capability, message counts, and the model.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let service = &state.chat_service;
    let total = service.store().count().await.context("failed to count messages")?;

    let (pending,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM messages WHERE embedding IS NULL")
            .fetch_one(&state.db_pool.reader)
            .await
            .context("failed to count unembedded messages")?;

    let vector_query = service.store().supports_vector_query();

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "backend": state.backend(),
            "configured_backend": state.config.store_backend.to_string(),
            "vector_query": vector_query,
            "search_mode": service.search_mode().to_string(),
            "embedding_model": service.model_name(),
            "messages": {
                "total": total,
                "searchable": total.saturating_sub(pending as u64),
                "pending": pending,
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Parley v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Storage ──").dim());
    let backend = if state.backend() == state.config.store_backend.to_string() {
        style(state.backend().to_string()).green()
    } else {
        style(format!("{} (fallback from {})", state.backend(), state.config.store_backend)).yellow()
    };
    println!("  Backend:      {backend}");
    let mode = match service.search_mode() {
        SearchMode::VectorIndex => style("vector index").green(),
        SearchMode::Fallback => style("in-process scoring").yellow(),
    };
    println!("  Search:       {mode}");
    println!();

    println!("  {}", style("── Messages ──").dim());
    println!("  Total:        {}", style(total).bold());
    println!("  Searchable:   {}", style(total.saturating_sub(pending as u64)).green());
    if pending > 0 {
        println!(
            "  Pending:      {} {}",
            style(pending).yellow(),
            style("(run `parley backfill`)").dim()
        );
    }
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Model:        {}", style(service.model_name()).cyan());
    println!("  Data dir:     {}", style(state.data_dir.display()).dim());
    println!();

    Ok(())
}
