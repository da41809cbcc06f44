//! `parley serve`: run the HTTP/WebSocket API until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use console::style;

use crate::http;
use crate::state::AppState;

/// Messages queued for embedding at startup.
const STARTUP_BACKFILL: usize = 10_000;

pub async fn serve(state: AppState, host: &str, port: u16, quiet: bool) -> Result<()> {
    // Backfill waits for queue space, so it runs beside the server.
    let service = state.chat_service.clone();
    tokio::spawn(async move {
        match service.backfill(STARTUP_BACKFILL).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(queued = n, "queued unembedded messages"),
            Err(e) => tracing::warn!(error = %e, "startup backfill failed"),
        }
    });

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    if !quiet {
        println!(
            "  {} Parley API listening on {} ({} backend)",
            style("⚡").bold(),
            style(format!("http://{addr}")).cyan(),
            state.backend()
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
