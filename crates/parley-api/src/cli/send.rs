//! `parley send`: send one message and wait for it to be embedded.

use anyhow::Result;
use console::style;

use parley_types::event::MessagePayload;

use crate::state::AppState;

pub async fn send_message(state: &AppState, from: i64, to: i64, text: &str, json: bool) -> Result<()> {
    let message = state.chat_service.send_message(from, to, text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&MessagePayload::from(&message))?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Message {} sent from {} to {} at {}",
        style("✓").green().bold(),
        style(message.id).bold(),
        style(from).cyan(),
        style(to).cyan(),
        style(message.created_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    println!();

    Ok(())
}
