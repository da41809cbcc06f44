//! `parley history`: print a conversation as a table.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::event::MessagePayload;

use crate::state::AppState;

pub async fn show_history(
    state: &AppState,
    user: i64,
    with: i64,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or_else(|| state.chat_service.default_history_limit());
    let messages = state.chat_service.get_history(user, with, limit).await?;

    if json {
        let payload: Vec<MessagePayload> = messages.iter().map(MessagePayload::from).collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No messages between {} and {}.",
            style("i").blue().bold(),
            style(user).cyan(),
            style(with).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Sent").fg(Color::White),
        Cell::new("From").fg(Color::White),
        Cell::new("Message").fg(Color::White),
        Cell::new("Searchable").fg(Color::White),
    ]);

    for msg in &messages {
        let from_color = if msg.sender_id == user {
            Color::Cyan
        } else {
            Color::Magenta
        };
        let (mark, mark_color) = if msg.is_searchable() {
            ("yes", Color::Green)
        } else {
            ("pending", Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(msg.id).fg(Color::DarkGrey),
            Cell::new(msg.created_at.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(msg.sender_id).fg(from_color),
            Cell::new(truncate(&msg.text, 60)).fg(Color::White),
            Cell::new(mark).fg(mark_color),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} message{}",
        style(messages.len()).bold(),
        if messages.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

/// Shorten `text` to at most `max` characters, marking the cut with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
