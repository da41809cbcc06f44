//! `parley search`: semantic search with a similarity-colored table.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use super::history::truncate;
use crate::http::handlers::search::SearchHit;
use crate::state::AppState;

pub async fn search_messages(
    state: &AppState,
    user: i64,
    query: &str,
    with: Option<i64>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let results = state
        .chat_service
        .semantic_search(user, query, limit, with)
        .await?;

    if json {
        let hits: Vec<SearchHit> = results
            .iter()
            .map(|r| SearchHit {
                rank: r.rank,
                similarity: r.similarity,
                message: (&r.message).into(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if results.is_empty() {
        println!();
        println!(
            "  {} No messages matched '{}' for user {}.",
            style("i").blue().bold(),
            style(query).dim(),
            style(user).cyan(),
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Similarity").fg(Color::White),
        Cell::new("Message").fg(Color::White),
        Cell::new("With").fg(Color::White),
        Cell::new("Sent").fg(Color::White),
    ]);

    for result in &results {
        let sim_color = if result.similarity >= 0.7 {
            Color::Green
        } else if result.similarity >= 0.4 {
            Color::Yellow
        } else {
            Color::Red
        };

        table.add_row(vec![
            Cell::new(result.rank).fg(Color::DarkGrey),
            Cell::new(format!("{:.4}", result.similarity)).fg(sim_color),
            Cell::new(truncate(&result.message.text, 50)).fg(Color::White),
            Cell::new(result.message.counterpart_of(user)).fg(Color::Magenta),
            Cell::new(result.message.created_at.format("%Y-%m-%d %H:%M")).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!(
        "  Search for '{}' ({} mode)",
        style(query).white().bold(),
        style(state.chat_service.search_mode()).cyan(),
    );
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} result{}",
        style(results.len()).bold(),
        if results.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}
