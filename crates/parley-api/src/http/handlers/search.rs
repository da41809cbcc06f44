//! Semantic search HTTP handler.
//!
//! GET /api/v1/search?q=&limit=&user_id= - Search the caller's messages by
//! meaning, optionally narrowed to the conversation with `user_id`.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use parley_types::event::MessagePayload;
use parley_types::message::UserId;

use crate::http::error::AppError;
use crate::http::extractors::identity::Identity;
use crate::http::response::RequestTimer;
use crate::state::AppState;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub similarity: f32,
    pub message: MessagePayload,
}

/// GET /api/v1/search
pub async fn search_messages(
    State(state): State<AppState>,
    Identity(user_id): Identity,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let timer = RequestTimer::start();

    let results = state
        .chat_service
        .semantic_search(
            user_id,
            &query.q,
            query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            query.user_id,
        )
        .await?;

    let hits: Vec<SearchHit> = results
        .iter()
        .map(|r| SearchHit {
            rank: r.rank,
            similarity: r.similarity,
            message: MessagePayload::from(&r.message),
        })
        .collect();

    Ok(timer.finish(hits))
}
