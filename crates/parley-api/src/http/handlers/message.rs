//! Message HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/messages             - Send a message as the caller
//! - GET  /api/v1/messages?user_id=... - Conversation with another user, newest first

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use parley_types::event::MessagePayload;
use parley_types::message::UserId;

use crate::http::error::AppError;
use crate::http::extractors::identity::Identity;
use crate::http::response::RequestTimer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: UserId,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// The other participant.
    pub user_id: Option<UserId>,
    pub limit: Option<usize>,
}

/// POST /api/v1/messages
pub async fn send_message(
    State(state): State<AppState>,
    Identity(sender_id): Identity,
    axum::Json(body): axum::Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let timer = RequestTimer::start();

    let message = state
        .chat_service
        .send_message(sender_id, body.receiver_id, &body.message)
        .await?;

    tracing::debug!(id = message.id, sender_id, receiver_id = body.receiver_id, "message sent via HTTP");

    Ok((
        StatusCode::CREATED,
        timer.finish(MessagePayload::from(&message)),
    ))
}

/// GET /api/v1/messages?user_id=&limit=
pub async fn get_history(
    State(state): State<AppState>,
    Identity(user_id): Identity,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let timer = RequestTimer::start();

    let other_user_id = query
        .user_id
        .ok_or_else(|| AppError::Validation("Query parameter 'user_id' is required".to_string()))?;
    let limit = query
        .limit
        .unwrap_or_else(|| state.chat_service.default_history_limit());

    let messages = state
        .chat_service
        .get_history(user_id, other_user_id, limit)
        .await?;

    let payload: Vec<MessagePayload> = messages.iter().map(MessagePayload::from).collect();
    Ok(timer.finish(payload))
}
