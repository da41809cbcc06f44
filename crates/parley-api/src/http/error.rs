//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use parley_types::error::ChatError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors from the chat service.
    Chat(ChatError),
    /// Missing or malformed caller identity.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

/// Status and machine-readable code for a chat error.
///
/// Shared with the WebSocket handler, which reports the same codes.
pub fn chat_error_status(e: &ChatError) -> (StatusCode, &'static str) {
    match e {
        ChatError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "INVALID_QUERY"),
        ChatError::InvalidMessage(_) => (StatusCode::BAD_REQUEST, "INVALID_MESSAGE"),
        ChatError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ChatError::ProviderUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE")
        }
        ChatError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR"),
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Chat(e) => {
                let (status, code) = chat_error_status(e);
                (status, code, e.to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let mut response = ApiResponse::<()>::error(code, &message, String::new(), 0).into_response();
        *response.status_mut() = status;
        response
    }
}
