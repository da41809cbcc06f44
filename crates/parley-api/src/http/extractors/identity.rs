//! Caller identity extractor.
//!
//! The session layer in front of Parley authenticates users and forwards
//! the user id in the `X-User-Id` header. The id is trusted as given.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use parley_types::message::UserId;

use crate::http::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized("Missing caller identity. Provide 'X-User-Id: <id>'.".to_string())
        })?;

        let raw = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid X-User-Id header encoding".to_string()))?;

        parse_user_id(raw).map(Identity)
    }
}

/// Parse a user id from a header or query value.
pub fn parse_user_id(raw: &str) -> Result<UserId, AppError> {
    raw.trim()
        .parse::<UserId>()
        .map_err(|_| AppError::Unauthorized(format!("Invalid user id '{raw}'")))
}
