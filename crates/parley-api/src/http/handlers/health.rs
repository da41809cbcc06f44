//! GET /health - liveness plus the active backend and search mode (no identity required).

use axum::Json;
use axum::extract::State;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let service = &state.chat_service;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.backend(),
        "search_mode": service.search_mode().to_string(),
        "embedding_model": service.model_name(),
        "online_users": service.fanout().online_users(),
    }))
}
