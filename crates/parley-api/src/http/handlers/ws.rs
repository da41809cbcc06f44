//! WebSocket handler for live message delivery and socket-side sends.
//!
//! `GET /api/v1/ws?user_id=<id>` upgrades to a WebSocket joined to that
//! user's fanout. The server then:
//!
//! - sends `{"type":"connected","user_id":..}` once,
//! - forwards `new_message` (addressed to the user) and `message_sent`
//!   (sent by the user from any session) events as JSON text frames,
//! - accepts `{"type":"send_message","receiver_id":..,"message":".."}` and
//!   `{"type":"ping"}` from the client.
//!
//! A socket-side send is confirmed by the `message_sent` event arriving
//! through the fanout like any other; failures come back as an `error`
//! event on this socket only.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;

use parley_types::event::ChatEvent;
use parley_types::message::UserId;

use crate::http::error::{AppError, chat_error_status};
use crate::http::extractors::identity::parse_user_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Option<String>,
}

/// Incoming command from a WebSocket client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    SendMessage { receiver_id: UserId, message: String },
    Ping,
}

/// Upgrade an HTTP request to a WebSocket connection for `user_id`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Result<Response, AppError> {
    let raw = params.user_id.ok_or_else(|| {
        AppError::Unauthorized("Missing caller identity. Provide '?user_id=<id>'.".to_string())
    })?;
    let user_id = parse_user_id(&raw)?;

    Ok(ws
        .on_upgrade(move |socket| handle_ws_connection(socket, state, user_id))
        .into_response())
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, user_id: UserId) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Join the fanout before announcing the connection so nothing sent
    // after `connected` is missed.
    let mut subscription = state.chat_service.fanout().subscribe(user_id);
    tracing::debug!(user_id, "WebSocket connected");

    if send_event(&mut ws_sender, &ChatEvent::Connected { user_id })
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                if send_event(&mut ws_sender, &event).await.is_err() {
                    break;
                }
            }

            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(reply) = process_command(&state, user_id, &text).await {
                            if send_event(&mut ws_sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(user_id, "WebSocket receive error: {err}");
                        break;
                    }
                    // Binary and protocol frames are handled by axum.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(user_id, "WebSocket connection closed");
}

/// Handle one client frame. Returns the event to send back on this socket, if any.
async fn process_command(state: &AppState, user_id: UserId, text: &str) -> Option<ChatEvent> {
    let cmd: WsCommand = match serde_json::from_str(text) {
        Ok(cmd) => cmd,
        Err(err) => {
            tracing::warn!(user_id, error = %err, "Ignoring malformed WebSocket command");
            return Some(ChatEvent::Error {
                code: "INVALID_COMMAND".to_string(),
                message: err.to_string(),
            });
        }
    };

    match cmd {
        WsCommand::SendMessage {
            receiver_id,
            message,
        } => match state
            .chat_service
            .send_message(user_id, receiver_id, &message)
            .await
        {
            Ok(_) => None,
            Err(e) => {
                let (_, code) = chat_error_status(&e);
                Some(ChatEvent::Error {
                    code: code.to_string(),
                    message: e.to_string(),
                })
            }
        },
        WsCommand::Ping => Some(ChatEvent::Pong),
    }
}

async fn send_event<S>(sender: &mut S, event: &ChatEvent) -> Result<(), ()>
where
    S: Sink<WsMessage, Error = axum::Error> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!("Failed to serialize ChatEvent: {err}");
            return Ok(());
        }
    };
    sender
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|err| tracing::debug!("WebSocket send failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::sqlite_state;

    #[test]
    fn commands_parse_from_tagged_json() {
        let cmd: WsCommand =
            serde_json::from_str(r#"{"type":"send_message","receiver_id":2,"message":"hi"}"#)
                .unwrap();
        assert!(matches!(cmd, WsCommand::SendMessage { receiver_id: 2, ref message } if message == "hi"));

        let ping: WsCommand = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, WsCommand::Ping));
    }

    #[tokio::test]
    async fn ping_gets_pong_and_garbage_gets_error() {
        let dir = tempfile::tempdir().unwrap();
        let (state, handle) = sqlite_state(dir.path()).await;

        assert_eq!(
            process_command(&state, 1, r#"{"type":"ping"}"#).await,
            Some(ChatEvent::Pong)
        );
        assert!(matches!(
            process_command(&state, 1, "not json").await,
            Some(ChatEvent::Error { ref code, .. }) if code == "INVALID_COMMAND"
        ));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn socket_send_is_delivered_through_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let (state, handle) = sqlite_state(dir.path()).await;
        let mut bob = state.chat_service.fanout().subscribe(2);

        let reply = process_command(
            &state,
            1,
            r#"{"type":"send_message","receiver_id":2,"message":"hello bob"}"#,
        )
        .await;
        assert!(reply.is_none());

        match bob.recv().await {
            Some(ChatEvent::NewMessage(payload)) => {
                assert_eq!(payload.sender_id, 1);
                assert_eq!(payload.message, "hello bob");
            }
            other => panic!("expected new_message, got {other:?}"),
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_socket_send_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let (state, handle) = sqlite_state(dir.path()).await;

        let reply = process_command(
            &state,
            1,
            r#"{"type":"send_message","receiver_id":2,"message":"   "}"#,
        )
        .await;
        assert!(matches!(
            reply,
            Some(ChatEvent::Error { ref code, .. }) if code == "INVALID_MESSAGE"
        ));
        handle.shutdown().await;
    }
}
