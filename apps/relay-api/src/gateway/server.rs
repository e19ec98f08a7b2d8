//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time;

use crate::auth::middleware::AuthUser;
use crate::auth::Identity;
use crate::error::RelayError;
use crate::AppState;

use super::events::{
    ClientMessage, EventName, GatewayMessage, HeartbeatPayload, PublishPayload, RoomPayload,
    OP_HEARTBEAT, OP_JOIN, OP_LEAVE, OP_PUBLISH,
};
use super::handler::Caller;
use super::registry::SessionRegistry;
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// What the event loop should do after handling one client message.
enum Reply {
    Send(GatewayMessage),
    Nothing,
    Close(u16, &'static str),
}

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

/// The bearer token is checked before the upgrade, so an unauthenticated
/// client gets a plain 401 instead of a socket.
async fn ws_upgrade(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, identity))
}

async fn handle_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let session = match state
        .sessions
        .register(relay_common::id::session_id(), identity.user_id)
    {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(%err, user_id = identity.user_id, "failed to register gateway session");
            return;
        }
    };

    let _registration = Registration {
        sessions: Arc::clone(&state.sessions),
        session: Arc::clone(&session),
    };

    tracing::info!(
        session_id = %session.session_id,
        user_id = session.user_id,
        expires_at = %identity.expires_at,
        "gateway session established"
    );

    let (mut ws_tx, ws_rx) = socket.split();

    let ready = GatewayMessage::dispatch(
        EventName::READY,
        session.next_seq(),
        serde_json::json!({
            "session_id": session.session_id,
            "user_id": session.user_id,
            "heartbeat_interval": state.config.heartbeat_interval_ms,
        }),
    );
    if send_message(&mut ws_tx, &ready).await.is_ok() {
        run_session(&state, &session, ws_tx, ws_rx).await;
    }
}

/// Unregisters the session when the connection task ends, including by panic.
/// Leaves every joined room; in-flight broadcasts skip the closed outbox.
struct Registration {
    sessions: Arc<SessionRegistry>,
    session: Arc<GatewaySession>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.sessions.unregister(&self.session.session_id);
        tracing::info!(
            session_id = %self.session.session_id,
            user_id = self.session.user_id,
            "gateway session ended"
        );
    }
}

/// Main session event loop: read client messages, drain the outbox, enforce heartbeat.
async fn run_session(
    state: &AppState,
    session: &Arc<GatewaySession>,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
) {
    // Client must heartbeat within 1.5× the interval.
    let mut heartbeat_timer = time::interval(state.config.heartbeat_deadline());
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                                break;
                            }
                        };

                        if client_msg.op == OP_HEARTBEAT {
                            got_heartbeat = true;
                        }

                        match handle_op(state, session, client_msg).await {
                            Reply::Send(reply) => {
                                if send_message(&mut ws_tx, &reply).await.is_err() {
                                    break;
                                }
                            }
                            Reply::Nothing => {}
                            Reply::Close(code, reason) => {
                                let _ = send_close(&mut ws_tx, code, reason).await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Room event queued for this session.
            next = session.outbox().recv() => {
                let Some(event) = next else {
                    break;
                };
                let msg = match GatewayMessage::room_event(session.next_seq(), &event) {
                    Ok(msg) => msg,
                    Err(err) => {
                        tracing::warn!(
                            session_id = %session.session_id,
                            room_id = event.room_id,
                            %err,
                            "failed to encode room event, skipping"
                        );
                        continue;
                    }
                };
                if send_message(&mut ws_tx, &msg).await.is_err() {
                    break;
                }
            }

            // Heartbeat timeout check.
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        session_id = %session.session_id,
                        "heartbeat timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

async fn handle_op(state: &AppState, session: &GatewaySession, msg: ClientMessage) -> Reply {
    match msg.op {
        OP_HEARTBEAT => {
            let payload: HeartbeatPayload =
                serde_json::from_value(msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
            Reply::Send(GatewayMessage::heartbeat_ack(payload.seq))
        }
        OP_JOIN => {
            let result = parse::<RoomPayload>(msg.d).and_then(|room| {
                state.broadcaster.join(room.room_id, &session.session_id)?;
                Ok(room.room_id)
            });
            match result {
                Ok(room_id) => Reply::Send(GatewayMessage::dispatch(
                    EventName::ROOM_JOINED,
                    session.next_seq(),
                    serde_json::json!({ "roomId": room_id }),
                )),
                Err(err) => request_failed(session, err),
            }
        }
        OP_LEAVE => match parse::<RoomPayload>(msg.d) {
            Ok(room) => {
                state.broadcaster.leave(room.room_id, &session.session_id);
                Reply::Send(GatewayMessage::dispatch(
                    EventName::ROOM_LEFT,
                    session.next_seq(),
                    serde_json::json!({ "roomId": room.room_id }),
                ))
            }
            Err(err) => request_failed(session, err),
        },
        OP_PUBLISH => {
            let publish = match parse::<PublishPayload>(msg.d) {
                Ok(publish) => publish,
                Err(err) => return request_failed(session, err),
            };
            let (event, token) = publish.into_parts();
            let caller = Caller::session(&session.session_id).with_credential(token.as_deref());

            // The sender's copy arrives through its outbox like everyone else's.
            match state.gateway.submit(caller, event).await {
                Ok(_) => Reply::Nothing,
                Err(err) => request_failed(session, err),
            }
        }
        _ => Reply::Close(CLOSE_UNKNOWN_OPCODE, "Unknown opcode"),
    }
}

fn request_failed(session: &GatewaySession, err: RelayError) -> Reply {
    if err.is_rejection() {
        tracing::debug!(session_id = %session.session_id, %err, "request rejected");
    } else {
        tracing::warn!(session_id = %session.session_id, code = err.code(), %err, "request failed");
    }
    Reply::Send(GatewayMessage::error(&err))
}

fn parse<T: DeserializeOwned>(data: Value) -> Result<T, RelayError> {
    serde_json::from_value(data).map_err(|e| RelayError::InvalidPayload(e.to_string()))
}

async fn send_message(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
