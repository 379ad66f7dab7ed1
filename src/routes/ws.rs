//! WebSocket upgrade + per-connection event loop.
//!
//! One connection is one practice session. The loop multiplexes four sources and
//! applies them to the `Session` one at a time:
//!   - client messages (JSON, see `protocol::ClientWsMessage`)
//!   - identity transitions from the session's provider
//!   - completions of spawned oracle/store work
//!   - the debounce deadline of the pending progress save

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::identity::{IdentityProvider, LocalIdentity};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::Session;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "vericode_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "vericode_backend", "WebSocket connected");

  let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentity::new(state.identity.clone()));
  let mut auth_rx = identity.subscribe();
  let (events_tx, mut events_rx) = mpsc::unbounded_channel();
  let mut session = Session::new(state, identity, events_tx);

  loop {
    let deadline = session.save_deadline();
    // Identity changes are applied before any queued client message is served.
    let replies = tokio::select! {
      biased;
      changed = auth_rx.changed() => {
        if changed.is_err() {
          break;
        }
        let user = auth_rx.borrow_and_update().clone();
        session.handle_auth(user)
      },
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => {
          debug!(target: "session", len = txt.len(), "WS message received");
          match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(msg) => session.handle_client(msg).await,
            Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }],
          }
        }
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => continue,
        Some(Err(e)) => {
          error!(target: "vericode_backend", error = %e, "WS receive error");
          break;
        }
      },
      Some(event) = events_rx.recv() => session.handle_event(event),
      _ = async {
        match deadline {
          Some(at) => tokio::time::sleep_until(at).await,
          None => std::future::pending::<()>().await,
        }
      } => session.on_save_deadline(),
    };

    if !send_all(&mut socket, replies).await {
      break;
    }
  }

  session.shutdown();
  info!(target: "vericode_backend", "WebSocket disconnected");
}

/// Serialize and send each reply. Returns false once the socket is gone.
async fn send_all(socket: &mut WebSocket, replies: Vec<ServerWsMessage>) -> bool {
  for reply in replies {
    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });
    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "vericode_backend", error = %e, "WS send error");
      return false;
    }
  }
  true
}
