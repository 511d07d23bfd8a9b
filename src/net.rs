// ==============================================================================
// net.rs — WEBSOCKET FRONT END
// ------------------------------------------------------------------------------
// Per connection:
//   1) outgoing mpsc channel + send loop
//   2) session (own Simulation) + load ticket
//   3) vehicle load runs outside the state lock, then attaches if the session
//      is still around and the ticket still current
//   4) receive loop: JSON messages → handle_message()
// ==============================================================================

use crate::config::VehiclePatch;
use crate::scene::MeshSource;
use crate::state::{Session, SharedGameState};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::{Error as WsError, Message};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Key { key: String, down: bool },
    Blur,
    Focus,
    Camera,
    Orbit {
        #[serde(default)]
        yaw: f32,
        #[serde(default)]
        pitch: f32,
        #[serde(default)]
        zoom: f32,
    },
    Config(VehiclePatch),
    Reset,
    Debug { enabled: bool },
    Ping,
}

/// Applies one client message to its session; returns the reply, if any.
pub fn handle_message(session: &mut Session, msg: ClientMessage) -> Option<String> {
    let sim = &mut session.sim;
    match msg {
        ClientMessage::Key { key, down } => {
            if !sim.handle_key(&key, down) {
                debug!(id = %session.id, key = %key, "unbound key");
            }
            None
        }
        ClientMessage::Blur => {
            sim.blur();
            None
        }
        ClientMessage::Focus => {
            sim.focus();
            None
        }
        ClientMessage::Camera => {
            let mode = sim.toggle_camera();
            Some(json!({ "type": "camera", "mode": mode }).to_string())
        }
        ClientMessage::Orbit { yaw, pitch, zoom } => {
            sim.orbit_camera(yaw, pitch, zoom);
            None
        }
        ClientMessage::Config(patch) => match sim.update_config(&patch) {
            Ok(()) => Some(json!({ "type": "config", "ok": true }).to_string()),
            Err(e) => {
                warn!(id = %session.id, error = %e, "rejected config patch");
                Some(json!({ "type": "error", "message": e.to_string() }).to_string())
            }
        },
        ClientMessage::Reset => {
            sim.reset_vehicle();
            None
        }
        ClientMessage::Debug { enabled } => {
            session.debug = enabled;
            None
        }
        ClientMessage::Ping => Some(json!({ "type": "pong" }).to_string()),
    }
}

pub async fn start_websocket_server(
    state: Arc<Mutex<SharedGameState>>,
    source: Arc<dyn MeshSource>,
    bind: String,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&bind).await?;
    info!("WebSocket listening on ws://{bind}");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let state = Arc::clone(&state);
        let source = Arc::clone(&source);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(raw, state, source).await {
                warn!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    raw: TcpStream,
    state: Arc<Mutex<SharedGameState>>,
    source: Arc<dyn MeshSource>,
) -> Result<(), WsError> {
    let ws = accept_async(raw).await?;
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) Session
    // -------------------------------
    let (id, ticket) = state.lock().await.add_session(tx.clone());
    info!(%id, "player connected");
    let _ = tx.send(json!({ "type": "welcome", "player_id": id }).to_string());

    // -------------------------------
    // 3) Vehicle load (phase one outside the lock)
    // -------------------------------
    let loader = Arc::clone(&state);
    tokio::spawn(async move {
        let loaded = source.load().await;
        attach_loaded(&loader, id, ticket, loaded).await;
    });

    // -------------------------------
    // 4) Receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let parsed: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                debug!(%id, error = %e, "ignoring malformed message");
                continue;
            }
        };

        let mut game = state.lock().await;
        let Some(session) = game.session_mut(&id) else { break };
        if let Some(reply) = handle_message(session, parsed) {
            let _ = tx.send(reply);
        }
    }

    info!(%id, "player disconnected");
    state.lock().await.remove_session(&id);
    Ok(())
}

async fn attach_loaded(
    state: &Mutex<SharedGameState>,
    id: Uuid,
    ticket: crate::simulation::LoadTicket,
    loaded: Result<crate::scene::MeshData, crate::error::VehicleError>,
) {
    let mut game = state.lock().await;
    let Some(session) = game.session_mut(&id) else {
        warn!(%id, "session closed before its vehicle finished loading");
        return;
    };
    match loaded {
        // attach_physics logs its own failures
        Ok(mesh) => {
            let _ = session.sim.attach_physics(ticket, mesh);
        }
        Err(e) => error!(%id, error = %e, "vehicle load failed"),
    }
}
