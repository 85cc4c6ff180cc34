//! Bus-ingress endpoint: `services/ingest` dials in here as a WebSocket
//! client, symmetric to `ws_forwarder_handler` accepting the pack's
//! forwarder uplink. One connection at a time; segments flow in, stream
//! commands flow out on the same socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use dashcam_protocol::bus::{BusMessage, StreamCommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::AppState;

const COMMAND_QUEUE_DEPTH: usize = 64;

pub async fn ws_bus_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_bus_socket(socket, state))
}

async fn handle_bus_socket(mut socket: WebSocket, state: AppState) {
    if state.is_bus_connected().await {
        warn!("rejecting second bus connection attempt, one ingest node is already connected");
        let _ = socket.close().await;
        return;
    }

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<StreamCommand>(COMMAND_QUEUE_DEPTH);
    state.set_bus_sender(Some(cmd_tx)).await;
    info!("ingest bus connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<BusMessage>(&text) {
                            Ok(msg) => dispatch_bus_message(&state, msg).await,
                            Err(err) => warn!(%err, "ignoring malformed bus message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => { warn!(%err, "bus socket read error"); break; }
                }
            }
            Some(cmd) = cmd_rx.recv() => {
                let Ok(json) = serde_json::to_string(&cmd) else { continue };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.set_bus_sender(None).await;
    info!("ingest bus disconnected");
}

async fn dispatch_bus_message(state: &AppState, msg: BusMessage) {
    match &msg {
        BusMessage::Init { identifier, .. } | BusMessage::Segment { identifier, .. } => {
            let tx = state.get_or_create_broadcast(identifier).await;
            let _ = tx.send(msg);
        }
        BusMessage::Heartbeat => {}
    }
}
