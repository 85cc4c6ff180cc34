//! `/ws/dashcam/` browser endpoint, per spec §6. One axum task per browser
//! connection; live video forwarding runs as a per-{phone, channel}
//! subscriber task feeding a shared outbound queue, since a browser may
//! have more than one channel live at once.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use base64::Engine as _;
use dashcam_protocol::bus::{BusMessage, StreamCommand, StreamOp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::repo::connections;
use crate::state::AppState;

const OUTBOUND_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum BrowserRequest {
    GetDevices,
    StartLive { phone: String, channel: u8, stream_type: u8 },
    StopLive { phone: String, channel: u8 },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BrowserResponse {
    Devices { devices: Vec<connections::DeviceSummary> },
    Response { action: &'static str, success: bool, phone: String, channel: u8 },
    InitSegment { codec: String, channel: u8, data: String },
    Video { channel: u8, data: String },
    Error { message: String },
}

pub async fn ws_browser_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_browser_socket(socket, state))
}

async fn handle_browser_socket(mut socket: WebSocket, state: AppState) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);
    let mut live: HashMap<(String, u8), JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<BrowserRequest>(&text) {
                            Ok(req) => handle_request(&state, &outbound_tx, &mut live, req).await,
                            Err(err) => send(&outbound_tx, &BrowserResponse::Error { message: format!("invalid JSON: {err}") }).await,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => { warn!(%err, "browser socket read error"); break; }
                }
            }
            Some(msg) = outbound_rx.recv() => {
                if socket.send(msg).await.is_err() { break; }
            }
        }
    }

    for (_, handle) in live.drain() {
        handle.abort();
    }
}

async fn handle_request(
    state: &AppState,
    outbound_tx: &mpsc::Sender<Message>,
    live: &mut HashMap<(String, u8), JoinHandle<()>>,
    req: BrowserRequest,
) {
    match req {
        BrowserRequest::GetDevices => match connections::list_devices(&state.pool).await {
            Ok(devices) => send(outbound_tx, &BrowserResponse::Devices { devices }).await,
            Err(err) => send(outbound_tx, &BrowserResponse::Error { message: err.to_string() }).await,
        },
        BrowserRequest::StartLive { phone, channel, stream_type } => {
            start_live(state, outbound_tx, live, phone, channel, stream_type).await;
        }
        BrowserRequest::StopLive { phone, channel } => {
            stop_live(state, live, phone, channel).await;
        }
    }
}

async fn start_live(
    state: &AppState,
    outbound_tx: &mpsc::Sender<Message>,
    live: &mut HashMap<(String, u8), JoinHandle<()>>,
    phone: String,
    channel: u8,
    stream_type: u8,
) {
    match connections::is_connected(&state.pool, &phone).await {
        Ok(true) => {}
        Ok(false) => {
            send(outbound_tx, &BrowserResponse::Error { message: "Device not connected".to_owned() }).await;
            return;
        }
        Err(err) => {
            send(outbound_tx, &BrowserResponse::Error { message: err.to_string() }).await;
            return;
        }
    }

    let cmd = StreamCommand {
        op: StreamOp::Start,
        identifier: phone.clone(),
        channel,
        stream_type,
        server_ip: state.public_ip.to_string(),
        video_port: state.video_port,
    };
    if !state.send_command(cmd).await {
        send(outbound_tx, &BrowserResponse::Error { message: "Device not connected".to_owned() }).await;
        return;
    }

    send(outbound_tx, &BrowserResponse::Response { action: "start_live", success: true, phone: phone.clone(), channel }).await;

    let mut rx = state.get_or_create_broadcast(&phone).await.subscribe();
    let tx = outbound_tx.clone();
    let handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(BusMessage::Init { channel: msg_channel, codec, payload, .. }) if msg_channel == channel => {
                    let data = base64::engine::general_purpose::STANDARD.encode(&payload);
                    send(&tx, &BrowserResponse::InitSegment { codec, channel, data }).await;
                }
                Ok(BusMessage::Segment { channel: msg_channel, payload, .. }) if msg_channel == channel => {
                    let data = base64::engine::general_purpose::STANDARD.encode(&payload);
                    send(&tx, &BrowserResponse::Video { channel, data }).await;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Some(previous) = live.insert((phone, channel), handle) {
        previous.abort();
    }
}

async fn stop_live(state: &AppState, live: &mut HashMap<(String, u8), JoinHandle<()>>, phone: String, channel: u8) {
    let cmd = StreamCommand {
        op: StreamOp::Stop,
        identifier: phone.clone(),
        channel,
        stream_type: 0,
        server_ip: state.public_ip.to_string(),
        video_port: state.video_port,
    };
    let _ = state.send_command(cmd).await;
    if let Some(handle) = live.remove(&(phone, channel)) {
        handle.abort();
    }
}

async fn send(tx: &mpsc::Sender<Message>, resp: &BrowserResponse) {
    let Ok(json) = serde_json::to_string(resp) else { return };
    if tx.try_send(Message::Text(json.into())).is_err() {
        warn!("browser outbound queue full, dropping message");
    }
}
