//! Fan-out bus client: the ingest node dials out to the gateway over
//! WebSocket, directly grounded on `services/forwarder/src/uplink.rs`'s
//! `UplinkSession::connect` (connect, hello/heartbeat, reconnect-on-drop).
//! Segments flow ingest → gateway; [`StreamCommand`]s flow the other way on
//! the same socket.

use std::sync::Arc;
use std::time::Duration;

use dashcam_codec::body::{build_av_control, build_realtime_av_request};
use dashcam_protocol::bus::{BusMessage, StreamCommand, StreamOp};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};

use crate::registry::DeviceRegistry;

const OUTBOUND_QUEUE_DEPTH: usize = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// AV control "close" command per the pack's JT1078 command conventions;
/// see DESIGN.md for why 0 was chosen when the spec leaves the exact code
/// unspecified.
const AV_CONTROL_STOP: u8 = 0;

#[derive(Clone)]
pub struct BusHandle {
    outbound_tx: mpsc::Sender<BusMessage>,
}

impl BusHandle {
    /// Queues a segment for publish; drops (and logs) it instead of
    /// blocking when the bus is backed up or disconnected, per spec §7's
    /// "bus publish failure: log, drop segment" policy.
    pub async fn publish_init(&self, identifier: &str, channel: u8, codec: &str, payload: Vec<u8>) {
        let msg = BusMessage::Init { identifier: identifier.to_string(), channel, codec: codec.to_string(), payload };
        if self.outbound_tx.try_send(msg).is_err() {
            warn!(identifier, channel, "bus queue full, dropping init segment");
        }
    }

    pub async fn publish_segment(&self, identifier: &str, channel: u8, payload: Vec<u8>) {
        let msg = BusMessage::Segment { identifier: identifier.to_string(), channel, payload };
        if self.outbound_tx.try_send(msg).is_err() {
            warn!(identifier, channel, "bus queue full, dropping media segment");
        }
    }
}

pub struct AvRequestConfig {
    pub public_ip: String,
    pub tcp_port: u16,
    pub udp_port: u16,
}

/// Spawns the bus connection task and returns a [`BusHandle`] for the
/// video server; the task itself runs until the process shuts down,
/// reconnecting with a fixed backoff on every drop.
pub fn spawn(bus_url: String, registry: Arc<DeviceRegistry>, av_cfg: AvRequestConfig) -> BusHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    tokio::spawn(run(bus_url, registry, av_cfg, outbound_rx));
    BusHandle { outbound_tx }
}

async fn run(bus_url: String, registry: Arc<DeviceRegistry>, av_cfg: AvRequestConfig, mut outbound_rx: mpsc::Receiver<BusMessage>) {
    loop {
        match connect_async(&bus_url).await {
            Ok((stream, _response)) => {
                info!(%bus_url, "bus connected");
                let (mut write, mut read) = stream.split();
                let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
                heartbeat.tick().await;

                loop {
                    tokio::select! {
                        maybe_msg = outbound_rx.recv() => {
                            let Some(msg) = maybe_msg else { return };
                            let Ok(json) = serde_json::to_string(&msg) else { continue };
                            if write.send(Message::Text(json.into())).await.is_err() { break; }
                        }
                        _ = heartbeat.tick() => {
                            let json = serde_json::to_string(&BusMessage::Heartbeat).expect("Heartbeat always serializes");
                            if write.send(Message::Text(json.into())).await.is_err() { break; }
                        }
                        incoming = read.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<StreamCommand>(&text) {
                                        Ok(cmd) => handle_command(&registry, &av_cfg, cmd).await,
                                        Err(err) => warn!(%err, "ignoring malformed stream command"),
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Err(err)) => { warn!(%err, "bus read error"); break; }
                                _ => {}
                            }
                        }
                    }
                }
            }
            Err(err) => warn!(%bus_url, %err, "bus connect failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn handle_command(registry: &Arc<DeviceRegistry>, av_cfg: &AvRequestConfig, cmd: StreamCommand) {
    let Some(session) = resolve(registry, &cmd.identifier).await else {
        warn!(identifier = %cmd.identifier, "stream command for unknown/disconnected device");
        return;
    };

    let frame = match cmd.op {
        StreamOp::Start => {
            session.set_streaming(Some(cmd.channel));
            build_realtime_av_request(
                &session.identifier,
                cmd.channel,
                &av_cfg.public_ip,
                av_cfg.tcp_port,
                av_cfg.udp_port,
                cmd.stream_type,
                session.next_seq(),
            )
        }
        StreamOp::Stop => {
            session.set_streaming(None);
            build_av_control(&session.identifier, cmd.channel, AV_CONTROL_STOP, 0, 0, session.next_seq())
        }
    };

    if !session.send(frame) {
        warn!(identifier = %session.identifier, "write queue saturated delivering stream command");
    }
}

async fn resolve(registry: &Arc<DeviceRegistry>, identifier: &str) -> Option<Arc<crate::registry::Session>> {
    if let Some(session) = registry.lookup(identifier).await {
        return Some(session);
    }
    registry.lookup_by_imei(identifier).await
}
