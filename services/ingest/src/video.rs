//! JT1078 video server: same accept-loop shape as the signaling server, but
//! scanning for the magic-word packet boundary instead of `0x7E` flags, and
//! feeding complete payloads through the reassembler and transmuxer instead
//! of a message router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashcam_codec::packet::{find_packet_start, packet_size, parse_packet};
use dashcam_codec::reassembler::Reassembler;
use dashcam_mp4::{Segment, Transmuxer};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::bus::BusHandle;

/// Video may legitimately go idle between stream sessions, so this is much
/// longer than the JT808 120s timeout.
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const READ_CHUNK: usize = 8192;

pub struct VideoServer {
    bus: BusHandle,
}

impl VideoServer {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }

    pub async fn begin(self, bind_addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!(%bind_addr, "video server listening");
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let bus = self.bus.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(socket, bus).await {
                    debug!(%peer_addr, %err, "video connection ended");
                }
            });
        }
    }
}

async fn handle_connection(mut socket: tokio::net::TcpStream, bus: BusHandle) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut reassembler = Reassembler::new();
    let mut transmuxers: HashMap<(String, u8), Transmuxer> = HashMap::new();

    loop {
        let mut chunk = [0u8; READ_CHUNK];
        let n = match tokio::time::timeout(IDLE_TIMEOUT, socket.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                debug!("video connection idle timeout");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        loop {
            let Some(offset) = find_packet_start(&buf) else { break };
            if offset > 0 {
                buf.drain(..offset);
            }
            let Some(size) = packet_size(&buf) else { break };
            if buf.len() < size {
                break;
            }

            let packet = buf[..size].to_vec();
            buf.drain(..size);

            let (header, body) = match parse_packet(&packet) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(%err, "dropping malformed JT1078 packet");
                    continue;
                }
            };

            if !header.data_type.is_video() {
                continue;
            }

            let Some(frame) = reassembler.push(&header.sim, header.channel, header.subpackage, &body) else { continue };

            let transmuxer = transmuxers.entry((header.sim.clone(), header.channel)).or_default();
            for segment in transmuxer.push(&frame) {
                match segment {
                    Segment::Init { codec, payload } => bus.publish_init(&header.sim, header.channel, &codec, payload).await,
                    Segment::Media { payload } => bus.publish_segment(&header.sim, header.channel, payload).await,
                }
            }
        }
    }

    Ok(())
}
