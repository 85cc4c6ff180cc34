//! JT808 signaling server: accept loop grounded on
//! `crates/timer-core/src/workers/client_connector.rs` — bind, loop-accept,
//! spawn one task per connection, never return.

use std::sync::Arc;
use std::time::Duration;

use dashcam_codec::body::parse_message;
use dashcam_codec::frame::{decode_frame, locate_frame};
use sqlx::PgPool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::DeviceCatalog;
use crate::notify::LocationNotifier;
use crate::registry::{DeviceRegistry, WRITE_QUEUE_DEPTH};
use crate::repo::connections;
use crate::router::{self, RouterContext};

const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const READ_CHUNK: usize = 4096;

pub struct SignalingServer {
    registry: Arc<DeviceRegistry>,
    pool: PgPool,
    catalog: Arc<dyn DeviceCatalog>,
    notifier: Arc<dyn LocationNotifier>,
}

impl SignalingServer {
    pub fn new(registry: Arc<DeviceRegistry>, pool: PgPool, catalog: Arc<dyn DeviceCatalog>, notifier: Arc<dyn LocationNotifier>) -> Self {
        Self { registry, pool, catalog, notifier }
    }

    pub async fn begin(self, bind_addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!(%bind_addr, "signaling server listening");
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let registry = self.registry.clone();
            let pool = self.pool.clone();
            let catalog = self.catalog.clone();
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(socket, peer_addr, registry, pool, catalog, notifier).await {
                    debug!(%peer_addr, %err, "signaling connection ended");
                }
            });
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer_addr: std::net::SocketAddr,
    registry: Arc<DeviceRegistry>,
    pool: PgPool,
    catalog: Arc<dyn DeviceCatalog>,
    notifier: Arc<dyn LocationNotifier>,
) -> Result<(), crate::error::IngestError> {
    let (mut reader, mut writer) = socket.into_split();
    let (write_tx, mut write_rx) = mpsc::channel::<bytes::Bytes>(WRITE_QUEUE_DEPTH);

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = write_rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
            let _ = writer.flush().await;
        }
    });

    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut session: Option<Arc<crate::registry::Session>> = None;

    // Compare-and-remove: a connection that lost the race to a newer
    // registration on another socket must not evict the session that
    // superseded it, nor mark that (still live) device disconnected.
    let teardown = |session: Option<Arc<crate::registry::Session>>, registry: Arc<DeviceRegistry>, pool: PgPool| async move {
        if let Some(session) = session {
            let identifier = session.identifier.clone();
            if registry.remove_if_current(&identifier, &session).await {
                if let Err(err) = connections::mark_disconnected(&pool, &identifier).await {
                    warn!(%err, %identifier, "failed to persist disconnect");
                }
            }
        }
    };

    loop {
        let mut chunk = [0u8; READ_CHUNK];
        let superseded = session.as_ref().map(|s| s.superseded.clone());

        let read_result = tokio::select! {
            res = tokio::time::timeout(IDLE_TIMEOUT, reader.read(&mut chunk)) => res,
            () = async {
                if let Some(notify) = &superseded { notify.notified().await; } else { std::future::pending::<()>().await; }
            } => {
                info!(%peer_addr, "session superseded, closing connection");
                break;
            }
        };

        let n = match read_result {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                warn!(%peer_addr, "signaling connection idle timeout");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        while let Some((start, end)) = locate_frame(&buf) {
            let enclosed = buf[start + 1..end - 1].to_vec();
            buf.drain(..end);

            let decoded = match decode_frame(&enclosed) {
                Ok(decoded) => decoded,
                Err(err) => {
                    debug!(%peer_addr, %err, "dropping malformed frame");
                    continue;
                }
            };
            if !decoded.checksum_ok {
                warn!(%peer_addr, phone = %decoded.header.phone, "checksum mismatch, parsing anyway");
            }

            if session.is_none() {
                session = Some(registry.register(&decoded.header.phone, peer_addr, write_tx.clone()).await);
            }
            let Some(active) = session.as_ref() else { continue };

            let message = parse_message(decoded.header.msg_id, &decoded.body);
            let ctx = RouterContext { registry: &registry, pool: &pool, catalog: catalog.as_ref(), notifier: notifier.clone() };
            if let Some(response) = router::route(&ctx, active, &decoded.header, message).await {
                if !active.send(response) {
                    warn!(%peer_addr, "write queue saturated, dropping connection");
                    teardown(Some(active.clone()), registry.clone(), pool.clone()).await;
                    writer_task.abort();
                    return Ok(());
                }
            }
        }
    }

    teardown(session, registry, pool).await;
    writer_task.abort();
    Ok(())
}

