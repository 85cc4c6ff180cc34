//! Process-wide device session map. Mirrors the teacher's `AppState`
//! pattern in `state.rs`: a single `RwLock` over the top-level map, with
//! every field inside a session behind its own lock or atomic so that
//! `next_seq` and writes never wait on the map lock.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};

/// Bound on the per-connection outbound frame queue. A device that can't
/// keep up gets its connection dropped rather than growing this queue
/// without limit — see spec's back-pressure policy for the signaling and
/// video servers.
pub const WRITE_QUEUE_DEPTH: usize = 64;

pub struct Session {
    pub identifier: String,
    pub peer_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    imei: Mutex<Option<String>>,
    auth_code: Mutex<Option<String>>,
    manufacturer: Mutex<Option<String>>,
    terminal_model: Mutex<Option<String>>,
    seq: AtomicU16,
    last_heartbeat: Mutex<DateTime<Utc>>,
    last_location_at: Mutex<Option<DateTime<Utc>>>,
    is_streaming: AtomicBool,
    stream_channel: AtomicU8,
    writer: mpsc::Sender<Bytes>,
    /// Fired when a later registration supersedes this session, so the
    /// owning reader task can tear itself down.
    pub superseded: Arc<Notify>,
}

impl Session {
    fn new(identifier: String, peer_addr: SocketAddr, writer: mpsc::Sender<Bytes>) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            identifier,
            peer_addr,
            connected_at: now,
            imei: Mutex::new(None),
            auth_code: Mutex::new(None),
            manufacturer: Mutex::new(None),
            terminal_model: Mutex::new(None),
            seq: AtomicU16::new(0),
            last_heartbeat: Mutex::new(now),
            last_location_at: Mutex::new(None),
            is_streaming: AtomicBool::new(false),
            stream_channel: AtomicU8::new(0),
            writer,
            superseded: Arc::new(Notify::new()),
        })
    }

    /// Atomic fetch-and-add modulo 65536 (`u16` wraps on overflow); never
    /// touches the registry lock or does I/O.
    pub fn next_seq(&self) -> u16 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn imei(&self) -> Option<String> {
        self.imei.lock().await.clone()
    }

    pub async fn set_imei(&self, imei: String) {
        *self.imei.lock().await = Some(imei);
    }

    pub async fn auth_code(&self) -> Option<String> {
        self.auth_code.lock().await.clone()
    }

    pub async fn set_auth_code(&self, code: String) {
        *self.auth_code.lock().await = Some(code);
    }

    pub async fn set_metadata(&self, manufacturer: String, terminal_model: String) {
        *self.manufacturer.lock().await = Some(manufacturer);
        *self.terminal_model.lock().await = Some(terminal_model);
    }

    pub async fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock().await = Utc::now();
    }

    pub async fn last_heartbeat(&self) -> DateTime<Utc> {
        *self.last_heartbeat.lock().await
    }

    pub async fn touch_location(&self) {
        *self.last_location_at.lock().await = Some(Utc::now());
    }

    pub fn set_streaming(&self, channel: Option<u8>) {
        match channel {
            Some(ch) => {
                self.stream_channel.store(ch, Ordering::Relaxed);
                self.is_streaming.store(true, Ordering::Relaxed);
            }
            None => {
                self.is_streaming.store(false, Ordering::Relaxed);
                self.stream_channel.store(0, Ordering::Relaxed);
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming.load(Ordering::Relaxed)
    }

    pub fn stream_channel(&self) -> u8 {
        self.stream_channel.load(Ordering::Relaxed)
    }

    /// Queues a frame for the device's writer task. Returns `false` (and
    /// does not block) when the write queue is saturated — the caller
    /// should treat that as grounds to drop the connection.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.writer.try_send(Bytes::from(frame)).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub identifier: String,
    pub imei: Option<String>,
    pub peer_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub is_streaming: bool,
    pub stream_channel: u8,
}

#[derive(Default)]
pub struct DeviceRegistry {
    by_identifier: RwLock<HashMap<String, Arc<Session>>>,
    imei_index: RwLock<HashMap<String, String>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the session for `identifier`. If a session
    /// already exists it is superseded: its `superseded` notifier fires so
    /// the old connection's reader task tears itself down, per spec's
    /// "supersession, not coexistence" invariant.
    pub async fn register(
        &self,
        identifier: &str,
        peer_addr: SocketAddr,
        writer: mpsc::Sender<Bytes>,
    ) -> Arc<Session> {
        let session = Session::new(identifier.to_string(), peer_addr, writer);
        let mut map = self.by_identifier.write().await;
        if let Some(prior) = map.insert(identifier.to_string(), session.clone()) {
            prior.superseded.notify_waiters();
        }
        session
    }

    pub async fn lookup(&self, identifier: &str) -> Option<Arc<Session>> {
        self.by_identifier.read().await.get(identifier).cloned()
    }

    pub async fn lookup_by_imei(&self, imei: &str) -> Option<Arc<Session>> {
        let identifier = self.imei_index.read().await.get(imei).cloned()?;
        self.lookup(&identifier).await
    }

    pub async fn index_imei(&self, identifier: &str, imei: &str) {
        self.imei_index.write().await.insert(imei.to_string(), identifier.to_string());
    }

    /// Removes `identifier` only if it still maps to `session` — a
    /// compare-and-remove so a connection tearing down after being
    /// superseded can't evict the session that replaced it. Returns whether
    /// the removal happened, so callers know whether this task's teardown
    /// is the one that actually owns the row/state cleanup.
    pub async fn remove_if_current(&self, identifier: &str, session: &Arc<Session>) -> bool {
        let mut map = self.by_identifier.write().await;
        match map.get(identifier) {
            Some(current) if Arc::ptr_eq(current, session) => {
                map.remove(identifier);
                drop(map);
                self.imei_index.write().await.retain(|_, v| v != identifier);
                true
            }
            _ => false,
        }
    }

    pub async fn list(&self) -> Vec<DeviceSnapshot> {
        let map = self.by_identifier.read().await;
        let mut out = Vec::with_capacity(map.len());
        for session in map.values() {
            out.push(DeviceSnapshot {
                identifier: session.identifier.clone(),
                imei: session.imei().await,
                peer_addr: session.peer_addr,
                connected_at: session.connected_at,
                is_streaming: session.is_streaming(),
                stream_channel: session.stream_channel(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_lookup_round_trips() {
        let registry = DeviceRegistry::new();
        let (tx, _rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        registry.register("13800001111", addr, tx).await;
        assert!(registry.lookup("13800001111").await.is_some());
        assert!(registry.lookup("missing").await.is_none());
    }

    #[tokio::test]
    async fn second_registration_supersedes_the_first() {
        let registry = DeviceRegistry::new();
        let (tx1, _rx1) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let first = registry.register("13800001111", addr, tx1).await;

        let (tx2, _rx2) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let second = registry.register("13800001111", addr, tx2).await;

        // The first session's notifier must have fired.
        tokio::time::timeout(std::time::Duration::from_millis(50), first.superseded.notified())
            .await
            .expect("first session should have been superseded");

        let looked_up = registry.lookup("13800001111").await.unwrap();
        assert!(Arc::ptr_eq(&looked_up, &second));
    }

    #[tokio::test]
    async fn next_seq_increments_and_wraps() {
        let registry = DeviceRegistry::new();
        let (tx, _rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let session = registry.register("13800001111", addr, tx).await;
        session.seq.store(u16::MAX, Ordering::Relaxed);
        assert_eq!(session.next_seq(), u16::MAX);
        assert_eq!(session.next_seq(), 0);
        assert_eq!(session.next_seq(), 1);
    }

    #[tokio::test]
    async fn imei_lookup_resolves_through_the_index() {
        let registry = DeviceRegistry::new();
        let (tx, _rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        registry.register("13800001111", addr, tx).await;
        registry.index_imei("13800001111", "IMEI123").await;
        let session = registry.lookup_by_imei("IMEI123").await.unwrap();
        assert_eq!(session.identifier, "13800001111");
    }
}
