//! Table-driven dispatch over [`JtMessage`]: each handler returns the
//! response frame bytes to write back on the same connection, or `None`.
//! Per spec §4.F this is a plain exhaustive match, not a registered-handler
//! table — the type-checked enum already gives us that.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashcam_codec::body::{build_general_response, build_registration_response};
use dashcam_protocol::jt808::{msg_id, FrameHeader, JtMessage, RegistrationResult, ResponseResult};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::catalog::DeviceCatalog;
use crate::notify::LocationNotifier;
use crate::registry::{DeviceRegistry, Session};
use crate::repo::{connections, locations};

pub struct RouterContext<'a> {
    pub registry: &'a DeviceRegistry,
    pub pool: &'a PgPool,
    pub catalog: &'a dyn DeviceCatalog,
    pub notifier: Arc<dyn LocationNotifier>,
}

/// Dispatches one decoded message for `session` and returns the bytes to
/// write back, if any.
pub async fn route(ctx: &RouterContext<'_>, session: &Arc<Session>, header: &FrameHeader, message: JtMessage) -> Option<Vec<u8>> {
    match message {
        JtMessage::Registration(body) => {
            Some(handle_registration(ctx, session, header, &body.terminal_id, body.manufacturer, body.terminal_model).await)
        }
        JtMessage::Auth { auth_code } => Some(handle_auth(ctx, session, header, auth_code).await),
        JtMessage::Heartbeat => handle_heartbeat(ctx, session, header).await,
        JtMessage::LocationReport(location) => {
            if handle_location(ctx, session, header, location).await {
                Some(build_general_response(&header.phone, header.seq_num, msg_id::LOCATION_REPORT, ResponseResult::Success, session.next_seq()))
            } else {
                None
            }
        }
        JtMessage::GeneralResponse { .. } => None,
        JtMessage::Unknown { id, .. } => {
            info!(msg_id = format!("{id:#06x}"), phone = %header.phone, "unknown message id, acking anyway");
            Some(build_general_response(&header.phone, header.seq_num, id, ResponseResult::Success, session.next_seq()))
        }
    }
}

async fn handle_registration(
    ctx: &RouterContext<'_>,
    session: &Arc<Session>,
    header: &FrameHeader,
    terminal_id: &str,
    manufacturer: String,
    terminal_model: String,
) -> Vec<u8> {
    if !ctx.catalog.is_authorized(terminal_id) {
        warn!(terminal_id, "registration rejected: device not in catalog");
        return build_registration_response(&header.phone, header.seq_num, RegistrationResult::NoSuchTerminal, "", session.next_seq());
    }

    let auth_code = generate_auth_code(&header.phone);
    session.set_imei(terminal_id.to_string()).await;
    session.set_metadata(manufacturer, terminal_model).await;
    session.set_auth_code(auth_code.clone()).await;
    ctx.registry.index_imei(&header.phone, terminal_id).await;

    let peer_ip = session.peer_addr.ip().to_string();
    let peer_port = i32::from(session.peer_addr.port());
    if let Err(err) = connections::upsert_connected(ctx.pool, &header.phone, &header.phone, Some(terminal_id), &auth_code, &peer_ip, peer_port).await {
        warn!(%err, phone = %header.phone, "failed to persist connection row on registration");
    }

    build_registration_response(&header.phone, header.seq_num, RegistrationResult::Success, &auth_code, session.next_seq())
}

fn generate_auth_code(identifier: &str) -> String {
    let mut hasher = DefaultHasher::new();
    identifier.hash(&mut hasher);
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

async fn handle_auth(ctx: &RouterContext<'_>, session: &Arc<Session>, header: &FrameHeader, _auth_code: String) -> Vec<u8> {
    if !ctx.catalog.is_authorized(&header.phone) {
        warn!(phone = %header.phone, "auth rejected: device not in catalog");
        return build_general_response(&header.phone, header.seq_num, msg_id::TERMINAL_AUTH, ResponseResult::Fail, session.next_seq());
    }

    // Any non-empty code is accepted, per spec §9's documented open question:
    // devices cache auth codes across reboots and the source trades
    // strictness for reconnect resilience.
    if let Err(err) = connections::upsert_connected(
        ctx.pool,
        &header.phone,
        &header.phone,
        None,
        &session.auth_code().await.unwrap_or_default(),
        &session.peer_addr.ip().to_string(),
        i32::from(session.peer_addr.port()),
    )
    .await
    {
        warn!(%err, phone = %header.phone, "failed to persist connection row on auth");
    }
    build_general_response(&header.phone, header.seq_num, msg_id::TERMINAL_AUTH, ResponseResult::Success, session.next_seq())
}

async fn handle_heartbeat(ctx: &RouterContext<'_>, session: &Arc<Session>, header: &FrameHeader) -> Option<Vec<u8>> {
    if !ctx.catalog.is_authorized(&header.phone) {
        warn!(phone = %header.phone, "heartbeat dropped: device not in catalog");
        return None;
    }

    session.touch_heartbeat().await;
    if let Err(err) = connections::touch_heartbeat(ctx.pool, &header.phone).await {
        warn!(%err, phone = %header.phone, "failed to persist heartbeat");
    }
    Some(build_general_response(&header.phone, header.seq_num, msg_id::TERMINAL_HEARTBEAT, ResponseResult::Success, session.next_seq()))
}

/// Returns whether the fix was accepted (and thus whether `route` should
/// ack it). A device missing from the catalog gets the fix silently
/// dropped, per spec's "Unknown device" row — no persist, no notify, no ack.
async fn handle_location(ctx: &RouterContext<'_>, session: &Arc<Session>, header: &FrameHeader, location: dashcam_protocol::jt808::LocationReport) -> bool {
    if !ctx.catalog.is_authorized(&header.phone) {
        warn!(phone = %header.phone, "location fix dropped: device not in catalog");
        return false;
    }

    session.touch_location().await;
    let pool = ctx.pool.clone();
    let identifier = header.phone.clone();
    let notifier = ctx.notifier.clone();
    let location_for_notify = location.clone();
    // Detached: a slow database or notifier must never stall the reader.
    tokio::spawn(async move {
        if let Err(err) = locations::upsert_location(&pool, &identifier, &location).await {
            warn!(%err, %identifier, "failed to persist location fix");
        }
        notifier.notify(&identifier, &location_for_notify);
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_code_is_deterministic_in_shape_not_value() {
        let a = generate_auth_code("13800001111");
        let b = generate_auth_code("13800001111");
        assert_eq!(a.len(), 16);
        assert_eq!(b.len(), 16);
    }
}
