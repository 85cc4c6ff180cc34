//! axum web gateway: browser-facing WebSocket and REST surface, plus the
//! bus-ingress WebSocket the ingest node dials into. Holds no protocol
//! codec logic of its own — that lives in `dashcam-protocol`/
//! `dashcam-codec` and runs in `services/ingest`.

pub mod db;
pub mod http;
pub mod repo;
pub mod sms;
pub mod state;
pub mod ws_browser;
pub mod ws_bus;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/dashcam/", get(ws_browser::ws_browser_handler))
        .route("/bus/ingest", get(ws_bus::ws_bus_handler))
        .route("/dashcam/devices/", get(http::devices::list_devices))
        .route("/dashcam/status/:imei/", get(http::devices::device_status))
        .route("/dashcam/command/", post(http::command::send_command))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
