//! `GET /dashcam/devices/` and `GET /dashcam/status/<imei>/`, per spec §6.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::http::response::{internal_error, not_found};
use crate::repo::connections;
use crate::state::AppState;

pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    match connections::list_devices(&state.pool).await {
        Ok(devices) => Json(serde_json::json!({ "devices": devices })).into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}

pub async fn device_status(State(state): State<AppState>, Path(imei): Path<String>) -> impl IntoResponse {
    match connections::status_by_imei(&state.pool, &imei).await {
        Ok(Some(device)) => Json(device).into_response(),
        Ok(None) => not_found("device not known").into_response(),
        Err(err) => internal_error(err).into_response(),
    }
}
