//! `POST /dashcam/command/ {imei, action}`, per spec §6. Wraps the two SMS
//! device-provisioning strings; actual delivery is an out-of-scope external
//! collaborator (`crate::sms::SmsGateway`).

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::http::response::bad_request;
use crate::sms;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub imei: String,
    pub action: String,
}

pub async fn send_command(State(state): State<AppState>, Json(req): Json<CommandRequest>) -> impl IntoResponse {
    let command = match req.action.as_str() {
        "provision" => sms::provision_command(&state.public_ip, state.signaling_port),
        "reset" => sms::reset_command(),
        other => return bad_request(format!("unknown action '{other}'")).into_response(),
    };

    state.sms_gateway.send(&req.imei, &command);
    Json(serde_json::json!({ "imei": req.imei, "action": req.action, "command": command })).into_response()
}
