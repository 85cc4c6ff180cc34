//! JT808 message body parsing and platform-response building.

use bytes::Bytes;
use chrono::Utc;
use dashcam_protocol::jt808::{
    msg_id, JtMessage, LocationReport, RegistrationBody, RegistrationResult, ResponseResult,
};
use tracing::warn;

use crate::bcd;
use crate::error::CodecError;
use crate::frame::encode_frame;

const REGISTRATION_MIN_LEN: usize = 37;
const LOCATION_MIN_LEN: usize = 28;

/// Status-flag bit for "positioned" (bit 1) and "south latitude" (bit 2)
/// and "west longitude" (bit 3), per JT808's location report status word.
mod status_bit {
    pub const ACC_ON: u32 = 1 << 0;
    pub const POSITIONED: u32 = 1 << 1;
    pub const SOUTH: u32 = 1 << 2;
    pub const WEST: u32 = 1 << 3;
}

/// Dispatches on `msg_id` and parses the body into a typed [`JtMessage`].
/// Unsupported IDs become `Unknown` — per spec §4.F/§9 the router still
/// acknowledges these, it just doesn't decode the payload.
pub fn parse_message(id: u16, body: &Bytes) -> JtMessage {
    match id {
        msg_id::TERMINAL_GENERAL_RESPONSE => parse_general_response(body),
        msg_id::TERMINAL_HEARTBEAT => JtMessage::Heartbeat,
        msg_id::TERMINAL_REGISTRATION => match parse_registration(body) {
            Ok(reg) => JtMessage::Registration(reg),
            Err(err) => {
                warn!(%err, "dropping short registration body");
                JtMessage::Unknown { id, body: body.clone() }
            }
        },
        msg_id::TERMINAL_AUTH => JtMessage::Auth {
            auth_code: String::from_utf8_lossy(body).trim_end_matches('\0').to_string(),
        },
        msg_id::LOCATION_REPORT => match parse_location(body) {
            Ok(loc) => JtMessage::LocationReport(loc),
            Err(err) => {
                warn!(%err, "dropping short location body");
                JtMessage::Unknown { id, body: body.clone() }
            }
        },
        other => JtMessage::Unknown { id: other, body: body.clone() },
    }
}

fn parse_general_response(body: &[u8]) -> JtMessage {
    if body.len() < 5 {
        return JtMessage::Unknown { id: msg_id::TERMINAL_GENERAL_RESPONSE, body: Bytes::copy_from_slice(body) };
    }
    JtMessage::GeneralResponse {
        response_seq: u16::from_be_bytes([body[0], body[1]]),
        response_id: u16::from_be_bytes([body[2], body[3]]),
        result: body[4],
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_matches('\0').trim().to_string()
}

pub fn parse_registration(body: &[u8]) -> Result<RegistrationBody, CodecError> {
    if body.len() < REGISTRATION_MIN_LEN {
        return Err(CodecError::ShortBody {
            msg_id: msg_id::TERMINAL_REGISTRATION,
            need: REGISTRATION_MIN_LEN,
            got: body.len(),
        });
    }
    Ok(RegistrationBody {
        province_id: u16::from_be_bytes([body[0], body[1]]),
        city_id: u16::from_be_bytes([body[2], body[3]]),
        manufacturer: ascii_field(&body[4..9]),
        terminal_model: ascii_field(&body[9..29]),
        terminal_id: ascii_field(&body[29..36]),
        plate_color: body[36],
        plate: ascii_field(&body[37..]),
    })
}

pub fn parse_location(body: &[u8]) -> Result<LocationReport, CodecError> {
    if body.len() < LOCATION_MIN_LEN {
        return Err(CodecError::ShortBody {
            msg_id: msg_id::LOCATION_REPORT,
            need: LOCATION_MIN_LEN,
            got: body.len(),
        });
    }
    let alarm_flags = u32::from_be_bytes(body[0..4].try_into().unwrap());
    let status_flags = u32::from_be_bytes(body[4..8].try_into().unwrap());
    let raw_lat = u32::from_be_bytes(body[8..12].try_into().unwrap());
    let raw_lon = u32::from_be_bytes(body[12..16].try_into().unwrap());
    let altitude_m = i16::from_be_bytes(body[16..18].try_into().unwrap());
    let raw_speed = u16::from_be_bytes(body[18..20].try_into().unwrap());
    let heading_deg = u16::from_be_bytes(body[20..22].try_into().unwrap());

    let mut latitude = f64::from(raw_lat) / 1_000_000.0;
    let mut longitude = f64::from(raw_lon) / 1_000_000.0;
    if status_flags & status_bit::SOUTH != 0 {
        latitude = -latitude;
    }
    if status_flags & status_bit::WEST != 0 {
        longitude = -longitude;
    }

    let time_bcd: [u8; 6] = body[22..28].try_into().unwrap();
    let timestamp = bcd::parse_datetime(&time_bcd).unwrap_or_else(|err| {
        warn!(%err, "bad location timestamp BCD, falling back to receive time");
        Utc::now()
    });

    let tlv_extras = parse_tlv_extras(&body[28..]);

    Ok(LocationReport {
        alarm_flags,
        status_flags,
        latitude,
        longitude,
        altitude_m,
        speed_kmh: f64::from(raw_speed) / 10.0,
        heading_deg,
        timestamp,
        acc_on: status_flags & status_bit::ACC_ON != 0,
        positioned: status_flags & status_bit::POSITIONED != 0,
        tlv_extras,
    })
}

/// Parses `id(1) + len(1) + value(len)` extras trailing a location body.
/// A malformed trailing TLV (length running past the buffer) just stops
/// parsing early rather than erroring the whole location report.
fn parse_tlv_extras(mut rest: &[u8]) -> Vec<(u8, Bytes)> {
    let mut extras = Vec::new();
    while rest.len() >= 2 {
        let id = rest[0];
        let len = rest[1] as usize;
        if rest.len() < 2 + len {
            break;
        }
        extras.push((id, Bytes::copy_from_slice(&rest[2..2 + len])));
        rest = &rest[2 + len..];
    }
    extras
}

/// Builds a 0x8001 platform general response frame.
pub fn build_general_response(
    phone: &str,
    resp_seq: u16,
    resp_msg_id: u16,
    result: ResponseResult,
    seq_num: u16,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(5);
    body.extend_from_slice(&resp_seq.to_be_bytes());
    body.extend_from_slice(&resp_msg_id.to_be_bytes());
    body.push(result as u8);
    encode_frame(msg_id::PLATFORM_GENERAL_RESPONSE, phone, seq_num, &body)
}

/// Builds a 0x8100 registration response frame. `auth_code` is only
/// appended when `result` is `Success` — the field has no length prefix
/// and simply runs to the end of the body.
pub fn build_registration_response(
    phone: &str,
    resp_seq: u16,
    result: RegistrationResult,
    auth_code: &str,
    seq_num: u16,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(3 + auth_code.len());
    body.extend_from_slice(&resp_seq.to_be_bytes());
    body.push(result as u8);
    if matches!(result, RegistrationResult::Success) {
        body.extend_from_slice(auth_code.as_bytes());
    }
    encode_frame(msg_id::REGISTRATION_RESPONSE, phone, seq_num, &body)
}

/// Builds a 0x9101 real-time AV request frame.
#[allow(clippy::too_many_arguments)]
pub fn build_realtime_av_request(
    phone: &str,
    channel: u8,
    server_ip: &str,
    tcp_port: u16,
    udp_port: u16,
    stream_type: u8,
    seq_num: u16,
) -> Vec<u8> {
    let ip_bytes = server_ip.as_bytes();
    let mut body = Vec::with_capacity(1 + ip_bytes.len() + 2 + 2 + 1 + 1 + 1);
    body.push(ip_bytes.len() as u8);
    body.extend_from_slice(ip_bytes);
    body.extend_from_slice(&tcp_port.to_be_bytes());
    body.extend_from_slice(&udp_port.to_be_bytes());
    body.push(channel);
    body.push(0); // data type: always audio+video
    body.push(stream_type);
    encode_frame(msg_id::REALTIME_AV_REQUEST, phone, seq_num, &body)
}

/// Builds a 0x9102 AV control frame.
pub fn build_av_control(
    phone: &str,
    channel: u8,
    control_cmd: u8,
    close_type: u8,
    switch_stream: u8,
    seq_num: u16,
) -> Vec<u8> {
    let body = [channel, control_cmd, close_type, switch_stream];
    encode_frame(msg_id::AV_CONTROL, phone, seq_num, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_location_body(south: bool, west: bool) -> Vec<u8> {
        let mut status: u32 = status_bit::ACC_ON | status_bit::POSITIONED;
        if south {
            status |= status_bit::SOUTH;
        }
        if west {
            status |= status_bit::WEST;
        }
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_be_bytes()); // alarm
        body.extend_from_slice(&status.to_be_bytes());
        body.extend_from_slice(&27_717_500u32.to_be_bytes()); // lat
        body.extend_from_slice(&85_324_000u32.to_be_bytes()); // lon
        body.extend_from_slice(&1320i16.to_be_bytes()); // alt
        body.extend_from_slice(&0u16.to_be_bytes()); // speed
        body.extend_from_slice(&0u16.to_be_bytes()); // heading
        body.extend_from_slice(&bcd::encode_datetime(
            Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
        ));
        body
    }

    #[test]
    fn location_sign_is_applied_from_status_bits() {
        let body = sample_location_body(true, false);
        let loc = parse_location(&body).unwrap();
        assert!(loc.latitude < 0.0);
        assert!(loc.longitude > 0.0);
        assert!((loc.latitude.abs() - 27.7175).abs() < 1e-6);
        assert!(loc.acc_on);
        assert!(loc.positioned);
    }

    #[test]
    fn location_body_too_short_is_rejected() {
        assert!(parse_location(&[0u8; 10]).is_err());
    }

    #[test]
    fn registration_body_too_short_is_rejected() {
        assert!(parse_registration(&[0u8; 10]).is_err());
    }

    #[test]
    fn registration_response_omits_auth_code_on_failure() {
        let frame = build_registration_response(
            "13800001111",
            1,
            RegistrationResult::NoSuchVehicle,
            "should-not-appear",
            1,
        );
        // The auth code string must not appear anywhere in the built frame.
        assert!(!frame.windows(5).any(|w| w == b"shoul"));
    }

    #[test]
    fn general_response_round_trips_through_parse_message() {
        let frame = build_general_response("13800001111", 3, msg_id::TERMINAL_HEARTBEAT, ResponseResult::Success, 1);
        let (start, end) = crate::frame::locate_frame(&frame).unwrap();
        let decoded = crate::frame::decode_frame(&frame[start + 1..end - 1]).unwrap();
        match parse_message(decoded.header.msg_id, &decoded.body) {
            JtMessage::GeneralResponse { response_seq, response_id, result } => {
                assert_eq!(response_seq, 3);
                assert_eq!(response_id, msg_id::TERMINAL_HEARTBEAT);
                assert_eq!(result, 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
