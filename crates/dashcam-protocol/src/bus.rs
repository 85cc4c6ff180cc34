//! Cross-process fan-out bus messages exchanged between `services/ingest`
//! (WebSocket client) and `services/gateway` (WebSocket server).
//!
//! Segment payloads are base64-encoded on the wire via `serde_with`-free
//! manual encode/decode since the transport is JSON text frames.

use serde::{Deserialize, Serialize};

/// Ingest → gateway and gateway → browser: one topic per device identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    /// Announces a new streaming session for {identifier, channel}; carries
    /// the fMP4 init segment (`ftyp+moov`) once per session.
    Init {
        identifier: String,
        channel: u8,
        codec: String,
        #[serde(with = "b64")]
        payload: Vec<u8>,
    },
    /// A single fMP4 media segment (`moof+mdat`).
    Segment {
        identifier: String,
        channel: u8,
        #[serde(with = "b64")]
        payload: Vec<u8>,
    },
    /// Ingest → gateway periodic liveness, mirrors the teacher's forwarder
    /// heartbeat shape.
    Heartbeat,
}

/// Gateway → ingest: start/stop a device's video stream on behalf of a
/// browser client. Carried on the same socket as [`BusMessage`], tagged
/// separately since it flows the opposite direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamOp {
    Start,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamCommand {
    pub op: StreamOp,
    pub identifier: String,
    pub channel: u8,
    pub stream_type: u8,
    pub server_ip: String,
    pub video_port: u16,
}

mod b64 {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_message_round_trips_through_json() {
        let msg = BusMessage::Init {
            identifier: "13800001111".into(),
            channel: 1,
            codec: "avc1.640028".into(),
            payload: vec![0, 1, 2, 255],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"kind\":\"init\""));
        let back: BusMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn stream_command_tags_op_snake_case() {
        let cmd = StreamCommand {
            op: StreamOp::Start,
            identifier: "13800001111".into(),
            channel: 1,
            stream_type: 0,
            server_ip: "10.0.0.1".into(),
            video_port: 6664,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"op\":\"start\""));
    }
}
