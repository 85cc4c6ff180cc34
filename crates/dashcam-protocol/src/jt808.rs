//! JT/T 808 envelope and body types.

use bytes::Bytes;

/// Frame delimiter. Opens and closes every JT808 frame on the wire.
pub const FLAG: u8 = 0x7E;
/// Escape byte used to stuff [`FLAG`] and itself inside a frame body.
pub const ESCAPE: u8 = 0x7D;

/// Known inbound (terminal → platform) message IDs.
pub mod msg_id {
    pub const TERMINAL_GENERAL_RESPONSE: u16 = 0x0001;
    pub const TERMINAL_HEARTBEAT: u16 = 0x0002;
    pub const TERMINAL_REGISTRATION: u16 = 0x0100;
    pub const TERMINAL_AUTH: u16 = 0x0102;
    pub const LOCATION_REPORT: u16 = 0x0200;

    pub const PLATFORM_GENERAL_RESPONSE: u16 = 0x8001;
    pub const REGISTRATION_RESPONSE: u16 = 0x8100;
    pub const REALTIME_AV_REQUEST: u16 = 0x9101;
    pub const AV_CONTROL: u16 = 0x9102;
}

/// Result codes for the 0x8001 platform general response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseResult {
    Success = 0,
    Fail = 1,
    MsgError = 2,
    NotSupported = 3,
    AlarmConfirmed = 4,
}

/// Result codes for the 0x8100 registration response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegistrationResult {
    Success = 0,
    VehicleAlreadyRegistered = 1,
    NoSuchVehicle = 2,
    TerminalAlreadyRegistered = 3,
    NoSuchTerminal = 4,
}

/// Fixed 12-byte envelope preceding the body (16 bytes when the subpackage
/// bit is set, which adds a 4-byte subpackage info field after the header —
/// the core does not need to reassemble JT808 subpackages for the message
/// types it supports, so that field is surfaced but unused).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_id: u16,
    pub body_length: u16,
    pub encrypted: bool,
    pub subpackage: bool,
    /// Canonicalized (leading zeros stripped) decimal phone/SIM.
    pub phone: String,
    pub seq_num: u16,
}

/// A decoded inbound message. `Unknown` carries the raw body for any ID the
/// core doesn't model as a first-class variant — see spec §9's "polymorphism
/// over message IDs" note.
#[derive(Debug, Clone, PartialEq)]
pub enum JtMessage {
    GeneralResponse {
        response_seq: u16,
        response_id: u16,
        result: u8,
    },
    Heartbeat,
    Registration(RegistrationBody),
    Auth {
        auth_code: String,
    },
    LocationReport(LocationReport),
    Unknown {
        id: u16,
        body: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationBody {
    pub province_id: u16,
    pub city_id: u16,
    pub manufacturer: String,
    pub terminal_model: String,
    pub terminal_id: String,
    pub plate_color: u8,
    pub plate: String,
}

/// A parsed 0x0200 location report with sign already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReport {
    pub alarm_flags: u32,
    pub status_flags: u32,
    /// Signed decimal degrees.
    pub latitude: f64,
    /// Signed decimal degrees.
    pub longitude: f64,
    pub altitude_m: i16,
    /// km/h, one decimal of precision already applied.
    pub speed_kmh: f64,
    pub heading_deg: u16,
    /// Wall-clock UTC; falls back to receive time if the BCD timestamp is
    /// unparseable (never drop the fix for a bad clock field).
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub acc_on: bool,
    pub positioned: bool,
    /// Vendor-specific TLV extras trailing the fixed body, preserved
    /// opaque (id, value) for a later out-of-scope consumer.
    pub tlv_extras: Vec<(u8, Bytes)>,
}
