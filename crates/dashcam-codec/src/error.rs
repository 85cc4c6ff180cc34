use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame shorter than the 12-byte header")]
    ShortFrame,
    #[error("body shorter than required for message {msg_id:#06x}: need {need}, got {got}")]
    ShortBody { msg_id: u16, need: usize, got: usize },
    #[error("invalid BCD digit in byte {0:#04x}")]
    InvalidBcd(u8),
    #[error("bad JT1078 magic")]
    BadMagic,
}
