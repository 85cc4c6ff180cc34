//! JT808/JT1078 byte-level codec: framing, checksums, BCD, body
//! parse/build, packet boundary scanning, and payload reassembly.

pub mod bcd;
pub mod body;
pub mod error;
pub mod frame;
pub mod packet;
pub mod reassembler;
pub mod stuffing;

pub use error::CodecError;
