//! Wire and bus message types shared by `dashcam-codec` and the ingest/gateway
//! services. This crate holds data only — no parsing or I/O.

pub mod bus;
pub mod jt1078;
pub mod jt808;
