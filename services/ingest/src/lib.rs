//! JT808 signaling + JT1078 video ingest node: frame/packet codecs,
//! message routing, device registry, location store, and the fan-out bus
//! client that forwards transmuxed segments to the gateway process.

pub mod bus;
pub mod catalog;
pub mod db;
pub mod error;
pub mod notify;
pub mod registry;
pub mod repo;
pub mod router;
pub mod signaling;
pub mod video;
