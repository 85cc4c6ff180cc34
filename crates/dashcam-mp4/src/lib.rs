//! H.264 Annex-B parsing and fMP4 (fragmented MP4) box synthesis for
//! MediaSource Extensions playback.

pub mod boxes;
pub mod nal;
pub mod sps;
pub mod transmux;

pub use transmux::{Segment, Transmuxer};
