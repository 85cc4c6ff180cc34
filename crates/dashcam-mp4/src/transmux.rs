//! Per-(device, channel) H.264 → fMP4 transmuxer session.

use tracing::{debug, info};

use crate::boxes::{self, TIMESCALE};
use crate::nal::{self, split_annex_b};
use crate::sps::{self, SpsInfo};

pub const DEFAULT_FPS: u32 = 25;

/// One emitted fMP4 segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `ftyp+moov`, emitted exactly once per session, before any media.
    Init { codec: String, payload: Vec<u8> },
    /// `moof+mdat` for one access unit.
    Media { payload: Vec<u8> },
}

/// Transmuxes a stream of complete NAL-bearing buffers (as delivered by the
/// reassembler) for a single (device, channel) into fMP4 segments.
#[derive(Debug)]
pub struct Transmuxer {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    sps_info: Option<SpsInfo>,
    initialized: bool,
    frame_count: u32,
    fps: u32,
}

impl Default for Transmuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmuxer {
    pub fn new() -> Self {
        Self {
            sps: None,
            pps: None,
            sps_info: None,
            initialized: false,
            frame_count: 0,
            fps: DEFAULT_FPS,
        }
    }

    /// Feeds a complete NAL-bearing buffer (possibly containing multiple
    /// Annex-B units) and returns the segments it produces, in order: at
    /// most one [`Segment::Init`] followed by at most one
    /// [`Segment::Media`]. Per spec §4.D, a non-IDR NAL seen before the
    /// init segment is emitted is dropped.
    pub fn push(&mut self, nal_data: &[u8]) -> Vec<Segment> {
        let mut out = Vec::new();
        for nal in split_annex_b(nal_data) {
            let Some(nal_type) = nal::nal_type(nal) else { continue };
            match nal_type {
                7 => {
                    self.sps_info = sps::parse_sps(nal);
                    self.sps = Some(nal.to_vec());
                    debug!(bytes = nal.len(), "cached SPS");
                }
                8 => {
                    self.pps = Some(nal.to_vec());
                    debug!(bytes = nal.len(), "cached PPS");
                }
                5 => {
                    if !self.initialized {
                        if let (Some(sps), Some(pps)) = (&self.sps, &self.pps) {
                            let info = self.sps_info.unwrap_or(SpsInfo {
                                profile_idc: 0,
                                constraint_set: 0,
                                level_idc: 0,
                                width: sps::DEFAULT_WIDTH,
                                height: sps::DEFAULT_HEIGHT,
                            });
                            self.initialized = true;
                            let payload = boxes::build_init_segment(info.width, info.height, sps, pps);
                            let codec = sps::codec_string(Some(sps));
                            info!(width = info.width, height = info.height, %codec, "video initialized");
                            out.push(Segment::Init { codec, payload });
                        }
                    }
                    if self.initialized {
                        out.push(self.emit_media(nal, true));
                    }
                }
                1 => {
                    if self.initialized {
                        out.push(self.emit_media(nal, false));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn emit_media(&mut self, nal: &[u8], is_keyframe: bool) -> Segment {
        let sample_duration = TIMESCALE / self.fps;
        let decode_time = self.frame_count * sample_duration;
        let payload = boxes::build_media_segment(
            nal,
            self.frame_count + 1,
            decode_time,
            sample_duration,
            is_keyframe,
            self.sps.as_deref(),
            self.pps.as_deref(),
        );
        self.frame_count += 1;
        Segment::Media { payload }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annex_b(nal_type_byte: u8, rest: &[u8]) -> Vec<u8> {
        let mut v = vec![0, 0, 0, 1, nal_type_byte];
        v.extend_from_slice(rest);
        v
    }

    #[test]
    fn no_media_segment_before_init() {
        let mut tm = Transmuxer::new();
        let segs = tm.push(&annex_b(0x41, &[1, 2, 3])); // non-IDR, no SPS/PPS yet
        assert!(segs.is_empty());
        assert!(!tm.is_initialized());
    }

    #[test]
    fn sps_pps_idr_then_p_frames_emits_one_init_then_three_media() {
        let mut tm = Transmuxer::new();
        let mut segs = Vec::new();
        segs.extend(tm.push(&annex_b(0x67, &[0x64, 0x00, 40, 0xAA]))); // SPS, level 4.0
        segs.extend(tm.push(&annex_b(0x68, &[0xEB])));
        segs.extend(tm.push(&annex_b(0x65, &[1, 2, 3]))); // IDR
        segs.extend(tm.push(&annex_b(0x41, &[4, 5]))); // P
        segs.extend(tm.push(&annex_b(0x41, &[6, 7]))); // P

        assert_eq!(segs.len(), 4); // init + 3 media
        match &segs[0] {
            Segment::Init { codec, .. } => assert_eq!(codec, "avc1.640028"),
            other => panic!("expected init segment, got {other:?}"),
        }
        assert_eq!(segs.len() - 1, 3);
        for seg in &segs[1..] {
            assert!(matches!(seg, Segment::Media { .. }));
        }
        assert!(tm.is_initialized());
    }

    #[test]
    fn keyframe_bit_is_set_only_on_the_idr_segment() {
        let mut tm = Transmuxer::new();
        tm.push(&annex_b(0x67, &[0x64, 0x00, 40]));
        tm.push(&annex_b(0x68, &[0xEB]));
        let segs = tm.push(&annex_b(0x65, &[1, 2, 3]));
        // first element of segs is Init, second is the keyframe Media
        let Segment::Media { payload } = &segs[1] else { panic!("expected media segment") };
        // sample_flags keyframe marker 0x02000000 appears in the trun box
        assert!(payload.windows(4).any(|w| w == 0x0200_0000u32.to_be_bytes()));
    }
}
