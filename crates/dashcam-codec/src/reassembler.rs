//! Merges fragmented JT1078 payloads, keyed by (device, channel), into
//! complete NAL-unit buffers per spec §4.C.

use std::collections::HashMap;

use bytes::Bytes;
use dashcam_protocol::jt1078::SubpackageType;

#[derive(Debug, Default)]
pub struct Reassembler {
    buffers: HashMap<(String, u8), Vec<u8>>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet's body into the reassembler. Returns `Some(frame)`
    /// when a complete frame becomes available (on `Atomic` or `Last`).
    ///
    /// - `Atomic`: passes the body straight through, untouched buffer.
    /// - `First`: replaces any existing buffer (a stale in-progress frame
    ///   is discarded — data loss is preferred to corrupting the next one).
    /// - `Middle`: appends only if a buffer is already open; a middle
    ///   fragment with no prior `First` is silently dropped.
    /// - `Last`: appends and emits if a buffer is open; otherwise dropped.
    pub fn push(
        &mut self,
        device: &str,
        channel: u8,
        subpackage: SubpackageType,
        body: &[u8],
    ) -> Option<Bytes> {
        let key = (device.to_string(), channel);
        match subpackage {
            SubpackageType::Atomic => Some(Bytes::copy_from_slice(body)),
            SubpackageType::First => {
                self.buffers.insert(key, body.to_vec());
                None
            }
            SubpackageType::Middle => {
                if let Some(buf) = self.buffers.get_mut(&key) {
                    buf.extend_from_slice(body);
                }
                None
            }
            SubpackageType::Last => {
                let mut buf = self.buffers.remove(&key)?;
                buf.extend_from_slice(body);
                Some(Bytes::from(buf))
            }
        }
    }

    /// Drops any in-progress buffer for (device, channel) — called on
    /// session teardown.
    pub fn clear(&mut self, device: &str, channel: u8) {
        self.buffers.remove(&(device.to_string(), channel));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_first_middle_last() {
        let mut r = Reassembler::new();
        assert_eq!(r.push("dev1", 1, SubpackageType::First, b"A"), None);
        assert_eq!(r.push("dev1", 1, SubpackageType::Middle, b"B"), None);
        assert_eq!(r.push("dev1", 1, SubpackageType::Last, b"C"), Some(Bytes::from_static(b"ABC")));
    }

    #[test]
    fn atomic_passes_through_without_touching_buffer() {
        let mut r = Reassembler::new();
        assert_eq!(r.push("dev1", 1, SubpackageType::First, b"A"), None);
        assert_eq!(r.push("dev1", 1, SubpackageType::Atomic, b"X"), Some(Bytes::from_static(b"X")));
        // the First buffer is untouched by the Atomic packet
        assert_eq!(r.push("dev1", 1, SubpackageType::Last, b"B"), Some(Bytes::from_static(b"AB")));
    }

    #[test]
    fn stray_last_without_first_produces_no_output() {
        let mut r = Reassembler::new();
        assert_eq!(r.push("dev1", 1, SubpackageType::Last, b"C"), None);
    }

    #[test]
    fn middle_without_first_is_silently_dropped() {
        let mut r = Reassembler::new();
        assert_eq!(r.push("dev1", 1, SubpackageType::Middle, b"B"), None);
        assert_eq!(r.push("dev1", 1, SubpackageType::Last, b"C"), None);
    }

    #[test]
    fn new_first_discards_stale_in_progress_buffer() {
        let mut r = Reassembler::new();
        assert_eq!(r.push("dev1", 1, SubpackageType::First, b"stale"), None);
        assert_eq!(r.push("dev1", 1, SubpackageType::First, b"A"), None);
        assert_eq!(r.push("dev1", 1, SubpackageType::Last, b"B"), Some(Bytes::from_static(b"AB")));
    }

    #[test]
    fn channels_and_devices_are_independent() {
        let mut r = Reassembler::new();
        r.push("dev1", 1, SubpackageType::First, b"A1");
        r.push("dev1", 2, SubpackageType::First, b"A2");
        assert_eq!(r.push("dev1", 1, SubpackageType::Last, b"Z1"), Some(Bytes::from_static(b"A1Z1")));
        assert_eq!(r.push("dev1", 2, SubpackageType::Last, b"Z2"), Some(Bytes::from_static(b"A2Z2")));
    }
}
