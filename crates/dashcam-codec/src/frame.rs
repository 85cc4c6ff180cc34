//! JT808 frame boundary scanning, decode, and encode.

use bytes::Bytes;
use dashcam_protocol::jt808::{FrameHeader, FLAG};

use crate::bcd;
use crate::error::CodecError;
use crate::stuffing::{checksum, stuff, unstuff};

const HEADER_LEN: usize = 12;
const SUBPACKAGE_INFO_LEN: usize = 4;

/// Scans `buf` for one complete `0x7E ... 0x7E` frame and returns the byte
/// range `[start, end)` including both flags, or `None` if no complete
/// frame is present yet (the caller should keep reading). A garbage prefix
/// before the opening flag is implicitly skipped: the caller should drain
/// everything up to (and including) the returned range once a frame is
/// extracted, which also drops any such prefix.
pub fn locate_frame(buf: &[u8]) -> Option<(usize, usize)> {
    let start = buf.iter().position(|&b| b == FLAG)?;
    let end = buf[start + 1..].iter().position(|&b| b == FLAG)? + start + 1;
    Some((start, end + 1))
}

/// Decodes the bytes strictly between the two flags (i.e. `buf[start+1..end-1]`
/// from [`locate_frame`]) into a header and body. Checksum mismatches are
/// logged by the caller via the returned `checksum_ok` flag — per spec
/// §4.A/§7 they are never fatal.
#[derive(Debug, PartialEq)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    pub body: Bytes,
    pub checksum_ok: bool,
}

pub fn decode_frame(enclosed: &[u8]) -> Result<DecodedFrame, CodecError> {
    let unescaped = unstuff(enclosed);
    if unescaped.len() < HEADER_LEN + 1 {
        return Err(CodecError::ShortFrame);
    }
    let (payload, trailing_checksum) = unescaped.split_at(unescaped.len() - 1);
    let checksum_ok = checksum(payload) == trailing_checksum[0];

    let msg_id = u16::from_be_bytes([payload[0], payload[1]]);
    let body_props = u16::from_be_bytes([payload[2], payload[3]]);
    let body_length = body_props & 0x03FF;
    let encrypted = body_props & (1 << 10) != 0;
    let subpackage = body_props & (1 << 13) != 0;
    let phone = bcd::parse(&payload[4..10])?;
    let seq_num = u16::from_be_bytes([payload[10], payload[11]]);

    let mut body_start = HEADER_LEN;
    if subpackage {
        body_start += SUBPACKAGE_INFO_LEN;
    }
    let body = if body_start <= payload.len() {
        Bytes::copy_from_slice(&payload[body_start..])
    } else {
        Bytes::new()
    };

    Ok(DecodedFrame {
        header: FrameHeader {
            msg_id,
            body_length,
            encrypted,
            subpackage,
            phone,
            seq_num,
        },
        body,
        checksum_ok,
    })
}

/// Builds a complete `0x7E ... 0x7E` frame for an outbound message.
pub fn encode_frame(msg_id: u16, phone: &str, seq_num: u16, body: &[u8]) -> Vec<u8> {
    let body_props = (body.len() as u16) & 0x03FF;
    let mut payload = Vec::with_capacity(HEADER_LEN + body.len());
    payload.extend_from_slice(&msg_id.to_be_bytes());
    payload.extend_from_slice(&body_props.to_be_bytes());
    payload.extend_from_slice(&bcd::encode(phone, 6));
    payload.extend_from_slice(&seq_num.to_be_bytes());
    payload.extend_from_slice(body);
    let sum = checksum(&payload);
    payload.push(sum);

    let stuffed = stuff(&payload);
    let mut frame = Vec::with_capacity(stuffed.len() + 2);
    frame.push(FLAG);
    frame.extend_from_slice(&stuffed);
    frame.push(FLAG);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_a_single_frame() {
        let frame = encode_frame(0x0002, "13800001111", 1, &[]);
        assert_eq!(locate_frame(&frame), Some((0, frame.len())));
    }

    #[test]
    fn locates_frame_after_garbage_prefix_and_with_trailing_suffix() {
        let frame = encode_frame(0x0002, "13800001111", 1, &[]);
        let mut buf = vec![0xAA, 0xBB];
        buf.extend_from_slice(&frame);
        buf.extend_from_slice(&[0xCC]);
        let (start, end) = locate_frame(&buf).unwrap();
        assert_eq!(&buf[start..end], frame.as_slice());
    }

    #[test]
    fn returns_none_without_a_complete_frame() {
        assert_eq!(locate_frame(&[0x7E, 0x01, 0x02]), None);
    }

    #[test]
    fn round_trips_header_fields() {
        let frame = encode_frame(0x0200, "13800001111", 42, &[1, 2, 3]);
        let (start, end) = locate_frame(&frame).unwrap();
        let decoded = decode_frame(&frame[start + 1..end - 1]).unwrap();
        assert!(decoded.checksum_ok);
        assert_eq!(decoded.header.msg_id, 0x0200);
        assert_eq!(decoded.header.phone, "13800001111");
        assert_eq!(decoded.header.seq_num, 42);
        assert_eq!(&decoded.body[..], &[1, 2, 3]);
    }

    #[test]
    fn checksum_mismatch_is_flagged_not_rejected() {
        // A hand-built, already-unescaped enclosed payload for a heartbeat
        // (msg_id=0x0002, body_props=0, phone BCD, seq_num=1) with a
        // deliberately wrong trailing checksum byte.
        let mut enclosed = vec![0x00, 0x02, 0x00, 0x00];
        enclosed.extend_from_slice(&bcd::encode("13800001111", 6));
        enclosed.extend_from_slice(&1u16.to_be_bytes());
        enclosed.push(0x00); // wrong checksum; correct XOR of the above is not 0
        let decoded = decode_frame(&enclosed).unwrap();
        assert!(!decoded.checksum_ok);
        assert_eq!(decoded.header.msg_id, 0x0002);
    }

    #[test]
    fn rejects_frames_shorter_than_the_header() {
        assert_eq!(decode_frame(&[0x00, 0x01]), Err(CodecError::ShortFrame));
    }
}
