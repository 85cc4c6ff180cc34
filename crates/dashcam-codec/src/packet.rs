//! JT1078 video packet header parsing and stream boundary scanning.

use bytes::Bytes;
use dashcam_protocol::jt1078::{DataType, PacketHeader, SubpackageType, MAGIC};

use crate::bcd;
use crate::error::CodecError;

/// Fixed bytes preceding the variable timing fields (magic through the
/// data-type/subpackage byte).
const FIXED_PREFIX_LEN: usize = 16;

fn fixed_header_offset(data_type: DataType) -> usize {
    match data_type {
        DataType::IFrame | DataType::PFrame | DataType::BFrame => 28,
        DataType::Audio => 24,
        DataType::Transparent => 16,
    }
}

/// Scans for the next occurrence of [`MAGIC`] in `data`.
pub fn find_packet_start(data: &[u8]) -> Option<usize> {
    data.windows(MAGIC.len()).position(|w| w == MAGIC)
}

/// Returns the total size of the packet starting at `data[0]` (which must
/// begin with [`MAGIC`]), or `None` if `data` doesn't yet contain enough
/// bytes to know the size.
pub fn packet_size(data: &[u8]) -> Option<usize> {
    if data.len() < FIXED_PREFIX_LEN || data[..4] != MAGIC {
        return None;
    }
    let data_type = DataType::try_from(data[15] >> 4).ok()?;
    let offset = fixed_header_offset(data_type);
    if data.len() < offset + 2 {
        return None;
    }
    let body_length = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
    Some(offset + 2 + body_length)
}

/// Parses a complete packet (as sized by [`packet_size`]) into its header
/// and body.
pub fn parse_packet(data: &[u8]) -> Result<(PacketHeader, Bytes), CodecError> {
    if data.len() < FIXED_PREFIX_LEN || data[..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let seq_num = u16::from_be_bytes([data[6], data[7]]);
    let sim = bcd::parse(&data[8..14])?;
    let channel = data[14];
    let data_type = DataType::try_from(data[15] >> 4).map_err(|_| CodecError::BadMagic)?;
    let subpackage = SubpackageType::try_from(data[15] & 0x0F).map_err(|_| CodecError::BadMagic)?;

    let offset = fixed_header_offset(data_type);
    if data.len() < offset + 2 {
        return Err(CodecError::ShortFrame);
    }
    let timestamp_90khz = match data_type {
        DataType::IFrame | DataType::PFrame | DataType::BFrame | DataType::Audio => {
            Some(u64::from_be_bytes(data[16..24].try_into().unwrap()))
        }
        DataType::Transparent => None,
    };
    let body_length = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
    let body_start = offset + 2;
    if data.len() < body_start + body_length {
        return Err(CodecError::ShortFrame);
    }
    let body = Bytes::copy_from_slice(&data[body_start..body_start + body_length]);

    Ok((
        PacketHeader {
            seq_num,
            sim,
            channel,
            data_type,
            subpackage,
            timestamp_90khz,
        },
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_video_packet(subpackage: u8, body: &[u8]) -> Vec<u8> {
        let mut pkt = Vec::new();
        pkt.extend_from_slice(&MAGIC);
        pkt.push(0x00); // version/padding/extension/cc
        pkt.push(98); // marker/payload_type: H.264
        pkt.extend_from_slice(&1u16.to_be_bytes()); // seq_num
        pkt.extend_from_slice(&bcd::encode("13800001111", 6)); // sim
        pkt.push(1); // channel
        pkt.push((0 << 4) | subpackage); // data_type=I_FRAME, subpackage
        pkt.extend_from_slice(&0u64.to_be_bytes()); // timestamp
        pkt.extend_from_slice(&0u16.to_be_bytes()); // iframe_interval
        pkt.extend_from_slice(&0u16.to_be_bytes()); // frame_interval
        pkt.extend_from_slice(&(body.len() as u16).to_be_bytes());
        pkt.extend_from_slice(body);
        pkt
    }

    #[test]
    fn parses_a_video_packet_header_and_body() {
        let pkt = build_video_packet(0, b"NALDATA");
        let size = packet_size(&pkt).unwrap();
        assert_eq!(size, pkt.len());
        let (header, body) = parse_packet(&pkt[..size]).unwrap();
        assert_eq!(header.channel, 1);
        assert_eq!(header.sim, "13800001111");
        assert_eq!(header.data_type, DataType::IFrame);
        assert_eq!(header.subpackage, SubpackageType::Atomic);
        assert_eq!(&body[..], b"NALDATA");
    }

    #[test]
    fn packet_size_finds_boundary_of_k_concatenated_packets() {
        let a = build_video_packet(0, b"AAA");
        let b = build_video_packet(0, b"BB");
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0xDE, 0xAD]); // garbage prefix
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);
        stream.extend_from_slice(&[0xBE, 0xEF]); // garbage suffix

        let start = find_packet_start(&stream).unwrap();
        let size_a = packet_size(&stream[start..]).unwrap();
        assert_eq!(size_a, a.len());
        let after_a = start + size_a;
        let start_b = after_a + find_packet_start(&stream[after_a..]).unwrap();
        let size_b = packet_size(&stream[start_b..]).unwrap();
        assert_eq!(size_b, b.len());
    }

    #[test]
    fn packet_size_returns_none_on_truncated_header() {
        assert_eq!(packet_size(&MAGIC), None);
    }
}
