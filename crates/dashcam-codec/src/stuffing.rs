//! JT808 byte-stuffing: `0x7E` → `0x7D 0x02`, `0x7D` → `0x7D 0x01`.

use dashcam_protocol::jt808::{ESCAPE, FLAG};

/// Escapes `data` so it can be placed between two [`FLAG`] bytes.
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        match b {
            FLAG => out.extend_from_slice(&[ESCAPE, 0x02]),
            ESCAPE => out.extend_from_slice(&[ESCAPE, 0x01]),
            other => out.push(other),
        }
    }
    out
}

/// Reverses [`stuff`]. Any trailing lone escape byte is passed through
/// unchanged rather than panicking on the malformed input.
pub fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == ESCAPE && i + 1 < data.len() {
            match data[i + 1] {
                0x02 => {
                    out.push(FLAG);
                    i += 2;
                }
                0x01 => {
                    out.push(ESCAPE);
                    i += 2;
                }
                _ => {
                    out.push(data[i]);
                    i += 1;
                }
            }
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

/// XOR of every byte. Used both for the checksum and for its verification.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuff_unstuff_round_trips_arbitrary_bytes() {
        for b in 0u8..=255 {
            let data = vec![b, 0x7E, 0x7D, b, 0x00, 0xFF];
            assert_eq!(unstuff(&stuff(&data)), data);
        }
    }

    #[test]
    fn stuff_escapes_flag_and_escape_bytes() {
        let data = [0x7E, 0x7D, 0x01];
        assert_eq!(stuff(&data), vec![0x7D, 0x02, 0x7D, 0x01, 0x01]);
    }

    #[test]
    fn checksum_is_xor_fold() {
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 0x00);
        assert_eq!(checksum(&[0xFF, 0x0F]), 0xF0);
    }
}
