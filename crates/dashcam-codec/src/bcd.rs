//! Packed BCD (binary-coded decimal) used for JT808 phone/SIM fields and
//! timestamps: two decimal digits per byte, high nibble first.

use crate::error::CodecError;
use chrono::{DateTime, TimeZone, Utc};

/// Decodes `data` into a decimal digit string. A nibble value of `0xF` is
/// padding and is skipped rather than emitted, matching the wire format's
/// convention for short fields. Leading zeros are stripped from the result
/// (an all-zero field decodes to `"0"`).
pub fn parse(data: &[u8]) -> Result<String, CodecError> {
    let mut digits = String::with_capacity(data.len() * 2);
    for &byte in data {
        for nibble in [byte >> 4, byte & 0x0F] {
            match nibble {
                0x0..=0x9 => digits.push((b'0' + nibble) as char),
                0xF => {}
                _ => return Err(CodecError::InvalidBcd(byte)),
            }
        }
    }
    let trimmed = digits.trim_start_matches('0');
    Ok(if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    })
}

/// Encodes a decimal digit string into `length` BCD bytes, zero-padding on
/// the left. Truncates from the left if `value` already has more digits
/// than fit (mirrors the source's `zfill` which never truncates — callers
/// are expected to pass values that fit).
pub fn encode(value: &str, length: usize) -> Vec<u8> {
    let width = length * 2;
    let padded = if value.len() >= width {
        value[value.len() - width..].to_string()
    } else {
        format!("{:0>width$}", value, width = width)
    };
    padded
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = pair[0] - b'0';
            let lo = pair[1] - b'0';
            (hi << 4) | lo
        })
        .collect()
}

/// Parses a 6-byte `YYMMDDhhmmss` BCD timestamp as UTC, treating the
/// two-digit year as `2000 + YY`. Per spec §4.B, callers must fall back to
/// wall-clock time on error rather than dropping the record.
pub fn parse_datetime(data: &[u8; 6]) -> Result<DateTime<Utc>, CodecError> {
    let digits = parse(data)?;
    // `parse` strips leading zeros, so re-pad to the fixed 12-digit width.
    let digits = format!("{digits:0>12}");
    let year = 2000 + digits[0..2].parse::<i32>().map_err(|_| CodecError::InvalidBcd(data[0]))?;
    let month = digits[2..4].parse::<u32>().map_err(|_| CodecError::InvalidBcd(data[1]))?;
    let day = digits[4..6].parse::<u32>().map_err(|_| CodecError::InvalidBcd(data[2]))?;
    let hour = digits[6..8].parse::<u32>().map_err(|_| CodecError::InvalidBcd(data[3]))?;
    let minute = digits[8..10].parse::<u32>().map_err(|_| CodecError::InvalidBcd(data[4]))?;
    let second = digits[10..12].parse::<u32>().map_err(|_| CodecError::InvalidBcd(data[5]))?;
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or(CodecError::InvalidBcd(data[0]))
}

/// Encodes a UTC timestamp back into the 6-byte `YYMMDDhhmmss` BCD field.
pub fn encode_datetime(dt: DateTime<Utc>) -> [u8; 6] {
    use chrono::Datelike as _;
    use chrono::Timelike as _;
    let s = format!(
        "{:02}{:02}{:02}{:02}{:02}{:02}",
        dt.year() % 100,
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    let bytes = encode(&s, 6);
    bytes.try_into().expect("encode(_, 6) always returns 6 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_phone_number() {
        let phone = "13800001111";
        let encoded = encode(phone, 6);
        assert_eq!(parse(&encoded).unwrap(), phone);
    }

    #[test]
    fn strips_leading_zeros_after_decode() {
        let encoded = encode("42", 6);
        assert_eq!(parse(&encoded).unwrap(), "42");
    }

    #[test]
    fn all_zero_field_decodes_to_zero() {
        assert_eq!(parse(&[0, 0, 0]).unwrap(), "0");
    }

    #[test]
    fn padding_nibble_is_skipped() {
        // 0xF in the low nibble of the final byte is a common short-field pad.
        assert_eq!(parse(&[0x01, 0x2F]).unwrap(), "12");
    }

    #[test]
    fn datetime_round_trips() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 45).unwrap();
        let encoded = encode_datetime(dt);
        assert_eq!(parse_datetime(&encoded).unwrap(), dt);
    }

    #[test]
    fn invalid_datetime_bcd_is_rejected() {
        // month 13 is not a valid calendar month.
        let bad = encode("240305123045".replacen("03", "13", 1).as_str(), 6);
        let arr: [u8; 6] = bad.try_into().unwrap();
        assert!(parse_datetime(&arr).is_err());
    }
}
