// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Packed binary encodings for array metric values.
//!
//! All multi-byte elements are little-endian with no length prefix, except
//! `BooleanArray` which leads with a 4-byte element count. Strings are
//! NUL-terminated and concatenated.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::DecodeError;

pub fn encode_int8(values: &[i8]) -> Vec<u8> {
    values.iter().map(|v| *v as u8).collect()
}

pub fn decode_int8(buf: &[u8]) -> Vec<i8> {
    buf.iter().map(|b| *b as i8).collect()
}

pub fn encode_int16(values: &[i16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 2);
    for v in values {
        // Vec<u8> writes cannot fail.
        let _ = buf.write_i16::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_int16(buf: &[u8]) -> Result<Vec<i16>, DecodeError> {
    exact_chunks(buf, 2).map(|chunks| chunks.map(LittleEndian::read_i16).collect())
}

pub fn encode_int32(values: &[i32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        let _ = buf.write_i32::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_int32(buf: &[u8]) -> Result<Vec<i32>, DecodeError> {
    exact_chunks(buf, 4).map(|chunks| chunks.map(LittleEndian::read_i32).collect())
}

pub fn encode_int64(values: &[i64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for v in values {
        let _ = buf.write_i64::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_int64(buf: &[u8]) -> Result<Vec<i64>, DecodeError> {
    exact_chunks(buf, 8).map(|chunks| chunks.map(LittleEndian::read_i64).collect())
}

pub fn encode_uint16(values: &[u16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 2);
    for v in values {
        let _ = buf.write_u16::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_uint16(buf: &[u8]) -> Result<Vec<u16>, DecodeError> {
    exact_chunks(buf, 2).map(|chunks| chunks.map(LittleEndian::read_u16).collect())
}

pub fn encode_uint32(values: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        let _ = buf.write_u32::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_uint32(buf: &[u8]) -> Result<Vec<u32>, DecodeError> {
    exact_chunks(buf, 4).map(|chunks| chunks.map(LittleEndian::read_u32).collect())
}

pub fn encode_uint64(values: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for v in values {
        let _ = buf.write_u64::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_uint64(buf: &[u8]) -> Result<Vec<u64>, DecodeError> {
    exact_chunks(buf, 8).map(|chunks| chunks.map(LittleEndian::read_u64).collect())
}

pub fn encode_float(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        let _ = buf.write_f32::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_float(buf: &[u8]) -> Result<Vec<f32>, DecodeError> {
    exact_chunks(buf, 4).map(|chunks| chunks.map(LittleEndian::read_f32).collect())
}

pub fn encode_double(values: &[f64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for v in values {
        let _ = buf.write_f64::<LittleEndian>(*v);
    }
    buf
}

pub fn decode_double(buf: &[u8]) -> Result<Vec<f64>, DecodeError> {
    exact_chunks(buf, 8).map(|chunks| chunks.map(LittleEndian::read_f64).collect())
}

/// Booleans: 4-byte LE element count, then `ceil(n/8)` bytes with
/// MSB-first bits (bit 7 of the first byte is element 0).
pub fn encode_boolean(values: &[bool]) -> Vec<u8> {
    let packed_len = values.len().div_ceil(8);
    let mut buf = Vec::with_capacity(4 + packed_len);
    let _ = buf.write_u32::<LittleEndian>(values.len() as u32);
    buf.resize(4 + packed_len, 0);
    for (i, v) in values.iter().enumerate() {
        if *v {
            buf[4 + i / 8] |= 1 << (7 - i % 8);
        }
    }
    buf
}

pub fn decode_boolean(buf: &[u8]) -> Result<Vec<bool>, DecodeError> {
    if buf.len() < 4 {
        return Err(DecodeError::TruncatedArray);
    }
    let count = LittleEndian::read_u32(&buf[..4]) as usize;
    let packed = &buf[4..];
    if packed.len() < count.div_ceil(8) {
        return Err(DecodeError::TruncatedArray);
    }
    Ok((0..count)
        .map(|i| (packed[i / 8] >> (7 - i % 8)) & 1 == 1)
        .collect())
}

/// Strings: NUL-terminated UTF-8, concatenated, no leading count.
pub fn encode_string(values: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    for v in values {
        buf.extend_from_slice(v.as_bytes());
        buf.push(0);
    }
    buf
}

pub fn decode_string(buf: &[u8]) -> Result<Vec<String>, DecodeError> {
    let mut values = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        let Some(end) = rest.iter().position(|b| *b == 0) else {
            // Trailing bytes with no terminator.
            return Err(DecodeError::TruncatedArray);
        };
        values.push(String::from_utf8(rest[..end].to_vec())?);
        rest = &rest[end + 1..];
    }
    Ok(values)
}

/// DateTimes: 8-byte LE milliseconds since the Unix epoch per element.
pub fn encode_datetime(values: &[u64]) -> Vec<u8> {
    encode_uint64(values)
}

pub fn decode_datetime(buf: &[u8]) -> Result<Vec<u64>, DecodeError> {
    decode_uint64(buf)
}

fn exact_chunks(buf: &[u8], width: usize) -> Result<std::slice::ChunksExact<'_, u8>, DecodeError> {
    let chunks = buf.chunks_exact(width);
    if chunks.remainder().is_empty() {
        Ok(chunks)
    } else {
        Err(DecodeError::TruncatedArray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int16_little_endian() {
        let encoded = encode_int16(&[-2, 0x0102]);
        assert_eq!(encoded, [0xfe, 0xff, 0x02, 0x01]);
        assert_eq!(decode_int16(&encoded).unwrap(), [-2, 0x0102]);
    }

    #[test]
    fn test_truncated_element() {
        assert_eq!(decode_int32(&[1, 2, 3]), Err(DecodeError::TruncatedArray));
        assert_eq!(
            decode_double(&[0; 9][..]),
            Err(DecodeError::TruncatedArray)
        );
    }

    #[test]
    fn test_boolean_bit_packing() {
        // 9 elements: 4-byte LE count then two packed bytes.
        let values = [true, false, true, true, false, false, false, false, true];
        let encoded = encode_boolean(&values);
        assert_eq!(encoded, [0x09, 0x00, 0x00, 0x00, 0xb0, 0x80]);
        assert_eq!(decode_boolean(&encoded).unwrap(), values);
    }

    #[test]
    fn test_boolean_empty() {
        let encoded = encode_boolean(&[]);
        assert_eq!(encoded, [0x00, 0x00, 0x00, 0x00]);
        assert_eq!(decode_boolean(&encoded).unwrap(), Vec::<bool>::new());
    }

    #[test]
    fn test_boolean_short_buffer() {
        // Count says 9 elements but only one packed byte follows.
        let buf = [0x09, 0x00, 0x00, 0x00, 0xb0];
        assert_eq!(decode_boolean(&buf), Err(DecodeError::TruncatedArray));
    }

    #[test]
    fn test_string_nul_terminated() {
        let values = ["ab".to_string(), String::new(), "c".to_string()];
        let encoded = encode_string(&values);
        assert_eq!(encoded, [0x61, 0x62, 0x00, 0x00, 0x63, 0x00]);
        assert_eq!(decode_string(&encoded).unwrap(), values);
    }

    #[test]
    fn test_string_missing_terminator() {
        assert_eq!(
            decode_string(&[0x61, 0x00, 0x62]),
            Err(DecodeError::TruncatedArray)
        );
    }

    #[test]
    fn test_datetime_round_trip() {
        let values = [0u64, 1_700_000_000_000];
        let encoded = encode_datetime(&values);
        assert_eq!(encoded.len(), 16);
        assert_eq!(decode_datetime(&encoded).unwrap(), values);
    }
}
