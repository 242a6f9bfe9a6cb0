//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use nom::{
    IResult,
    bytes::complete::take,
    combinator::map,
    error::ErrorKind,
    number::complete::{le_f32, le_f64},
};

use std::convert::TryInto;

/// Parses an unsigned integer encoded as a little-endian base-128 varint:
/// 7 value bits per byte, continuation bit 0x80 on all but the last byte.
///
/// # Notes
///
/// 1. Non-minimal encodings are accepted: trailing continuation bytes whose
///    value bits are zero decode to the same integer. The compression frame
///    relies on this when it back-patches a reserved length slot.
/// 2. Set value bits beyond the 64th, or more than ten continuation bytes,
///    fail with `ErrorKind::TooLarge`.
/// 3. A continuation bit promised past the end of the input fails with
///    `ErrorKind::Eof`.
pub fn varint(input: &[u8]) -> IResult<&[u8], u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (index, byte) in input.iter().enumerate() {
        if index > 10 {
            return Err(nom::Err::Error((input, ErrorKind::TooLarge)));
        }
        let chunk = (byte & 0x7F) as u64;
        if shift < 64 {
            if shift > 57 && (chunk >> (64 - shift)) != 0 {
                return Err(nom::Err::Error((input, ErrorKind::TooLarge)));
            }
            value |= chunk << shift;
        } else if chunk != 0 {
            return Err(nom::Err::Error((input, ErrorKind::TooLarge)));
        }
        if byte & 0x80 == 0 {
            return Ok((&input[index + 1..], value));
        }
        shift += 7;
    }
    Err(nom::Err::Error((input, ErrorKind::Eof)))
}

/// Parses a signed integer encoded as a zigzag-mapped varint.
pub fn zigzag_varint(input: &[u8]) -> IResult<&[u8], i64> {
    map(varint, |value| {
        ((value >> 1) as i64) ^ -((value & 1) as i64)
    })(input)
}

/// Parses a 32-bit little-endian IEEE-754 payload.
pub fn float(input: &[u8]) -> IResult<&[u8], f32> {
    le_f32(input)
}

/// Parses a 64-bit little-endian IEEE-754 payload.
pub fn double(input: &[u8]) -> IResult<&[u8], f64> {
    le_f64(input)
}

/// Parses a 128-bit little-endian IEEE-754 payload as its bit pattern.
pub fn long_double(input: &[u8]) -> IResult<&[u8], [u8; 16]> {
    map(take(16usize), |bytes: &[u8]| {
        bytes.try_into().expect("take(16) yields 16 bytes")
    })(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_minimal() {
        let cases: &[(&[u8], u64)] = &[
            (&[0x00], 0),
            (&[0x01], 1),
            (&[0x7F], 127),
            (&[0x80, 0x01], 128),
            (&[0xAC, 0x02], 300),
            (&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u64::MAX),
        ];
        for (input, expected) in cases {
            assert_eq!(varint(input), Ok((&input[input.len()..], *expected)));
        }
    }

    #[test]
    fn test_varint_leaves_residual_input() {
        let input = &[0xAC, 0x02, 0x61, 0x61];
        assert_eq!(varint(input), Ok((&input[2..], 300)));
    }

    #[test]
    fn test_varint_non_minimal() {
        // The terminating byte of a minimal encoding, continued with a
        // zero byte, decodes to the same value.
        let cases: &[(&[u8], u64)] = &[
            (&[0x80, 0x00], 0),
            (&[0x87, 0x00], 7),
            (&[0xAC, 0x82, 0x80, 0x00], 300),
            (
                &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x81, 0x00],
                u64::MAX,
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(varint(input), Ok((&input[input.len()..], *expected)));
        }
    }

    #[test]
    fn test_varint_truncated() {
        assert!(varint(&[0x80]).is_err());
        assert!(varint(&[0xFF, 0xFF]).is_err());
        assert!(varint(&[]).is_err());
    }

    #[test]
    fn test_varint_overflow_value_bits() {
        // Bit 64 set.
        let input = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02];
        assert_eq!(
            varint(input),
            Err(nom::Err::Error((&input[..], ErrorKind::TooLarge)))
        );
    }

    #[test]
    fn test_varint_overflow_length() {
        // Twelve bytes of continuation with no value bits set.
        let input = &[0x80; 12];
        assert_eq!(
            varint(input),
            Err(nom::Err::Error((&input[..], ErrorKind::TooLarge)))
        );
    }

    #[test]
    fn test_zigzag_varint() {
        let cases: &[(&[u8], i64)] = &[
            (&[0x00], 0),
            (&[0x01], -1),
            (&[0x02], 1),
            (&[0x03], -2),
            (&[0x05], -3),
            (&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], i64::MIN),
            (&[0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], i64::MAX),
        ];
        for (input, expected) in cases {
            assert_eq!(zigzag_varint(input), Ok((&input[input.len()..], *expected)));
        }
    }

    #[test]
    fn test_float() {
        let input = &[0x00, 0x00, 0x20, 0xC0];
        assert_eq!(float(input), Ok((&input[4..], -2.5f32)));
    }

    #[test]
    fn test_double() {
        let input = &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0xC0];
        assert_eq!(double(input), Ok((&input[8..], -2.5f64)));
    }

    #[test]
    fn test_long_double() {
        let mut input = [0u8; 17];
        input[0] = 0xAA;
        input[16] = 0xBB;
        let (residual, bits) = long_double(&input).unwrap();
        assert_eq!(residual, &[0xBB]);
        assert_eq!(bits[0], 0xAA);
        assert_eq!(bits[15], 0x00);
    }

    #[test]
    fn test_long_double_truncated() {
        assert!(long_double(&[0u8; 15]).is_err());
    }
}
