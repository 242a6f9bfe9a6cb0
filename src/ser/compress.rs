//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The compression frame.
//!
//! After body emission the encoder may replace the body with a compressed
//! frame. The framed encodings carry the compressed length as a varint
//! *before* the compressed bytes, but the length is only known after
//! compression. The frame therefore reserves the worst-case varint width
//! up front, pre-filled with continuation bytes and a final zero so that
//! any shorter length can be patched in place as a valid, non-minimal
//! varint without shifting the compressed bytes.

use flate2::{Compress, FlushCompress, Status};

use crate::document::{ENCODING_SNAPPY, ENCODING_SNAPPY_LEGACY, ENCODING_ZLIB, ENCODING_ZSTD};
use crate::error::{Error, Result};
use crate::ser::buffer::{push_varint, varint_size, OutputBuffer};
use crate::ser::Compression;

/// Per-instance compressor handles and the frame scratch buffer, owned by
/// the encoder and reused across documents.
#[derive(Default)]
pub(crate) struct CompressorState {
    snappy: Option<snap::raw::Encoder>,
    zlib: Option<Compress>,
    zstd: Option<zstd::bulk::Compressor<'static>>,
    scratch: Vec<u8>,
}

impl CompressorState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Worst-case deflate output for `len` input bytes, per the zlib bound.
fn zlib_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13 + 6
}

/// Wraps the emitted body in a compression frame when that makes the
/// document smaller.
///
/// On success the buffer holds `[pre-body header][frame]` and `true` is
/// returned. When the framed document would be at least as large as the
/// raw one, the buffer is left untouched and `false` is returned; the
/// caller then clears the encoding nibble.
pub(crate) fn compress_body(
    buffer: &mut OutputBuffer,
    header_size: usize,
    encoding: u8,
    compression: &Compression,
    state: &mut CompressorState,
) -> Result<bool> {
    let raw_size = buffer.len();
    let body_size = raw_size - header_size;
    let body_start;

    let mut frame = std::mem::take(&mut state.scratch);
    frame.clear();
    frame.extend_from_slice(&buffer.as_slice()[..header_size]);

    let reserved;
    match encoding {
        ENCODING_SNAPPY_LEGACY => {
            // Whole-body compression with no length varint.
            reserved = 0;
            body_start = frame.len();
        }
        ENCODING_SNAPPY => {
            reserved = varint_size(snap::raw::max_compress_len(body_size) as u64);
            reserve_length_slot(&mut frame, reserved);
            body_start = frame.len();
        }
        ENCODING_ZLIB => {
            // The uncompressed length travels first, as a minimal varint.
            push_varint(&mut frame, body_size as u64);
            reserved = varint_size(zlib_bound(body_size) as u64);
            reserve_length_slot(&mut frame, reserved);
            body_start = frame.len();
        }
        ENCODING_ZSTD => {
            reserved = varint_size(compress_bound_zstd(body_size) as u64);
            reserve_length_slot(&mut frame, reserved);
            body_start = frame.len();
        }
        _ => return Err(Error::InternalError),
    }

    let compressed = {
        let body = &buffer.as_slice()[header_size..];
        match encoding {
            ENCODING_SNAPPY_LEGACY | ENCODING_SNAPPY => {
                let bound = snap::raw::max_compress_len(body_size);
                frame.resize(body_start + bound, 0);
                let encoder = state.snappy.get_or_insert_with(snap::raw::Encoder::new);
                encoder
                    .compress(body, &mut frame[body_start..])
                    .map_err(|error| Error::CompressionError(error.to_string()))?
            }
            ENCODING_ZLIB => {
                let level = match compression {
                    Compression::Zlib { level } => *level,
                    _ => return Err(Error::InternalError),
                };
                frame.resize(body_start + zlib_bound(body_size), 0);
                let deflate = state.zlib.get_or_insert_with(|| {
                    Compress::new(flate2::Compression::new(level), true)
                });
                deflate.reset();
                let status = deflate
                    .compress(body, &mut frame[body_start..], FlushCompress::Finish)
                    .map_err(|error| Error::CompressionError(error.to_string()))?;
                if status != Status::StreamEnd {
                    return Err(Error::CompressionError(String::from(
                        "deflate did not reach stream end",
                    )));
                }
                deflate.total_out() as usize
            }
            ENCODING_ZSTD => {
                let level = match compression {
                    Compression::Zstd { level } => *level,
                    _ => return Err(Error::InternalError),
                };
                frame.resize(body_start + compress_bound_zstd(body_size), 0);
                if state.zstd.is_none() {
                    state.zstd = Some(
                        zstd::bulk::Compressor::new(level)
                            .map_err(|error| Error::CompressionError(error.to_string()))?,
                    );
                }
                let compressor = state.zstd.as_mut().ok_or(Error::InternalError)?;
                compressor
                    .compress_to_buffer(body, &mut frame[body_start..])
                    .map_err(|error| Error::CompressionError(error.to_string()))?
            }
            _ => return Err(Error::InternalError),
        }
    };
    frame.truncate(body_start + compressed);

    if frame.len() >= raw_size {
        // The frame did not pay for itself; the caller keeps the raw body.
        state.scratch = frame;
        return Ok(false);
    }

    if reserved > 0 {
        patch_length_slot(&mut frame, body_start - reserved, reserved, compressed as u64);
    }
    log::debug!(
        "compressed {} body bytes to {} (encoding {})",
        body_size,
        compressed,
        encoding
    );
    buffer.swap_contents(&mut frame);
    state.scratch = frame;
    Ok(true)
}

/// `ZSTD_compressBound` per the zstd format: worst case for one frame.
fn compress_bound_zstd(len: usize) -> usize {
    len + (len >> 8) + if len < (128 << 10) { (((128 << 10) - len) >> 11) } else { 0 } + 64
}

/// Appends a length slot of `reserved` bytes, pre-filled as a non-minimal
/// varint of zero: continuation bytes followed by a final zero byte.
fn reserve_length_slot(frame: &mut Vec<u8>, reserved: usize) {
    for _ in 0..reserved - 1 {
        frame.push(0x80);
    }
    frame.push(0x00);
}

/// Patches the true compressed length into a reserved slot. When the
/// minimal encoding is shorter than the slot, the continuation bit is
/// raised on its terminating byte so decoding walks the remaining pad
/// bytes; the result is non-minimal but decodes to the same value.
fn patch_length_slot(frame: &mut Vec<u8>, slot: usize, reserved: usize, mut value: u64) {
    let mut index = slot;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            frame[index] = if index + 1 < slot + reserved {
                byte | 0x80
            } else {
                byte
            };
            break;
        }
        frame[index] = byte | 0x80;
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de::parser::item::varint;

    #[test]
    fn test_reserve_length_slot_decodes_to_zero() {
        let mut frame = Vec::new();
        reserve_length_slot(&mut frame, 4);
        assert_eq!(frame, &[0x80, 0x80, 0x80, 0x00]);
        assert_eq!(varint(&frame), Ok((&frame[4..], 0)));
    }

    #[test]
    fn test_patch_length_slot_exact_width() {
        let mut frame = Vec::new();
        reserve_length_slot(&mut frame, 2);
        patch_length_slot(&mut frame, 0, 2, 300);
        assert_eq!(frame, &[0xAC, 0x02]);
    }

    #[test]
    fn test_patch_length_slot_shorter_than_reserved() {
        let mut frame = Vec::new();
        reserve_length_slot(&mut frame, 4);
        patch_length_slot(&mut frame, 0, 4, 7);
        // Non-minimal on purpose: the decoder walks the pad bytes.
        assert_eq!(frame, &[0x87, 0x80, 0x80, 0x00]);
        assert_eq!(varint(&frame), Ok((&frame[4..], 7)));
    }

    #[test]
    fn test_patch_length_slot_two_of_four() {
        let mut frame = Vec::new();
        reserve_length_slot(&mut frame, 4);
        patch_length_slot(&mut frame, 0, 4, 300);
        assert_eq!(frame, &[0xAC, 0x82, 0x80, 0x00]);
        assert_eq!(varint(&frame), Ok((&frame[4..], 300)));
    }
}
