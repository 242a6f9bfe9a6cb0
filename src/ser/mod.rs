//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The Sereal encoder.
//!
//! The encoder walks a value graph recursively and appends tagged items to
//! an output buffer. Repeated values become back references: a shared
//! container or referent becomes REFP, a repeated byte or Unicode string
//! becomes COPY, an aliased scalar becomes ALIAS, and a repeated class
//! name becomes OBJECTV. All back references carry a body offset and
//! retroactively set the track bit on the byte they point at.

mod buffer;
mod compress;
mod track;

use std::rc::Rc;

use crate::document::{
    self, is_ref_tag, magic_for_version, pack_version_encoding, tag, HEADER_FLAG_USER_DATA,
    MAGIC_SIZE, PROTOCOL_VERSION_MAX, PROTOCOL_VERSION_MIN, TRACK_BIT,
};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use buffer::{varint_size, OutputBuffer};
use compress::{compress_body, CompressorState};
use track::{Identity, OffsetTracker};

/// Body compression selection.
#[derive(Clone, Debug, PartialEq)]
pub enum Compression {
    /// Raw body.
    None,
    /// Snappy. Protocol version 1 uses the legacy whole-body framing;
    /// version 2 and later prefix the compressed length as a varint.
    Snappy,
    /// Zlib at the given level. Requires protocol version 3 or later.
    Zlib { level: u32 },
    /// Zstd at the given level. Requires protocol version 4.
    Zstd { level: i32 },
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}

/// Encoder configuration.
///
/// Every `max_*` limit treats zero as unbounded.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderConfig {
    /// Protocol version to emit, 1 through 4.
    pub protocol_version: u8,
    /// Body compression, gated by protocol version.
    pub compression: Compression,
    /// Bodies at or below this many bytes are never compressed.
    pub compression_threshold: usize,
    /// Emit sequences and mappings bare, without the implicit REFN wrap;
    /// the host graph then expresses all referencing explicitly.
    pub emit_refs: bool,
    /// Enable ALIAS emission for scalar cells appearing in multiple slots.
    pub emit_aliases: bool,
    pub max_recursion_depth: usize,
    pub max_array_entries: usize,
    pub max_map_entries: usize,
    pub max_string_length: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            protocol_version: 3,
            compression: Compression::None,
            compression_threshold: 1024,
            emit_refs: false,
            emit_aliases: false,
            max_recursion_depth: 10_000,
            max_array_entries: 0,
            max_map_entries: 0,
            max_string_length: 0,
        }
    }
}

impl EncoderConfig {
    /// Rejects impossible version/compression combinations.
    fn validate(&self) -> Result<()> {
        let version = self.protocol_version;
        if version < PROTOCOL_VERSION_MIN || version > PROTOCOL_VERSION_MAX {
            return Err(Error::BadVersion);
        }
        match self.compression {
            Compression::None | Compression::Snappy => Ok(()),
            Compression::Zlib { .. } if version >= 3 => Ok(()),
            Compression::Zstd { .. } if version >= 4 => Ok(()),
            _ => Err(Error::BadEncoding),
        }
    }

    /// The encoding nibble announced before the body is emitted; cleared
    /// back to raw if compression is skipped or abandoned.
    fn encoding(&self) -> u8 {
        match self.compression {
            Compression::None => document::ENCODING_RAW,
            Compression::Snappy if self.protocol_version < 2 => {
                document::ENCODING_SNAPPY_LEGACY
            }
            Compression::Snappy => document::ENCODING_SNAPPY,
            Compression::Zlib { .. } => document::ENCODING_ZLIB,
            Compression::Zstd { .. } => document::ENCODING_ZSTD,
        }
    }
}

/// Sereal document encoder.
///
/// One instance encodes one document at a time; the output buffer, the
/// back-reference indices and the compressor handles are owned by the
/// instance and reused across documents. A failed `encode` leaves no
/// partial document observable: `data` returns `None` until the next
/// successful encode.
pub struct Encoder {
    config: EncoderConfig,
    buffer: OutputBuffer,
    tracker: OffsetTracker,
    compressor: CompressorState,
    header_offset: usize,
    depth: usize,
    valid: bool,
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_config(EncoderConfig::default())
    }

    pub fn with_config(config: EncoderConfig) -> Self {
        Encoder {
            config,
            buffer: OutputBuffer::new(),
            tracker: OffsetTracker::new(),
            compressor: CompressorState::new(),
            header_offset: 0,
            depth: 0,
            valid: false,
        }
    }

    /// Encodes a value graph into a complete Sereal document and returns
    /// a view of it. The previous document is overwritten.
    pub fn encode(&mut self, body: &ObjectRef) -> Result<&[u8]> {
        self.encode_with_header(None, body)
    }

    /// Encodes a document carrying an optional user header. The header is
    /// a Sereal body of its own, with its own back-reference scope.
    pub fn encode_with_header(
        &mut self,
        header: Option<&ObjectRef>,
        body: &ObjectRef,
    ) -> Result<&[u8]> {
        match self.encode_document(header, body) {
            Ok(()) => {
                self.valid = true;
                Ok(self.buffer.as_slice())
            }
            Err(error) => {
                self.buffer.clear();
                self.valid = false;
                Err(error)
            }
        }
    }

    /// A view of the last complete document, if any.
    pub fn data(&self) -> Option<&[u8]> {
        if self.valid {
            Some(self.buffer.as_slice())
        } else {
            None
        }
    }

    /// A copy of the last complete document, if any.
    pub fn to_vec(&self) -> Option<Vec<u8>> {
        self.data().map(Vec::from)
    }

    /// Returns the instance to a usable state after an error.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.tracker.reset();
        self.depth = 0;
        self.valid = false;
    }

    fn encode_document(&mut self, header: Option<&ObjectRef>, body: &ObjectRef) -> Result<()> {
        self.config.validate()?;
        self.reset();

        let version = self.config.protocol_version;
        let encoding = self.config.encoding();
        self.buffer.append_bytes(magic_for_version(version));
        self.buffer
            .append_byte(pack_version_encoding(version, encoding));

        match header {
            None => self.buffer.append_byte(0x00),
            Some(value) => self.write_user_header(value)?,
        }

        let header_size = self.buffer.len();
        self.header_offset = if version >= 2 {
            header_size - 1
        } else {
            header_size
        };
        self.tracker.reset();
        self.write_value(body, false)?;

        if encoding != document::ENCODING_RAW {
            let body_size = self.buffer.len() - header_size;
            let framed = body_size > self.config.compression_threshold
                && compress_body(
                    &mut self.buffer,
                    header_size,
                    encoding,
                    &self.config.compression,
                    &mut self.compressor,
                )?;
            if !framed {
                self.buffer.patch_byte(
                    MAGIC_SIZE,
                    pack_version_encoding(version, document::ENCODING_RAW),
                );
            }
        }
        log::trace!(
            "encoded document: {} bytes, version {}",
            self.buffer.len(),
            version
        );
        Ok(())
    }

    /// Emits the user header block: a varint suffix length, the bitfield
    /// announcing user data, and a nested body.
    ///
    /// Two bytes are reserved optimistically. When the suffix turns out
    /// to need a wider length varint, the emitted bytes are shifted
    /// forward and the true length is written in place.
    fn write_user_header(&mut self, value: &ObjectRef) -> Result<()> {
        let reserve_at = self.buffer.len();
        self.buffer.append_byte(0x00);
        self.buffer.append_byte(HEADER_FLAG_USER_DATA);

        let nested_start = self.buffer.len();
        self.header_offset = if self.config.protocol_version >= 2 {
            nested_start - 1
        } else {
            nested_start
        };
        self.tracker.reset();
        self.write_value(value, false)?;

        let suffix_size = self.buffer.len() - reserve_at - 1;
        if suffix_size < 0x80 {
            self.buffer.patch_byte(reserve_at, suffix_size as u8);
        } else {
            let width = varint_size(suffix_size as u64);
            self.buffer.shift_tail_right(reserve_at + 1, width - 1);
            let mut value = suffix_size as u64;
            for index in 0..width {
                let mut byte = (value & 0x7F) as u8;
                value >>= 7;
                if value != 0 {
                    byte |= 0x80;
                }
                self.buffer.patch_byte(reserve_at + index, byte);
            }
        }
        Ok(())
    }

    /// The body offset the next appended byte will have.
    fn body_offset(&self) -> u64 {
        (self.buffer.len() - self.header_offset) as u64
    }

    fn write_value(&mut self, cell: &ObjectRef, as_referent: bool) -> Result<()> {
        let max = self.config.max_recursion_depth;
        if max != 0 && self.depth >= max {
            return Err(Error::RecursionLimit);
        }
        self.depth += 1;
        let result = self.write_value_inner(cell, as_referent);
        self.depth -= 1;
        result
    }

    fn write_value_inner(&mut self, cell: &ObjectRef, as_referent: bool) -> Result<()> {
        let id = Rc::as_ptr(cell) as Identity;
        let location = self.body_offset();
        let object = cell.borrow();

        // An explicit alias marker shares its target's slot outright.
        if let Object::Alias(target) = &*object {
            return self.write_value(target, as_referent);
        }

        if self.config.emit_aliases && is_alias_candidate(&object) {
            if let Some(offset) = self.tracker.alias_offset(id) {
                self.buffer.append_byte(tag::ALIAS);
                self.buffer.append_varint(offset);
                self.set_track_bit(offset);
                return Ok(());
            }
            self.tracker.note_maybe_alias(id, location);
        }

        // A scalar emitted as the referent of a REFN is a REFP target for
        // later references to the same cell.
        if as_referent && !identity_tracks_itself(&object) {
            self.tracker.track(id, location);
        }

        match &*object {
            Object::Alias(_) => Err(Error::InternalError),

            Object::Undefined => {
                self.buffer.append_byte(tag::UNDEF);
                Ok(())
            }

            Object::CanonicalUndefined => {
                if self.config.protocol_version >= 3 {
                    self.buffer.append_byte(tag::CANONICAL_UNDEF);
                } else {
                    self.buffer.append_byte(tag::UNDEF);
                }
                Ok(())
            }

            Object::Boolean(value) => {
                self.buffer
                    .append_byte(if *value { tag::TRUE } else { tag::FALSE });
                Ok(())
            }

            Object::Integer(value) => {
                let value = *value;
                if value >= 0 && value < 16 {
                    self.buffer.append_byte(tag::POS_LOW | value as u8);
                } else if value < 0 && value >= -16 {
                    self.buffer.append_byte(tag::NEG_LOW | (value + 32) as u8);
                } else if value >= 0 {
                    self.buffer.append_byte(tag::VARINT);
                    self.buffer.append_varint(value as u64);
                } else {
                    self.buffer.append_byte(tag::ZIGZAG);
                    self.buffer.append_zigzag(value);
                }
                Ok(())
            }

            Object::UnsignedInteger(value) => {
                let value = *value;
                if value < 16 {
                    self.buffer.append_byte(tag::POS_LOW | value as u8);
                } else {
                    self.buffer.append_byte(tag::VARINT);
                    self.buffer.append_varint(value);
                }
                Ok(())
            }

            Object::Float(value) => {
                self.buffer.append_byte(tag::FLOAT);
                self.buffer.append_bytes(&value.0.to_le_bytes());
                Ok(())
            }

            Object::Double(value) => {
                self.buffer.append_byte(tag::DOUBLE);
                self.buffer.append_bytes(&value.0.to_le_bytes());
                Ok(())
            }

            Object::LongDouble(bits) => {
                self.buffer.append_byte(tag::LONG_DOUBLE);
                self.buffer.append_bytes(bits);
                Ok(())
            }

            Object::Bytes(bytes) => self.write_byte_string(bytes),

            Object::String(text) => self.write_unicode_string(text),

            Object::Array(items) => {
                if let Some(offset) = self.tracker.tracked_offset(id) {
                    return self.write_refp(offset);
                }
                let limit = self.config.max_array_entries;
                if limit != 0 && items.len() > limit {
                    return Err(Error::EntryLimit);
                }
                self.tracker.track(id, location);
                if !as_referent && !self.config.emit_refs {
                    self.buffer.append_byte(tag::REFN);
                }
                self.buffer.append_byte(tag::ARRAY);
                self.buffer.append_varint(items.len() as u64);
                for item in items {
                    self.write_value(item, false)?;
                }
                Ok(())
            }

            Object::Hash(entries) => {
                if let Some(offset) = self.tracker.tracked_offset(id) {
                    return self.write_refp(offset);
                }
                let limit = self.config.max_map_entries;
                if limit != 0 && entries.len() > limit {
                    return Err(Error::EntryLimit);
                }
                self.tracker.track(id, location);
                if !as_referent && !self.config.emit_refs {
                    self.buffer.append_byte(tag::REFN);
                }
                self.buffer.append_byte(tag::HASH);
                self.buffer.append_varint(entries.len() as u64);
                for (key, value) in entries {
                    self.write_byte_string(key)?;
                    self.write_value(value, false)?;
                }
                Ok(())
            }

            Object::Reference(target) => self.write_reference(target),

            Object::WeakReference(target) => self.write_weak_reference(target),

            Object::Regex { pattern, flags } => {
                for flag in flags.chars() {
                    if !"msix".contains(flag) {
                        return Err(Error::OutOfRange);
                    }
                }
                self.buffer.append_byte(tag::REGEXP);
                self.write_unicode_string(pattern)?;
                self.write_byte_string(flags.as_bytes())
            }

            Object::Blessed { class, value } => {
                if let Some(offset) = self.tracker.tracked_offset(id) {
                    return self.write_refp(offset);
                }
                self.tracker.track(id, location);
                if let Some(offset) = self.tracker.classname_offset(class) {
                    self.buffer.append_byte(tag::OBJECTV);
                    self.buffer.append_varint(offset);
                } else {
                    self.buffer.append_byte(tag::OBJECT);
                    let class_location = self.body_offset();
                    self.tracker.record_classname(class, class_location);
                    self.write_byte_string(class.as_bytes())?;
                }
                self.write_value(value, false)
            }
        }
    }

    /// Emits a reference to `target`: REFP when the referent was emitted
    /// before, otherwise REFN with the referent tracked at its own tag.
    fn write_reference(&mut self, target: &ObjectRef) -> Result<()> {
        let target_id = Rc::as_ptr(target) as Identity;
        if let Some(offset) = self.tracker.tracked_offset(target_id) {
            return self.write_refp(offset);
        }
        self.buffer.append_byte(tag::REFN);
        self.write_value(target, true)
    }

    /// Emits a weak reference. The wire must read WEAKEN, then a
    /// reference-family tag, then the value; because the referent's first
    /// tag is not known until after the recursive call, a PAD slot is
    /// reserved and rewritten to REFN when the recursion produced
    /// something else.
    fn write_weak_reference(&mut self, target: &ObjectRef) -> Result<()> {
        self.buffer.append_byte(tag::WEAKEN);
        let pad_at = self.buffer.len();
        self.buffer.append_byte(tag::PAD);

        let target_id = Rc::as_ptr(target) as Identity;
        let target_is_container = target.borrow().is_container();
        if let Some(offset) = self.tracker.tracked_offset(target_id) {
            self.write_refp(offset)?;
        } else if target_is_container {
            self.write_value(target, false)?;
        } else {
            self.write_value(target, true)?;
        }

        if !is_ref_tag(self.buffer.byte_at(pad_at + 1)) {
            self.buffer.patch_byte(pad_at, tag::REFN);
        }
        Ok(())
    }

    fn write_refp(&mut self, offset: u64) -> Result<()> {
        self.buffer.append_byte(tag::REFP);
        self.buffer.append_varint(offset);
        self.set_track_bit(offset);
        Ok(())
    }

    /// Sets the track bit on the tag byte at a body offset, in place.
    /// Idempotent.
    fn set_track_bit(&mut self, offset: u64) {
        self.buffer
            .or_byte(offset as usize + self.header_offset, TRACK_BIT);
    }

    fn check_string_length(&self, length: usize) -> Result<()> {
        let limit = self.config.max_string_length;
        if limit != 0 && length > limit {
            return Err(Error::LengthLimit);
        }
        Ok(())
    }

    /// Emits an opaque byte string, deduplicated through the byte-copy
    /// index: a repeat of earlier content becomes COPY.
    fn write_byte_string(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_string_length(bytes.len())?;
        if let Some(offset) = self.tracker.bytes_offset(bytes) {
            self.buffer.append_byte(tag::COPY);
            self.buffer.append_varint(offset);
            return Ok(());
        }
        let location = self.body_offset();
        if bytes.len() < 32 {
            self.buffer
                .append_byte(tag::SHORT_BINARY_LOW | bytes.len() as u8);
        } else {
            self.buffer.append_byte(tag::BINARY);
            self.buffer.append_varint(bytes.len() as u64);
        }
        self.buffer.append_bytes(bytes);
        self.tracker.record_bytes(bytes, location);
        Ok(())
    }

    /// Emits a Unicode string as UTF-8, deduplicated through the
    /// string-copy index.
    fn write_unicode_string(&mut self, text: &str) -> Result<()> {
        self.check_string_length(text.len())?;
        if let Some(offset) = self.tracker.string_offset(text) {
            self.buffer.append_byte(tag::COPY);
            self.buffer.append_varint(offset);
            return Ok(());
        }
        let location = self.body_offset();
        self.buffer.append_byte(tag::STR_UTF8);
        self.buffer.append_varint(text.len() as u64);
        self.buffer.append_bytes(text.as_bytes());
        self.tracker.record_string(text, location);
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scalar kinds participate in alias tracking; containers and references
/// use the tracked index and REFP instead.
fn is_alias_candidate(object: &Object) -> bool {
    match object {
        Object::Undefined
        | Object::CanonicalUndefined
        | Object::Boolean(_)
        | Object::Integer(_)
        | Object::UnsignedInteger(_)
        | Object::Float(_)
        | Object::Double(_)
        | Object::LongDouble(_)
        | Object::Bytes(_)
        | Object::String(_) => true,
        _ => false,
    }
}

/// Kinds whose dispatch arm records its own identity (and must check for a
/// prior offset before doing so).
fn identity_tracks_itself(object: &Object) -> bool {
    match object {
        Object::Array(_) | Object::Hash(_) | Object::Blessed { .. } => true,
        _ => false,
    }
}
