//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The Sereal decoder.
//!
//! The decoder parses the document preamble, inflates a compression frame
//! when present, then reads the body recursively. Every decoded item is
//! recorded in a back-reference index keyed by its body offset, strictly
//! before any later tag can reference it; containers are built in two
//! phases (allocate the cell, register its offset, then populate) so that
//! REFP and ALIAS may point into a container that is still being filled.

pub(crate) mod parser;
mod source;

use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::io::Read;

use ordered_float::OrderedFloat;

use crate::document::{
    is_string_tag, strip_track_bit, tag, ENCODING_RAW, ENCODING_SNAPPY, ENCODING_SNAPPY_LEGACY,
    ENCODING_ZLIB, ENCODING_ZSTD, HEADER_FLAG_USER_DATA, MAGIC_SIZE, PROTOCOL_VERSION_MAX,
};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use source::Source;

/// Decoder configuration.
///
/// Every `max_*` limit treats zero as unbounded.
#[derive(Clone, Debug, PartialEq)]
pub struct DecoderConfig {
    /// Reject documents with Snappy-compressed bodies.
    pub refuse_snappy: bool,
    /// Reject documents with Zlib-compressed bodies.
    pub refuse_zlib: bool,
    /// Reject documents with Zstd-compressed bodies.
    pub refuse_zstd: bool,
    /// Reject documents containing blessed objects.
    pub refuse_objects: bool,
    /// Decode blessed objects as their payload, dropping the class.
    pub no_bless_objects: bool,
    /// Keep the stream buffer between documents so several documents can
    /// be decoded from one byte source.
    pub incremental: bool,
    pub max_recursion_depth: usize,
    pub max_array_entries: usize,
    pub max_map_entries: usize,
    pub max_string_length: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            refuse_snappy: false,
            refuse_zlib: false,
            refuse_zstd: false,
            refuse_objects: false,
            no_bless_objects: false,
            incremental: false,
            max_recursion_depth: 10_000,
            max_array_entries: 0,
            max_map_entries: 0,
            max_string_length: 0,
        }
    }
}

/// A decoded document: the optional user header and the body.
#[derive(Debug)]
pub struct Document {
    pub header: Option<ObjectRef>,
    pub body: ObjectRef,
}

/// Sereal document decoder.
pub struct Decoder {
    config: DecoderConfig,
    retained: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Decoder {
            config,
            retained: Vec::new(),
        }
    }

    /// Decodes one complete in-memory document.
    pub fn decode(&self, input: &[u8]) -> Result<Document> {
        let mut source = Source::from_slice(input);
        self.decode_document(&mut source)
    }

    /// Decodes one document from a byte source, refilling lazily. With
    /// `incremental` set, bytes read past the document are kept for the
    /// next call.
    pub fn decode_from_reader(&mut self, reader: &mut dyn Read) -> Result<Document> {
        let retained = std::mem::take(&mut self.retained);
        let mut source = Source::from_reader(retained, reader);
        let result = self.decode_document(&mut source);
        if self.config.incremental && result.is_ok() {
            source.shift_left();
            self.retained = source.into_retained();
        }
        result
    }

    fn decode_document(&self, source: &mut Source) -> Result<Document> {
        let preamble = {
            let bytes = source.take(MAGIC_SIZE + 1)?;
            match parser::document::preamble(bytes) {
                Ok((_, preamble)) => preamble,
                Err(_) => return Err(Error::BadMagic),
            }
        };
        let version = preamble.version;
        if version == 0 || version > PROTOCOL_VERSION_MAX {
            return Err(Error::BadVersion);
        }
        if preamble.v3_magic != (version >= 3) {
            return Err(Error::BadVersion);
        }
        let encoding = preamble.encoding;
        match encoding {
            ENCODING_RAW => {}
            ENCODING_SNAPPY_LEGACY | ENCODING_SNAPPY => {
                if self.config.refuse_snappy {
                    return Err(Error::BadEncoding);
                }
            }
            ENCODING_ZLIB => {
                if self.config.refuse_zlib {
                    return Err(Error::BadEncoding);
                }
            }
            ENCODING_ZSTD => {
                if self.config.refuse_zstd {
                    return Err(Error::BadEncoding);
                }
            }
            _ => return Err(Error::BadEncoding),
        }
        log::trace!("document preamble: version {} encoding {}", version, encoding);

        let suffix_size = read_varint_from(source)?;
        let header = if suffix_size == 0 {
            None
        } else {
            let suffix_size =
                usize::try_from(suffix_size).map_err(|_| Error::OutOfRange)?;
            let header_end = source
                .pos()
                .checked_add(suffix_size)
                .ok_or(Error::OutOfRange)?;
            let bitfield = source.take_byte()?;
            let value = if bitfield & HEADER_FLAG_USER_DATA != 0 {
                Some(BodyReader::new(source, &self.config, version).read_root()?)
            } else {
                None
            };
            // Skip padding a future minor version may add to the suffix.
            if source.pos() > header_end {
                return Err(Error::Truncated);
            }
            let padding = header_end - source.pos();
            source.take(padding)?;
            value
        };

        let body = if encoding == ENCODING_RAW {
            BodyReader::new(source, &self.config, version).read_root()?
        } else {
            let inflated = self.inflate_body(source, encoding)?;
            log::debug!("inflated body: {} bytes", inflated.len());
            let mut window = Source::from_vec(inflated);
            BodyReader::new(&mut window, &self.config, version).read_root()?
        };
        Ok(Document { header, body })
    }

    /// Consumes a compression frame and returns the raw body bytes.
    fn inflate_body(&self, source: &mut Source, encoding: u8) -> Result<Vec<u8>> {
        match encoding {
            ENCODING_SNAPPY_LEGACY => {
                let compressed = source.take_to_end()?;
                snap::raw::Decoder::new()
                    .decompress_vec(compressed)
                    .map_err(|error| Error::CompressionError(error.to_string()))
            }
            ENCODING_SNAPPY => {
                let length = read_length(source)?;
                let compressed = source.take(length)?;
                snap::raw::Decoder::new()
                    .decompress_vec(compressed)
                    .map_err(|error| Error::CompressionError(error.to_string()))
            }
            ENCODING_ZLIB => {
                let uncompressed_size = read_varint_from(source)?;
                let length = read_length(source)?;
                let compressed = source.take(length)?;
                let mut inflated =
                    Vec::with_capacity(usize::try_from(uncompressed_size.min(1 << 20)).unwrap_or(0));
                flate2::read::ZlibDecoder::new(compressed)
                    .read_to_end(&mut inflated)
                    .map_err(|error| Error::CompressionError(error.to_string()))?;
                if inflated.len() as u64 != uncompressed_size {
                    return Err(Error::CompressionError(String::from(
                        "inflated body does not match the declared length",
                    )));
                }
                Ok(inflated)
            }
            ENCODING_ZSTD => {
                let length = read_length(source)?;
                let compressed = source.take(length)?;
                zstd::decode_all(compressed)
                    .map_err(|error| Error::CompressionError(error.to_string()))
            }
            _ => Err(Error::InternalError),
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads one varint off the window, tolerating non-minimal encodings.
fn read_varint_from(source: &mut Source) -> Result<u64> {
    let (value, used) = {
        let window = source.varint_window()?;
        match parser::item::varint(window) {
            Ok((rest, value)) => (value, window.len() - rest.len()),
            Err(_) => return Err(Error::OverflowError),
        }
    };
    source.consume(used);
    Ok(value)
}

fn read_length(source: &mut Source) -> Result<usize> {
    usize::try_from(read_varint_from(source)?).map_err(|_| Error::OutOfRange)
}

/// One entry of the back-reference index.
///
/// `ref_like` distinguishes items that already denote a reference-family
/// value on the wire (REFN, containers, blessed objects, regexes) from
/// plain scalars: REFP to the former yields the cell itself, REFP to the
/// latter yields a fresh `Reference` around it.
struct MemoEntry {
    cell: ObjectRef,
    ref_like: bool,
}

/// Recursive body reader over one offset scope.
struct BodyReader<'r, 'a> {
    source: &'r mut Source<'a>,
    config: &'r DecoderConfig,
    version: u8,
    body_start: usize,
    offset_bias: usize,
    memo: HashMap<u64, MemoEntry>,
    classnames: HashMap<u64, String>,
    depth: usize,
    in_copy: bool,
}

impl<'r, 'a> BodyReader<'r, 'a> {
    fn new(source: &'r mut Source<'a>, config: &'r DecoderConfig, version: u8) -> Self {
        let body_start = source.pos();
        BodyReader {
            source,
            config,
            version,
            body_start,
            offset_bias: if version >= 2 { 1 } else { 0 },
            memo: HashMap::new(),
            classnames: HashMap::new(),
            depth: 0,
            in_copy: false,
        }
    }

    fn read_root(mut self) -> Result<ObjectRef> {
        self.read_item()
    }

    /// The body offset of an absolute window position.
    fn offset_of(&self, pos: usize) -> u64 {
        (pos - self.body_start + self.offset_bias) as u64
    }

    /// The absolute window position of a body offset.
    fn absolute(&self, offset: u64) -> Result<usize> {
        let offset = usize::try_from(offset).map_err(|_| Error::InvalidBackReference)?;
        self.body_start
            .checked_add(offset)
            .and_then(|pos| pos.checked_sub(self.offset_bias))
            .ok_or(Error::InvalidBackReference)
    }

    fn record(&mut self, offset: u64, cell: &ObjectRef, ref_like: bool) {
        if !self.in_copy {
            self.memo.insert(
                offset,
                MemoEntry {
                    cell: cell.clone(),
                    ref_like,
                },
            );
        }
    }

    fn read_varint(&mut self) -> Result<u64> {
        read_varint_from(self.source)
    }

    fn check_string_length(&self, length: usize) -> Result<()> {
        let limit = self.config.max_string_length;
        if limit != 0 && length > limit {
            return Err(Error::LengthLimit);
        }
        Ok(())
    }

    /// Consumes PAD bytes and the next real tag byte, returning the tag's
    /// body offset and raw byte.
    fn next_tag(&mut self) -> Result<(u64, u8)> {
        loop {
            let byte = self.source.peek(1)?[0];
            if strip_track_bit(byte) == tag::PAD {
                self.source.consume(1);
                continue;
            }
            let offset = self.offset_of(self.source.pos());
            self.source.consume(1);
            return Ok((offset, byte));
        }
    }

    /// Peeks the next real tag byte without consuming it; PAD bytes in
    /// front of it are consumed.
    fn peek_tag(&mut self) -> Result<u8> {
        loop {
            let byte = self.source.peek(1)?[0];
            if strip_track_bit(byte) == tag::PAD {
                self.source.consume(1);
                continue;
            }
            return Ok(byte);
        }
    }

    fn read_item(&mut self) -> Result<ObjectRef> {
        let max = self.config.max_recursion_depth;
        if max != 0 && self.depth >= max {
            return Err(Error::RecursionLimit);
        }
        self.depth += 1;
        let result = self.read_item_inner();
        self.depth -= 1;
        result
    }

    fn read_item_inner(&mut self) -> Result<ObjectRef> {
        let (offset, byte) = self.next_tag()?;
        let opcode = strip_track_bit(byte);

        let object = match opcode {
            opcode if opcode < 0x10 => Object::Integer(opcode as i64),

            opcode if opcode < 0x20 => Object::Integer(opcode as i64 - 32),

            tag::VARINT => {
                let value = self.read_varint()?;
                if value > i64::MAX as u64 {
                    Object::UnsignedInteger(value)
                } else {
                    Object::Integer(value as i64)
                }
            }

            tag::ZIGZAG => {
                let (value, used) = {
                    let window = self.source.varint_window()?;
                    match parser::item::zigzag_varint(window) {
                        Ok((rest, value)) => (value, window.len() - rest.len()),
                        Err(_) => return Err(Error::OverflowError),
                    }
                };
                self.source.consume(used);
                Object::Integer(value)
            }

            tag::FLOAT => {
                let bytes = self.source.take(4)?;
                match parser::item::float(bytes) {
                    Ok((_, value)) => Object::Float(OrderedFloat(value)),
                    Err(_) => return Err(Error::InternalError),
                }
            }

            tag::DOUBLE => {
                let bytes = self.source.take(8)?;
                match parser::item::double(bytes) {
                    Ok((_, value)) => Object::Double(OrderedFloat(value)),
                    Err(_) => return Err(Error::InternalError),
                }
            }

            tag::LONG_DOUBLE => {
                let bytes = self.source.take(16)?;
                match parser::item::long_double(bytes) {
                    Ok((_, bits)) => Object::LongDouble(bits),
                    Err(_) => return Err(Error::InternalError),
                }
            }

            tag::UNDEF => Object::Undefined,

            tag::CANONICAL_UNDEF => {
                if self.version < 3 {
                    return Err(Error::InvalidTag(byte));
                }
                Object::CanonicalUndefined
            }

            tag::TRUE => Object::Boolean(true),

            tag::FALSE => Object::Boolean(false),

            tag::BINARY => {
                let length = self.read_string_payload_length()?;
                Object::Bytes(self.source.take(length)?.to_vec())
            }

            tag::STR_UTF8 => {
                let length = self.read_string_payload_length()?;
                let bytes = self.source.take(length)?.to_vec();
                Object::String(String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?)
            }

            tag::REFN => {
                let cell = Object::Undefined.into_ref();
                self.record(offset, &cell, true);
                let next = strip_track_bit(self.peek_tag()?);
                if next == tag::ARRAY || next == tag::HASH {
                    // A reference to a directly following container is
                    // the container value itself.
                    self.read_container_into(&cell)?;
                } else {
                    let referent = self.read_item()?;
                    *cell.borrow_mut() = Object::Reference(referent);
                }
                return Ok(cell);
            }

            tag::REFP => {
                let target = self.read_varint()?;
                let entry = self
                    .memo
                    .get(&target)
                    .ok_or(Error::InvalidBackReference)?;
                let cell = if entry.ref_like {
                    entry.cell.clone()
                } else {
                    Object::Reference(entry.cell.clone()).into_ref()
                };
                self.record(offset, &cell, true);
                return Ok(cell);
            }

            tag::ALIAS => {
                let target = self.read_varint()?;
                let entry = self
                    .memo
                    .get(&target)
                    .ok_or(Error::InvalidBackReference)?;
                let cell = entry.cell.clone();
                let ref_like = entry.ref_like;
                self.record(offset, &cell, ref_like);
                return Ok(cell);
            }

            tag::COPY => {
                let copied = self.read_copy(offset)?;
                let cell = copied.into_ref();
                self.record(offset, &cell, false);
                return Ok(cell);
            }

            tag::ARRAY | tag::HASH => {
                // A bare container, as emitted when the encoder leaves
                // referencing to the host graph.
                self.source.set_pos(self.source.pos() - 1);
                let cell = Object::Undefined.into_ref();
                self.read_container_into(&cell)?;
                return Ok(cell);
            }

            tag::WEAKEN => {
                let inner = self.read_item()?;
                let referent = match &*inner.borrow() {
                    Object::Reference(target) => Some(target.clone()),
                    _ => None,
                };
                let cell = Object::WeakReference(referent.unwrap_or(inner)).into_ref();
                self.record(offset, &cell, true);
                return Ok(cell);
            }

            tag::OBJECT | tag::OBJECTV => {
                if self.config.refuse_objects {
                    return Err(Error::InvalidTag(byte));
                }
                let cell = Object::Undefined.into_ref();
                self.record(offset, &cell, true);
                let class = if opcode == tag::OBJECT {
                    self.read_classname()?
                } else {
                    let target = self.read_varint()?;
                    self.classnames
                        .get(&target)
                        .cloned()
                        .ok_or(Error::InvalidBackReference)?
                };
                let value = self.read_item()?;
                if self.config.no_bless_objects {
                    let unblessed = value.borrow().clone();
                    *cell.borrow_mut() = unblessed;
                } else {
                    *cell.borrow_mut() = Object::Blessed { class, value };
                }
                return Ok(cell);
            }

            tag::REGEXP => {
                let pattern = self.read_text_item()?;
                let flags = self.read_text_item()?;
                Object::Regex { pattern, flags }
            }

            opcode if opcode >= tag::SHORT_BINARY_LOW => {
                let length = (opcode - tag::SHORT_BINARY_LOW) as usize;
                self.check_string_length(length)?;
                Object::Bytes(self.source.take(length)?.to_vec())
            }

            opcode if opcode >= tag::ARRAYREF_LOW => {
                self.source.set_pos(self.source.pos() - 1);
                let cell = Object::Undefined.into_ref();
                self.read_container_into(&cell)?;
                return Ok(cell);
            }

            _ => return Err(Error::InvalidTag(byte)),
        };

        let cell = object.into_ref();
        self.record(offset, &cell, false);
        Ok(cell)
    }

    fn read_string_payload_length(&mut self) -> Result<usize> {
        let length = usize::try_from(self.read_varint()?).map_err(|_| Error::OutOfRange)?;
        self.check_string_length(length)?;
        Ok(length)
    }

    /// Reads a container tag and populates `cell` in place. The cell is
    /// registered at the container's own offset before any element is
    /// read, so cycles resolve to it.
    fn read_container_into(&mut self, cell: &ObjectRef) -> Result<()> {
        let (offset, byte) = self.next_tag()?;
        let opcode = strip_track_bit(byte);
        self.record(offset, cell, true);
        match opcode {
            tag::ARRAY => {
                let count = self.read_varint()?;
                self.fill_array(cell, count)
            }
            tag::HASH => {
                let count = self.read_varint()?;
                self.fill_hash(cell, count)
            }
            opcode
                if opcode >= tag::HASHREF_LOW && opcode < tag::HASHREF_LOW + 16 =>
            {
                self.fill_hash(cell, (opcode - tag::HASHREF_LOW) as u64)
            }
            opcode
                if opcode >= tag::ARRAYREF_LOW && opcode < tag::ARRAYREF_LOW + 16 =>
            {
                self.fill_array(cell, (opcode - tag::ARRAYREF_LOW) as u64)
            }
            _ => Err(Error::InvalidTag(byte)),
        }
    }

    fn fill_array(&mut self, cell: &ObjectRef, count: u64) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::OutOfRange)?;
        let limit = self.config.max_array_entries;
        if limit != 0 && count > limit {
            return Err(Error::EntryLimit);
        }
        let mut items = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            items.push(self.read_item()?);
        }
        *cell.borrow_mut() = Object::Array(items);
        Ok(())
    }

    fn fill_hash(&mut self, cell: &ObjectRef, count: u64) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::OutOfRange)?;
        let limit = self.config.max_map_entries;
        if limit != 0 && count > limit {
            return Err(Error::EntryLimit);
        }
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_key()?;
            let value = self.read_item()?;
            entries.insert(key, value);
        }
        *cell.borrow_mut() = Object::Hash(entries);
        Ok(())
    }

    /// Reads a hash key: a string item of any form, COPY included.
    fn read_key(&mut self) -> Result<Vec<u8>> {
        let (offset, byte) = self.next_tag()?;
        let opcode = strip_track_bit(byte);
        let key = match opcode {
            tag::COPY => match self.read_copy(offset)? {
                Object::Bytes(bytes) => bytes,
                Object::String(text) => text.into_bytes(),
                _ => return Err(Error::InvalidBackReference),
            },
            tag::BINARY => {
                let length = self.read_string_payload_length()?;
                self.source.take(length)?.to_vec()
            }
            tag::STR_UTF8 => {
                let length = self.read_string_payload_length()?;
                let bytes = self.source.take(length)?.to_vec();
                String::from_utf8(bytes)
                    .map_err(|_| Error::InvalidUtf8)?
                    .into_bytes()
            }
            opcode if opcode >= tag::SHORT_BINARY_LOW => {
                let length = (opcode - tag::SHORT_BINARY_LOW) as usize;
                self.check_string_length(length)?;
                self.source.take(length)?.to_vec()
            }
            _ => return Err(Error::InvalidTag(byte)),
        };
        let cell = Object::Bytes(key.clone()).into_ref();
        self.record(offset, &cell, false);
        Ok(key)
    }

    /// Reads the class-name item of an OBJECT, registering its offset for
    /// later OBJECTV back references.
    fn read_classname(&mut self) -> Result<String> {
        let (offset, byte) = self.next_tag()?;
        let opcode = strip_track_bit(byte);
        let name = match opcode {
            tag::COPY => match self.read_copy(offset)? {
                Object::Bytes(bytes) => {
                    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
                }
                Object::String(text) => text,
                _ => return Err(Error::InvalidBackReference),
            },
            tag::BINARY => {
                let length = self.read_string_payload_length()?;
                let bytes = self.source.take(length)?.to_vec();
                String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
            }
            tag::STR_UTF8 => {
                let length = self.read_string_payload_length()?;
                let bytes = self.source.take(length)?.to_vec();
                String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
            }
            opcode if opcode >= tag::SHORT_BINARY_LOW => {
                let length = (opcode - tag::SHORT_BINARY_LOW) as usize;
                self.check_string_length(length)?;
                let bytes = self.source.take(length)?.to_vec();
                String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
            }
            _ => return Err(Error::InvalidTag(byte)),
        };
        self.classnames.insert(offset, name.clone());
        let cell = Object::Bytes(name.clone().into_bytes()).into_ref();
        self.record(offset, &cell, false);
        Ok(name)
    }

    /// Reads a string item into text, for regex patterns and flags.
    fn read_text_item(&mut self) -> Result<String> {
        let (offset, byte) = self.next_tag()?;
        let opcode = strip_track_bit(byte);
        let text = match opcode {
            tag::COPY => match self.read_copy(offset)? {
                Object::Bytes(bytes) => {
                    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
                }
                Object::String(text) => text,
                _ => return Err(Error::InvalidBackReference),
            },
            tag::BINARY | tag::STR_UTF8 => {
                let length = self.read_string_payload_length()?;
                let bytes = self.source.take(length)?.to_vec();
                String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
            }
            opcode if opcode >= tag::SHORT_BINARY_LOW => {
                let length = (opcode - tag::SHORT_BINARY_LOW) as usize;
                self.check_string_length(length)?;
                let bytes = self.source.take(length)?.to_vec();
                String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?
            }
            _ => return Err(Error::InvalidTag(byte)),
        };
        let cell = Object::Bytes(text.clone().into_bytes()).into_ref();
        self.record(offset, &cell, false);
        Ok(text)
    }

    /// Resolves a COPY: decodes the single string item at the target
    /// offset in a fresh, non-tracking sub-context. Exactly one hop is
    /// followed; a COPY inside a COPY target is invalid.
    fn read_copy(&mut self, copy_offset: u64) -> Result<Object> {
        if self.in_copy {
            return Err(Error::InvalidBackReference);
        }
        let target_offset = self.read_varint()?;
        let target = self.absolute(target_offset)?;
        let copy_at = self.absolute(copy_offset)?;
        if target >= copy_at {
            return Err(Error::InvalidBackReference);
        }
        let saved = self.source.pos();
        self.source.set_pos(target);
        self.in_copy = true;
        let result = match self.source.peek(1) {
            Ok(window) if is_string_tag(window[0]) => self.read_string_object(),
            Ok(_) => Err(Error::InvalidBackReference),
            Err(error) => Err(error),
        };
        self.in_copy = false;
        self.source.set_pos(saved);
        result
    }

    /// Reads one string-family item at the current position.
    fn read_string_object(&mut self) -> Result<Object> {
        let (_, byte) = self.next_tag()?;
        let opcode = strip_track_bit(byte);
        match opcode {
            tag::BINARY => {
                let length = self.read_string_payload_length()?;
                Ok(Object::Bytes(self.source.take(length)?.to_vec()))
            }
            tag::STR_UTF8 => {
                let length = self.read_string_payload_length()?;
                let bytes = self.source.take(length)?.to_vec();
                Ok(Object::String(
                    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?,
                ))
            }
            opcode if opcode >= tag::SHORT_BINARY_LOW => {
                let length = (opcode - tag::SHORT_BINARY_LOW) as usize;
                self.check_string_length(length)?;
                Ok(Object::Bytes(self.source.take(length)?.to_vec()))
            }
            _ => Err(Error::InvalidBackReference),
        }
    }
}
