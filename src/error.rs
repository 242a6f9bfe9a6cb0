//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use std;
use std::fmt::{self, Display};

use serde::{de, ser};

pub type Result<T> = std::result::Result<T, Error>;

/// Sereal serialization and deserialization error.
///
/// All errors are surfaced to the caller; none are recovered internally.
/// After an error, an encoder or decoder instance must be reset before it
/// is reused; the encoder does not expose a partially written document
/// through its data accessors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Constructed from serialization and deserialization errors.
    Message(String),
    /// The input ended before the current item was complete.
    Truncated,
    /// The document does not start with one of the two Sereal magic numbers,
    /// or the magic number does not match the protocol version.
    BadMagic,
    /// The protocol version is zero or above the highest supported version.
    BadVersion,
    /// The body encoding is unknown, refused by configuration, or not valid
    /// for the protocol version.
    BadEncoding,
    /// Encountered a tag byte with no meaning at its position.
    InvalidTag(u8),
    /// A REFP, ALIAS, OBJECTV or COPY offset does not point at a prior item
    /// of the required kind.
    InvalidBackReference,
    /// A STR_UTF8 payload is not valid UTF-8.
    InvalidUtf8,
    /// A varint ran past ten continuation bytes or past 64 value bits.
    OverflowError,
    /// A numeric value cannot be represented in the target range.
    OutOfRange,
    /// The configured maximum recursion depth was exceeded.
    RecursionLimit,
    /// The configured maximum number of array or map entries was exceeded.
    EntryLimit,
    /// The configured maximum string length was exceeded.
    LengthLimit,
    /// A compressor or decompressor reported failure.
    CompressionError(String),
    /// An I/O error occurred while refilling from the byte source.
    IoError(String),
    /// An internal invariant was violated.
    InternalError,
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Message(msg) =>
                formatter.write_str(msg),
            Error::Truncated =>
                formatter.write_str("unexpected end of input"),
            Error::BadMagic =>
                formatter.write_str("missing or invalid Sereal magic number"),
            Error::BadVersion =>
                formatter.write_str("unsupported Sereal protocol version"),
            Error::BadEncoding =>
                formatter.write_str("unknown or refused body encoding"),
            Error::InvalidTag(byte) =>
                write!(formatter, "invalid tag byte 0x{:02X}", byte),
            Error::InvalidBackReference =>
                formatter.write_str("back reference to an invalid body offset"),
            Error::InvalidUtf8 =>
                formatter.write_str("string payload is not valid UTF-8"),
            Error::OverflowError =>
                formatter.write_str("varint exceeds 64 bits"),
            Error::OutOfRange =>
                formatter.write_str("value out of representable range"),
            Error::RecursionLimit =>
                formatter.write_str("maximum recursion depth exceeded"),
            Error::EntryLimit =>
                formatter.write_str("maximum number of container entries exceeded"),
            Error::LengthLimit =>
                formatter.write_str("maximum string length exceeded"),
            Error::CompressionError(msg) =>
                write!(formatter, "compression failure: {}", msg),
            Error::IoError(msg) =>
                write!(formatter, "i/o failure: {}", msg),
            Error::InternalError =>
                formatter.write_str("internal invariant violated"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IoError(error.to_string())
    }
}

impl std::error::Error for Error {}
