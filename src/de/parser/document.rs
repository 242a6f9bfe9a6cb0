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
    branch::alt,
    bytes::complete::tag,
    combinator::map,
    number::complete::be_u8,
    sequence::tuple,
};

use crate::document::{unpack_version_encoding, MAGIC_V1, MAGIC_V3};

/// The fixed preamble of a Sereal document: the magic number and the
/// version/encoding byte.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub struct Preamble {
    /// Whether the document carries the version-3 magic number.
    pub v3_magic: bool,
    /// The protocol version from the low nibble.
    pub version: u8,
    /// The body encoding from the high nibble.
    pub encoding: u8,
}

/// Parses one of the two accepted magic numbers, yielding `true` for the
/// version-3 form.
pub fn magic(input: &[u8]) -> IResult<&[u8], bool> {
    alt((
        map(tag(MAGIC_V1), |_| false),
        map(tag(MAGIC_V3), |_| true),
    ))(input)
}

/// Parses the fixed five-byte document preamble.
pub fn preamble(input: &[u8]) -> IResult<&[u8], Preamble> {
    map(
        tuple((
            magic,
            be_u8,
        )), |(
            v3_magic,
            version_encoding,
        )| {
            let (version, encoding) = unpack_version_encoding(version_encoding);
            Preamble {
                v3_magic,
                version,
                encoding,
            }
        }
    )(input)
}
