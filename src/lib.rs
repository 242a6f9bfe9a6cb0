//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

mod de;
mod error;
mod ser;

pub mod document;
pub mod object;
pub use object::{Object, ObjectRef};

pub use de::{Decoder, DecoderConfig, Document};
pub use error::{Error, Result};
pub use ser::{Compression, Encoder, EncoderConfig};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Support for deserializing any supported type from a Sereal document.
pub fn from_slice<T>(input: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    let document = Decoder::new().decode(input)?;
    object::deserialize_from_object(&document.body)
}

/// Support for serializing any supported type into a Sereal document.
pub fn to_vec<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let object = object::serialize_to_object(value)?;
    let mut encoder = Encoder::new();
    encoder.encode(&object).map(Vec::from)
}
