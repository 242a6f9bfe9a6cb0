//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The Sereal object model.
//!
//! The Sereal format serializes the value graph of a dynamic language.
//! This module models that graph with shared, mutable cells: an
//! [`ObjectRef`] is an `Rc<RefCell<Object>>`, and sharing a value between
//! two slots is expressed by the same cell appearing in both. The encoder
//! keys its back-reference indices on cell identity (`Rc::as_ptr`), so a
//! shared cell is emitted once and referenced thereafter, and a cell that
//! contains itself round-trips as a cycle.
//!
//! The supported object kinds are:
//!
//! 1. Undefined, in plain and canonical form.
//! 2. Boolean.
//! 3. Integers, signed and unsigned, up to 64 bits.
//! 4. Floating point values: single, double and 128-bit extended precision.
//! 5. Byte strings and Unicode strings.
//! 6. Arrays.
//! 7. Hashes, keyed by byte string.
//! 8. References, weak references and aliases.
//! 9. Regular expressions.
//! 10. Blessed objects.
//!
//! # References
//!
//! 1. https://github.com/Sereal/Sereal/blob/master/sereal_spec.pod

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use ordered_float::OrderedFloat;

/// A shared handle to an object in a value graph.
///
/// Cloning the handle shares the cell; the encoder treats two clones of one
/// handle as the same value and emits a back reference for the second.
pub type ObjectRef = Rc<RefCell<Object>>;

/// Represents any value expressible in a Sereal body.
///
/// See the `sereal::object` module documentation for the sharing model.
///
/// # Notes
///
/// 1. Equality is structural and does not terminate on cyclic graphs;
///    compare cyclic values by cell identity (`Rc::ptr_eq`) instead.
/// 2. Float payloads use `OrderedFloat` so values containing NaN still
///    compare equal after a round trip.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    /// The undefined value, like Perl's `undef`.
    Undefined,

    /// The interpreter-global undefined value, distinguished from a plain
    /// undefined slot by protocol version 3 and later.
    CanonicalUndefined,

    /// A boolean value.
    Boolean(bool),

    /// A signed integral value of up to 64 bits.
    Integer(i64),

    /// An unsigned integral value of up to 64 bits. Values at or below
    /// `i64::MAX` are interchangeable with `Integer` on the wire.
    UnsignedInteger(u64),

    /// A single-precision 32-bit floating point value.
    Float(OrderedFloat<f32>),

    /// A double-precision 64-bit floating point value.
    Double(OrderedFloat<f64>),

    /// A 128-bit extended-precision floating point value, carried as its
    /// little-endian IEEE-754 binary128 bit pattern.
    LongDouble([u8; 16]),

    /// An opaque byte string, like a Perl string without the UTF-8 flag.
    Bytes(Vec<u8>),

    /// A Unicode string, transported as UTF-8.
    String(String),

    /// An ordered sequence of values, like a Perl `AV` behind a reference.
    Array(Vec<ObjectRef>),

    /// A mapping with byte-string keys, like a Perl `HV` behind a
    /// reference. Backed by a `BTreeMap`, so iteration order is defined
    /// and encoding a hash twice produces identical bytes.
    Hash(BTreeMap<Vec<u8>, ObjectRef>),

    /// An explicit reference to another value, like `\$x`.
    Reference(ObjectRef),

    /// A weak reference to another value. The handle is strong on the host
    /// side; only the wire representation is marked weak.
    WeakReference(ObjectRef),

    /// An aliased slot sharing another value in place, rather than through
    /// a reference.
    Alias(ObjectRef),

    /// A regular expression as a pattern and a set of flags drawn from
    /// `m`, `s`, `i` and `x`.
    Regex {
        pattern: String,
        flags: String,
    },

    /// A value blessed into a class.
    Blessed {
        class: String,
        value: ObjectRef,
    },
}

impl Object {
    /// Wraps the object in a fresh shared cell.
    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    /// Returns `true` for the container kinds that the encoder implicitly
    /// places behind a REFN.
    pub(crate) fn is_container(&self) -> bool {
        match self {
            Object::Array(_) | Object::Hash(_) => true,
            _ => false,
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::Undefined
    }
}

mod de;
mod ser;

pub(crate) use de::deserialize_from_object;
pub(crate) use ser::serialize_to_object;
