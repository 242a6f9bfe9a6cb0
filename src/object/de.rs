//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use serde::de::{
    self,
    DeserializeOwned,
    DeserializeSeed,
    IntoDeserializer,
    MapAccess,
    SeqAccess,
};

use std::collections::BTreeSet;
use std::rc::Rc;
use std::vec;

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};

/// Deserialization of a decoded object graph into any serde-compatible
/// type. References, weak references, aliases and blessings are followed
/// transparently; the serde data model cannot express sharing, so a graph
/// that reaches the same container from within itself is rejected rather
/// than unrolled forever.
pub(crate) fn deserialize_from_object<T>(cell: &ObjectRef) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut deserializer = ObjectDeserializer::new(cell.clone());
    T::deserialize(&mut deserializer)
}

#[derive(Debug)]
pub(crate) struct ObjectDeserializer {
    /// The cell to deserialize next.
    next_object: ObjectRef,
    /// Ordered set of the cells being unrolled, to detect cycles.
    collection_stack: BTreeSet<usize>,
}

impl ObjectDeserializer {
    fn new(next_object: ObjectRef) -> Self {
        ObjectDeserializer {
            next_object,
            collection_stack: BTreeSet::new(),
        }
    }

    fn set_next_object(&mut self, cell: ObjectRef) {
        self.next_object = cell;
    }

    /// Pushes a cell onto the collection stack to ensure no cycles occur.
    #[must_use = "the result must be checked to avoid unrolling a cycle"]
    fn enter_collection(&mut self, id: usize) -> Result<()> {
        if self.collection_stack.insert(id) {
            Ok(())
        } else {
            Err(Error::RecursionLimit)
        }
    }

    fn exit_collection(&mut self, id: usize) {
        self.collection_stack.remove(&id);
    }
}

impl<'de, 'b> de::Deserializer<'de> for &'b mut ObjectDeserializer {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: de::Visitor<'de>,
    {
        let id = Rc::as_ptr(&self.next_object) as usize;
        let object = self.next_object.borrow().clone();

        match object {
            Object::Undefined | Object::CanonicalUndefined =>
                visitor.visit_unit(),
            Object::Boolean(value) =>
                visitor.visit_bool(value),
            Object::Integer(value) =>
                visitor.visit_i64(value),
            Object::UnsignedInteger(value) =>
                visitor.visit_u64(value),
            Object::Float(value) =>
                visitor.visit_f32(value.0),
            Object::Double(value) =>
                visitor.visit_f64(value.0),
            Object::LongDouble(bits) =>
                visitor.visit_bytes(&bits),
            Object::Bytes(bytes) =>
                visitor.visit_byte_buf(bytes),
            Object::String(text) =>
                visitor.visit_string(text),

            // A regex deserializes as its pattern text.
            Object::Regex { pattern, .. } =>
                visitor.visit_string(pattern),

            // Reference kinds and blessings are transparent.
            Object::Reference(target)
            | Object::WeakReference(target)
            | Object::Alias(target)
            | Object::Blessed { value: target, .. } => {
                self.enter_collection(id)?;
                self.set_next_object(target);
                let result = de::Deserializer::deserialize_any(&mut *self, visitor);
                self.exit_collection(id);
                result
            }

            Object::Array(items) => {
                self.enter_collection(id)?;
                let sequence = ArraySequence::new(&mut *self, items);
                let result = visitor.visit_seq(sequence);
                self.exit_collection(id);
                result
            }

            Object::Hash(entries) => {
                self.enter_collection(id)?;
                let pairs = entries.into_iter().collect::<Vec<_>>();
                let map = HashSequence::new(&mut *self, pairs);
                let result = visitor.visit_map(map);
                self.exit_collection(id);
                result
            }
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: de::Visitor<'de>,
    {
        let is_undef = match &*self.next_object.borrow() {
            Object::Undefined | Object::CanonicalUndefined => true,
            _ => false,
        };
        if is_undef {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: de::Visitor<'de>,
    {
        let object = self.next_object.borrow().clone();
        match object {
            Object::String(text) =>
                visitor.visit_enum(text.into_deserializer()),
            Object::Bytes(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?;
                visitor.visit_enum(text.into_deserializer())
            }
            Object::Hash(entries) if entries.len() == 1 => {
                let pairs = entries.into_iter().collect::<Vec<_>>();
                let map = HashSequence::new(self, pairs);
                visitor.visit_enum(de::value::MapAccessDeserializer::new(map))
            }
            Object::Reference(target)
            | Object::Alias(target)
            | Object::Blessed { value: target, .. } => {
                self.set_next_object(target);
                de::Deserializer::deserialize_enum(self, name, variants, visitor)
            }
            _ => Err(Error::Message(format!(
                "cannot deserialize enum `{}` from this object",
                name
            ))),
        }
    }

    serde::forward_to_deserialize_any! {
        bool
        u8 u16 u32 u64 u128
        i8 i16 i32 i64 i128
        f32 f64
        char str string
        seq map
        bytes byte_buf
        struct
        unit unit_struct
        tuple tuple_struct
        newtype_struct
        ignored_any
        identifier
    }
}

/// Access object to process the elements in an Array.
struct ArraySequence<'a> {
    de: &'a mut ObjectDeserializer,
    items: vec::IntoIter<ObjectRef>,
}

impl<'a> ArraySequence<'a> {
    fn new(de: &'a mut ObjectDeserializer, items: Vec<ObjectRef>) -> Self {
        ArraySequence {
            de,
            items: items.into_iter(),
        }
    }
}

impl<'de, 'a> SeqAccess<'de> for ArraySequence<'a> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        if let Some(item) = self.items.next() {
            self.de.set_next_object(item);
            seed.deserialize(&mut *self.de).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Access object to process the entries in a Hash.
struct HashSequence<'a> {
    de: &'a mut ObjectDeserializer,
    pairs: vec::IntoIter<(Vec<u8>, ObjectRef)>,
    current_value: Option<ObjectRef>,
}

impl<'a> HashSequence<'a> {
    fn new(de: &'a mut ObjectDeserializer, pairs: Vec<(Vec<u8>, ObjectRef)>) -> Self {
        HashSequence {
            de,
            pairs: pairs.into_iter(),
            current_value: None,
        }
    }
}

impl<'de, 'a> MapAccess<'de> for HashSequence<'a> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        if let Some((key, value)) = self.pairs.next() {
            self.current_value = Some(value);
            let key = String::from_utf8(key).map_err(|_| Error::InvalidUtf8)?;
            seed.deserialize(key.into_deserializer()).map(Some)
        } else {
            Ok(None)
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        let value = self.current_value.take().ok_or(Error::InternalError)?;
        self.de.set_next_object(value);
        seed.deserialize(&mut *self.de)
    }
}
