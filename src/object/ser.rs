//
// Copyright 2026 sereal Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use serde::ser::{self, Serialize};

use ordered_float::OrderedFloat;

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};

/// Serialization of any serde-compatible value into the object model.
/// Rust data has no sharing the serde data model can express, so the
/// resulting graph is always a tree; enums map the way self-describing
/// formats conventionally map them, with the variant name as a one-entry
/// hash key.
pub(crate) fn serialize_to_object<T>(value: &T) -> Result<ObjectRef>
where
    T: Serialize + ?Sized,
{
    value.serialize(ObjectSerializer)
}

/// Stringifies a map key the way the wire does: hash keys are byte
/// strings.
fn key_bytes<T>(key: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let object = serialize_to_object(key)?;
    let object = object.borrow();
    match &*object {
        Object::String(text) => Ok(text.clone().into_bytes()),
        Object::Bytes(bytes) => Ok(bytes.clone()),
        Object::Integer(value) => Ok(value.to_string().into_bytes()),
        Object::UnsignedInteger(value) => Ok(value.to_string().into_bytes()),
        Object::Boolean(value) => Ok(value.to_string().into_bytes()),
        _ => Err(Error::Message(String::from(
            "map key cannot be stringified",
        ))),
    }
}

struct ObjectSerializer;

impl ser::Serializer for ObjectSerializer {
    type Ok = ObjectRef;
    type Error = Error;

    type SerializeSeq = ArraySerializer;
    type SerializeTuple = ArraySerializer;
    type SerializeTupleStruct = ArraySerializer;
    type SerializeTupleVariant = VariantArraySerializer;
    type SerializeMap = HashSerializer;
    type SerializeStruct = HashSerializer;
    type SerializeStructVariant = VariantHashSerializer;

    fn serialize_bool(self, value: bool) -> Result<ObjectRef> {
        Ok(Object::Boolean(value).into_ref())
    }

    fn serialize_i8(self, value: i8) -> Result<ObjectRef> {
        self.serialize_i64(value as i64)
    }

    fn serialize_i16(self, value: i16) -> Result<ObjectRef> {
        self.serialize_i64(value as i64)
    }

    fn serialize_i32(self, value: i32) -> Result<ObjectRef> {
        self.serialize_i64(value as i64)
    }

    fn serialize_i64(self, value: i64) -> Result<ObjectRef> {
        Ok(Object::Integer(value).into_ref())
    }

    fn serialize_u8(self, value: u8) -> Result<ObjectRef> {
        self.serialize_u64(value as u64)
    }

    fn serialize_u16(self, value: u16) -> Result<ObjectRef> {
        self.serialize_u64(value as u64)
    }

    fn serialize_u32(self, value: u32) -> Result<ObjectRef> {
        self.serialize_u64(value as u64)
    }

    fn serialize_u64(self, value: u64) -> Result<ObjectRef> {
        if value <= i64::MAX as u64 {
            Ok(Object::Integer(value as i64).into_ref())
        } else {
            Ok(Object::UnsignedInteger(value).into_ref())
        }
    }

    fn serialize_f32(self, value: f32) -> Result<ObjectRef> {
        Ok(Object::Float(OrderedFloat(value)).into_ref())
    }

    fn serialize_f64(self, value: f64) -> Result<ObjectRef> {
        Ok(Object::Double(OrderedFloat(value)).into_ref())
    }

    fn serialize_char(self, value: char) -> Result<ObjectRef> {
        Ok(Object::String(value.to_string()).into_ref())
    }

    fn serialize_str(self, value: &str) -> Result<ObjectRef> {
        Ok(Object::String(value.to_string()).into_ref())
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<ObjectRef> {
        Ok(Object::Bytes(value.to_vec()).into_ref())
    }

    fn serialize_none(self) -> Result<ObjectRef> {
        Ok(Object::Undefined.into_ref())
    }

    fn serialize_some<T>(self, value: &T) -> Result<ObjectRef>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<ObjectRef> {
        Ok(Object::Undefined.into_ref())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<ObjectRef> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<ObjectRef> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<ObjectRef>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<ObjectRef>
    where
        T: Serialize + ?Sized,
    {
        let mut entries = BTreeMap::new();
        entries.insert(variant.as_bytes().to_vec(), serialize_to_object(value)?);
        Ok(Object::Hash(entries).into_ref())
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<ArraySerializer> {
        Ok(ArraySerializer {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<ArraySerializer> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<ArraySerializer> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantArraySerializer> {
        Ok(VariantArraySerializer {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<HashSerializer> {
        Ok(HashSerializer {
            entries: BTreeMap::new(),
            next_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<HashSerializer> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantHashSerializer> {
        Ok(VariantHashSerializer {
            variant,
            entries: BTreeMap::new(),
        })
    }
}

pub(crate) struct ArraySerializer {
    items: Vec<ObjectRef>,
}

impl ser::SerializeSeq for ArraySerializer {
    type Ok = ObjectRef;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.items.push(serialize_to_object(value)?);
        Ok(())
    }

    fn end(self) -> Result<ObjectRef> {
        Ok(Object::Array(self.items).into_ref())
    }
}

impl ser::SerializeTuple for ArraySerializer {
    type Ok = ObjectRef;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<ObjectRef> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for ArraySerializer {
    type Ok = ObjectRef;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<ObjectRef> {
        ser::SerializeSeq::end(self)
    }
}

pub(crate) struct VariantArraySerializer {
    variant: &'static str,
    items: Vec<ObjectRef>,
}

impl ser::SerializeTupleVariant for VariantArraySerializer {
    type Ok = ObjectRef;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.items.push(serialize_to_object(value)?);
        Ok(())
    }

    fn end(self) -> Result<ObjectRef> {
        let mut entries = BTreeMap::new();
        entries.insert(
            self.variant.as_bytes().to_vec(),
            Object::Array(self.items).into_ref(),
        );
        Ok(Object::Hash(entries).into_ref())
    }
}

pub(crate) struct HashSerializer {
    entries: BTreeMap<Vec<u8>, ObjectRef>,
    next_key: Option<Vec<u8>>,
}

impl ser::SerializeMap for HashSerializer {
    type Ok = ObjectRef;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.next_key = Some(key_bytes(key)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self.next_key.take().ok_or(Error::InternalError)?;
        self.entries.insert(key, serialize_to_object(value)?);
        Ok(())
    }

    fn end(self) -> Result<ObjectRef> {
        Ok(Object::Hash(self.entries).into_ref())
    }
}

impl ser::SerializeStruct for HashSerializer {
    type Ok = ObjectRef;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.entries
            .insert(key.as_bytes().to_vec(), serialize_to_object(value)?);
        Ok(())
    }

    fn end(self) -> Result<ObjectRef> {
        Ok(Object::Hash(self.entries).into_ref())
    }
}

pub(crate) struct VariantHashSerializer {
    variant: &'static str,
    entries: BTreeMap<Vec<u8>, ObjectRef>,
}

impl ser::SerializeStructVariant for VariantHashSerializer {
    type Ok = ObjectRef;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.entries
            .insert(key.as_bytes().to_vec(), serialize_to_object(value)?);
        Ok(())
    }

    fn end(self) -> Result<ObjectRef> {
        let mut outer = BTreeMap::new();
        outer.insert(
            self.variant.as_bytes().to_vec(),
            Object::Hash(self.entries).into_ref(),
        );
        Ok(Object::Hash(outer).into_ref())
    }
}
