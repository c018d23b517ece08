// Copyright 2014-2015 Galen Clark Haynes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Rust XML-RPC library

//! The XML-RPC value model and its conversions to and from native Rust types.
//!
//! Native values enter through [`ToValue`], which checks the 32-bit integer
//! range, rejects non-finite doubles and bounds nesting so that cyclic
//! `Rc`/`Arc` graphs fail instead of recursing forever. Values leave through
//! `serde`: `Value` implements `Serialize`, and [`from_value`] decodes a
//! `Value` into any `DeserializeOwned` type.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::ops::Index;
use std::rc::Rc;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::encoding::Encoder;
use crate::error::ValueError;

/// Maximum number of nested arrays/structs accepted in either direction.
pub const MAX_NESTING: usize = 128;

/// Represents an XML-RPC data value
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Int(i32),
    Bool(bool),
    /// Must be finite; `ToValue` enforces this for native doubles.
    Double(f64),
    String(String),
    DateTime(DateTime),
    Base64(Vec<u8>),
    Array(Array),
    Struct(Struct),
    /// The `<nil/>` extension.
    Nil,
}

pub type Array = Vec<Value>;
pub type Struct = BTreeMap<String, Value>;

lazy_static! {
    static ref ISO8601: Regex = Regex::new(
        r"^\d{4}-?\d{2}-?\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?$"
    )
    .expect("dateTime pattern is valid");
}

/// A `dateTime.iso8601` timestamp, kept exactly as written.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DateTime(String);

impl DateTime {
    pub fn parse(s: &str) -> Result<DateTime, ValueError> {
        let s = s.trim();
        if ISO8601.is_match(s) {
            Ok(DateTime(s.to_string()))
        } else {
            Err(ValueError::InvalidDateTime(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NIL: Value = Value::Nil;

impl Value {
    pub fn base64(bytes: impl Into<Vec<u8>>) -> Value {
        Value::Base64(bytes.into())
    }

    /// If the value is a Struct, returns the member stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Struct(map) => map.get(key),
            _ => None,
        }
    }

    /// Follows `keys` through nested structs.
    pub fn find_path(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().try_fold(self, |target, key| target.get(key))
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Ints widen losslessly to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(n) => Some(f64::from(n)),
            Value::Double(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<&DateTime> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Base64(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Value::Struct(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Checks that the value can be written to the wire and read back:
    /// strings and member names hold only XML characters, doubles are
    /// finite and nesting stays within `MAX_NESTING`.
    pub fn validate(&self) -> Result<(), ValueError> {
        self.validate_nested(0)
    }

    fn validate_nested(&self, depth: usize) -> Result<(), ValueError> {
        match self {
            Value::Double(n) => check_finite(*n),
            Value::String(s) => check_text(s),
            Value::Array(values) => {
                let depth = enter(depth)?;
                values.iter().try_for_each(|v| v.validate_nested(depth))
            }
            Value::Struct(members) => {
                let depth = enter(depth)?;
                members.iter().try_for_each(|(name, v)| {
                    check_text(name)?;
                    v.validate_nested(depth)
                })
            }
            _ => Ok(()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Nil => "nil",
        }
    }
}

impl<'a> Index<&'a str> for Value {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.get(key).unwrap_or(&NIL)
    }
}

impl Index<usize> for Value {
    type Output = Value;

    fn index(&self, idx: usize) -> &Value {
        self.as_array().and_then(|a| a.get(idx)).unwrap_or(&NIL)
    }
}

impl fmt::Display for Value {
    /// Renders the `<value>` fragment.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Encoder::new(f).emit_value(self)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s)
    }
}

impl From<DateTime> for Value {
    fn from(dt: DateTime) -> Value {
        Value::DateTime(dt)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Value {
        Value::Array(a)
    }
}

impl From<Struct> for Value {
    fn from(m: Struct) -> Value {
        Value::Struct(m)
    }
}

/// A trait for converting native values to XML-RPC values.
pub trait ToValue {
    fn to_value(&self) -> Result<Value, ValueError> {
        self.to_value_nested(0)
    }

    /// Converts `self` found `depth` containers below the root.
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError>;
}

/// Characters allowed in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

pub(crate) fn check_text(s: &str) -> Result<(), ValueError> {
    match s.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(ValueError::InvalidChar(c)),
        None => Ok(()),
    }
}

fn check_finite(n: f64) -> Result<(), ValueError> {
    if n.is_finite() {
        Ok(())
    } else {
        Err(ValueError::UnsupportedType(format!("non-finite double {}", n)))
    }
}

fn enter(depth: usize) -> Result<usize, ValueError> {
    if depth >= MAX_NESTING {
        return Err(ValueError::UnsupportedType(format!(
            "nesting deeper than {} levels (cyclic structure?)",
            MAX_NESTING
        )));
    }
    Ok(depth + 1)
}

macro_rules! to_value_impl_small_int {
    ($($t:ty),+) => (
        $(impl ToValue for $t {
            fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
                Ok(Value::Int(i32::from(*self)))
            }
        })+
    )
}

macro_rules! to_value_impl_wide_int {
    ($($t:ty),+) => (
        $(impl ToValue for $t {
            fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
                i32::try_from(*self)
                    .map(Value::Int)
                    .map_err(|_| ValueError::OutOfRange(*self as i128))
            }
        })+
    )
}

to_value_impl_small_int! { i8, i16, i32, u8, u16 }
to_value_impl_wide_int! { i64, isize, u32, u64, usize, i128 }

impl ToValue for u128 {
    fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
        i32::try_from(*self)
            .map(Value::Int)
            .map_err(|_| ValueError::OutOfRange(i128::try_from(*self).unwrap_or(i128::MAX)))
    }
}

impl ToValue for f64 {
    fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
        check_finite(*self)?;
        Ok(Value::Double(*self))
    }
}

impl ToValue for f32 {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        f64::from(*self).to_value_nested(depth)
    }
}

impl ToValue for bool {
    fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
        Ok(Value::Bool(*self))
    }
}

impl ToValue for char {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        self.to_string().to_value_nested(depth)
    }
}

impl ToValue for str {
    fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
        check_text(self)?;
        Ok(Value::String(self.to_string()))
    }
}

impl ToValue for String {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        self.as_str().to_value_nested(depth)
    }
}

impl ToValue for DateTime {
    fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
        Ok(Value::DateTime(self.clone()))
    }
}

impl ToValue for Value {
    fn to_value_nested(&self, _: usize) -> Result<Value, ValueError> {
        Ok(self.clone())
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        (**self).to_value_nested(depth)
    }
}

impl<T: ToValue + ?Sized> ToValue for Box<T> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        (**self).to_value_nested(depth)
    }
}

impl<T: ToValue + ?Sized> ToValue for Rc<T> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        (**self).to_value_nested(depth)
    }
}

impl<T: ToValue + ?Sized> ToValue for Arc<T> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        (**self).to_value_nested(depth)
    }
}

impl<T: ToValue> ToValue for RefCell<T> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        let inner = self
            .try_borrow()
            .map_err(|_| ValueError::UnsupportedType("mutably borrowed RefCell".to_string()))?;
        inner.to_value_nested(depth)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        match self {
            None => Ok(Value::Nil),
            Some(value) => value.to_value_nested(depth),
        }
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        let depth = enter(depth)?;
        self.iter()
            .map(|elt| elt.to_value_nested(depth))
            .collect::<Result<Array, _>>()
            .map(Value::Array)
    }
}

impl<T: ToValue, const N: usize> ToValue for [T; N] {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        self[..].to_value_nested(depth)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        self[..].to_value_nested(depth)
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        let depth = enter(depth)?;
        self.iter()
            .map(|(key, value)| {
                check_text(key)?;
                Ok((key.clone(), value.to_value_nested(depth)?))
            })
            .collect::<Result<Struct, _>>()
            .map(Value::Struct)
    }
}

impl<T: ToValue, S: BuildHasher> ToValue for HashMap<String, T, S> {
    fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
        let depth = enter(depth)?;
        self.iter()
            .map(|(key, value)| {
                check_text(key)?;
                Ok((key.clone(), value.to_value_nested(depth)?))
            })
            .collect::<Result<Struct, _>>()
            .map(Value::Struct)
    }
}

macro_rules! tuple_impl {
    // use variables to indicate the arity of the tuple
    ($($tyvar:ident),*) => {
        impl<$($tyvar: ToValue),*> ToValue for ($($tyvar),*,) {
            #[allow(non_snake_case)]
            fn to_value_nested(&self, depth: usize) -> Result<Value, ValueError> {
                let depth = enter(depth)?;
                let ($(ref $tyvar),*,) = *self;
                Ok(Value::Array(vec![$($tyvar.to_value_nested(depth)?),*]))
            }
        }
    }
}

tuple_impl! {A}
tuple_impl! {A, B}
tuple_impl! {A, B, C}
tuple_impl! {A, B, C, D}
tuple_impl! {A, B, C, D, E}
tuple_impl! {A, B, C, D, E, F}
tuple_impl! {A, B, C, D, E, F, G}
tuple_impl! {A, B, C, D, E, F, G, H}
tuple_impl! {A, B, C, D, E, F, G, H, I}
tuple_impl! {A, B, C, D, E, F, G, H, I, J}
tuple_impl! {A, B, C, D, E, F, G, H, I, J, K}
tuple_impl! {A, B, C, D, E, F, G, H, I, J, K, L}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(n) => serializer.serialize_i32(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Double(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => serializer.serialize_str(dt.as_str()),
            Value::Base64(b) => serializer.serialize_bytes(b),
            Value::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for elt in a {
                    seq.serialize_element(elt)?;
                }
                seq.end()
            }
            Value::Struct(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (key, value) in m {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Nil => serializer.serialize_unit(),
        }
    }
}

/// Decodes a `Value` into a native type.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, ValueError> {
    T::deserialize(value)
}

impl<'de> IntoDeserializer<'de, ValueError> for Value {
    type Deserializer = Value;

    fn into_deserializer(self) -> Value {
        self
    }
}

impl<'de> de::Deserializer<'de> for Value {
    type Error = ValueError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self {
            Value::Int(n) => visitor.visit_i32(n),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Double(n) => visitor.visit_f64(n),
            Value::String(s) => visitor.visit_string(s),
            Value::DateTime(dt) => visitor.visit_string(dt.into_string()),
            Value::Base64(b) => visitor.visit_byte_buf(b),
            Value::Array(a) => {
                let mut seq = SeqDeserializer::<_, ValueError>::new(a.into_iter());
                let out = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(out)
            }
            Value::Struct(m) => {
                let mut map = MapDeserializer::<_, ValueError>::new(m.into_iter());
                let out = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(out)
            }
            Value::Nil => visitor.visit_unit(),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ValueError> {
        match self {
            Value::Nil => visitor.visit_none(),
            value => visitor.visit_some(value),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ValueError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ValueError> {
        match self {
            Value::String(s) => visitor.visit_enum(s.into_deserializer()),
            other => Err(de::Error::invalid_type(
                de::Unexpected::Other(other.type_name()),
                &"a string naming a unit variant",
            )),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}
