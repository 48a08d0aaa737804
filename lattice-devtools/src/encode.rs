//! Value Encoding
//!
//! Runtime values are opaque to the debugger. A [`ValueEncoder`] turns them
//! into [`EncodedValue`]s, a small tagged union the UI knows how to preview.
//!
//! Collections are encoded shallowly unless expanded: a collapsed array or
//! object only reports its length.

use std::any::Any;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::graph::{ElementHandle, Value};

/// Preview of a runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EncodedValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Array {
        len: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Vec<EncodedValue>>,
    },
    Object {
        len: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entries: Option<IndexMap<String, EncodedValue>>,
    },
    /// A callable, by name.
    Function(String),
    /// A lazily computed property, by name.
    Getter(String),
    Element(ElementHandle),
    /// An instance of a named type the encoder does not look into.
    Instance(String),
    /// A reactive store, by name.
    Store(String),
    Unknown,
}

/// Turns runtime values into previews.
pub trait ValueEncoder: Send + Sync {
    /// Encode `value`. When `expand` is set, collections list their items.
    fn encode(&self, value: &Value, expand: bool) -> EncodedValue;
}

/// Encoder for plain Rust data.
///
/// Understands numbers, booleans, strings, `()`, element handles, vectors of
/// those, nested `Vec<Value>` and `serde_json::Value`. Anything else is
/// [`EncodedValue::Unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEncoder;

impl BasicEncoder {
    fn primitive(value: &dyn Any) -> Option<EncodedValue> {
        macro_rules! numbers {
            ($($ty:ty),*) => {
                $(
                    if let Some(n) = value.downcast_ref::<$ty>() {
                        return Some(EncodedValue::Number(*n as f64));
                    }
                )*
            };
        }
        numbers!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

        if let Some(b) = value.downcast_ref::<bool>() {
            return Some(EncodedValue::Boolean(*b));
        }
        if let Some(s) = value.downcast_ref::<String>() {
            return Some(EncodedValue::String(s.clone()));
        }
        if let Some(s) = value.downcast_ref::<&'static str>() {
            return Some(EncodedValue::String((*s).to_owned()));
        }
        if value.is::<()>() {
            return Some(EncodedValue::Null);
        }
        if let Some(element) = value.downcast_ref::<ElementHandle>() {
            return Some(EncodedValue::Element(element.clone()));
        }
        None
    }

    fn array<T>(items: &[T], expand: bool, encode: impl Fn(&T) -> EncodedValue) -> EncodedValue {
        EncodedValue::Array {
            len: items.len(),
            items: expand.then(|| items.iter().map(encode).collect()),
        }
    }

    fn json(value: &serde_json::Value, expand: bool) -> EncodedValue {
        use serde_json::Value as Json;
        match value {
            Json::Null => EncodedValue::Null,
            Json::Bool(b) => EncodedValue::Boolean(*b),
            Json::Number(n) => n.as_f64().map_or(EncodedValue::Unknown, EncodedValue::Number),
            Json::String(s) => EncodedValue::String(s.clone()),
            Json::Array(items) => Self::array(items, expand, |item| Self::json(item, false)),
            Json::Object(map) => EncodedValue::Object {
                len: map.len(),
                entries: expand.then(|| {
                    map.iter()
                        .map(|(key, value)| (key.clone(), Self::json(value, false)))
                        .collect()
                }),
            },
        }
    }
}

impl ValueEncoder for BasicEncoder {
    fn encode(&self, value: &Value, expand: bool) -> EncodedValue {
        let any: &dyn Any = value.as_ref();
        if let Some(encoded) = Self::primitive(any) {
            return encoded;
        }

        macro_rules! vectors {
            ($($ty:ty),*) => {
                $(
                    if let Some(items) = any.downcast_ref::<Vec<$ty>>() {
                        return Self::array(items, expand, |item| {
                            Self::primitive(item).unwrap_or(EncodedValue::Unknown)
                        });
                    }
                )*
            };
        }
        vectors!(i32, i64, u32, u64, usize, f64, bool, String, ElementHandle);

        if let Some(items) = any.downcast_ref::<Vec<Value>>() {
            return Self::array(items, expand, |item| self.encode(item, false));
        }
        if let Some(json) = any.downcast_ref::<serde_json::Value>() {
            return Self::json(json, expand);
        }
        EncodedValue::Unknown
    }
}
