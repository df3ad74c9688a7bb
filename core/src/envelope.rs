//! Uniform access to parsed response bodies.
//!
//! # Design
//! `ResponseEnvelope` owns a `serde_json::Value`; every accessor hands out a
//! borrowed `Field` for exactly the node that was asked for. Nested objects
//! come back as another `EnvelopeView`, while arrays and scalars pass through
//! as plain JSON. Nothing is walked or copied up front.
//!
//! Fields are reached either with `get`/`path` (fallible, `MissingField`) or
//! with indexing (`envelope["stats"]["hp"]`). Indexing yields an
//! `EnvelopeNode` at every depth, so a missing key panics the same way
//! `HashMap` indexing does no matter how deep it sits; `serde_json`'s own
//! `Index` (which returns `null`) is never reached.

use std::ops::Index;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// A parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    value: Value,
}

impl ResponseEnvelope {
    /// Wrap `value` as-is.
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Wrap a full response body, unwrapping the service's
    /// `{"success": true, "data": ...}` shape when present.
    pub fn from_body(body: Value) -> Self {
        match body {
            Value::Object(mut map) if map.contains_key("success") && map.contains_key("data") => {
                Self::new(map.remove("data").unwrap_or(Value::Null))
            }
            other => Self::new(other),
        }
    }

    pub fn view(&self) -> EnvelopeView<'_> {
        EnvelopeView { value: &self.value }
    }

    pub fn get(&self, key: &str) -> Result<Field<'_>, ApiError> {
        self.view().get(key)
    }

    /// Follow a dotted path such as `"stats.hp"`.
    pub fn path(&self, path: &str) -> Result<Field<'_>, ApiError> {
        self.view().path(path)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Deserialize the whole payload into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        T::deserialize(&self.value).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }
}

impl Index<&str> for ResponseEnvelope {
    type Output = EnvelopeNode;

    fn index(&self, key: &str) -> &EnvelopeNode {
        index_field(&self.value, key)
    }
}

/// Borrowed view of one object node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeView<'a> {
    value: &'a Value,
}

impl<'a> EnvelopeView<'a> {
    pub fn get(&self, key: &str) -> Result<Field<'a>, ApiError> {
        self.value
            .get(key)
            .map(Field::wrap)
            .ok_or_else(|| ApiError::MissingField(key.to_string()))
    }

    pub fn path(&self, path: &str) -> Result<Field<'a>, ApiError> {
        let mut current = Field::wrap(self.value);
        for key in path.split('.') {
            current = current.get(key).map_err(|_| ApiError::MissingField(path.to_string()))?;
        }
        Ok(current)
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }
}

impl Index<&str> for EnvelopeView<'_> {
    type Output = EnvelopeNode;

    fn index(&self, key: &str) -> &EnvelopeNode {
        index_field(self.value, key)
    }
}

/// A node reached by indexing. Further indexing stays on the envelope side,
/// so `["a"]["b"]` checks every step.
#[derive(Debug)]
#[repr(transparent)]
pub struct EnvelopeNode(Value);

impl EnvelopeNode {
    fn from_value(value: &Value) -> &EnvelopeNode {
        // SAFETY: `EnvelopeNode` is `repr(transparent)` over `Value`, so the
        // layouts match and the borrow keeps the lifetime of `value`.
        unsafe { &*(value as *const Value as *const EnvelopeNode) }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn field(&self) -> Field<'_> {
        Field::wrap(&self.0)
    }

    pub fn get(&self, key: &str) -> Result<Field<'_>, ApiError> {
        self.field().get(key)
    }
}

impl Index<&str> for EnvelopeNode {
    type Output = EnvelopeNode;

    fn index(&self, key: &str) -> &EnvelopeNode {
        index_field(&self.0, key)
    }
}

impl Index<usize> for EnvelopeNode {
    type Output = EnvelopeNode;

    fn index(&self, index: usize) -> &EnvelopeNode {
        match self.0.get(index) {
            Some(element) => EnvelopeNode::from_value(element),
            None => panic!("no element {index} in response"),
        }
    }
}

impl<T> PartialEq<T> for EnvelopeNode
where
    Value: PartialEq<T>,
{
    fn eq(&self, other: &T) -> bool {
        self.0 == *other
    }
}

/// A field reached through an envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Object(EnvelopeView<'a>),
    Array(&'a Value),
    Scalar(&'a Value),
}

impl<'a> Field<'a> {
    fn wrap(value: &'a Value) -> Self {
        match value {
            Value::Object(_) => Field::Object(EnvelopeView { value }),
            Value::Array(_) => Field::Array(value),
            scalar => Field::Scalar(scalar),
        }
    }

    /// Descend into a nested object field.
    pub fn get(&self, key: &str) -> Result<Field<'a>, ApiError> {
        match *self {
            Field::Object(view) => view.get(key),
            _ => Err(ApiError::MissingField(key.to_string())),
        }
    }

    pub fn value(&self) -> &'a Value {
        match *self {
            Field::Object(view) => view.value,
            Field::Array(value) | Field::Scalar(value) => value,
        }
    }

    pub fn as_object(&self) -> Option<EnvelopeView<'a>> {
        match *self {
            Field::Object(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&'a [Value]> {
        match *self {
            Field::Array(value) => value.as_array().map(Vec::as_slice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            Field::Scalar(value) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Field::Scalar(value) => value.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Field::Scalar(value) => value.as_bool(),
            _ => None,
        }
    }
}

fn index_field<'a>(value: &'a Value, key: &str) -> &'a EnvelopeNode {
    match value.get(key) {
        Some(field) => EnvelopeNode::from_value(field),
        None => panic!("no field `{key}` in response"),
    }
}
