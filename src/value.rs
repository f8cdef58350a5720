// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The plain-value domain.
//!
//! A document manages a tree of [`Value`]s: null, booleans, numbers,
//! strings, arrays, and string-keyed mappings. The domain is closed — a
//! value that cannot be expressed as a `Value` cannot enter a document,
//! which is what makes every document serializable and every log replayable.
//!
//! Two classifiers guard the boundary:
//!
//! - [`Value::is_assignable`]: may this value be written into a document?
//!   Within the closed Rust domain the only inexpressible-in-JSON values
//!   are non-finite floats, so this amounts to a finiteness check over the
//!   tree.
//! - [`Value::is_manageable`]: may this value be a document *root*? Roots
//!   must be mappings, so the document always has a named slot for its
//!   versioning block; arrays and scalars are rejected.
//!
//! [`Assignable`] is the right-hand side of `create` and `set`: either a
//! plain value, or a managed [`View`] — offering a view where a plain value
//! is expected is how cross-attachment is attempted, and it is rejected at
//! the boundary rather than silently aliasing two documents.

use crate::{VsonRandomState, view::View};
use std::collections::HashMap;

/// The mapping type used throughout a document.
pub type Map = HashMap<String, Value, VsonRandomState>;

/// A plain value: the only shape of data a document can hold.
///
/// Numbers are normalized on construction so that every non-negative
/// integer is the `U64` variant; `I64` holds negative integers only. This
/// keeps structural equality meaningful across construction paths.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// The null value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A negative integer.
    I64(i64),
    /// A non-negative integer.
    U64(u64),
    /// A floating-point number. Only finite values are assignable.
    F64(f64),
    /// A string.
    String(String),
    /// An ordered sequence of plain values.
    Array(Vec<Value>),
    /// A string-keyed mapping of plain values.
    Map(Map),
}

impl Value {
    /// Returns true iff this value may be written into a document.
    ///
    /// Arrays and mappings are assignable iff every element is. The only
    /// constructible non-assignable values are non-finite floats, which
    /// have no replayable serialized form.
    pub fn is_assignable(&self) -> bool {
        match self {
            Value::Null | Value::Bool(_) | Value::I64(_) | Value::U64(_) | Value::String(_) => {
                true
            }
            Value::F64(v) => v.is_finite(),
            Value::Array(elems) => elems.iter().all(Value::is_assignable),
            Value::Map(map) => map.values().all(Value::is_assignable),
        }
    }

    /// Returns true iff this value may be the root of a managed document.
    ///
    /// Only assignable mappings qualify: the root must have a named slot
    /// for the versioning block, which arrays cannot offer.
    pub fn is_manageable(&self) -> bool {
        matches!(self, Value::Map(_)) && self.is_assignable()
    }

    /// Looks up a single child by key.
    ///
    /// On mappings this is a field lookup. On arrays the key must be a
    /// canonical decimal index (no sign, no leading zeros). Scalars have
    /// no children.
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            Value::Array(elems) => elems.get(parse_index(key)?),
            _ => None,
        }
    }

    /// Walks a path of keys from this value, returning the reached node.
    pub fn get_path<I, S>(&self, path: I) -> Option<&Value>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut node = self;
        for key in path {
            node = node.get_key(key.as_ref())?;
        }
        Some(node)
    }

    /// Returns the contained mapping, if this is one.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the contained array, if this is one.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(elems) => Some(elems),
            _ => None,
        }
    }

    pub(crate) fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(elems) => Some(elems),
            _ => None,
        }
    }

    /// Returns the contained string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the contained non-negative integer, if this is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true for arrays and mappings.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Map(_))
    }
}

/// Parses a canonical array index: ASCII digits only, no leading zeros.
///
/// `"0"` is an index; `"00"`, `"+1"`, and `"-1"` are not. This mirrors the
/// canonical-numeric-string rule for sequence keys, so a key either is an
/// index everywhere (log paths, views, replay) or nowhere.
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

/// The right-hand side of an assignment into a document.
///
/// Most callers pass plain data and never see this type: scalars, strings,
/// and [`Value`]s convert into it. A managed [`View`] also converts into
/// it — which is precisely how assigning one document into another is
/// *expressed*, and every such assignment is rejected
/// ([`Error::CrossAttachment`](crate::Error::CrossAttachment) on writes,
/// [`Error::AlreadyManaged`](crate::Error::AlreadyManaged) on `create`).
#[derive(Clone, Debug)]
pub enum Assignable {
    /// A plain value, owned by the document once assigned.
    Plain(Value),
    /// A managed view. Never assignable; carried so the boundary can
    /// reject it with the right error.
    Managed(View),
}

impl From<Value> for Assignable {
    fn from(value: Value) -> Self {
        Assignable::Plain(value)
    }
}

impl From<&Value> for Assignable {
    fn from(value: &Value) -> Self {
        Assignable::Plain(value.clone())
    }
}

impl From<View> for Assignable {
    fn from(view: View) -> Self {
        Assignable::Managed(view)
    }
}

impl From<&View> for Assignable {
    fn from(view: &View) -> Self {
        Assignable::Managed(view.clone())
    }
}

macro_rules! impl_value_from {
    ($($t:ty => $arm:expr),+ $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    #[allow(clippy::redundant_closure_call)]
                    ($arm)(v)
                }
            }

            impl From<$t> for Assignable {
                fn from(v: $t) -> Self {
                    Assignable::Plain(Value::from(v))
                }
            }
        )+
    };
}

impl_value_from! {
    bool => Value::Bool,
    u32 => |v: u32| Value::U64(v.into()),
    u64 => Value::U64,
    usize => |v: usize| Value::U64(v as u64),
    i32 => |v: i32| Value::from(i64::from(v)),
    i64 => |v: i64| {
        if v >= 0 {
            Value::U64(v as u64)
        } else {
            Value::I64(v)
        }
    },
    f32 => |v: f32| Value::F64(v.into()),
    f64 => Value::F64,
    &str => |v: &str| Value::String(v.to_owned()),
    String => Value::String,
    Vec<Value> => Value::Array,
    Map => Value::Map,
}

// Comparison shims against bare Rust scalars, so assertions read as
// `value == 42` instead of `value == Value::U64(42)`. Signed integers
// funnel through `Value::from` to get the same normalization the tree
// applies on construction: `Value::from(1i64)` and `1u64` compare equal.
impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Value::Bool(v) if v == other)
    }
}

impl PartialEq<u64> for Value {
    fn eq(&self, other: &u64) -> bool {
        matches!(self, Value::U64(v) if v == other)
    }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        *self == Value::from(*other)
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        *self == Value::from(*other)
    }
}

impl PartialEq<f64> for Value {
    fn eq(&self, other: &f64) -> bool {
        matches!(self, Value::F64(v) if v == other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Value::String(v) if v == other)
    }
}

impl PartialEq<String> for Value {
    fn eq(&self, other: &String) -> bool {
        matches!(self, Value::String(v) if v == other)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    //! `Value` serializes untagged, to the same shape as
    //! `serde_json::Value`, so the `serde` representation of a detached
    //! document is plain JSON.
    use super::{Map, Value};
    use serde::{
        Deserialize, Deserializer, Serialize, Serializer,
        de::{MapAccess, SeqAccess, Visitor},
        ser::SerializeMap,
    };
    use std::fmt;

    impl Serialize for Value {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match self {
                Value::Null => serializer.serialize_unit(),
                Value::Bool(v) => serializer.serialize_bool(*v),
                Value::I64(v) => serializer.serialize_i64(*v),
                Value::U64(v) => serializer.serialize_u64(*v),
                Value::F64(v) => serializer.serialize_f64(*v),
                Value::String(v) => serializer.serialize_str(v),
                Value::Array(elems) => elems.serialize(serializer),
                Value::Map(map) => {
                    let mut out = serializer.serialize_map(Some(map.len()))?;
                    for (key, value) in map {
                        out.serialize_entry(key, value)?;
                    }
                    out.end()
                }
            }
        }
    }

    struct ValueVisitor;

    impl<'de> Visitor<'de> for ValueVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a plain JSON-shaped value")
        }

        fn visit_unit<E>(self) -> Result<Value, E> {
            Ok(Value::Null)
        }

        fn visit_none<E>(self) -> Result<Value, E> {
            Ok(Value::Null)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            Deserialize::deserialize(deserializer)
        }

        fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
            Ok(Value::Bool(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
            Ok(Value::from(v))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
            Ok(Value::U64(v))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
            Ok(Value::F64(v))
        }

        fn visit_str<E>(self, v: &str) -> Result<Value, E> {
            Ok(Value::String(v.to_owned()))
        }

        fn visit_string<E>(self, v: String) -> Result<Value, E> {
            Ok(Value::String(v))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut elems = Vec::new();
            while let Some(elem) = seq.next_element()? {
                elems.push(elem);
            }
            Ok(Value::Array(elems))
        }

        fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut map = Map::default();
            while let Some((key, value)) = access.next_entry::<String, Value>()? {
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        }
    }

    impl<'de> Deserialize<'de> for Value {
        fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(ValueVisitor)
        }
    }
}
