// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Conversions between [`Value`] and `serde_json::Value`.
//!
//! The plain-value domain *is* the JSON domain, so both conversions are
//! total — with one asterisk: a non-finite float (which the document
//! boundary rejects, but which can be constructed as a loose `Value`)
//! has no JSON rendering and converts to null, matching how JSON
//! serializers flatten it.
//!
//! # Examples
//!
//! ```
//! use vson::{Value, plain};
//!
//! let value = plain!({ "name": "Ada", "tags": ["x", "y"], "score": 9.5 });
//! let json: serde_json::Value = value.clone().into();
//! assert_eq!(json["tags"][1], serde_json::json!("y"));
//! assert_eq!(Value::from(json), value);
//! ```

use crate::value::{Map, Value};

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(v) => {
                if let Some(v) = v.as_u64() {
                    Value::U64(v)
                } else if let Some(v) = v.as_i64() {
                    Value::from(v)
                } else {
                    Value::F64(v.as_f64().expect("serde_json numbers are u64, i64, or f64"))
                }
            }
            serde_json::Value::String(v) => Value::String(v),
            serde_json::Value::Array(elems) => {
                Value::Array(elems.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => {
                let mut map = Map::default();
                for (key, value) in fields {
                    map.insert(key, Value::from(value));
                }
                Value::Map(map)
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        Value::from(value.clone())
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => v.into(),
            Value::I64(v) => v.into(),
            Value::U64(v) => v.into(),
            // Non-finite floats cannot be represented in JSON; they are
            // rejected at the document boundary, so this only flattens
            // loose values.
            Value::F64(v) => serde_json::Number::from_f64(v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(v) => v.into(),
            Value::Array(elems) => {
                serde_json::Value::Array(elems.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        serde_json::Value::from(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plain;

    #[test]
    fn json_round_trip() {
        let value = plain!({
            "null": null,
            "flag": false,
            "pos": 7,
            "neg": (-7),
            "float": 1.25,
            "text": "hi",
            "seq": [1, [2], { "k": "v" }],
        });
        let json = serde_json::Value::from(&value);
        assert_eq!(Value::from(json), value);
    }

    #[test]
    fn negative_integers_survive() {
        let json = serde_json::json!(-3);
        assert_eq!(Value::from(json), Value::I64(-3));
    }

    #[test]
    fn non_finite_floats_flatten_to_null() {
        assert_eq!(
            serde_json::Value::from(Value::F64(f64::NAN)),
            serde_json::Value::Null
        );
    }

    #[test]
    fn detached_documents_are_plain_json() {
        let doc = crate::create(plain!({ "a": [1, 2] })).unwrap();
        doc.node("a").unwrap().push(3).unwrap();
        let json = serde_json::Value::from(doc.detach());
        assert_eq!(json, serde_json::json!({ "a": [1, 2, 3] }));
    }
}
