// (c) Copyright 2025 Helsing GmbH. All rights reserved.
/// Convenience macro for building plain [`Value`](crate::Value) trees.
///
/// Mappings use `{ "key": value }` syntax, sequences use `[ … ]`, and
/// `null` is spelled out. Anything else is passed through
/// `Value::from`, so scalars and expressions work in place — but note
/// that a composite expression (including a negative literal) must be
/// parenthesized to read as a single token tree:
///
/// ```rust
/// # use vson::plain;
/// let config = plain!({
///     "name": "reactor",
///     "enabled": true,
///     "retries": 3,
///     "offset": (-12),
///     "thresholds": [0.5, 0.9],
///     "limits": { "depth": null }
/// });
/// assert_eq!(config.get_path(["limits", "depth"]), Some(&vson::Value::Null));
/// ```
#[macro_export]
macro_rules! plain {
    (null) => {
        $crate::Value::Null
    };

    ([ $($elem:tt),* $(,)? ]) => {
        $crate::Value::Array(vec![ $( $crate::plain!($elem) ),* ])
    };

    ({ $($key:literal : $val:tt),* $(,)? }) => {{
        #[allow(unused_mut)]
        let mut map = $crate::value::Map::default();
        $( map.insert($key.to_string(), $crate::plain!($val)); )*
        $crate::Value::Map(map)
    }};

    ($other:expr) => {
        $crate::Value::from($other)
    };
}

#[cfg(test)]
mod tests {
    use crate::{Value, plain};

    #[test]
    fn scalar_literals() {
        assert_eq!(plain!(null), Value::Null);
        assert_eq!(plain!(true), Value::Bool(true));
        assert_eq!(plain!(3), Value::U64(3));
        assert_eq!(plain!((-3)), Value::I64(-3));
        assert_eq!(plain!("s"), Value::from("s"));
    }

    #[test]
    fn nested_literals() {
        let value = plain!({
            "a": [1, { "b": null }],
            "c": { "d": [true] },
        });
        assert_eq!(value.get_path(["a", "1", "b"]), Some(&Value::Null));
        assert_eq!(value.get_path(["c", "d", "0"]), Some(&Value::Bool(true)));
    }

    #[test]
    fn expressions_pass_through() {
        let n = 2 + 2;
        assert_eq!(plain!(n), Value::U64(4));
        assert_eq!(plain!([(1 + 1)]), plain!([2]));
    }
}
