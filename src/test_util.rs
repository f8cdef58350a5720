// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Property-testing support: `Arbitrary` impls for plain values and for
//! mutation scripts.
//!
//! A [`Script`] is a bounded sequence of document mutations drawn from
//! the full surface (field writes and deletes, nested writes, sequence
//! bulk operations). Property tests run a script against a live document
//! and then check the universal invariants — replay equals detach, events
//! are dense, round-trips are lossless — without caring what the script
//! actually did.

use crate::value::{Map, Value};
use quickcheck::{Arbitrary, Gen};

/// Keys are drawn from a small pool so scripts collide with themselves:
/// overwrites, re-deletes, and shadowed paths all happen in practice.
const KEYS: &[&str] = &["alpha", "beta", "gamma", "delta", "items"];

fn small_key(g: &mut Gen) -> String {
    (*g.choose(KEYS).expect("key pool is non-empty")).to_owned()
}

fn scalar(g: &mut Gen) -> Value {
    match u8::arbitrary(g) % 6 {
        0 => Value::Null,
        1 => Value::Bool(bool::arbitrary(g)),
        2 => Value::U64(u64::from(u8::arbitrary(g))),
        3 => Value::I64(-i64::from(u8::arbitrary(g)) - 1),
        // Derived from an integer so the value is finite and exact.
        4 => Value::F64(f64::from(i16::arbitrary(g)) / 4.0),
        _ => Value::String(small_key(g)),
    }
}

fn value_with_depth(g: &mut Gen, depth: usize) -> Value {
    if depth == 0 {
        return scalar(g);
    }
    match u8::arbitrary(g) % 4 {
        0 => {
            let len = usize::arbitrary(g) % 4;
            Value::Array((0..len).map(|_| value_with_depth(g, depth - 1)).collect())
        }
        1 => {
            let len = usize::arbitrary(g) % 4;
            let mut map = Map::default();
            for _ in 0..len {
                map.insert(small_key(g), value_with_depth(g, depth - 1));
            }
            Value::Map(map)
        }
        _ => scalar(g),
    }
}

impl Arbitrary for Value {
    fn arbitrary(g: &mut Gen) -> Value {
        value_with_depth(g, 3)
    }
}

/// One step of a mutation script.
#[derive(Clone, Debug)]
pub enum ScriptOp {
    /// Set a root field.
    Set(String, Value),
    /// Delete a root field.
    Delete(String),
    /// Set a field of the mapping at `data` (created by the runner).
    SetNested(String, Value),
    /// Push onto the sequence at `items` (created by the runner).
    Push(Value),
    /// Pop from the sequence at `items`.
    Pop,
    /// Overwrite a low index of the sequence at `items`.
    SetIndex(u8, Value),
    /// Reverse the sequence at `items`.
    Reverse,
    /// Truncate the sequence at `items` to a low length.
    Truncate(u8),
}

impl Arbitrary for ScriptOp {
    fn arbitrary(g: &mut Gen) -> ScriptOp {
        match u8::arbitrary(g) % 8 {
            0 => ScriptOp::Set(small_key(g), Value::arbitrary(g)),
            1 => ScriptOp::Delete(small_key(g)),
            2 => ScriptOp::SetNested(small_key(g), Value::arbitrary(g)),
            3 => ScriptOp::Push(Value::arbitrary(g)),
            4 => ScriptOp::Pop,
            5 => ScriptOp::SetIndex(u8::arbitrary(g) % 6, Value::arbitrary(g)),
            6 => ScriptOp::Reverse,
            _ => ScriptOp::Truncate(u8::arbitrary(g) % 4),
        }
    }
}

/// A bounded mutation script.
#[derive(Clone, Debug)]
pub struct Script(pub Vec<ScriptOp>);

impl Arbitrary for Script {
    fn arbitrary(g: &mut Gen) -> Script {
        let len = usize::arbitrary(g) % 12;
        Script((0..len).map(|_| ScriptOp::arbitrary(g)).collect())
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Script>> {
        let ops = self.0.clone();
        Box::new(
            (0..ops.len()).map(move |skip| {
                let mut shorter = ops.clone();
                shorter.remove(skip);
                Script(shorter)
            }),
        )
    }
}

/// Runs a script against a document view.
///
/// The runner guarantees the fixed slots the script refers to: a mapping
/// under `data` and a sequence under `items`. Script steps that target
/// the root never touch those two keys (the key pool excludes `data`),
/// except for `items`, which scripts may legitimately overwrite — the
/// runner re-creates it on demand.
#[allow(clippy::missing_panics_doc)]
pub fn run_script(doc: &crate::View, script: &Script) -> Result<(), crate::Error> {
    doc.set("data", Value::Map(Map::default()))?;
    doc.set("items", Value::Array(Vec::new()))?;
    for op in &script.0 {
        let items = match doc.node("items") {
            Some(items) if items.is_array() => items,
            _ => {
                doc.set("items", Value::Array(Vec::new()))?;
                doc.node("items").expect("just created")
            }
        };
        match op {
            ScriptOp::Set(key, value) => {
                doc.set(key.clone(), value.clone())?;
            }
            ScriptOp::Delete(key) => {
                doc.delete(key)?;
            }
            ScriptOp::SetNested(key, value) => {
                let data = match doc.node("data") {
                    Some(data) if data.is_map() => data,
                    _ => {
                        doc.set("data", Value::Map(Map::default()))?;
                        doc.node("data").expect("just created")
                    }
                };
                data.set(key.clone(), value.clone())?;
            }
            ScriptOp::Push(value) => {
                items.push(value.clone())?;
            }
            ScriptOp::Pop => {
                items.pop()?;
            }
            ScriptOp::SetIndex(idx, value) => {
                items.set_index(usize::from(*idx), value.clone())?;
            }
            ScriptOp::Reverse => {
                items.reverse()?;
            }
            ScriptOp::Truncate(len) => {
                items.set_len(usize::from(*len))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::{create, log, log::replay, plain, replica};
    use std::{cell::RefCell, rc::Rc};

    /// Invariant: replaying the full log reproduces the live tree.
    #[quickcheck]
    fn replay_matches_detach(script: Script) -> bool {
        let doc = create(plain!({})).unwrap();
        run_script(&doc, &script).unwrap();
        let preserved = doc.detach_preserve_version_data();
        let entries = log::parse_log(&preserved)
            .expect("documents carry a log")
            .expect("own logs are well-formed");
        replay(&entries).unwrap() == doc.detach()
    }

    /// Invariant: managing and detaching a manageable value is lossless.
    #[quickcheck]
    fn manageable_values_round_trip(value: Value) -> bool {
        if !value.is_manageable() {
            return true;
        }
        let doc = create(&value).unwrap();
        doc.detach() == value
    }

    /// Invariant: detach-preserving and re-attaching keeps tree and
    /// history.
    #[quickcheck]
    fn reattach_round_trip(script: Script) -> bool {
        let doc = create(plain!({})).unwrap();
        run_script(&doc, &script).unwrap();
        let restored = create(doc.detach_preserve_version_data()).unwrap();
        restored.detach() == doc.detach()
            && restored.version_count().unwrap() == doc.version_count().unwrap()
    }

    /// Invariants: event LSNs are dense and equal the log position at
    /// dispatch time, and a followed replica converges on the live tree.
    #[quickcheck]
    fn events_are_dense_and_replicas_converge(script: Script) -> bool {
        let doc = create(plain!({})).unwrap();
        let mirror = replica::create(&doc).unwrap();
        replica::follow(&doc, &mirror).unwrap();

        let lsns = Rc::new(RefCell::new(Vec::new()));
        {
            let lsns = Rc::clone(&lsns);
            let doc = doc.clone();
            doc.clone().emitter().on(move |event| {
                // The handler observes the tree already at the event's
                // LSN.
                assert_eq!(doc.version_count().unwrap() as u64 - 1, event.lsn);
                lsns.borrow_mut().push(event.lsn);
                Ok(())
            });
        }

        run_script(&doc, &script).unwrap();

        let lsns = lsns.borrow();
        let dense = lsns
            .iter()
            .copied()
            .eq(1..=lsns.len() as u64);
        dense
            && replica::lsn(&mirror).unwrap() == lsns.len() as u64
            && replica::detach(&mirror) == doc.detach()
    }
}
