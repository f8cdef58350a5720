// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The mutation log: entries, the in-tree codec, and the replay engine.
//!
//! Every mutation made through a [`View`](crate::View) is recorded as a
//! [`LogEntry`] — an `op` ([`Op::Set`] or [`Op::Delete`]), a `path` of
//! string keys from the root, and for sets a deep copy of the assigned
//! value. Entry 0 is always a `Set` at the empty path carrying the initial
//! root value; every later entry is a delta against the tree produced by
//! replaying its predecessors.
//!
//! The log is addressed by **LSN** — the index of an entry, monotone and
//! dense from 0. It lives co-resident with the data it describes, as plain
//! values under the document's reserved `__versioning__` field, which is
//! why a document detached with its version data is nothing more than a
//! plain mapping. [`LogEntry::to_value`] and [`LogEntry::from_value`]
//! convert between the typed record and that in-tree form; `from_value`
//! treats its input as untrusted, since re-attach accepts documents from
//! the outside world.
//!
//! Sequence keys are decimal strings. Replaying a `Delete` on a sequence
//! index nulls the slot without shifting anything; lengths change only
//! through the reserved `length` key, so replay is position-stable and a
//! compound sequence operation is observably just its elementary entries.

use crate::{
    error::Error,
    value::{Map, Value, parse_index},
};
use tracing::trace;

/// The reserved root field holding a document's versioning block.
pub const VERSIONING_FIELD: &str = "__versioning__";

/// The field of the versioning block holding the log (documents).
pub(crate) const LOG_FIELD: &str = "log";

/// The field of the versioning block holding the sync position (replicas
/// and snapshots).
pub(crate) const LSN_FIELD: &str = "lsn";

/// The reserved sequence key through which lengths change.
pub(crate) const LENGTH_KEY: &str = "length";

/// A log sequence number: the index of an entry within the log.
pub type Lsn = u64;

/// The kind of mutation a log entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Op {
    /// Assign a value at the path.
    Set,
    /// Remove the value at the path.
    Delete,
}

/// An immutable record of one mutation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct LogEntry {
    /// What happened.
    pub op: Op,
    /// Where, as string keys from the root. Sequence indices are decimal
    /// strings. The versioning block never appears in a path.
    pub path: Vec<String>,
    /// The assigned value, for `Set` entries. `Delete` carries none.
    pub value: Option<Value>,
}

impl LogEntry {
    /// Creates a `Set` entry.
    pub fn set(path: Vec<String>, value: Value) -> Self {
        LogEntry {
            op: Op::Set,
            path,
            value: Some(value),
        }
    }

    /// Creates a `Delete` entry.
    pub fn delete(path: Vec<String>) -> Self {
        LogEntry {
            op: Op::Delete,
            path,
            value: None,
        }
    }

    /// Encodes this entry into its in-tree form:
    /// `{"op": …, "path": […], "value": …}`.
    ///
    /// The `value` field is always present; for `Delete` entries it is
    /// null.
    pub fn to_value(&self) -> Value {
        let mut map = Map::default();
        map.insert(
            "op".to_owned(),
            Value::String(
                match self.op {
                    Op::Set => "set",
                    Op::Delete => "delete",
                }
                .to_owned(),
            ),
        );
        map.insert(
            "path".to_owned(),
            Value::Array(self.path.iter().cloned().map(Value::String).collect()),
        );
        map.insert(
            "value".to_owned(),
            self.value.clone().unwrap_or(Value::Null),
        );
        Value::Map(map)
    }

    /// Decodes an entry from its in-tree form.
    ///
    /// The input is untrusted (it arrives through re-attach). Fails with
    /// [`Error::MalformedEntry`] if the op is unknown, the path is not a
    /// sequence of strings, or the `value` field is absent.
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        let map = value
            .as_map()
            .ok_or_else(|| Error::MalformedEntry("entry is not a mapping".to_owned()))?;
        let op = match map.get("op").and_then(Value::as_str) {
            Some("set") => Op::Set,
            Some("delete") => Op::Delete,
            Some(other) => {
                return Err(Error::MalformedEntry(format!("unknown op {other:?}")));
            }
            None => return Err(Error::MalformedEntry("missing op".to_owned())),
        };
        let path = map
            .get("path")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedEntry("path is not a sequence".to_owned()))?
            .iter()
            .map(|key| {
                key.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| Error::MalformedEntry("non-string path key".to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let value = map
            .get("value")
            .ok_or_else(|| Error::MalformedEntry("missing value".to_owned()))?;
        Ok(match op {
            Op::Set => LogEntry::set(path, value.clone()),
            Op::Delete => LogEntry::delete(path),
        })
    }

    /// Applies this entry to a plain tree.
    ///
    /// Walks the path to the parent container and mutates the final key.
    /// An empty path replaces the tree wholesale (entry 0). On sequences,
    /// a `Set` beyond the end pads with nulls, a `Delete` nulls the slot
    /// in place, and the reserved `length` key truncates or extends.
    pub fn apply(&self, tree: &mut Value) -> Result<(), Error> {
        let Some((target, parents)) = self.path.split_last() else {
            return match self.op {
                Op::Set => {
                    *tree = self.set_value()?.clone();
                    Ok(())
                }
                Op::Delete => Err(Error::MalformedEntry(
                    "delete at the empty path".to_owned(),
                )),
            };
        };

        let mut node = tree;
        for key in parents {
            node = match node {
                Value::Map(map) => map.get_mut(key),
                Value::Array(elems) => parse_index(key).and_then(|idx| elems.get_mut(idx)),
                _ => None,
            }
            .ok_or_else(|| {
                Error::MalformedEntry(format!("path does not resolve at {key:?}"))
            })?;
        }

        match node {
            Value::Map(map) => {
                match self.op {
                    Op::Set => {
                        map.insert(target.clone(), self.set_value()?.clone());
                    }
                    Op::Delete => {
                        // Removing an absent key is a recorded no-op.
                        map.remove(target);
                    }
                }
                Ok(())
            }
            Value::Array(elems) => self.apply_to_sequence(elems, target),
            _ => Err(Error::MalformedEntry(format!(
                "path ends in a scalar before {target:?}"
            ))),
        }
    }

    fn apply_to_sequence(&self, elems: &mut Vec<Value>, target: &str) -> Result<(), Error> {
        if target == LENGTH_KEY {
            return match self.op {
                Op::Set => {
                    let len = self
                        .set_value()?
                        .as_u64()
                        .ok_or_else(|| {
                            Error::MalformedEntry("length must be a non-negative integer".to_owned())
                        })?;
                    elems.resize(len as usize, Value::Null);
                    Ok(())
                }
                Op::Delete => Err(Error::MalformedEntry("cannot delete length".to_owned())),
            };
        }
        let idx = parse_index(target).ok_or_else(|| {
            Error::MalformedEntry(format!("{target:?} is not a sequence index"))
        })?;
        match self.op {
            Op::Set => {
                if idx >= elems.len() {
                    elems.resize(idx + 1, Value::Null);
                }
                elems[idx] = self.set_value()?.clone();
            }
            Op::Delete => {
                // A deleted slot becomes a hole; length is untouched.
                if let Some(slot) = elems.get_mut(idx) {
                    *slot = Value::Null;
                }
            }
        }
        Ok(())
    }

    fn set_value(&self) -> Result<&Value, Error> {
        self.value
            .as_ref()
            .ok_or_else(|| Error::MalformedEntry("set entry without a value".to_owned()))
    }
}

/// Replays a sequence of entries from scratch.
///
/// The first entry must be a wholesale `Set` at the empty path; anything
/// else fails as malformed when applied to the initial null tree.
pub fn replay<'a, I>(entries: I) -> Result<Value, Error>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut tree = Value::Null;
    let mut replayed = 0u64;
    for entry in entries {
        entry.apply(&mut tree)?;
        replayed += 1;
    }
    trace!(entries = replayed, "replayed log");
    Ok(tree)
}

/// Reads the log array of a managed tree, if it has one.
pub(crate) fn log_slot(tree: &Value) -> Option<&Vec<Value>> {
    tree.as_map()?
        .get(VERSIONING_FIELD)?
        .as_map()?
        .get(LOG_FIELD)?
        .as_array()
}

/// Decodes every entry of a managed tree's log.
pub(crate) fn parse_log(tree: &Value) -> Option<Result<Vec<LogEntry>, Error>> {
    let slot = log_slot(tree)?;
    Some(slot.iter().map(LogEntry::from_value).collect())
}

/// Appends an entry to a managed tree's log, returning the entry's LSN.
///
/// Panics if the tree has no versioning block; callers only reach this
/// after `create` installed (or re-attach validated) one.
pub(crate) fn append_entry(tree: &mut Value, entry: &LogEntry) -> Lsn {
    let log = tree
        .as_map_mut()
        .expect("managed root is a mapping")
        .get_mut(VERSIONING_FIELD)
        .expect("managed tree carries a versioning block")
        .as_map_mut()
        .expect("versioning block is a mapping")
        .get_mut(LOG_FIELD)
        .expect("document versioning block carries a log")
        .as_array_mut()
        .expect("log is a sequence");
    log.push(entry.to_value());
    let lsn = (log.len() - 1) as Lsn;
    trace!(lsn, op = ?entry.op, path = ?entry.path, "appended log entry");
    lsn
}

/// Reads the sync position of a replica-shaped tree, if it has one.
pub(crate) fn read_lsn(tree: &Value) -> Option<Lsn> {
    tree.as_map()?
        .get(VERSIONING_FIELD)?
        .as_map()?
        .get(LSN_FIELD)?
        .as_u64()
}

/// Advances the sync position of a replica-shaped tree.
pub(crate) fn write_lsn(tree: &mut Value, lsn: Lsn) {
    let block = tree
        .as_map_mut()
        .expect("replica root is a mapping")
        .get_mut(VERSIONING_FIELD)
        .expect("replica tree carries a versioning block")
        .as_map_mut()
        .expect("versioning block is a mapping");
    block.insert(LSN_FIELD.to_owned(), Value::U64(lsn));
}
