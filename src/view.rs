// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The interception layer: managed views over a document tree.
//!
//! A [`View`] is a cursor — a shared handle on the document plus a path
//! from the root. Reading a nested container through a view yields a view
//! of that child; reading a scalar yields a copy. No reference into the
//! underlying tree ever escapes, which is what lets every write be
//! intercepted: each [`View::set`] and [`View::delete`] applies the
//! mutation, appends the matching [`LogEntry`], and publishes a
//! [`ChangeEvent`], in that order.
//!
//! Views enforce the document's prohibitions at the boundary:
//!
//! - the versioning block is readable but never writable through a view;
//! - a managed view is never assignable into a document
//!   ([`Error::CrossAttachment`]);
//! - a view whose path was deleted out from under it fails writes with
//!   [`Error::OrphanedView`] (reads return `None`);
//! - replica views are read-only wholesale.
//!
//! Sequence nodes additionally offer the usual bulk operations (`push`,
//! `pop`, `splice`, `reverse`, …). These decompose into elementary
//! per-index entries, appended and published in ascending index order —
//! observably, a bulk operation *is* its elementary mutations.

use crate::{
    emitter::{ChangeEvent, Emitter},
    error::Error,
    log::{self, LENGTH_KEY, LogEntry, Lsn, VERSIONING_FIELD},
    value::{Assignable, Value, parse_index},
};
use smallvec::SmallVec;
use std::{cell::RefCell, cmp::Ordering, fmt, rc::Rc};

type Path = SmallVec<[String; 8]>;

/// State shared by every view of one document or replica.
pub(crate) struct DocShared {
    /// The live tree, versioning block included.
    pub(crate) tree: RefCell<Value>,
    /// The document's event bus.
    pub(crate) emitter: Emitter,
    /// Whether even the root view rejects writes (replicas).
    pub(crate) root_read_only: bool,
}

/// A managed view: the only surface through which a document is read and
/// mutated.
///
/// Views are cheap to clone and non-owning in spirit — they all share one
/// underlying tree, log, and emitter. A view taken of a nested container
/// stays valid as long as its path resolves; if an ancestor is deleted,
/// reads return `None` and writes fail with [`Error::OrphanedView`].
#[derive(Clone)]
pub struct View {
    shared: Rc<DocShared>,
    path: Path,
    read_only: bool,
}

/// What a read through a view produces.
#[derive(Clone, Debug)]
pub enum DocValue {
    /// A copy of a scalar value.
    Scalar(Value),
    /// A view of a nested container.
    Node(View),
}

impl DocValue {
    /// Returns the nested view, if this is a container.
    pub fn into_node(self) -> Option<View> {
        match self {
            DocValue::Node(view) => Some(view),
            DocValue::Scalar(_) => None,
        }
    }

    /// Returns the copied value, if this is a scalar.
    pub fn into_scalar(self) -> Option<Value> {
        match self {
            DocValue::Scalar(value) => Some(value),
            DocValue::Node(_) => None,
        }
    }
}

impl View {
    pub(crate) fn new_root(shared: Rc<DocShared>) -> View {
        let read_only = shared.root_read_only;
        View {
            shared,
            path: Path::new(),
            read_only,
        }
    }

    pub(crate) fn shared(&self) -> &Rc<DocShared> {
        &self.shared
    }

    pub(crate) fn path(&self) -> &[String] {
        &self.path
    }

    pub(crate) fn at(&self, path: Path, read_only: bool) -> View {
        View {
            shared: Rc::clone(&self.shared),
            path,
            read_only,
        }
    }

    fn child(&self, key: &str) -> View {
        let mut path = self.path.clone();
        path.push(key.to_owned());
        let read_only =
            self.read_only || (self.path.is_empty() && key == VERSIONING_FIELD);
        self.at(path, read_only)
    }

    fn with_node<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let tree = self.shared.tree.borrow();
        f(tree.get_path(self.path.iter()))
    }

    /// Returns true when both views belong to the same document.
    pub fn same_document(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Returns true when writes through this view are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// A clone of the document's event bus.
    pub fn emitter(&self) -> Emitter {
        self.shared.emitter.clone()
    }

    // === reads ===

    /// Reads a child: scalars come back as copies, containers as views.
    ///
    /// On sequence nodes the key is a decimal index, or `length`, which
    /// reads as the sequence length. Returns `None` for absent keys and
    /// for views whose path no longer resolves.
    pub fn get(&self, key: &str) -> Option<DocValue> {
        self.with_node(|node| {
            let child = match node? {
                Value::Map(map) => map.get(key)?,
                Value::Array(elems) => {
                    if key == LENGTH_KEY {
                        return Some(DocValue::Scalar(Value::U64(elems.len() as u64)));
                    }
                    elems.get(parse_index(key)?)?
                }
                _ => return None,
            };
            Some(if child.is_container() {
                DocValue::Node(self.child(key))
            } else {
                DocValue::Scalar(child.clone())
            })
        })
    }

    /// Reads a child container as a view.
    pub fn node(&self, key: &str) -> Option<View> {
        self.get(key)?.into_node()
    }

    /// Reads a child scalar as a copy.
    pub fn scalar(&self, key: &str) -> Option<Value> {
        self.get(key)?.into_scalar()
    }

    /// Deep-copies the child at `key`, containers included.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.with_node(|node| node?.get_key(key).cloned())
    }

    /// Deep-copies the node this view points at.
    ///
    /// On the root view the copy includes the versioning block; use
    /// [`View::detach`] for a plain copy.
    pub fn to_value(&self) -> Option<Value> {
        self.with_node(|node| node.cloned())
    }

    /// The number of entries (mapping) or elements (sequence) at this
    /// node. `None` for scalars and unresolvable paths.
    pub fn len(&self) -> Option<usize> {
        self.with_node(|node| match node? {
            Value::Map(map) => Some(map.len()),
            Value::Array(elems) => Some(elems.len()),
            _ => None,
        })
    }

    /// True when the node exists and has no entries or elements.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// The keys of a mapping node, in unspecified order.
    pub fn keys(&self) -> Vec<String> {
        self.with_node(|node| match node {
            Some(Value::Map(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    /// True when the node exists and holds `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.with_node(|node| match node {
            Some(value) => value.get_key(key).is_some(),
            None => false,
        })
    }

    /// True when this view points at a sequence.
    pub fn is_array(&self) -> bool {
        self.with_node(|node| matches!(node, Some(Value::Array(_))))
    }

    /// True when this view points at a mapping.
    pub fn is_map(&self) -> bool {
        self.with_node(|node| matches!(node, Some(Value::Map(_))))
    }

    // === elementary writes ===

    /// Assigns `value` at `key`, logging the mutation and publishing its
    /// change event. Returns the LSN of the new log entry.
    ///
    /// An assignment always logs, even when the value equals the current
    /// slot — observers rely on event parity with writes.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Assignable>) -> Result<Lsn, Error> {
        let key = key.into();
        self.check_writable(&key)?;
        let value = match value.into() {
            Assignable::Managed(_) => return Err(Error::CrossAttachment),
            Assignable::Plain(value) => value,
        };
        self.check_target_key(&key, Some(&value))?;
        if !value.is_assignable() {
            return Err(Error::NonAssignableValue);
        }
        self.commit(LogEntry::set(self.target_path(&key), value))
    }

    /// Removes `key`, logging the mutation and publishing its change
    /// event. Returns the LSN of the new log entry.
    ///
    /// Removing an absent key still logs, for parity with assignments.
    pub fn delete(&self, key: &str) -> Result<Lsn, Error> {
        self.check_writable(key)?;
        self.check_target_key(key, None)?;
        self.commit(LogEntry::delete(self.target_path(key)))
    }

    // === sequence operations ===
    //
    // Bulk operations decompose into elementary entries by editing a copy
    // and diffing it against the live sequence: a set per changed or added
    // index (ascending), a delete per removed trailing slot, and a
    // trailing length entry only when the sequence shrank — a length
    // implied by a preceding set is collapsed.

    /// Appends an element, returning the LSN of its entry.
    pub fn push(&self, value: impl Into<Assignable>) -> Result<Lsn, Error> {
        let len = self.sequence_len_for_write()?;
        self.set(len.to_string(), value)
    }

    /// Removes and returns the last element.
    ///
    /// Popping an empty sequence returns `None` and logs nothing.
    pub fn pop(&self) -> Result<Option<Value>, Error> {
        self.edit_sequence(|elems| {
            let removed = elems.pop();
            removed.map_or(Vec::new(), |value| vec![value])
        })
        .map(|mut removed| removed.pop())
    }

    /// Removes and returns the first element, shifting the rest down.
    pub fn shift(&self) -> Result<Option<Value>, Error> {
        self.edit_sequence(|elems| {
            if elems.is_empty() {
                Vec::new()
            } else {
                vec![elems.remove(0)]
            }
        })
        .map(|mut removed| removed.pop())
    }

    /// Prepends an element, returning the new length.
    pub fn unshift(&self, value: impl Into<Assignable>) -> Result<usize, Error> {
        let value = self.plain_item(value)?;
        self.edit_sequence(move |elems| {
            elems.insert(0, value);
            Vec::new()
        })?;
        self.sequence_len_for_write()
    }

    /// Replaces `delete_count` elements starting at `start` with `items`,
    /// returning the removed elements.
    ///
    /// `start` and `delete_count` are clamped to the sequence, as the
    /// host-language operation clamps them.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, Error> {
        for item in &items {
            if !item.is_assignable() {
                return Err(Error::NonAssignableValue);
            }
        }
        self.edit_sequence(move |elems| {
            let start = start.min(elems.len());
            let end = (start + delete_count).min(elems.len());
            elems.splice(start..end, items).collect()
        })
    }

    /// Reverses the sequence in place.
    pub fn reverse(&self) -> Result<(), Error> {
        self.edit_sequence(|elems| {
            elems.reverse();
            Vec::new()
        })
        .map(drop)
    }

    /// Sorts the sequence in place with the given comparator.
    pub fn sort_by<F>(&self, cmp: F) -> Result<(), Error>
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut cmp = cmp;
        self.edit_sequence(move |elems| {
            elems.sort_by(&mut cmp);
            Vec::new()
        })
        .map(drop)
    }

    /// Assigns at a sequence index. Writing beyond the end extends the
    /// sequence, padding with nulls.
    pub fn set_index(&self, index: usize, value: impl Into<Assignable>) -> Result<Lsn, Error> {
        self.set(index.to_string(), value)
    }

    /// Removes the element at a sequence index, leaving a hole; the
    /// length is unchanged.
    pub fn delete_index(&self, index: usize) -> Result<Lsn, Error> {
        self.delete(&index.to_string())
    }

    /// Sets the sequence length directly, truncating or null-padding.
    pub fn set_len(&self, len: usize) -> Result<Lsn, Error> {
        self.set(LENGTH_KEY, Value::U64(len as u64))
    }

    // === write plumbing ===

    fn check_writable(&self, key: &str) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::ReadOnlyViolation);
        }
        if self.path.is_empty() && key == VERSIONING_FIELD {
            return Err(Error::ReadOnlyViolation);
        }
        Ok(())
    }

    /// Validates `key` against the container this view points at, walking
    /// the path to detect orphaned views first.
    fn check_target_key(&self, key: &str, value: Option<&Value>) -> Result<(), Error> {
        self.with_node(|node| match node {
            None => Err(Error::OrphanedView),
            Some(Value::Map(_)) => Ok(()),
            Some(Value::Array(_)) => {
                if key == LENGTH_KEY {
                    match value {
                        None => Err(Error::InvalidKey("length cannot be deleted".to_owned())),
                        Some(len) if len.as_u64().is_some() => Ok(()),
                        Some(_) => Err(Error::InvalidKey(
                            "length must be a non-negative integer".to_owned(),
                        )),
                    }
                } else if parse_index(key).is_some() {
                    Ok(())
                } else {
                    Err(Error::InvalidKey(format!(
                        "{key:?} is not a sequence index"
                    )))
                }
            }
            // The container this view wrapped was replaced by a scalar.
            Some(_) => Err(Error::OrphanedView),
        })
    }

    fn target_path(&self, key: &str) -> Vec<String> {
        self.path
            .iter()
            .cloned()
            .chain(std::iter::once(key.to_owned()))
            .collect()
    }

    /// Applies an entry to the tree, appends it to the log, and publishes
    /// it — in that order. A handler error surfaces after the append; the
    /// document has still advanced.
    fn commit(&self, entry: LogEntry) -> Result<Lsn, Error> {
        let lsn = {
            let mut tree = self.shared.tree.borrow_mut();
            entry.apply(&mut tree)?;
            log::append_entry(&mut tree, &entry)
        };
        let event = ChangeEvent { lsn, entry };
        self.shared.emitter.emit(&event)?;
        Ok(lsn)
    }

    fn plain_item(&self, value: impl Into<Assignable>) -> Result<Value, Error> {
        let value = match value.into() {
            Assignable::Managed(_) => return Err(Error::CrossAttachment),
            Assignable::Plain(value) => value,
        };
        if !value.is_assignable() {
            return Err(Error::NonAssignableValue);
        }
        Ok(value)
    }

    fn sequence_len_for_write(&self) -> Result<usize, Error> {
        self.check_writable("")?;
        self.with_node(|node| match node {
            None => Err(Error::OrphanedView),
            Some(Value::Array(elems)) => Ok(elems.len()),
            Some(_) => Err(Error::InvalidKey(
                "not a sequence operation target".to_owned(),
            )),
        })
    }

    /// Runs `edit` on a copy of the sequence, then commits the difference
    /// as elementary entries in ascending index order. Returns whatever
    /// `edit` collected (removed elements, for the operations that yield
    /// them).
    fn edit_sequence<F>(&self, edit: F) -> Result<Vec<Value>, Error>
    where
        F: FnOnce(&mut Vec<Value>) -> Vec<Value>,
    {
        self.check_writable("")?;
        let old = self.with_node(|node| match node {
            None => Err(Error::OrphanedView),
            Some(Value::Array(elems)) => Ok(elems.clone()),
            Some(_) => Err(Error::InvalidKey(
                "not a sequence operation target".to_owned(),
            )),
        })?;
        let mut new = old.clone();
        let out = edit(&mut new);
        for entry in diff_sequences(&self.path, &old, &new) {
            self.commit(entry)?;
        }
        Ok(out)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Decomposes an edited sequence into elementary entries, ascending.
fn diff_sequences(path: &[String], old: &[Value], new: &[Value]) -> Vec<LogEntry> {
    let index_path = |idx: usize| {
        path.iter()
            .cloned()
            .chain(std::iter::once(idx.to_string()))
            .collect::<Vec<_>>()
    };
    let mut entries = Vec::new();
    for (idx, elem) in new.iter().enumerate() {
        if old.get(idx) != Some(elem) {
            entries.push(LogEntry::set(index_path(idx), elem.clone()));
        }
    }
    for idx in new.len()..old.len() {
        entries.push(LogEntry::delete(index_path(idx)));
    }
    if new.len() < old.len() {
        let length_path = path
            .iter()
            .cloned()
            .chain(std::iter::once(LENGTH_KEY.to_owned()))
            .collect();
        entries.push(LogEntry::set(length_path, Value::U64(new.len() as u64)));
    }
    entries
}
