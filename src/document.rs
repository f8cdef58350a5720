// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The managed-document façade: create, detach, re-attach, and history.
//!
//! [`create`] turns a plain mapping into a managed document by installing
//! the reserved `__versioning__` block — a log whose entry 0 carries the
//! initial tree — and returning the root [`View`]. From then on every
//! mutation flows through the view layer and lands in the log, so any
//! recorded version can be reconstructed by replay.
//!
//! Detaching reverses the wrap: [`View::detach`] yields a plain copy
//! without the block, [`View::detach_preserve_version_data`] keeps it.
//! The preserved form is the canonical wire format — a plain,
//! JSON-compatible mapping — and feeding it back through [`create`]
//! re-attaches the document *losslessly*: the block is treated as
//! untrusted and re-validated by replaying its log and comparing the
//! result against the live tree it arrived with.

use crate::{
    emitter::Emitter,
    error::Error,
    log::{self, LOG_FIELD, LSN_FIELD, LogEntry, VERSIONING_FIELD, replay},
    value::{Assignable, Map, Value},
    view::{DocShared, View},
};
use smallvec::smallvec;
use std::{cell::RefCell, rc::Rc};
use tracing::debug;

/// Wraps a plain mapping into a managed document, returning its root
/// view.
///
/// The input is deep-copied; later changes to the source value do not
/// affect the document. If the copy already carries a `__versioning__`
/// block — because it came from
/// [`View::detach_preserve_version_data`] — the block is validated by
/// replay and the document resumes with its full history (re-attach).
/// Otherwise a fresh log is installed whose entry 0 is the initial tree.
///
/// # Errors
///
/// - [`Error::AlreadyManaged`] if `value` is a managed view;
/// - [`Error::NonManageable`] if it is not an assignable mapping;
/// - [`Error::InvalidVersioningData`] if a carried versioning block does
///   not replay to the tree around it.
///
/// # Example
///
/// ```
/// use vson::{create, plain};
///
/// let doc = create(plain!({ "prop": 41 }))?;
/// doc.set("prop", 42)?;
/// assert_eq!(doc.version_count()?, 2);
/// # Ok::<(), vson::Error>(())
/// ```
pub fn create(value: impl Into<Assignable>) -> Result<View, Error> {
    let working = match value.into() {
        Assignable::Managed(_) => return Err(Error::AlreadyManaged),
        Assignable::Plain(value) => value,
    };
    if !working.is_manageable() {
        return Err(Error::NonManageable);
    }
    let mut working = working;

    let carries_block = working
        .as_map()
        .expect("manageable values are mappings")
        .contains_key(VERSIONING_FIELD);
    if carries_block {
        validate_versioning(&working)?;
    } else {
        let initial = working.clone();
        let entry = LogEntry::set(Vec::new(), initial);
        let mut block = Map::default();
        block.insert(LOG_FIELD.to_owned(), Value::Array(vec![entry.to_value()]));
        working
            .as_map_mut()
            .expect("manageable values are mappings")
            .insert(VERSIONING_FIELD.to_owned(), Value::Map(block));
    }

    Ok(View::new_root(Rc::new(DocShared {
        tree: RefCell::new(working),
        emitter: Emitter::new(),
        root_read_only: false,
    })))
}

/// Returns true iff the value is a managed view (of a document or a
/// replica).
///
/// In this crate the managed surface is a distinct type, so the check is
/// a formality — but `create` and `set` accept either plain values or
/// views, and this answers which side of that boundary a value is on.
pub fn is_managed(value: &Assignable) -> bool {
    matches!(value, Assignable::Managed(_))
}

/// Re-validates a carried versioning block by replay.
fn validate_versioning(working: &Value) -> Result<(), Error> {
    let bad = |reason: &str| Error::InvalidVersioningData(reason.to_owned());

    let block = working
        .as_map()
        .expect("manageable values are mappings")
        .get(VERSIONING_FIELD)
        .expect("checked by the caller");
    let block = block.as_map().ok_or_else(|| bad("block is not a mapping"))?;
    let log = block
        .get(LOG_FIELD)
        .ok_or_else(|| bad("block carries no log"))?
        .as_array()
        .ok_or_else(|| bad("log is not a sequence"))?;
    let entries = log
        .iter()
        .map(LogEntry::from_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| Error::InvalidVersioningData(err.to_string()))?;
    match entries.first() {
        Some(first) if first.op == crate::log::Op::Set && first.path.is_empty() => {}
        Some(_) => return Err(bad("entry 0 is not a wholesale set")),
        None => return Err(bad("log is empty")),
    }

    let replayed =
        replay(&entries).map_err(|err| Error::InvalidVersioningData(err.to_string()))?;
    let mut live = working.clone();
    live.as_map_mut()
        .expect("manageable values are mappings")
        .remove(VERSIONING_FIELD);
    if replayed != live {
        return Err(bad("log replay does not reproduce the live tree"));
    }
    debug!(entries = entries.len(), "re-attached document with version data");
    Ok(())
}

impl View {
    fn version_entries(&self) -> Result<Vec<LogEntry>, Error> {
        let tree = self.shared().tree.borrow();
        log::parse_log(&tree)
            .ok_or(Error::NotManaged)?
            .map_err(|err| Error::InvalidVersioningData(err.to_string()))
    }

    /// How many versions the document's log records.
    ///
    /// Fails with [`Error::NotManaged`] on replicas, whose versioning
    /// block tracks a sync position instead of a log.
    pub fn version_count(&self) -> Result<usize, Error> {
        let tree = self.shared().tree.borrow();
        log::log_slot(&tree).map(Vec::len).ok_or(Error::NotManaged)
    }

    /// Reconstructs this view's subtree as it was at `version`.
    ///
    /// Replays log entries `0..=version` into a fresh tree, then walks it
    /// along this view's path. If the path did not fully exist at that
    /// version, the deepest resolvable value is returned — asking a
    /// nested view about an era before its ancestor existed yields that
    /// ancestor's closest surviving parent.
    ///
    /// The result is plain and unmanaged.
    ///
    /// # Example
    ///
    /// ```
    /// use vson::{create, plain};
    ///
    /// let doc = create(plain!({ "prop": 41 }))?;
    /// doc.set("prop", 42)?;
    /// assert_eq!(doc.restore_version(0)?, plain!({ "prop": 41 }));
    /// assert_eq!(doc.restore_version(1)?, plain!({ "prop": 42 }));
    /// # Ok::<(), vson::Error>(())
    /// ```
    pub fn restore_version(&self, version: usize) -> Result<Value, Error> {
        let entries = self.version_entries()?;
        if version >= entries.len() {
            return Err(Error::InvalidVersionId {
                requested: version,
                versions: entries.len(),
            });
        }
        let tree = replay(&entries[..=version])?;
        let mut node = &tree;
        for key in self.path() {
            match node.get_key(key) {
                Some(child) => node = child,
                None => break,
            }
        }
        Ok(node.clone())
    }

    /// Deep-copies the live tree without its versioning block.
    ///
    /// The result is plain and unmanaged. This is a document-level
    /// operation: it detaches the whole tree regardless of which view it
    /// is called on.
    pub fn detach(&self) -> Value {
        let mut copy = self.shared().tree.borrow().clone();
        if let Some(map) = copy.as_map_mut() {
            map.remove(VERSIONING_FIELD);
        }
        copy
    }

    /// Deep-copies the live tree *keeping* its versioning block.
    ///
    /// This is the canonical wire form: feeding the result back through
    /// [`create`] restores the document with its full history.
    pub fn detach_preserve_version_data(&self) -> Value {
        self.shared().tree.borrow().clone()
    }

    /// A plain copy of the live tree tagged with the current LSN and no
    /// log: `__versioning__ = { lsn }`.
    ///
    /// Snapshots exist to seed replicas; see
    /// [`replica::create_from_snapshot`](crate::replica::create_from_snapshot).
    pub fn snapshot(&self) -> Result<Value, Error> {
        let versions = self.version_count()?;
        let mut snapshot = self.detach();
        let mut block = Map::default();
        block.insert(LSN_FIELD.to_owned(), Value::U64((versions - 1) as u64));
        snapshot
            .as_map_mut()
            .expect("document roots are mappings")
            .insert(VERSIONING_FIELD.to_owned(), Value::Map(block));
        Ok(snapshot)
    }

    /// A read-only view over the document's log.
    ///
    /// The log — like the whole versioning block — can be inspected
    /// through views but never written: every mutation attempt fails with
    /// [`Error::ReadOnlyViolation`].
    pub fn log_view(&self) -> Result<View, Error> {
        self.version_count()?;
        Ok(self.at(
            smallvec![VERSIONING_FIELD.to_owned(), LOG_FIELD.to_owned()],
            true,
        ))
    }

    /// A fresh view of the document root.
    pub fn root(&self) -> View {
        self.at(smallvec![], self.shared().root_read_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plain;

    #[test]
    fn create_rejects_non_mappings() {
        assert!(matches!(create(Value::Null), Err(Error::NonManageable)));
        assert!(matches!(create(plain!(41)), Err(Error::NonManageable)));
        assert!(matches!(create(plain!("root")), Err(Error::NonManageable)));
        assert!(matches!(create(plain!([1, 2])), Err(Error::NonManageable)));
        assert!(matches!(
            create(plain!({ "x": (f64::NAN) })),
            Err(Error::NonManageable)
        ));
    }

    #[test]
    fn create_rejects_managed_views() {
        let doc = create(plain!({})).unwrap();
        assert!(matches!(create(doc.clone()), Err(Error::AlreadyManaged)));
        let nested = create(plain!({ "a": {} })).unwrap().node("a").unwrap();
        assert!(matches!(create(nested), Err(Error::AlreadyManaged)));
    }

    #[test]
    fn empty_mapping_is_a_valid_document() {
        let doc = create(plain!({})).unwrap();
        assert_eq!(doc.version_count().unwrap(), 1);
        assert_eq!(doc.detach(), plain!({}));
    }

    #[test]
    fn is_managed_distinguishes_views_from_values() {
        let doc = create(plain!({})).unwrap();
        assert!(is_managed(&doc.into()));
        assert!(!is_managed(&plain!({ "x": 1 }).into()));
    }

    #[test]
    fn version_zero_is_the_initial_tree() {
        let doc = create(plain!({ "prop": 41 })).unwrap();
        doc.set("prop", 42).unwrap();
        assert_eq!(doc.version_count().unwrap(), 2);
        assert_eq!(doc.restore_version(0).unwrap(), plain!({ "prop": 41 }));
    }

    #[test]
    fn restore_rejects_out_of_range_versions() {
        let doc = create(plain!({})).unwrap();
        assert!(matches!(
            doc.restore_version(1),
            Err(Error::InvalidVersionId {
                requested: 1,
                versions: 1,
            })
        ));
    }

    #[test]
    fn nested_views_restore_along_their_path() {
        let doc = create(plain!({})).unwrap();
        doc.set("a", plain!({})).unwrap();
        let a = doc.node("a").unwrap();
        a.set("b", 1).unwrap();
        a.set("c", 2).unwrap();
        a.delete("b").unwrap();

        assert_eq!(a.restore_version(1).unwrap(), plain!({}));
        assert_eq!(a.restore_version(2).unwrap(), plain!({ "b": 1 }));
        assert_eq!(a.restore_version(3).unwrap(), plain!({ "b": 1, "c": 2 }));
        assert_eq!(a.restore_version(4).unwrap(), plain!({ "c": 2 }));
    }

    #[test]
    fn restore_before_the_path_existed_resolves_the_deepest_ancestor() {
        let doc = create(plain!({})).unwrap();
        doc.set("a", plain!({})).unwrap();
        let a = doc.node("a").unwrap();
        // At version 0 the path ["a"] did not exist yet; the deepest
        // resolvable value is the root.
        assert_eq!(a.restore_version(0).unwrap(), plain!({}));
    }

    #[test]
    fn detach_strips_the_versioning_block() {
        let doc = create(plain!({ "prop": 41 })).unwrap();
        doc.set("x", 1).unwrap();
        let plain = doc.detach();
        assert_eq!(plain, plain!({ "prop": 41, "x": 1 }));
    }

    #[test]
    fn snapshot_carries_the_lsn_and_no_log() {
        let doc = create(plain!({ "p": 1 })).unwrap();
        doc.set("p", 2).unwrap();
        let snapshot = doc.snapshot().unwrap();
        let block = snapshot
            .as_map()
            .unwrap()
            .get(VERSIONING_FIELD)
            .unwrap()
            .as_map()
            .unwrap();
        assert_eq!(block.get("lsn"), Some(&Value::U64(1)));
        assert!(!block.contains_key("log"));
    }

    #[test]
    fn log_is_readable_but_not_writable() {
        let doc = create(plain!({ "p": 1 })).unwrap();
        doc.set("p", 2).unwrap();

        let log = doc.log_view().unwrap();
        assert_eq!(log.len(), Some(2));
        let entry = log.node("0").unwrap();
        assert_eq!(entry.scalar("op"), Some(Value::from("set")));

        assert!(matches!(log.set("0", 1), Err(Error::ReadOnlyViolation)));
        assert!(matches!(log.delete("0"), Err(Error::ReadOnlyViolation)));
        assert!(matches!(log.set_len(0), Err(Error::ReadOnlyViolation)));
        assert!(matches!(entry.set("op", "delete"), Err(Error::ReadOnlyViolation)));
        assert!(matches!(
            doc.node(VERSIONING_FIELD).unwrap().delete("log"),
            Err(Error::ReadOnlyViolation)
        ));
        assert!(matches!(
            doc.set(VERSIONING_FIELD, plain!({})),
            Err(Error::ReadOnlyViolation)
        ));
        assert!(matches!(
            doc.delete(VERSIONING_FIELD),
            Err(Error::ReadOnlyViolation)
        ));
        assert_eq!(doc.version_count().unwrap(), 2);
    }

    #[test]
    fn root_view_reaches_the_same_document() {
        let doc = create(plain!({ "a": { "b": 1 } })).unwrap();
        let nested = doc.node("a").unwrap();
        let root = nested.root();
        assert!(root.same_document(&doc));
        root.set("c", 3).unwrap();
        assert_eq!(doc.scalar("c"), Some(Value::U64(3)));
    }

    #[test]
    fn reattach_restores_history() {
        let doc = create(plain!({ "prop": 41 })).unwrap();
        doc.set("x", 42).unwrap();
        doc.set("y", 43).unwrap();

        let wire = doc.detach_preserve_version_data();
        let restored = create(wire).unwrap();
        assert_eq!(restored.detach(), doc.detach());
        assert_eq!(
            restored.version_count().unwrap(),
            doc.version_count().unwrap()
        );
        assert_eq!(
            restored.restore_version(0).unwrap(),
            plain!({ "prop": 41 })
        );
    }

    #[test]
    fn reattach_rejects_tampered_logs() {
        let doc = create(plain!({ "prop": 41 })).unwrap();
        doc.set("x", 42).unwrap();
        let mut wire = doc.detach_preserve_version_data();

        // Flip the live tree out from under the log.
        wire.as_map_mut()
            .unwrap()
            .insert("x".to_owned(), Value::U64(999));
        assert!(matches!(
            create(wire),
            Err(Error::InvalidVersioningData(_))
        ));
    }

    #[test]
    fn reattach_rejects_structurally_broken_blocks() {
        assert!(matches!(
            create(plain!({ "__versioning__": 1 })),
            Err(Error::InvalidVersioningData(_))
        ));
        assert!(matches!(
            create(plain!({ "__versioning__": {} })),
            Err(Error::InvalidVersioningData(_))
        ));
        assert!(matches!(
            create(plain!({ "__versioning__": { "log": [] } })),
            Err(Error::InvalidVersioningData(_))
        ));
        assert!(matches!(
            create(plain!({ "__versioning__": { "log": [{ "op": "delete", "path": [], "value": null }] } })),
            Err(Error::InvalidVersioningData(_))
        ));
        // A snapshot is not a re-attachable form: it has no log.
        assert!(matches!(
            create(plain!({ "__versioning__": { "lsn": 0 } })),
            Err(Error::InvalidVersioningData(_))
        ));
    }
}
