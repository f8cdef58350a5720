// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Read-only replicas, advanced strictly by change events.
//!
//! A replica is a document-shaped tree whose versioning block holds only
//! a sync position (`lsn`) — no log. It is seeded from a
//! [`View::snapshot`] and advances exclusively through [`apply`], which
//! insists on receiving events in strict, contiguous LSN order: the event
//! for LSN *n + 1* is the only thing that moves a replica at LSN *n*.
//! Anything else fails with [`Error::OutOfSync`] and leaves the replica
//! where it was — there is no recovery state; a desynchronized replica is
//! discarded and rebuilt from a fresh snapshot.
//!
//! Replicas are not implicitly linked to their source. [`follow`] wires a
//! replica to a source's emitter; because [`apply`] re-emits every event
//! it consumes, replicas chain: a replica of a replica stays consistent
//! through the same mechanism.
//!
//! ```
//! use vson::{create, plain, replica};
//!
//! let doc = create(plain!({}))?;
//! let first = replica::create(&doc)?;
//! replica::follow(&doc, &first)?;
//! let second = replica::create(&first)?;
//! replica::follow(&first, &second)?;
//!
//! doc.set("a", 1)?;
//! doc.set("a", 2)?;
//! assert_eq!(second.scalar("a"), Some(2.into()));
//! assert_eq!(replica::lsn(&second)?, 2);
//! # Ok::<(), vson::Error>(())
//! ```

use crate::{
    emitter::{ChangeEvent, Emitter, HandlerId},
    error::Error,
    log::{self, LOG_FIELD, LSN_FIELD, Lsn, VERSIONING_FIELD},
    value::Value,
    view::{DocShared, View},
};
use std::{cell::RefCell, rc::Rc};
use tracing::trace;

/// Creates a replica from a snapshot value.
///
/// The snapshot must be a mapping whose `__versioning__` block is a
/// mapping carrying a numeric `lsn` and no log — the shape produced by
/// [`View::snapshot`]. The value is deep-copied and wrapped in a
/// read-only root view: external writes fail with
/// [`Error::ReadOnlyViolation`]; only [`apply`] advances the replica.
pub fn create_from_snapshot(snapshot: &Value) -> Result<View, Error> {
    let root = snapshot
        .as_map()
        .ok_or(Error::InvalidSnapshot("snapshot is not a mapping"))?;
    let block = root
        .get(VERSIONING_FIELD)
        .ok_or(Error::InvalidSnapshot("snapshot has no versioning block"))?
        .as_map()
        .ok_or(Error::InvalidSnapshot("versioning block is not a mapping"))?;
    if block.get(LSN_FIELD).and_then(Value::as_u64).is_none() {
        return Err(Error::InvalidSnapshot("versioning block has no lsn"));
    }
    if block.contains_key(LOG_FIELD) {
        return Err(Error::InvalidSnapshot("snapshot must not carry a log"));
    }
    if !snapshot.is_assignable() {
        return Err(Error::InvalidSnapshot("snapshot holds non-plain values"));
    }

    Ok(View::new_root(Rc::new(DocShared {
        tree: RefCell::new(snapshot.clone()),
        emitter: Emitter::new(),
        root_read_only: true,
    })))
}

/// Creates a replica from a managed document or from another replica.
///
/// A document source is snapshotted at its current LSN; a replica source
/// is copied at *its* current LSN. Either way the new replica is
/// unlinked: it only advances once subscribed, e.g. via [`follow`].
pub fn create(source: &View) -> Result<View, Error> {
    if is_replica(source) {
        let tree = source.shared().tree.borrow().clone();
        create_from_snapshot(&tree)
    } else {
        create_from_snapshot(&source.snapshot()?)
    }
}

/// Returns true iff the view is a replica (its versioning block tracks a
/// sync position rather than a log).
pub fn is_replica(view: &View) -> bool {
    lsn(view).is_ok()
}

/// The LSN the replica has advanced to.
pub fn lsn(replica: &View) -> Result<Lsn, Error> {
    let tree = replica.shared().tree.borrow();
    log::read_lsn(&tree).ok_or(Error::NotReplica)
}

/// Advances a replica by one change event.
///
/// The event must carry exactly the next LSN; on a gap (or a repeat) the
/// call fails with [`Error::OutOfSync`] naming both the expected and the
/// received LSN, and the replica remains at its current position. On
/// success the entry is applied, the sync position advances, and the same
/// event is re-emitted on the replica's own emitter so that downstream
/// replicas can chain.
pub fn apply(replica: &View, event: &ChangeEvent) -> Result<(), Error> {
    let expected = lsn(replica)? + 1;
    if event.lsn != expected {
        return Err(Error::OutOfSync {
            expected,
            actual: event.lsn,
        });
    }
    {
        let mut tree = replica.shared().tree.borrow_mut();
        event.entry.apply(&mut tree)?;
        log::write_lsn(&mut tree, event.lsn);
    }
    trace!(lsn = event.lsn, "replica advanced");
    replica.shared().emitter.emit(event)?;
    Ok(())
}

/// Subscribes a replica to a source's change events.
///
/// Every event the source emits is fed through [`apply`]; an apply
/// failure (for example [`Error::OutOfSync`] after a dropped event)
/// propagates to the source's write site as [`Error::Handler`].
///
/// The source may be a document or another replica — chains of replicas
/// are wired the same way. Returns the subscription handle on the
/// source's emitter.
pub fn follow(source: &View, replica: &View) -> Result<HandlerId, Error> {
    if !is_replica(replica) {
        return Err(Error::NotReplica);
    }
    let target = replica.clone();
    Ok(source.emitter().on(move |event| {
        apply(&target, event).map_err(|err| Box::new(err) as Box<dyn std::error::Error>)
    }))
}

/// A plain deep copy of the replica's tree, without the versioning block.
pub fn detach(replica: &View) -> Value {
    replica.detach()
}

/// A clone of the replica's event bus.
pub fn emitter(replica: &View) -> Result<Emitter, Error> {
    if !is_replica(replica) {
        return Err(Error::NotReplica);
    }
    Ok(replica.emitter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create as create_doc, plain};

    #[test]
    fn snapshot_validation() {
        assert!(matches!(
            create_from_snapshot(&plain!(1)),
            Err(Error::InvalidSnapshot(_))
        ));
        assert!(matches!(
            create_from_snapshot(&plain!({})),
            Err(Error::InvalidSnapshot(_))
        ));
        assert!(matches!(
            create_from_snapshot(&plain!({ "__versioning__": { "lsn": "x" } })),
            Err(Error::InvalidSnapshot(_))
        ));
        // A full document form is not a snapshot.
        let doc = create_doc(plain!({})).unwrap();
        assert!(matches!(
            create_from_snapshot(&doc.detach_preserve_version_data()),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn replicas_are_read_only() {
        let doc = create_doc(plain!({ "a": { "b": 1 } })).unwrap();
        let replica = create(&doc).unwrap();
        assert!(matches!(
            replica.set("a", 1),
            Err(Error::ReadOnlyViolation)
        ));
        assert!(matches!(
            replica.node("a").unwrap().set("b", 2),
            Err(Error::ReadOnlyViolation)
        ));
        assert!(matches!(replica.delete("a"), Err(Error::ReadOnlyViolation)));
    }

    #[test]
    fn replica_identity() {
        let doc = create_doc(plain!({})).unwrap();
        let replica = create(&doc).unwrap();
        assert!(is_replica(&replica));
        assert!(!is_replica(&doc));
        assert_eq!(lsn(&replica).unwrap(), 0);
        assert!(matches!(lsn(&doc), Err(Error::NotReplica)));
        assert!(matches!(doc.version_count(), Ok(1)));
        assert!(matches!(replica.version_count(), Err(Error::NotManaged)));
    }

    #[test]
    fn apply_requires_the_next_lsn() {
        let doc = create_doc(plain!({})).unwrap();
        let replica = create(&doc).unwrap();

        doc.set("a", 1).unwrap(); // lsn 1, not delivered
        doc.set("a", 2).unwrap(); // lsn 2

        let stale = ChangeEvent {
            lsn: 2,
            entry: crate::LogEntry::set(vec!["a".to_owned()], plain!(2)),
        };
        assert!(matches!(
            apply(&replica, &stale),
            Err(Error::OutOfSync {
                expected: 1,
                actual: 2,
            })
        ));
        assert_eq!(lsn(&replica).unwrap(), 0);
        assert_eq!(detach(&replica), plain!({}));
    }

    #[test]
    fn followed_replicas_track_the_document() {
        let doc = create_doc(plain!({ "n": 0 })).unwrap();
        let replica = create(&doc).unwrap();
        follow(&doc, &replica).unwrap();

        doc.set("n", 1).unwrap();
        doc.set("m", plain!([1, 2])).unwrap();
        doc.node("m").unwrap().push(3).unwrap();

        assert_eq!(detach(&replica), doc.detach());
        assert_eq!(lsn(&replica).unwrap(), 3);
    }

    #[test]
    fn unlinked_replicas_stand_still() {
        let doc = create_doc(plain!({})).unwrap();
        let replica = create(&doc).unwrap();
        doc.set("a", 1).unwrap();
        assert_eq!(detach(&replica), plain!({}));
        assert_eq!(lsn(&replica).unwrap(), 0);
    }

    #[test]
    fn follow_rejects_non_replicas() {
        let doc = create_doc(plain!({})).unwrap();
        let other = create_doc(plain!({})).unwrap();
        assert!(matches!(follow(&doc, &other), Err(Error::NotReplica)));
        assert!(matches!(emitter(&doc), Err(Error::NotReplica)));
    }
}
