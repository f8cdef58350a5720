// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Error taxonomy for the document store.
//!
//! All failures are surfaced at the call site; the store performs no retries
//! and no silent recovery. Boundary rejections ([`Error::NonManageable`],
//! [`Error::NonAssignableValue`], [`Error::InvalidKey`]) and identity
//! violations ([`Error::AlreadyManaged`], [`Error::CrossAttachment`],
//! [`Error::OrphanedView`]) leave the tree and the log unmodified. A
//! [`Error::Handler`] failure is different: it is raised by a change-event
//! subscriber *after* the log entry has been appended, so the document has
//! already advanced — the log, not the emitter, is authoritative.

use crate::log::Lsn;
use std::{error, fmt};

/// A convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by document, view, and replica operations.
#[derive(Debug)]
pub enum Error {
    /// The value offered as a document root is not a manageable mapping.
    NonManageable,
    /// The value offered for assignment is outside the plain-value domain.
    NonAssignableValue,
    /// The key is not legal for the container it addresses.
    InvalidKey(String),
    /// The value offered to [`create`](crate::create) is already managed.
    AlreadyManaged,
    /// The assigned value is a managed view of this or another document.
    CrossAttachment,
    /// The view's path no longer resolves in the document it was taken from.
    OrphanedView,
    /// Write on a replica or inside the versioning block.
    ReadOnlyViolation,
    /// The requested version does not exist in the log.
    InvalidVersionId {
        /// The version that was asked for.
        requested: usize,
        /// How many versions the log holds.
        versions: usize,
    },
    /// The value is not a snapshot produced by
    /// [`View::snapshot`](crate::View::snapshot).
    InvalidSnapshot(&'static str),
    /// The `__versioning__` block offered for re-attach is inconsistent.
    InvalidVersioningData(String),
    /// A log entry could not be decoded or applied.
    MalformedEntry(String),
    /// A change event arrived out of sequence; the replica is unchanged.
    OutOfSync {
        /// The LSN the replica was waiting for.
        expected: Lsn,
        /// The LSN the event actually carried.
        actual: Lsn,
    },
    /// The operation requires a managed document.
    NotManaged,
    /// The operation requires a replica.
    NotReplica,
    /// A change-event handler failed. The triggering entry has already been
    /// appended to the log.
    Handler(Box<dyn error::Error + 'static>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NonManageable => {
                write!(f, "only a plain, string-keyed mapping can be managed")
            }
            Error::NonAssignableValue => {
                write!(f, "value is outside the assignable plain-value domain")
            }
            Error::InvalidKey(key) => write!(f, "invalid key: {key}"),
            Error::AlreadyManaged => write!(f, "value is already a managed view"),
            Error::CrossAttachment => {
                write!(f, "cannot assign a managed view into a document")
            }
            Error::OrphanedView => {
                write!(f, "view path no longer resolves in the document")
            }
            Error::ReadOnlyViolation => write!(f, "write through a read-only view"),
            Error::InvalidVersionId {
                requested,
                versions,
            } => {
                write!(f, "version {requested} does not exist ({versions} recorded)")
            }
            Error::InvalidSnapshot(reason) => write!(f, "invalid snapshot: {reason}"),
            Error::InvalidVersioningData(reason) => {
                write!(f, "invalid versioning data: {reason}")
            }
            Error::MalformedEntry(reason) => write!(f, "malformed log entry: {reason}"),
            Error::OutOfSync { expected, actual } => {
                write!(f, "event out of sync: expected lsn {expected}, got {actual}")
            }
            Error::NotManaged => write!(f, "not a managed document"),
            Error::NotReplica => write!(f, "not a replica"),
            Error::Handler(err) => write!(f, "change-event handler failed: {err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Handler(err) => Some(&**err),
            _ => None,
        }
    }
}
