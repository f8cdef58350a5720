// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # VSON: A Versioned, Observable, JSON-Shaped Document Store
//!
//! This crate wraps a plain tree of structured data (mappings, arrays,
//! scalars) and transparently captures every mutation as an ordered **redo
//! log**, while emitting **change events** that can drive read-only
//! **replicas** to stay in sync with a primary.
//!
//! The managed surface is a [`View`]: a cheap, clonable cursor over the
//! document tree. Reading a nested container through a view yields another
//! view; writing through any view appends a [`LogEntry`] to the document's
//! log and publishes a [`ChangeEvent`] on its [`Emitter`]. The log lives
//! *inside* the document, under the reserved `__versioning__` field, which
//! is what makes detach/re-attach lossless: the detached form is simply a
//! plain value.
//!
//! ## Core Concepts
//!
//! - [`Value`]: the plain-value domain — null, booleans, numbers, strings,
//!   arrays, and string-keyed mappings. Nothing else can enter a document.
//! - [`View`]: the interception layer. Every mutation made through a view
//!   is logged and observable; the underlying tree is never handed out.
//! - **Log**: the ordered sequence of mutations, addressed by **LSN**
//!   (monotone, dense, starting at 0). Replaying the log always reproduces
//!   the live tree.
//! - [`replica`]: read-only documents seeded from a [`View::snapshot`] and
//!   advanced strictly by consuming change events in LSN order.
//!
//! ## Getting Started
//!
//! ```rust
//! use vson::{create, plain, replica};
//!
//! // Create a managed document from a plain mapping.
//! let doc = create(plain!({ "title": "draft", "tags": ["a"] }))?;
//!
//! // Mutations go through the view and are captured in the log.
//! doc.set("title", "final")?;
//! let tags = doc.node("tags").expect("tags is an array");
//! tags.push("b")?;
//!
//! assert_eq!(doc.version_count()?, 3);
//! assert_eq!(doc.restore_version(0)?, plain!({ "title": "draft", "tags": ["a"] }));
//!
//! // Replicas follow the document through its change events.
//! let mirror = replica::create(&doc)?;
//! replica::follow(&doc, &mirror)?;
//! doc.set("reviewed", true)?;
//! assert_eq!(mirror.scalar("reviewed"), Some(true.into()));
//!
//! // Detach with history, re-attach losslessly elsewhere.
//! let wire = doc.detach_preserve_version_data();
//! let restored = create(wire)?;
//! assert_eq!(restored.detach(), doc.detach());
//! # Ok::<(), vson::Error>(())
//! ```
//!
//! ## Ordering Guarantees
//!
//! The store is single-threaded and synchronous. A log append
//! happens-before its change event; events on one document are delivered
//! contiguously in LSN order, to handlers in registration order. A handler
//! therefore always observes a fully-updated tree at the LSN it was
//! notified about. Handlers must not mutate the document they were
//! notified about during the notification; this is a convention, not an
//! enforced rule.
//!
//! A handler that returns an error aborts the write *after* the log has
//! been appended — the emitter is not transactional with the log. See
//! [`Error::Handler`].
//!
//! ## Scope of this Crate
//!
//! This crate provides the document model, the log and replay engine, the
//! snapshot/detach/re-attach protocol, the change-event bus, and the
//! replica state machine. It does **not** provide transport or storage:
//! the canonical wire form is the plain value returned by
//! [`View::detach_preserve_version_data`], and how it travels is up to
//! you. There is no multi-writer conflict resolution — one primary writes,
//! replicas follow.
//!
//! ## License
//!
//! This project is licensed under either of
//!
//! - Apache License, Version 2.0, ([LICENSE-APACHE](LICENSE-APACHE) or http://www.apache.org/licenses/LICENSE-2.0)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or http://opensource.org/licenses/MIT)
//!
//! at your option.
//!
//! ## Features
//!
//! - `json`: Conversions between [`Value`] and `serde_json::Value`. This
//!   feature is enabled by default.
//! - `serde`: Serde support for plain values and log entries. `Value`
//!   serializes untagged, to the same shape as `serde_json::Value`.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for plain values and
//!   mutation scripts, useful for property-based testing.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

pub mod document;
pub use document::{create, is_managed};
pub mod emitter;
pub use emitter::{ChangeEvent, Emitter, HandlerId};
pub mod error;
pub use error::{Error, Result};
pub mod log;
pub use log::{LogEntry, Lsn, Op, VERSIONING_FIELD};
pub mod replica;
pub mod value;
pub use value::{Assignable, Value};
pub mod view;
pub use view::{DocValue, View};

#[cfg(feature = "json")]
mod json;
/// Macros for building plain values in tests and initialization.
pub mod macros;
#[cfg(any(test, feature = "arbitrary"))]
pub mod test_util;

static DETERMINISTIC_MAPS: AtomicBool = AtomicBool::new(false);

/// Switches every subsequently created mapping to a fixed hash seed, so
/// map iteration order is reproducible from run to run.
///
/// Reproducible iteration makes debug output and test failures stable,
/// at the cost of making hash collisions predictable — leave this off
/// outside of tests and debugging sessions.
#[doc(hidden)]
pub fn enable_determinism() {
    DETERMINISTIC_MAPS.store(true, Ordering::Release);
}

/// The hasher state behind every mapping in a document tree.
///
/// A fresh instance draws random `ahash` seeds; after
/// [`enable_determinism`], all new instances share one arbitrary fixed
/// seed set instead. Mappings pick this up through `Default`, so no
/// call site ever mentions seeds.
#[derive(Clone)]
pub struct VsonRandomState(RandomState);

impl Default for VsonRandomState {
    fn default() -> Self {
        VsonRandomState(if DETERMINISTIC_MAPS.load(Ordering::Acquire) {
            RandomState::with_seeds(11, 719, 2203, 3671)
        } else {
            RandomState::new()
        })
    }
}

impl BuildHasher for VsonRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.0.build_hasher()
    }
}
