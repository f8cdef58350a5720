// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The change-event bus.
//!
//! Every document and every replica owns an [`Emitter`]: a single-topic,
//! synchronous, process-local publish/subscribe object. Handlers are
//! invoked in registration order, on the calling flow, immediately after
//! the log append they describe — so a handler always observes the tree at
//! the LSN it was notified about.
//!
//! Handlers are fallible. A failing handler aborts the dispatch and the
//! error surfaces at the write site as
//! [`Error::Handler`](crate::Error::Handler) — *after* the entry has been
//! appended. The emitter is not transactional with the log; the log is
//! authoritative.
//!
//! The listener list is snapshotted at dispatch, so subscribing or
//! unsubscribing from within a handler takes effect from the next event
//! on. A handler must not trigger a dispatch that re-enters itself.

use crate::{error::Error, log::{LogEntry, Lsn}};
use std::{cell::RefCell, error, fmt, rc::Rc};

/// The payload published for every mutation.
///
/// Consumers receive a shared reference; the event and the entry inside it
/// cannot be altered by a handler.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// The LSN assigned to the entry, equal to the log length minus one
    /// after the append.
    pub lsn: Lsn,
    /// A copy of the appended entry.
    pub entry: LogEntry,
}

/// What a subscribed handler may return.
pub type HandlerResult = Result<(), Box<dyn error::Error + 'static>>;

type Handler = Box<dyn FnMut(&ChangeEvent) -> HandlerResult>;

/// A subscription handle, usable with [`Emitter::off`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Inner {
    next_id: u64,
    handlers: Vec<(HandlerId, Rc<RefCell<Handler>>)>,
}

/// A single-topic, synchronous change-event emitter.
///
/// Cloning an emitter yields another handle to the same subscriber list;
/// each document and replica hands out clones of its own emitter.
#[derive(Clone, Default)]
pub struct Emitter {
    inner: Rc<RefCell<Inner>>,
}

impl Emitter {
    /// Creates an emitter with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, returning a handle for [`Emitter::off`].
    ///
    /// Handlers run in registration order.
    pub fn on<F>(&self, handler: F) -> HandlerId
    where
        F: FnMut(&ChangeEvent) -> HandlerResult + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        inner
            .handlers
            .push((id, Rc::new(RefCell::new(Box::new(handler)))));
        id
    }

    /// Removes a previously registered handler.
    ///
    /// Removing an unknown or already-removed handler is a no-op.
    pub fn off(&self, id: HandlerId) {
        self.inner
            .borrow_mut()
            .handlers
            .retain(|(handler_id, _)| *handler_id != id);
    }

    /// How many handlers are currently registered.
    pub fn handler_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }

    /// Dispatches an event to every currently-registered handler, in
    /// registration order, aborting on the first handler error.
    pub fn emit(&self, event: &ChangeEvent) -> Result<(), Error> {
        let snapshot: Vec<Rc<RefCell<Handler>>> = self
            .inner
            .borrow()
            .handlers
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in snapshot {
            (handler.borrow_mut())(event).map_err(Error::Handler)?;
        }
        Ok(())
    }

    /// Returns true when both handles dispatch to the same subscriber
    /// list.
    pub fn same_emitter(&self, other: &Emitter) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
