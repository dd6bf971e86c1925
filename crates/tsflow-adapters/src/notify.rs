//! Explicit observer registry used for every notification stream.
//!
//! A [`Notifier`] holds handlers keyed by [`SubscriptionId`].  Publishing
//! snapshots the handler list under a short lock, releases it, then calls each
//! handler in subscription order.  Handlers may therefore subscribe,
//! unsubscribe, or mutate a collection from inside a callback.
//!
//! A handler that returns an error or panics does not stop delivery to the
//! handlers after it; its fault is returned to the publisher as a
//! [`HandlerFault`].

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Boxed error a handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler<E> = Arc<dyn Fn(&E) -> Result<(), HandlerError> + Send + Sync>;

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A fault raised by one handler during [`Notifier::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    pub subscription: SubscriptionId,
    pub details: String,
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber {} failed: {}", self.subscription.0, self.details)
    }
}

/// Publish/subscribe point for one notification stream carrying `E`.
pub struct Notifier<E> {
    handlers: Mutex<BTreeMap<SubscriptionId, Handler<E>>>,
    next_id: AtomicU64,
}

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler`.  Handlers are invoked in subscription order.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(handler));
        id
    }

    /// Remove a handler.  Returns `false` if it was not (or no longer)
    /// registered; calling twice is harmless.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every current handler.
    ///
    /// Returns the faults raised by individual handlers; an empty vector means
    /// every handler succeeded (or there were none).
    pub fn publish(&self, event: &E) -> Vec<HandlerFault> {
        let snapshot: Vec<(SubscriptionId, Handler<E>)> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();

        let mut faults = Vec::new();
        for (subscription, handler) in snapshot {
            let details = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            faults.push(HandlerFault {
                subscription,
                details,
            });
        }
        faults
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
