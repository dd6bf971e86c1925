//! Adapter capability traits.
//!
//! Collections only ever talk to these traits, so concrete adapters (device
//! connections, protocol parsers, sinks) can be swapped without touching the
//! lifecycle or fan-in logic.
//!
//! - [`Adapter`] – identity plus lifecycle; every collection member has it.
//! - [`InputAdapter`] – an adapter that originates data and exposes the two
//!   outward notification streams.
//! - [`AdapterFactory`] – builds adapters from configuration rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tsflow_types::{
    AdapterError, AdapterId, AdapterRow, AdapterSource, AdapterState, EntityBatch,
    ProcessingComplete,
};

use crate::notify::Notifier;

/// Converts a shared adapter of any capability into a plain `Arc<dyn Adapter>`.
///
/// Implemented for every sized [`Adapter`]; trait objects such as
/// `dyn InputAdapter` inherit it through the supertrait vtable.
pub trait AsAdapter {
    fn as_adapter(self: Arc<Self>) -> Arc<dyn Adapter>;
}

impl<A: Adapter + 'static> AsAdapter for A {
    fn as_adapter(self: Arc<Self>) -> Arc<dyn Adapter> {
        self
    }
}

/// A pluggable unit in the pipeline.
///
/// # Contract
///
/// * `initialize` – runs the adapter's own setup.  May be called again to
///   reinitialize after a configuration change.
/// * `dispose` – releases resources.  Must tolerate being called on an adapter
///   that was never initialized, and being called twice.
///
/// All methods take `&self`: adapters are shared between their collection and
/// their own producing threads, so mutable state lives behind interior
/// mutability.
pub trait Adapter: AsAdapter + Send + Sync {
    fn id(&self) -> AdapterId;

    fn name(&self) -> &str;

    fn state(&self) -> AdapterState;

    /// # Errors
    ///
    /// Returns [`AdapterError::InitializationFailed`] (or any other variant)
    /// when setup fails.  The owning collection reports it; it never aborts
    /// sibling initialization.
    fn initialize(&self) -> Result<(), AdapterError>;

    fn dispose(&self);

    /// Identity stamped on every notification this adapter emits.
    fn source(&self) -> AdapterSource {
        AdapterSource::new(self.id(), self.name())
    }
}

/// An adapter that originates measurement data.
///
/// Subscribers register on the two notifiers; the adapter publishes on them
/// from whatever execution context it owns.
pub trait InputAdapter: Adapter {
    /// Raised when a new batch of measurements is available.
    fn new_entities(&self) -> &Notifier<EntityBatch>;

    /// Raised when an adapter processing a finite data set has finished.
    fn processing_complete(&self) -> &Notifier<ProcessingComplete>;
}

/// Builds an adapter of capability `T` from a configuration row.
pub trait AdapterFactory<T: ?Sized>: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when the row names an unknown
    /// adapter type or carries invalid settings.
    fn create(&self, row: &AdapterRow) -> Result<Arc<T>, AdapterError>;
}

/// Atomic [`AdapterState`] cell for adapters to embed.
#[derive(Debug, Default)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> AdapterState {
        match self.0.load(Ordering::Acquire) {
            0 => AdapterState::Uninitialized,
            1 => AdapterState::Initializing,
            2 => AdapterState::Initialized,
            _ => AdapterState::Disposed,
        }
    }

    pub fn set(&self, state: AdapterState) {
        self.0.store(Self::encode(state), Ordering::Release);
    }

    /// Move to `Disposed`, returning `false` if it already was.
    pub fn dispose(&self) -> bool {
        self.0.swap(Self::encode(AdapterState::Disposed), Ordering::AcqRel)
            != Self::encode(AdapterState::Disposed)
    }

    fn encode(state: AdapterState) -> u8 {
        match state {
            AdapterState::Uninitialized => 0,
            AdapterState::Initializing => 1,
            AdapterState::Initialized => 2,
            AdapterState::Disposed => 3,
        }
    }
}
