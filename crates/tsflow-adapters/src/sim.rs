//! In-process simulation adapters for tests, CI and the demo host.
//!
//! # Stub behaviour
//!
//! | Type | Behaviour |
//! |---|---|
//! | [`SimAdapter`] | Counts `initialize`/`dispose` calls; optionally fails or panics on `initialize`. |
//! | [`SimInputAdapter`] | Same lifecycle; [`publish`][SimInputAdapter::publish] emits a batch and [`complete`][SimInputAdapter::complete] emits processing complete. |
//! | [`SimFactory`] | Builds either kind from an [`AdapterRow`] whose `type_name` is `"sim"` or `"sim-failing"`. |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tsflow_adapters::{InputAdapterCollection, sim::SimInputAdapter};
//! use tsflow_types::Measurement;
//!
//! let inputs = InputAdapterCollection::new(false);
//! inputs.new_entities().subscribe(|batch| {
//!     println!("{} measurements from {}", batch.len(), batch.source);
//!     Ok(())
//! });
//!
//! let pmu = Arc::new(SimInputAdapter::new(1, "PMU-A"));
//! inputs.add(pmu.clone()).unwrap();
//! pmu.publish(vec![Measurement::now("PMU-A:FREQ", 60.0)]);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;
use tsflow_types::{
    AdapterError, AdapterId, AdapterRow, AdapterState, EntityBatch, Measurement,
    ProcessingComplete,
};

use crate::adapter::{Adapter, AdapterFactory, InputAdapter, Lifecycle};
use crate::notify::Notifier;

/// How a stub reacts to `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitBehavior {
    #[default]
    Succeed,
    Fail,
    Panic,
}

/// Shared lifecycle bookkeeping for both stubs.
#[derive(Debug)]
struct SimCore {
    id: AdapterId,
    name: String,
    lifecycle: Lifecycle,
    behavior: InitBehavior,
    inits: AtomicUsize,
    disposals: AtomicUsize,
}

impl SimCore {
    fn new(id: AdapterId, name: &str, behavior: InitBehavior) -> Self {
        Self {
            id,
            name: name.to_string(),
            lifecycle: Lifecycle::new(),
            behavior,
            inits: AtomicUsize::new(0),
            disposals: AtomicUsize::new(0),
        }
    }

    fn initialize(&self) -> Result<(), AdapterError> {
        if self.lifecycle.get() == AdapterState::Disposed {
            return Err(AdapterError::Disposed(self.name.clone()));
        }
        self.inits.fetch_add(1, Ordering::SeqCst);
        self.lifecycle.set(AdapterState::Initializing);
        match self.behavior {
            InitBehavior::Succeed => {
                self.lifecycle.set(AdapterState::Initialized);
                Ok(())
            }
            InitBehavior::Fail => {
                self.lifecycle.set(AdapterState::Uninitialized);
                Err(AdapterError::InitializationFailed {
                    name: self.name.clone(),
                    details: "simulated connection refused".to_string(),
                })
            }
            InitBehavior::Panic => panic!("simulated driver crash in {}", self.name),
        }
    }

    fn dispose(&self) {
        if self.lifecycle.dispose() {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimAdapter
// ─────────────────────────────────────────────────────────────────────────────

/// Stub action/output adapter.
#[derive(Debug)]
pub struct SimAdapter {
    core: SimCore,
}

impl SimAdapter {
    pub fn new(id: AdapterId, name: &str) -> Self {
        Self::with_behavior(id, name, InitBehavior::Succeed)
    }

    /// Adapter whose every initialization attempt fails.
    pub fn failing(id: AdapterId, name: &str) -> Self {
        Self::with_behavior(id, name, InitBehavior::Fail)
    }

    /// Adapter whose initialization panics.
    pub fn panicking(id: AdapterId, name: &str) -> Self {
        Self::with_behavior(id, name, InitBehavior::Panic)
    }

    pub fn with_behavior(id: AdapterId, name: &str, behavior: InitBehavior) -> Self {
        Self {
            core: SimCore::new(id, name, behavior),
        }
    }

    pub fn init_count(&self) -> usize {
        self.core.inits.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.core.disposals.load(Ordering::SeqCst)
    }
}

impl Adapter for SimAdapter {
    fn id(&self) -> AdapterId {
        self.core.id
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn state(&self) -> AdapterState {
        self.core.lifecycle.get()
    }

    fn initialize(&self) -> Result<(), AdapterError> {
        self.core.initialize()
    }

    fn dispose(&self) {
        self.core.dispose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimInputAdapter
// ─────────────────────────────────────────────────────────────────────────────

/// Stub input adapter driven by the caller.
#[derive(Debug)]
pub struct SimInputAdapter {
    core: SimCore,
    new_entities: Notifier<EntityBatch>,
    processing_complete: Notifier<ProcessingComplete>,
    published: AtomicUsize,
}

impl SimInputAdapter {
    pub fn new(id: AdapterId, name: &str) -> Self {
        Self::with_behavior(id, name, InitBehavior::Succeed)
    }

    pub fn failing(id: AdapterId, name: &str) -> Self {
        Self::with_behavior(id, name, InitBehavior::Fail)
    }

    pub fn with_behavior(id: AdapterId, name: &str, behavior: InitBehavior) -> Self {
        Self {
            core: SimCore::new(id, name, behavior),
            new_entities: Notifier::new(),
            processing_complete: Notifier::new(),
            published: AtomicUsize::new(0),
        }
    }

    /// Emit `entities` as one batch on the "new entities" notifier.
    pub fn publish(&self, entities: Vec<Measurement>) {
        let batch = EntityBatch {
            source: self.source(),
            entities,
        };
        self.published.fetch_add(1, Ordering::SeqCst);
        let faults = self.new_entities.publish(&batch);
        if !faults.is_empty() {
            debug!(adapter = %self.core.name, faults = faults.len(), "batch subscribers faulted");
        }
    }

    /// Emit a synthetic batch of `size` measurements keyed `"<name>:CH<n>"`.
    pub fn publish_synthetic(&self, sequence: usize, size: usize) {
        let entities = (0..size)
            .map(|channel| {
                let phase = (sequence * size + channel) as f64 * 0.1;
                Measurement::now(format!("{}:CH{channel}", self.core.name), 60.0 + phase.sin() * 0.05)
            })
            .collect();
        self.publish(entities);
    }

    /// Emit "processing complete".
    pub fn complete(&self) {
        self.processing_complete.publish(&ProcessingComplete {
            source: self.source(),
        });
    }

    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub fn init_count(&self) -> usize {
        self.core.inits.load(Ordering::SeqCst)
    }
}

impl Adapter for SimInputAdapter {
    fn id(&self) -> AdapterId {
        self.core.id
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn state(&self) -> AdapterState {
        self.core.lifecycle.get()
    }

    fn initialize(&self) -> Result<(), AdapterError> {
        self.core.initialize()
    }

    fn dispose(&self) {
        self.core.dispose()
    }
}

impl InputAdapter for SimInputAdapter {
    fn new_entities(&self) -> &Notifier<EntityBatch> {
        &self.new_entities
    }

    fn processing_complete(&self) -> &Notifier<ProcessingComplete> {
        &self.processing_complete
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimFactory
// ─────────────────────────────────────────────────────────────────────────────

/// Row-driven factory for simulation adapters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimFactory;

impl SimFactory {
    pub fn new() -> Self {
        Self
    }

    /// Map a row's `type_name` to stub behaviour.
    pub fn behavior(row: &AdapterRow) -> Result<InitBehavior, AdapterError> {
        match row.type_name.as_str() {
            "sim" => Ok(InitBehavior::Succeed),
            "sim-failing" => Ok(InitBehavior::Fail),
            other => Err(AdapterError::Configuration(format!(
                "unknown adapter type '{other}' for {}",
                row.name
            ))),
        }
    }
}

impl AdapterFactory<dyn Adapter> for SimFactory {
    fn create(&self, row: &AdapterRow) -> Result<Arc<dyn Adapter>, AdapterError> {
        let behavior = Self::behavior(row)?;
        Ok(Arc::new(SimAdapter::with_behavior(row.id, &row.name, behavior)))
    }
}

impl AdapterFactory<dyn InputAdapter> for SimFactory {
    fn create(&self, row: &AdapterRow) -> Result<Arc<dyn InputAdapter>, AdapterError> {
        let behavior = Self::behavior(row)?;
        Ok(Arc::new(SimInputAdapter::with_behavior(
            row.id, &row.name, behavior,
        )))
    }
}
