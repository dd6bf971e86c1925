//! The hosting session: builds the typed collections from configuration,
//! groups them under an [`AllAdaptersCollection`], and drives the simulated
//! input adapters while consuming the collection-level streams.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use tsflow_adapters::exception::drain;
use tsflow_adapters::sim::{SimFactory, SimInputAdapter};
use tsflow_adapters::{
    Adapter, AdapterFactory, AllAdaptersCollection, ExceptionChannel, ExceptionReceiver,
    InputAdapter, InputAdapterCollection, ManagedCollection, PlainAdapterCollection,
    ProcessException,
};
use tsflow_types::{AdapterError, AdapterRow, AdapterState, EntityBatch, ProcessingComplete};

/// How long to wait for completions between shutdown-flag checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Input factory that keeps the concrete stubs it builds so the host can drive
/// them.
#[derive(Default)]
struct DrivableInputs {
    created: Mutex<Vec<Arc<SimInputAdapter>>>,
}

impl AdapterFactory<dyn InputAdapter> for DrivableInputs {
    fn create(&self, row: &AdapterRow) -> Result<Arc<dyn InputAdapter>, AdapterError> {
        let behavior = SimFactory::behavior(row)?;
        let adapter = Arc::new(SimInputAdapter::with_behavior(row.id, &row.name, behavior));
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(adapter.clone());
        Ok(adapter)
    }
}

/// Totals gathered while the session ran.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub batches: usize,
    pub measurements: usize,
    /// Batches per producing adapter name.
    pub per_adapter: BTreeMap<String, usize>,
    pub completions: usize,
    pub exceptions: Vec<ProcessException>,
    pub interrupted: bool,
}

/// One configured session.
pub struct Session {
    pub all: AllAdaptersCollection,
    pub inputs: Arc<InputAdapterCollection>,
    // Subscribed before anything is populated, so build-time reports are kept.
    exception_rx: Mutex<ExceptionReceiver>,
    drivable: Arc<DrivableInputs>,
}

impl Session {
    /// Build and populate every typed collection from `cfg`.  Nothing is
    /// initialized yet.
    pub fn build(cfg: &crate::config::Config) -> Result<Self, String> {
        let exceptions = ExceptionChannel::default();
        let exception_rx = Mutex::new(exceptions.subscribe());
        let drivable = Arc::new(DrivableInputs::default());
        let sim = Arc::new(SimFactory::new());

        let inputs = Arc::new(
            InputAdapterCollection::new(cfg.temporal)
                .with_exceptions(exceptions.clone())
                .with_factory(drivable.clone()),
        );
        let actions = Arc::new(
            PlainAdapterCollection::action_adapters()
                .with_exceptions(exceptions.clone())
                .with_factory(sim.clone()),
        );
        let outputs = Arc::new(
            PlainAdapterCollection::output_adapters()
                .with_exceptions(exceptions.clone())
                .with_factory(sim),
        );

        let all = AllAdaptersCollection::new().with_exceptions(exceptions.clone());
        let members: [Arc<dyn ManagedCollection>; 3] =
            [inputs.clone(), actions.clone(), outputs.clone()];
        for member in members {
            all.add(member).map_err(|e| e.to_string())?;
        }

        let added = inputs.populate(&cfg.input_adapters)
            + actions.populate(&cfg.action_adapters)
            + outputs.populate(&cfg.output_adapters);
        info!(adapters = added, collections = all.len(), "session built");

        Ok(Self {
            all,
            inputs,
            exception_rx,
            drivable,
        })
    }

    /// Initialize everything, let every healthy input adapter publish
    /// `cfg.batches_per_adapter` batches on its own thread, and wait until all
    /// of them complete or `shutdown` is raised.
    pub fn run(&self, cfg: &crate::config::Config, shutdown: Arc<AtomicBool>) -> RunSummary {
        let summary = Arc::new(Mutex::new(RunSummary::default()));

        let sink = summary.clone();
        self.inputs.new_entities().subscribe(move |batch: &EntityBatch| {
            let mut s = sink.lock().unwrap_or_else(PoisonError::into_inner);
            s.batches += 1;
            s.measurements += batch.len();
            *s.per_adapter.entry(batch.source.name.clone()).or_default() += 1;
            Ok(())
        });

        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        self.inputs
            .processing_complete()
            .subscribe(move |done: &ProcessingComplete| {
                debug!(adapter = %done.source, "processing complete");
                done_tx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .send(done.source.clone())
                    .map_err(|e| e.to_string().into())
            });

        if let Err(e) = self.all.initialize() {
            warn!(error = %e, "session initialization refused");
        }

        let drivers = self.spawn_drivers(cfg, &shutdown);
        let expected = drivers.len();
        let mut completions = 0;
        let mut interrupted = false;
        while completions < expected {
            if shutdown.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }
            match done_rx.recv_timeout(POLL_INTERVAL) {
                Ok(_) => completions += 1,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        for handle in drivers {
            if handle.join().is_err() {
                warn!("input driver thread panicked");
            }
        }

        let mut result = summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        result.completions = completions;
        result.interrupted = interrupted;
        result.exceptions = drain(
            &mut self
                .exception_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        result
    }

    /// Resolve an adapter anywhere in the session and describe where it lives.
    pub fn locate(&self, name: &str) -> Option<String> {
        self.all
            .try_get_any_adapter_by_name(name)
            .map(|(adapter, collection)| {
                format!(
                    "{} (id {}, {}) in {}",
                    adapter.name(),
                    adapter.id(),
                    adapter.state(),
                    collection.info().name
                )
            })
    }

    pub fn dispose(&self) {
        self.all.dispose();
    }

    fn spawn_drivers(
        &self,
        cfg: &crate::config::Config,
        shutdown: &Arc<AtomicBool>,
    ) -> Vec<thread::JoinHandle<()>> {
        let created = self
            .drivable
            .created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        created
            .into_iter()
            .filter(|a| a.state() == AdapterState::Initialized)
            .map(|adapter| {
                let shutdown = shutdown.clone();
                let (batches, size) = (cfg.batches_per_adapter, cfg.batch_size);
                thread::spawn(move || {
                    for sequence in 0..batches {
                        if shutdown.load(Ordering::SeqCst) {
                            return;
                        }
                        adapter.publish_synthetic(sequence, size);
                    }
                    adapter.complete();
                })
            })
            .collect()
    }
}
