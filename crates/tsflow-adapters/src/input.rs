//! [`InputAdapterCollection`] – fan-in of input adapter notifications.
//!
//! Every member's "new entities" and "processing complete" notifiers are
//! subscribed to on insertion and unsubscribed from on removal.  Each
//! notification received from a member is republished on the collection's own
//! notifier with the original batch (and therefore the original producing
//! adapter as source) untouched.
//!
//! Republishing runs on the producing adapter's thread and never takes the
//! collection lock.  Each member's forwarding passes through a gate: removal
//! closes it and then waits for any forward already past it, so once
//! `remove` returns nothing from that adapter reaches the collection-level
//! streams.  A collection-level subscriber that fails is reported on
//! the exception channel as [`AdapterError::ConsumerHandler`]; the fault never
//! reaches the producing adapter and never stops delivery to the remaining
//! subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use tracing::debug;
use tsflow_types::{AdapterError, EntityBatch, NotificationKind, ProcessingComplete};

use crate::adapter::InputAdapter;
use crate::collection::{
    AdapterCollection, CollectionHooks, CollectionInfo, INPUT_COLLECTION_ID, Reporter,
};
use crate::notify::{HandlerFault, Notifier, SubscriptionId};

/// Collection of input adapters with collection-level notification streams.
pub type InputAdapterCollection = AdapterCollection<dyn InputAdapter, InputFanIn>;

// Pointer identity of a member; IDs are not guaranteed unique on insertion.
type ItemKey = usize;

fn item_key(item: &Arc<dyn InputAdapter>) -> ItemKey {
    Arc::as_ptr(item) as *const () as usize
}

#[derive(Debug, Clone)]
struct Wiring {
    new_entities: SubscriptionId,
    processing_complete: SubscriptionId,
    gate: Arc<Gate>,
}

/// Open/closed switch shared by one member's forwarding closures.
#[derive(Debug, Default)]
struct Gate {
    closed: AtomicBool,
    in_flight: RwLock<()>,
    forwarding: Mutex<Vec<ThreadId>>,
}

impl Gate {
    fn forward(&self, republish: impl FnOnce()) {
        let _pass = self.in_flight.read().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let me = thread::current().id();
        self.threads().push(me);
        republish();
        let mut threads = self.threads();
        if let Some(i) = threads.iter().position(|t| *t == me) {
            threads.swap_remove(i);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    // Waits for forwards that passed the gate before `close`.  A removal
    // issued from inside one of this gate's own forwards cannot wait for
    // itself; later forwards are still refused.
    fn wait_idle(&self) {
        if self.threads().contains(&thread::current().id()) {
            return;
        }
        drop(self.in_flight.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn threads(&self) -> MutexGuard<'_, Vec<ThreadId>> {
        self.forwarding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hooks that wire members into the collection-level notifiers.
#[derive(Debug, Default)]
pub struct InputFanIn {
    new_entities: Arc<Notifier<EntityBatch>>,
    processing_complete: Arc<Notifier<ProcessingComplete>>,
    wiring: Mutex<HashMap<ItemKey, Wiring>>,
    // Closed gates waiting for `release_item`.
    closing: Mutex<HashMap<ItemKey, Arc<Gate>>>,
}

impl InputFanIn {
    /// Number of members currently wired.
    pub fn wired_count(&self) -> usize {
        self.wiring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl CollectionHooks<dyn InputAdapter> for InputFanIn {
    fn initialize_item(&self, item: &Arc<dyn InputAdapter>, reporter: &Reporter) {
        let mut wiring = self.wiring.lock().unwrap_or_else(PoisonError::into_inner);
        let key = item_key(item);
        if wiring.contains_key(&key) {
            return;
        }

        let gate = Arc::new(Gate::default());

        let target = Arc::clone(&self.new_entities);
        let r = reporter.clone();
        let g = Arc::clone(&gate);
        let new_entities = item.new_entities().subscribe(move |batch: &EntityBatch| {
            g.forward(|| report_faults(&r, NotificationKind::NewEntities, target.publish(batch)));
            Ok(())
        });

        let target = Arc::clone(&self.processing_complete);
        let r = reporter.clone();
        let g = Arc::clone(&gate);
        let processing_complete =
            item.processing_complete()
                .subscribe(move |done: &ProcessingComplete| {
                    g.forward(|| {
                        report_faults(&r, NotificationKind::ProcessingComplete, target.publish(done))
                    });
                    Ok(())
                });

        wiring.insert(
            key,
            Wiring {
                new_entities,
                processing_complete,
                gate,
            },
        );
        debug!(adapter = %item.name(), "input adapter notifications wired");
    }

    fn dispose_item(&self, item: &Arc<dyn InputAdapter>) {
        let removed = self
            .wiring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&item_key(item));
        if let Some(w) = removed {
            w.gate.close();
            item.new_entities().unsubscribe(w.new_entities);
            item.processing_complete().unsubscribe(w.processing_complete);
            self.closing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(item_key(item), w.gate);
            debug!(adapter = %item.name(), "input adapter notifications unwired");
        }
    }

    fn release_item(&self, item: &Arc<dyn InputAdapter>) {
        let gate = self
            .closing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&item_key(item));
        if let Some(gate) = gate {
            gate.wait_idle();
        }
    }
}

fn report_faults(reporter: &Reporter, stream: NotificationKind, faults: Vec<HandlerFault>) {
    for fault in faults {
        reporter.report(AdapterError::ConsumerHandler {
            stream,
            details: fault.details,
        });
    }
}

impl InputAdapterCollection {
    /// Create an empty input adapter collection.
    ///
    /// `temporal` marks a collection used in a historical replay session.
    pub fn new(temporal: bool) -> Self {
        Self::with_hooks(
            CollectionInfo::new("Input Adapter Collection", "InputAdapters")
                .with_id(INPUT_COLLECTION_ID)
                .monitor_timer(true)
                .temporal(temporal),
            InputFanIn::default(),
        )
    }

    /// Every batch produced by any current member.
    pub fn new_entities(&self) -> &Notifier<EntityBatch> {
        &self.hooks().new_entities
    }

    /// Completion of any current member that processes a finite data set.
    pub fn processing_complete(&self) -> &Notifier<ProcessingComplete> {
        &self.hooks().processing_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Adapter;
    use crate::exception::drain;
    use crate::sim::SimInputAdapter;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tsflow_types::{AdapterSource, AdapterState, Measurement};

    /// Handler that signals `entered` and then blocks until `resume` fires.
    fn pausing_handler<E: 'static>() -> (
        impl Fn(&E) -> Result<(), crate::notify::HandlerError> + Send + Sync + 'static,
        mpsc::Receiver<()>,
        mpsc::Sender<()>,
    ) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel::<()>();
        let (entered_tx, resume_rx) = (Mutex::new(entered_tx), Mutex::new(resume_rx));
        let handler = move |_: &E| {
            entered_tx.lock().unwrap().send(()).unwrap();
            resume_rx.lock().unwrap().recv().unwrap();
            Ok::<(), crate::notify::HandlerError>(())
        };
        (handler, entered_rx, resume_tx)
    }

    fn input(id: u32, name: &str) -> Arc<SimInputAdapter> {
        Arc::new(SimInputAdapter::new(id, name))
    }

    fn collect_batches(collection: &InputAdapterCollection) -> Arc<Mutex<Vec<EntityBatch>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        collection.new_entities().subscribe(move |b: &EntityBatch| {
            sink.lock().unwrap().push(b.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn defaults_match_input_collection() {
        let collection = InputAdapterCollection::new(false);
        assert_eq!(collection.info().name, "Input Adapter Collection");
        assert_eq!(collection.info().data_member, "InputAdapters");
        assert!(collection.info().monitor_timer_enabled);
        assert!(!collection.info().temporal);
        assert!(collection.auto_initialize());
    }

    #[test]
    fn add_wires_before_returning_and_preserves_source() {
        let collection = InputAdapterCollection::new(false);
        let seen = collect_batches(&collection);
        let a = input(1, "PMU-A");
        collection.add(a.clone()).unwrap();

        assert_eq!(a.new_entities().subscriber_count(), 1);
        assert_eq!(a.processing_complete().subscriber_count(), 1);
        assert_eq!(collection.hooks().wired_count(), 1);

        a.publish(vec![Measurement::now("PMU-A:FREQ", 60.01)]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source, AdapterSource::new(1, "PMU-A"));
        assert_eq!(seen[0].entities[0].key, "PMU-A:FREQ");
    }

    #[test]
    fn processing_complete_is_republished_with_original_source() {
        let collection = InputAdapterCollection::new(true);
        let done = Arc::new(Mutex::new(Vec::new()));
        let sink = done.clone();
        collection
            .processing_complete()
            .subscribe(move |p: &ProcessingComplete| {
                sink.lock().unwrap().push(p.source.clone());
                Ok(())
            });

        let a = input(3, "Historian");
        collection.add(a.clone()).unwrap();
        a.complete();

        assert_eq!(*done.lock().unwrap(), vec![AdapterSource::new(3, "Historian")]);
    }

    #[test]
    fn removed_adapter_no_longer_delivers() {
        let collection = InputAdapterCollection::new(false);
        let seen = collect_batches(&collection);
        let a = input(1, "PMU-A");
        collection.add(a.clone()).unwrap();

        let a_dyn: Arc<dyn InputAdapter> = a.clone();
        assert!(collection.remove(&a_dyn));

        assert_eq!(a.new_entities().subscriber_count(), 0);
        assert_eq!(a.processing_complete().subscriber_count(), 0);
        assert_eq!(collection.hooks().wired_count(), 0);
        assert_eq!(a.state(), AdapterState::Disposed);

        a.publish(vec![Measurement::now("PMU-A:FREQ", 59.9)]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn publish_racing_with_removal_is_not_forwarded() {
        let collection = InputAdapterCollection::new(false);
        let seen = collect_batches(&collection);
        let a = input(1, "PMU-A");

        // Subscribed ahead of the fan-in, so the publisher is held after it
        // has snapshotted its handlers but before it forwards.
        let (hold, entered, resume) = pausing_handler::<EntityBatch>();
        a.new_entities().subscribe(hold);
        collection.add(a.clone()).unwrap();

        let publisher = {
            let a = a.clone();
            thread::spawn(move || a.publish(vec![Measurement::now("PMU-A:FREQ", 60.0)]))
        };
        entered.recv().unwrap();

        let a_dyn: Arc<dyn InputAdapter> = a.clone();
        assert!(collection.remove(&a_dyn));
        resume.send(()).unwrap();
        publisher.join().unwrap();

        assert!(seen.lock().unwrap().is_empty(), "batch delivered after removal");
    }

    #[test]
    fn removal_waits_for_forward_in_progress() {
        let collection = Arc::new(InputAdapterCollection::new(false));
        let a = input(1, "PMU-A");
        collection.add(a.clone()).unwrap();

        let (hold, entered, resume) = pausing_handler::<EntityBatch>();
        collection.new_entities().subscribe(hold);

        let publisher = {
            let a = a.clone();
            thread::spawn(move || a.publish(vec![Measurement::now("PMU-A:FREQ", 60.0)]))
        };
        entered.recv().unwrap();

        let removed = Arc::new(AtomicBool::new(false));
        let remover = {
            let collection = collection.clone();
            let removed = removed.clone();
            let a_dyn: Arc<dyn InputAdapter> = a.clone();
            thread::spawn(move || {
                assert!(collection.remove(&a_dyn));
                removed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(
            !removed.load(Ordering::SeqCst),
            "remove returned while a forward was still running"
        );

        resume.send(()).unwrap();
        publisher.join().unwrap();
        remover.join().unwrap();
        assert!(removed.load(Ordering::SeqCst));
        assert!(collection.is_empty());
        assert_eq!(a.new_entities().subscriber_count(), 0);
    }

    #[test]
    fn same_instance_cannot_be_added_twice() {
        let collection = InputAdapterCollection::new(false);
        let seen = collect_batches(&collection);
        let a = input(1, "PMU-A");
        collection.add(a.clone()).unwrap();

        assert!(matches!(
            collection.add(a.clone()),
            Err(AdapterError::DuplicateId { id: 1, .. })
        ));
        assert_eq!(collection.len(), 1);
        assert_eq!(a.new_entities().subscriber_count(), 1);

        let a_dyn: Arc<dyn InputAdapter> = a.clone();
        assert!(collection.remove(&a_dyn));
        assert!(collection.is_empty());
        assert!(collection.try_get_adapter_by_id(1).is_none());

        a.publish(vec![Measurement::now("k", 1.0)]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn double_wiring_is_ignored() {
        let collection = InputAdapterCollection::new(false);
        let a: Arc<dyn InputAdapter> = input(1, "PMU-A");
        let reporter = Reporter::new("test", collection.exceptions().clone());

        collection.hooks().initialize_item(&a, &reporter);
        collection.hooks().initialize_item(&a, &reporter);
        assert_eq!(a.new_entities().subscriber_count(), 1);

        collection.hooks().dispose_item(&a);
        collection.hooks().dispose_item(&a);
        assert_eq!(a.new_entities().subscriber_count(), 0);
    }

    #[test]
    fn consumer_fault_on_processing_complete_is_reported_and_fan_out_continues() {
        let collection = InputAdapterCollection::new(false);
        let mut rx = collection.exceptions().subscribe();
        let delivered = Arc::new(AtomicUsize::new(0));

        collection
            .processing_complete()
            .subscribe(|_: &ProcessingComplete| Err("host handler failed".into()));
        let counter = delivered.clone();
        collection
            .processing_complete()
            .subscribe(move |_: &ProcessingComplete| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let a = input(1, "PMU-A");
        collection.add(a.clone()).unwrap();
        a.complete();

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].error,
            AdapterError::ConsumerHandler {
                stream: NotificationKind::ProcessingComplete,
                details: "host handler failed".to_string(),
            }
        );
    }

    #[test]
    fn consumer_panic_on_new_entities_is_reported() {
        let collection = InputAdapterCollection::new(false);
        let mut rx = collection.exceptions().subscribe();
        collection
            .new_entities()
            .subscribe(|_: &EntityBatch| panic!("bad consumer"));
        let seen = collect_batches(&collection);

        let a = input(1, "PMU-A");
        collection.add(a.clone()).unwrap();
        a.publish(vec![Measurement::now("k", 1.0)]);

        assert_eq!(seen.lock().unwrap().len(), 1);
        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            &reports[0].error,
            AdapterError::ConsumerHandler { stream: NotificationKind::NewEntities, details }
                if details.contains("bad consumer")
        ));
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PER_ADAPTER: usize = 500;
        let collection = InputAdapterCollection::new(false);
        let seen = collect_batches(&collection);

        let a = input(1, "A");
        let b = input(2, "B");
        collection.add(a.clone()).unwrap();
        collection.add(b.clone()).unwrap();

        let producers: Vec<_> = [a, b]
            .into_iter()
            .map(|adapter| {
                thread::spawn(move || {
                    for i in 0..PER_ADAPTER {
                        adapter.publish(vec![Measurement::now("seq", i as f64)]);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2 * PER_ADAPTER);
        for id in [1, 2] {
            let values: Vec<f64> = seen
                .iter()
                .filter(|b| b.source.id == id)
                .map(|b| b.entities[0].value)
                .collect();
            let expected: Vec<f64> = (0..PER_ADAPTER).map(|i| i as f64).collect();
            assert_eq!(values, expected, "adapter {id} lost or reordered batches");
        }
    }

    #[test]
    fn subscriber_may_remove_producer_from_collection() {
        let collection = Arc::new(InputAdapterCollection::new(false));
        let a = input(1, "PMU-A");
        collection.add(a.clone()).unwrap();

        let weak = Arc::downgrade(&collection);
        collection.new_entities().subscribe(move |b: &EntityBatch| {
            if let Some(c) = weak.upgrade() {
                c.remove_by_id(b.source.id);
            }
            Ok(())
        });

        a.publish(vec![Measurement::now("k", 1.0)]);
        assert!(collection.is_empty());
        assert_eq!(a.new_entities().subscriber_count(), 0);
    }
}
