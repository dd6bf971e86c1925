//! [`AdapterCollection`] – generic, thread-safe adapter registry and lifecycle
//! coordinator.
//!
//! A collection is an ordered index of adapters of one capability kind `T`
//! (`dyn InputAdapter`, `dyn Adapter`, `dyn ManagedCollection`, …) plus a
//! [`CollectionHooks`] policy `H` that specializes what happens when items
//! enter and leave.  Specializations are separate instantiations of this one
//! type rather than a subclass chain:
//!
//! | Alias | `T` | `H` |
//! |---|---|---|
//! | [`InputAdapterCollection`][crate::input::InputAdapterCollection] | `dyn InputAdapter` | [`InputFanIn`][crate::input::InputFanIn] |
//! | [`PlainAdapterCollection`] | `dyn Adapter` | [`PlainHooks`] |
//! | members of [`AllAdaptersCollection`][crate::all::AllAdaptersCollection] | `dyn ManagedCollection` | `MemberCollections` |
//!
//! # Locking
//!
//! Every operation that walks or mutates the index holds the collection's
//! single mutex for its whole duration, so an item is never visible in the
//! index after its teardown ran, nor missing from it before.  Adapters publish
//! their notifications from their own threads without this lock.  Adapter
//! `initialize` runs under the lock, so an adapter must not synchronously
//! re-enter its own collection from `initialize`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use tsflow_types::{AdapterError, AdapterId, AdapterRow, AdapterState};

use crate::adapter::{Adapter, AdapterFactory, Lifecycle};
use crate::exception::ExceptionChannel;
use crate::notify::panic_message;

// ─────────────────────────────────────────────────────────────────────────────
// Descriptive attributes
// ─────────────────────────────────────────────────────────────────────────────

/// Static attributes of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Numeric ID of the collection itself; collections are adapters too.
    pub id: AdapterId,
    /// Display name, also used as the origin of reported exceptions.
    pub name: String,
    /// Configuration table the collection is populated from.
    pub data_member: String,
    pub monitor_timer_enabled: bool,
    /// Whether the collection belongs to a temporal (historical replay) session.
    pub temporal: bool,
}

impl CollectionInfo {
    pub fn new(name: impl Into<String>, data_member: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            data_member: data_member.into(),
            monitor_timer_enabled: false,
            temporal: false,
        }
    }

    pub fn with_id(mut self, id: AdapterId) -> Self {
        self.id = id;
        self
    }

    pub fn monitor_timer(mut self, enabled: bool) -> Self {
        self.monitor_timer_enabled = enabled;
        self
    }

    pub fn temporal(mut self, temporal: bool) -> Self {
        self.temporal = temporal;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reporter
// ─────────────────────────────────────────────────────────────────────────────

/// An [`ExceptionChannel`] bound to the name of the reporting collection.
/// Hooks clone it into the callbacks they register.
#[derive(Clone, Debug)]
pub struct Reporter {
    origin: Arc<str>,
    channel: ExceptionChannel,
}

impl Reporter {
    pub fn new(origin: &str, channel: ExceptionChannel) -> Self {
        Self {
            origin: Arc::from(origin),
            channel,
        }
    }

    pub fn report(&self, error: AdapterError) {
        self.channel.report(&self.origin, error);
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn channel(&self) -> &ExceptionChannel {
        &self.channel
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Specialization policy for an [`AdapterCollection`].
///
/// The base behaviour runs after each hook: on insertion the adapter's own
/// `initialize` (when [`auto_initialize`][Self::auto_initialize] is on), on
/// removal the adapter's `dispose`.  Hooks only add collection-specific
/// wiring on top.
pub trait CollectionHooks<T: ?Sized>: Send + Sync {
    /// Read at insertion time.
    fn auto_initialize(&self) -> bool {
        true
    }

    /// Called exactly once per insertion, under the collection lock.
    fn initialize_item(&self, _item: &Arc<T>, _reporter: &Reporter) {}

    /// Called before an item leaves the collection, under the collection lock.
    fn dispose_item(&self, _item: &Arc<T>) {}

    /// Called once the item is out of the index and the collection lock has
    /// been released.  Blocks until work the item started before removal
    /// (such as a notification already being forwarded) has finished.
    fn release_item(&self, _item: &Arc<T>) {}
}

/// Hooks with no wiring: the base behaviour only.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHooks;

impl<T: ?Sized> CollectionHooks<T> for PlainHooks {}

// ─────────────────────────────────────────────────────────────────────────────
// AdapterCollection
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, mutable registry of adapters of capability `T`.
pub struct AdapterCollection<T: ?Sized, H> {
    info: CollectionInfo,
    items: Mutex<Vec<Arc<T>>>,
    initialized: AtomicBool,
    lifecycle: Lifecycle,
    hooks: H,
    reporter: Reporter,
    factory: Option<Arc<dyn AdapterFactory<T>>>,
}

/// IDs of the standard collections, distinct so they can share one
/// [`AllAdaptersCollection`][crate::all::AllAdaptersCollection].
pub const INPUT_COLLECTION_ID: AdapterId = 1;
pub const ACTION_COLLECTION_ID: AdapterId = 2;
pub const OUTPUT_COLLECTION_ID: AdapterId = 3;

/// Collection of plain adapters, used for action and output adapters.
pub type PlainAdapterCollection = AdapterCollection<dyn Adapter, PlainHooks>;

impl<T, H> AdapterCollection<T, H>
where
    T: ?Sized + Adapter,
    H: CollectionHooks<T>,
{
    /// Create an empty collection reporting to a private exception channel.
    pub fn with_hooks(info: CollectionInfo, hooks: H) -> Self {
        let reporter = Reporter::new(&info.name, ExceptionChannel::default());
        Self {
            info,
            items: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            lifecycle: Lifecycle::new(),
            hooks,
            reporter,
            factory: None,
        }
    }

    /// Report to `channel` instead, typically one shared by the whole session.
    pub fn with_exceptions(mut self, channel: ExceptionChannel) -> Self {
        self.reporter = Reporter::new(&self.info.name, channel);
        self
    }

    /// Attach the factory used by [`try_create_adapter`][Self::try_create_adapter].
    pub fn with_factory(mut self, factory: Arc<dyn AdapterFactory<T>>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn exceptions(&self) -> &ExceptionChannel {
        self.reporter.channel()
    }

    pub fn auto_initialize(&self) -> bool {
        self.hooks.auto_initialize()
    }

    /// Whether the last full [`initialize`][Self::initialize] pass completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Members in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.lock().clone()
    }

    /// Insert `item`, wire it through the hooks and, when auto-initialize is
    /// on, initialize it.  An initialization failure is reported; the item
    /// stays in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Disposed`] when the collection has been
    /// disposed, and [`AdapterError::DuplicateId`] when a member (including
    /// `item` itself) already carries the same ID.
    pub fn add(&self, item: Arc<T>) -> Result<(), AdapterError> {
        let mut items = self.lock();
        if self.lifecycle.get() == AdapterState::Disposed {
            return Err(AdapterError::Disposed(self.info.name.clone()));
        }
        if items.iter().any(|i| i.id() == item.id()) {
            return Err(AdapterError::DuplicateId {
                collection: self.info.name.clone(),
                id: item.id(),
            });
        }

        items.push(Arc::clone(&item));
        self.hooks.initialize_item(&item, &self.reporter);
        debug!(
            collection = %self.info.name,
            adapter_id = item.id(),
            adapter = %item.name(),
            "adapter added"
        );

        if self.hooks.auto_initialize() {
            self.initialize_item(&item);
        }
        Ok(())
    }

    /// Tear `item` down and drop it from the index.  Returns `false` when it
    /// was not a member.
    ///
    /// Once this returns, the item delivers nothing more through the
    /// collection.
    pub fn remove(&self, item: &Arc<T>) -> bool {
        let removed = {
            let mut items = self.lock();
            items
                .iter()
                .position(|i| Arc::ptr_eq(i, item))
                .map(|index| {
                    self.dispose_item(&items[index]);
                    items.remove(index)
                })
        };
        match removed {
            Some(item) => {
                self.hooks.release_item(&item);
                true
            }
            None => false,
        }
    }

    /// Like [`remove`][Self::remove], keyed by adapter ID.
    pub fn remove_by_id(&self, id: AdapterId) -> Option<Arc<T>> {
        let removed = {
            let mut items = self.lock();
            let index = items.iter().position(|i| i.id() == id)?;
            self.dispose_item(&items[index]);
            items.remove(index)
        };
        self.hooks.release_item(&removed);
        Some(removed)
    }

    /// Initialize every member in insertion order.
    ///
    /// A failing member is reported and skipped; the pass always completes and
    /// marks the collection initialized.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Disposed`] when the collection has been
    /// disposed.
    pub fn initialize(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::Release);

        {
            let items = self.lock();
            if self.lifecycle.get() == AdapterState::Disposed {
                return Err(AdapterError::Disposed(self.info.name.clone()));
            }
            self.lifecycle.set(AdapterState::Initializing);
            for item in items.iter() {
                self.initialize_item(item);
            }
            self.lifecycle.set(AdapterState::Initialized);
        }

        self.initialized.store(true, Ordering::Release);
        info!(collection = %self.info.name, members = self.len(), "collection initialized");
        Ok(())
    }

    /// Like [`initialize`][Self::initialize], but walks a snapshot of the
    /// members and does not hold the lock while each one initializes.  A
    /// member removed mid-pass is skipped.  Used where members are themselves
    /// collections with locks of their own.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Disposed`] when the collection has been
    /// disposed, before or during the pass.
    pub fn initialize_unlocked(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::Release);

        let members = {
            let items = self.lock();
            if self.lifecycle.get() == AdapterState::Disposed {
                return Err(AdapterError::Disposed(self.info.name.clone()));
            }
            self.lifecycle.set(AdapterState::Initializing);
            items.clone()
        };

        for member in &members {
            if self.contains(member) {
                self.initialize_item(member);
            }
        }

        let items = self.lock();
        if self.lifecycle.get() == AdapterState::Disposed {
            return Err(AdapterError::Disposed(self.info.name.clone()));
        }
        self.lifecycle.set(AdapterState::Initialized);
        self.initialized.store(true, Ordering::Release);
        info!(collection = %self.info.name, members = items.len(), "collection initialized");
        Ok(())
    }

    /// Whether `item` (by identity) is currently a member.
    pub fn contains(&self, item: &Arc<T>) -> bool {
        self.lock().iter().any(|i| Arc::ptr_eq(i, item))
    }

    /// First member with `id`, in insertion order.
    pub fn try_get_adapter_by_id(&self, id: AdapterId) -> Option<Arc<T>> {
        self.lock().iter().find(|i| i.id() == id).cloned()
    }

    /// First member named `name`, in insertion order.
    pub fn try_get_adapter_by_name(&self, name: &str) -> Option<Arc<T>> {
        self.lock().iter().find(|i| i.name() == name).cloned()
    }

    /// Re-run initialization of a single member without touching its
    /// siblings.  Returns whether the adapter was found; initialization
    /// failures are reported, not returned.
    pub fn try_initialize_adapter_by_id(&self, id: AdapterId) -> bool {
        let items = self.lock();
        match items.iter().find(|i| i.id() == id) {
            Some(item) => {
                self.initialize_item(item);
                true
            }
            None => false,
        }
    }

    /// Build an adapter from a configuration row with the attached factory.
    /// The adapter is not added.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when no factory is attached or
    /// the factory rejects the row.
    pub fn try_create_adapter(&self, row: &AdapterRow) -> Result<Arc<T>, AdapterError> {
        match &self.factory {
            Some(factory) => factory.create(row),
            None => Err(AdapterError::Configuration(format!(
                "no adapter factory attached to {}",
                self.info.name
            ))),
        }
    }

    /// Create and add an adapter for every enabled row.  Rows the factory
    /// rejects are reported and skipped.  Returns the number added.
    pub fn populate(&self, rows: &[AdapterRow]) -> usize {
        let mut added = 0;
        for row in rows.iter().filter(|r| r.enabled) {
            let result = self
                .try_create_adapter(row)
                .and_then(|adapter| self.add(adapter));
            match result {
                Ok(()) => added += 1,
                Err(e) => self.reporter.report(e),
            }
        }
        debug!(collection = %self.info.name, added, "collection populated");
        added
    }

    /// Dispose and remove every member, then mark the collection disposed.
    /// Calling it again is a no-op.
    pub fn dispose(&self) {
        let released: Vec<Arc<T>> = {
            let mut items = self.lock();
            if !self.lifecycle.dispose() {
                return;
            }
            let drained: Vec<Arc<T>> = items.drain(..).collect();
            for item in &drained {
                self.dispose_item(item);
            }
            self.initialized.store(false, Ordering::Release);
            drained
        };
        for item in &released {
            self.hooks.release_item(item);
        }
        debug!(collection = %self.info.name, "collection disposed");
    }

    pub fn state(&self) -> AdapterState {
        self.lifecycle.get()
    }

    // Base half of item initialization; runs after `H::initialize_item`
    // wiring.
    fn initialize_item(&self, item: &Arc<T>) {
        if let Err(e) = isolate(|| item.initialize()) {
            let error = match e {
                AdapterError::InitializationFailed { .. } => e,
                other => AdapterError::InitializationFailed {
                    name: item.name().to_string(),
                    details: other.to_string(),
                },
            };
            self.reporter.report(error);
        }
    }

    // Hook teardown followed by the adapter's own dispose.
    fn dispose_item(&self, item: &Arc<T>) {
        self.hooks.dispose_item(item);
        if let Err(e) = isolate(|| {
            item.dispose();
            Ok(())
        }) {
            self.reporter.report(e);
        }
        debug!(
            collection = %self.info.name,
            adapter_id = item.id(),
            adapter = %item.name(),
            "adapter removed"
        );
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlainAdapterCollection {
    /// Collection for action (transformation) adapters.
    pub fn action_adapters() -> Self {
        Self::with_hooks(
            CollectionInfo::new("Action Adapter Collection", "ActionAdapters")
                .with_id(ACTION_COLLECTION_ID)
                .monitor_timer(true),
            PlainHooks,
        )
    }

    /// Collection for output (sink) adapters.
    pub fn output_adapters() -> Self {
        Self::with_hooks(
            CollectionInfo::new("Output Adapter Collection", "OutputAdapters")
                .with_id(OUTPUT_COLLECTION_ID)
                .monitor_timer(true),
            PlainHooks,
        )
    }
}

/// Run adapter code, turning a panic into [`AdapterError::Panicked`].
pub(crate) fn isolate<F>(f: F) -> Result<(), AdapterError>
where
    F: FnOnce() -> Result<(), AdapterError>,
{
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|panic| Err(AdapterError::Panicked(panic_message(panic.as_ref()))))
}

// ─────────────────────────────────────────────────────────────────────────────
// ManagedCollection
// ─────────────────────────────────────────────────────────────────────────────

/// Object-safe view of any collection, so collections of different adapter
/// kinds can sit side by side in one
/// [`AllAdaptersCollection`][crate::all::AllAdaptersCollection].
pub trait ManagedCollection: Adapter {
    fn info(&self) -> &CollectionInfo;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_initialized(&self) -> bool;

    fn find_adapter_by_id(&self, id: AdapterId) -> Option<Arc<dyn Adapter>>;

    fn find_adapter_by_name(&self, name: &str) -> Option<Arc<dyn Adapter>>;

    fn try_initialize_adapter_by_id(&self, id: AdapterId) -> bool;
}

impl<T, H> Adapter for AdapterCollection<T, H>
where
    T: ?Sized + Adapter + 'static,
    H: CollectionHooks<T> + 'static,
{
    fn id(&self) -> AdapterId {
        self.info.id
    }

    fn name(&self) -> &str {
        &self.info.name
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.get()
    }

    fn initialize(&self) -> Result<(), AdapterError> {
        AdapterCollection::initialize(self)
    }

    fn dispose(&self) {
        AdapterCollection::dispose(self)
    }
}

impl<T, H> ManagedCollection for AdapterCollection<T, H>
where
    T: ?Sized + Adapter + 'static,
    H: CollectionHooks<T> + 'static,
{
    fn info(&self) -> &CollectionInfo {
        &self.info
    }

    fn len(&self) -> usize {
        AdapterCollection::len(self)
    }

    fn is_initialized(&self) -> bool {
        AdapterCollection::is_initialized(self)
    }

    fn find_adapter_by_id(&self, id: AdapterId) -> Option<Arc<dyn Adapter>> {
        self.try_get_adapter_by_id(id).map(|a| a.as_adapter())
    }

    fn find_adapter_by_name(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.try_get_adapter_by_name(name).map(|a| a.as_adapter())
    }

    fn try_initialize_adapter_by_id(&self, id: AdapterId) -> bool {
        AdapterCollection::try_initialize_adapter_by_id(self, id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::drain;
    use crate::sim::{SimAdapter, SimFactory};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn plain(id: AdapterId, name: &str) -> Arc<SimAdapter> {
        Arc::new(SimAdapter::new(id, name))
    }

    /// Hooks that count their invocations.
    #[derive(Default)]
    struct CountingHooks {
        wired: AtomicUsize,
        unwired: AtomicUsize,
        released: AtomicUsize,
        auto: bool,
    }

    impl CollectionHooks<dyn Adapter> for CountingHooks {
        fn auto_initialize(&self) -> bool {
            self.auto
        }
        fn initialize_item(&self, _item: &Arc<dyn Adapter>, _reporter: &Reporter) {
            self.wired.fetch_add(1, Ordering::SeqCst);
        }
        fn dispose_item(&self, _item: &Arc<dyn Adapter>) {
            self.unwired.fetch_add(1, Ordering::SeqCst);
        }
        fn release_item(&self, item: &Arc<dyn Adapter>) {
            assert_eq!(item.state(), AdapterState::Disposed, "released before dispose");
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(auto: bool) -> AdapterCollection<dyn Adapter, CountingHooks> {
        AdapterCollection::with_hooks(
            CollectionInfo::new("Counting", "Counting"),
            CountingHooks {
                auto,
                ..Default::default()
            },
        )
    }

    #[test]
    fn add_auto_initializes_and_wires() {
        let collection = PlainAdapterCollection::action_adapters();
        let a = plain(1, "A");
        collection.add(a.clone()).unwrap();

        assert_eq!(collection.len(), 1);
        assert_eq!(a.state(), AdapterState::Initialized);
        assert_eq!(a.init_count(), 1);
    }

    #[test]
    fn add_without_auto_initialize_still_runs_hook() {
        let collection = counting(false);
        let a = plain(1, "A");
        collection.add(a.clone()).unwrap();

        assert_eq!(collection.hooks().wired.load(Ordering::SeqCst), 1);
        assert_eq!(a.state(), AdapterState::Uninitialized);
        assert_eq!(a.init_count(), 0);
    }

    #[test]
    fn remove_runs_hook_then_dispose() {
        let collection = counting(false);
        let a = plain(1, "A");
        let b = plain(2, "B");
        collection.add(a.clone()).unwrap();
        collection.add(b.clone()).unwrap();

        let a_dyn: Arc<dyn Adapter> = a.clone();
        assert!(collection.remove(&a_dyn));
        assert!(!collection.remove(&a_dyn), "second remove finds nothing");

        assert_eq!(collection.hooks().unwired.load(Ordering::SeqCst), 1);
        assert_eq!(collection.hooks().released.load(Ordering::SeqCst), 1);
        assert_eq!(a.state(), AdapterState::Disposed);
        assert_eq!(b.state(), AdapterState::Uninitialized);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn remove_by_id_returns_the_removed_adapter() {
        let collection = PlainAdapterCollection::output_adapters();
        collection.add(plain(5, "sink")).unwrap();

        let removed = collection.remove_by_id(5).expect("adapter 5 present");
        assert_eq!(removed.name(), "sink");
        assert_eq!(removed.state(), AdapterState::Disposed);
        assert!(collection.remove_by_id(5).is_none());
        assert!(collection.is_empty());
    }

    #[test]
    fn index_tracks_adds_and_removes() {
        let collection = counting(true);
        let adapters: Vec<Arc<dyn Adapter>> =
            (0..6).map(|i| plain(i, &format!("A{i}")) as Arc<dyn Adapter>).collect();
        for a in &adapters {
            collection.add(a.clone()).unwrap();
        }
        collection.remove(&adapters[1]);
        collection.remove(&adapters[4]);

        let ids: Vec<AdapterId> = collection.snapshot().iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![0, 2, 3, 5]);
        assert_eq!(collection.hooks().wired.load(Ordering::SeqCst), 6);
        assert_eq!(collection.hooks().unwired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn initialize_reports_failure_and_continues() {
        let collection = counting(false);
        let mut rx = collection.exceptions().subscribe();
        let m1 = Arc::new(SimAdapter::failing(1, "M1"));
        let m2 = plain(2, "M2");
        collection.add(m1.clone()).unwrap();
        collection.add(m2.clone()).unwrap();

        collection.initialize().unwrap();

        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].origin, "Counting");
        assert!(matches!(
            &reports[0].error,
            AdapterError::InitializationFailed { name, .. } if name == "M1"
        ));
        assert_eq!(m2.state(), AdapterState::Initialized);
        assert!(collection.is_initialized());
    }

    #[test]
    fn panicking_adapter_is_contained() {
        let collection = counting(false);
        let mut rx = collection.exceptions().subscribe();
        collection.add(Arc::new(SimAdapter::panicking(1, "P"))).unwrap();
        let ok = plain(2, "OK");
        collection.add(ok.clone()).unwrap();

        collection.initialize().unwrap();

        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].error.to_string().contains("Initialization failed for P"));
        assert_eq!(ok.state(), AdapterState::Initialized);
        assert!(collection.is_initialized());
    }

    #[test]
    fn lookups_return_match_or_none() {
        let collection = PlainAdapterCollection::action_adapters();
        collection.add(plain(7, "first")).unwrap();
        collection.add(plain(8, "first")).unwrap();

        assert_eq!(collection.try_get_adapter_by_id(8).unwrap().id(), 8);
        assert_eq!(collection.try_get_adapter_by_name("first").unwrap().id(), 7);
        assert!(collection.try_get_adapter_by_id(99).is_none());
        assert!(collection.try_get_adapter_by_name("missing").is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let collection = counting(true);
        let a: Arc<dyn Adapter> = plain(1, "A");
        let b: Arc<dyn Adapter> = plain(1, "B");
        collection.add(a.clone()).unwrap();

        assert_eq!(
            collection.add(b.clone()),
            Err(AdapterError::DuplicateId {
                collection: "Counting".to_string(),
                id: 1,
            })
        );
        assert!(matches!(
            collection.add(a.clone()),
            Err(AdapterError::DuplicateId { id: 1, .. })
        ));
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.hooks().wired.load(Ordering::SeqCst), 1);
        assert_eq!(b.state(), AdapterState::Uninitialized, "rejected item untouched");

        assert!(collection.remove(&a));
        assert!(collection.is_empty());
        assert!(collection.try_get_adapter_by_id(1).is_none());
        assert!(!collection.remove(&a));
    }

    #[test]
    fn populate_reports_duplicate_rows() {
        let collection = PlainAdapterCollection::action_adapters()
            .with_factory(Arc::new(SimFactory::new()));
        let mut rx = collection.exceptions().subscribe();
        let rows = vec![
            AdapterRow::new(1, "calc", "sim"),
            AdapterRow::new(1, "calc-copy", "sim"),
        ];

        assert_eq!(collection.populate(&rows), 1);
        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].error, AdapterError::DuplicateId { id: 1, .. }));
        assert_eq!(collection.try_get_adapter_by_id(1).unwrap().name(), "calc");
    }

    #[test]
    fn try_initialize_adapter_by_id_reports_found_not_success() {
        let collection = counting(false);
        let mut rx = collection.exceptions().subscribe();
        let a = plain(1, "A");
        collection.add(a.clone()).unwrap();
        collection.add(Arc::new(SimAdapter::failing(2, "B"))).unwrap();

        assert!(collection.try_initialize_adapter_by_id(1));
        assert_eq!(a.init_count(), 1);

        assert!(collection.try_initialize_adapter_by_id(2), "found even though init fails");
        assert_eq!(drain(&mut rx).len(), 1);

        assert!(!collection.try_initialize_adapter_by_id(3));
    }

    #[test]
    fn populate_creates_enabled_rows_and_reports_rejects() {
        let collection = PlainAdapterCollection::action_adapters()
            .with_factory(Arc::new(SimFactory::new()));
        let mut rx = collection.exceptions().subscribe();

        let mut disabled = AdapterRow::new(3, "off", "sim");
        disabled.enabled = false;
        let rows = vec![
            AdapterRow::new(1, "calc", "sim"),
            AdapterRow::new(2, "bogus", "modbus"),
            disabled,
        ];

        assert_eq!(collection.populate(&rows), 1);
        assert_eq!(collection.len(), 1);
        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].error, AdapterError::Configuration(_)));
    }

    #[test]
    fn try_create_adapter_without_factory_is_configuration_error() {
        let collection = PlainAdapterCollection::output_adapters();
        let result = collection.try_create_adapter(&AdapterRow::new(1, "x", "sim"));
        assert!(matches!(result, Err(AdapterError::Configuration(_))));
    }

    #[test]
    fn dispose_tears_down_every_member() {
        let collection = counting(true);
        let a = plain(1, "A");
        let b = plain(2, "B");
        collection.add(a.clone()).unwrap();
        collection.add(b.clone()).unwrap();

        collection.dispose();
        collection.dispose();

        assert!(collection.is_empty());
        assert_eq!(collection.hooks().unwired.load(Ordering::SeqCst), 2);
        assert_eq!(collection.hooks().released.load(Ordering::SeqCst), 2);
        assert_eq!(a.state(), AdapterState::Disposed);
        assert_eq!(b.state(), AdapterState::Disposed);
        assert_eq!(collection.state(), AdapterState::Disposed);
        assert!(matches!(collection.add(plain(3, "C")), Err(AdapterError::Disposed(_))));
        assert!(matches!(collection.initialize(), Err(AdapterError::Disposed(_))));
    }

    #[test]
    fn concurrent_adds_and_removes_keep_index_consistent() {
        let collection = Arc::new(counting(true));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let collection = collection.clone();
                thread::spawn(move || {
                    for i in 0..50u32 {
                        let a: Arc<dyn Adapter> = plain(t * 1000 + i, "worker");
                        collection.add(a.clone()).unwrap();
                        if i % 2 == 0 {
                            assert!(collection.remove(&a));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(collection.len(), 4 * 25);
        let hooks = collection.hooks();
        assert_eq!(hooks.wired.load(Ordering::SeqCst), 200);
        assert_eq!(hooks.unwired.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn collection_is_itself_an_adapter() {
        let collection = PlainAdapterCollection::action_adapters();
        collection.add(plain(1, "A")).unwrap();
        let as_managed: &dyn ManagedCollection = &collection;

        assert_eq!(as_managed.name(), "Action Adapter Collection");
        assert_eq!(as_managed.info().data_member, "ActionAdapters");
        assert_eq!(ManagedCollection::len(as_managed), 1);
        assert_eq!(as_managed.find_adapter_by_id(1).unwrap().name(), "A");
        assert!(as_managed.find_adapter_by_name("nope").is_none());
    }
}
