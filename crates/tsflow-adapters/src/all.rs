//! [`AllAdaptersCollection`] – the collection of collections.
//!
//! Holds the session's typed collections (input, action, output) so they can
//! be initialized as one unit, and resolves an adapter by ID or name without
//! the caller knowing which typed collection owns it.
//!
//! Members are added fully constructed by the host, so automatic
//! initialization is off: the external data source a member would need does
//! not exist yet when the collections are being assembled.  The host calls
//! [`AllAdaptersCollection::initialize`] when ready.
//!
//! Row-driven construction and ID lookup of a *collection* make no sense at
//! this level and always return [`AdapterError::NotSupported`].

use std::sync::Arc;

use tsflow_types::{AdapterError, AdapterId, AdapterRow, AdapterState};

use crate::adapter::Adapter;
use crate::collection::{AdapterCollection, CollectionHooks, CollectionInfo, ManagedCollection};
use crate::exception::ExceptionChannel;

/// Hooks for the member collections: no wiring, never auto-initialize.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemberCollections;

impl CollectionHooks<dyn ManagedCollection> for MemberCollections {
    fn auto_initialize(&self) -> bool {
        false
    }
}

/// An adapter together with the collection it was found in.
pub type AdapterMatch = (Arc<dyn Adapter>, Arc<dyn ManagedCollection>);

/// Coordinates a fixed set of typed collections.
pub struct AllAdaptersCollection {
    members: AdapterCollection<dyn ManagedCollection, MemberCollections>,
}

impl AllAdaptersCollection {
    pub fn new() -> Self {
        Self {
            members: AdapterCollection::with_hooks(
                CollectionInfo::new("All Adapters Collection", ""),
                MemberCollections,
            ),
        }
    }

    /// Report member initialization failures to `channel`.
    pub fn with_exceptions(self, channel: ExceptionChannel) -> Self {
        Self {
            members: self.members.with_exceptions(channel),
        }
    }

    pub fn info(&self) -> &CollectionInfo {
        self.members.info()
    }

    pub fn exceptions(&self) -> &ExceptionChannel {
        self.members.exceptions()
    }

    /// Always `false`; see [`try_create_adapter`][Self::try_create_adapter].
    pub fn supports_row_construction(&self) -> bool {
        false
    }

    /// Always `false`.
    pub fn auto_initialize(&self) -> bool {
        self.members.auto_initialize()
    }

    pub fn is_initialized(&self) -> bool {
        self.members.is_initialized()
    }

    pub fn state(&self) -> AdapterState {
        self.members.state()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member collections in insertion order.
    pub fn collections(&self) -> Vec<Arc<dyn ManagedCollection>> {
        self.members.snapshot()
    }

    /// Add a typed collection.  It is not initialized.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Disposed`] after [`dispose`][Self::dispose] and
    /// [`AdapterError::DuplicateId`] when a member with the same collection ID
    /// is already present.
    pub fn add(&self, collection: Arc<dyn ManagedCollection>) -> Result<(), AdapterError> {
        self.members.add(collection)
    }

    /// Remove (and dispose) a member collection.
    pub fn remove(&self, collection: &Arc<dyn ManagedCollection>) -> bool {
        self.members.remove(collection)
    }

    /// Initialize every member collection in insertion order.  A failing
    /// member is reported and the pass continues.
    ///
    /// The member list is snapshotted first; this collection's lock is not
    /// held while a member initializes, so member adapters may look adapters
    /// up through this collection from their own `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Disposed`] after [`dispose`][Self::dispose].
    pub fn initialize(&self) -> Result<(), AdapterError> {
        self.members.initialize_unlocked()
    }

    /// First adapter with `id` across all members, probing members in
    /// insertion order, together with the member that holds it.
    pub fn try_get_any_adapter_by_id(&self, id: AdapterId) -> Option<AdapterMatch> {
        self.members.snapshot().into_iter().find_map(|collection| {
            collection
                .find_adapter_by_id(id)
                .map(|adapter| (adapter, collection))
        })
    }

    /// First adapter named `name` across all members.
    pub fn try_get_any_adapter_by_name(&self, name: &str) -> Option<AdapterMatch> {
        self.members.snapshot().into_iter().find_map(|collection| {
            collection
                .find_adapter_by_name(name)
                .map(|adapter| (adapter, collection))
        })
    }

    /// Reinitialize the first adapter with `id` in any member.  Returns whether
    /// some member found it, not whether its initialization succeeded.
    pub fn try_initialize_adapter_by_id(&self, id: AdapterId) -> bool {
        self.members
            .snapshot()
            .iter()
            .any(|collection| collection.try_initialize_adapter_by_id(id))
    }

    /// Not supported: collections of collections are assembled by the host,
    /// never from configuration rows.
    ///
    /// # Errors
    ///
    /// Always [`AdapterError::NotSupported`].
    pub fn try_create_adapter(
        &self,
        _row: &AdapterRow,
    ) -> Result<Arc<dyn ManagedCollection>, AdapterError> {
        Err(self.not_supported("try_create_adapter"))
    }

    /// Not supported: look adapters up with
    /// [`try_get_any_adapter_by_id`][Self::try_get_any_adapter_by_id].
    ///
    /// # Errors
    ///
    /// Always [`AdapterError::NotSupported`].
    pub fn try_get_collection_by_id(
        &self,
        _id: AdapterId,
    ) -> Result<Arc<dyn ManagedCollection>, AdapterError> {
        Err(self.not_supported("try_get_collection_by_id"))
    }

    /// Dispose every member collection (and so every adapter they hold).
    pub fn dispose(&self) {
        self.members.dispose()
    }

    fn not_supported(&self, operation: &str) -> AdapterError {
        AdapterError::NotSupported {
            operation: operation.to_string(),
            collection: self.members.info().name.clone(),
        }
    }
}

impl Default for AllAdaptersCollection {
    fn default() -> Self {
        Self::new()
    }
}
