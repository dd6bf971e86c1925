//! `tsflow-adapters` – adapter lifecycle and event-routing core.
//!
//! Manages dynamically mutable sets of independently running adapters,
//! fans their notification streams into collection-level streams, and
//! resolves adapters by identity across every collection of a session.
//!
//! # Modules
//!
//! - [`adapter`] – [`Adapter`], [`InputAdapter`] and [`AdapterFactory`]
//!   capability traits that concrete adapters implement.
//! - [`notify`] – [`Notifier`]: explicit observer registry with
//!   deterministic, idempotent unsubscription and per-handler fault isolation.
//! - [`exception`] – [`ExceptionChannel`]: where every contained failure is
//!   reported as a non-fatal [`ProcessException`].
//! - [`collection`] – [`AdapterCollection`]: the generic, lock-protected
//!   registry with per-item initialize/dispose hooks and identity lookup.
//! - [`input`] – [`InputAdapterCollection`]: fan-in of "new entities" and
//!   "processing complete" notifications from every member.
//! - [`all`] – [`AllAdaptersCollection`]: the collection of collections that
//!   drives initialization and cross-collection lookup.
//! - [`sim`] – in-process stub adapters and a row-driven factory for tests
//!   and demos.

pub mod adapter;
pub mod all;
pub mod collection;
pub mod exception;
pub mod input;
pub mod notify;
pub mod sim;

pub use adapter::{Adapter, AdapterFactory, AsAdapter, InputAdapter, Lifecycle};
pub use all::{AdapterMatch, AllAdaptersCollection, MemberCollections};
pub use collection::{
    AdapterCollection, CollectionHooks, CollectionInfo, ManagedCollection, PlainAdapterCollection,
    PlainHooks, Reporter,
};
pub use exception::{ExceptionChannel, ExceptionReceiver, ProcessException};
pub use input::{InputAdapterCollection, InputFanIn};
pub use notify::{HandlerError, HandlerFault, Notifier, SubscriptionId};
