//! `tsflow-types` – shared vocabulary of the adapter pipeline.
//!
//! Identities, lifecycle states, the measurement batches that flow from input
//! adapters to the host, configuration rows, and the single error type used
//! across every crate in the workspace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Numeric adapter identifier.  Unique within one collection, not globally.
pub type AdapterId = u32;

/// Lifecycle of an adapter (or of a whole collection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterState {
    #[default]
    Uninitialized,
    Initializing,
    Initialized,
    Disposed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Uninitialized => write!(f, "uninitialized"),
            AdapterState::Initializing => write!(f, "initializing"),
            AdapterState::Initialized => write!(f, "initialized"),
            AdapterState::Disposed => write!(f, "disposed"),
        }
    }
}

/// Identity of the adapter that produced a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdapterSource {
    pub id: AdapterId,
    pub name: String,
}

impl AdapterSource {
    pub fn new(id: AdapterId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for AdapterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// A single time-series value.  The collection layer never looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    /// Signal key, e.g. `"PMU-A:FREQ"`.
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Measurement {
    /// New measurement stamped with the current time.
    pub fn now(key: impl Into<String>, value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            timestamp: Utc::now(),
            value,
        }
    }
}

/// Payload of a "new entities available" notification: an ordered group of
/// measurements plus the adapter that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBatch {
    pub source: AdapterSource,
    pub entities: Vec<Measurement>,
}

impl EntityBatch {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Payload of a "processing complete" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingComplete {
    pub source: AdapterSource,
}

/// The two notification streams an input adapter exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    NewEntities,
    ProcessingComplete,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::NewEntities => write!(f, "NewEntities"),
            NotificationKind::ProcessingComplete => write!(f, "ProcessingComplete"),
        }
    }
}

/// One configuration record describing an adapter to construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRow {
    pub id: AdapterId,
    pub name: String,
    /// Factory key selecting the adapter implementation, e.g. `"sim"`.
    pub type_name: String,
    #[serde(default)]
    pub connection_string: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AdapterRow {
    pub fn new(id: AdapterId, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            type_name: type_name.into(),
            connection_string: String::new(),
            enabled: true,
        }
    }
}

/// Global error type for adapter lifecycle, fan-in and configuration faults.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterError {
    #[error("Initialization failed for {name}: {details}")]
    InitializationFailed { name: String, details: String },

    #[error("Exception in consumer handler for {stream} event: {details}")]
    ConsumerHandler {
        stream: NotificationKind,
        details: String,
    },

    #[error("{operation} is not supported by {collection}")]
    NotSupported {
        operation: String,
        collection: String,
    },

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("{0} has been disposed")]
    Disposed(String),

    #[error("{collection} already contains an adapter with ID {id}")]
    DuplicateId { collection: String, id: AdapterId },

    #[error("Panicked: {0}")]
    Panicked(String),
}
