//! Config Entries
//!
//! A config entry is one configured instance of an integration (for example
//! one Honeywell account). This crate owns the entry record, its lifecycle
//! state machine and the manager that persists entries.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking.

pub mod entry;
pub mod manager;
pub mod state_machine;
pub mod storage;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use state_machine::InvalidTransition;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
