//! Campaign state storage
//!
//! The dispatcher and HTTP handlers only see [`CampaignStore`]. Three
//! implementations exist:
//!
//! - [`MemoryStore`]: in-process state for tests and dry runs
//! - [`JsonFiles`]: flat JSON files with atomic replace-on-write
//! - [`AgentStore`]: a handle to [`StoreAgent`], which owns a `JsonFiles` and
//!   serializes every read-modify-write so concurrent triggers, pauses and
//!   unsubscribes cannot lose each other's updates

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{
    normalize_address, CollapseSummary, PauseState, Recipient, SendLog, SendLogEntry,
};

pub mod agent;
pub mod json;
pub mod memory;

pub use agent::{AgentStore, StoreAgent};
pub use json::JsonFiles;
pub use memory::MemoryStore;

/// The two suppression lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionList {
    /// Addresses that failed permanently
    Bounces,
    /// Addresses whose owners unsubscribed
    OptOuts,
}

impl std::fmt::Display for SuppressionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bounces => write!(f, "bounces"),
            Self::OptOuts => write!(f, "opt-outs"),
        }
    }
}

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A state file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A state file could not be written
    #[error("failed to write {path}: {source}")]
    Write {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A state file holds malformed JSON
    #[error("malformed {path}: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// State could not be encoded
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The store agent is gone or dropped the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything dispatch needs to persist
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Full recipient list, in source order
    async fn recipients(&self) -> Result<Vec<Recipient>, StoreError>;

    /// Current send log
    async fn send_log(&self) -> Result<SendLog, StoreError>;

    /// Upsert an outcome for the entry's address
    async fn record(&self, entry: SendLogEntry) -> Result<(), StoreError>;

    /// Collapse the log to one entry per address
    async fn collapse_log(&self) -> Result<CollapseSummary, StoreError>;

    /// Stamp the first open for an address; `false` when it has no log entry
    async fn mark_opened(&self, address: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Members of a suppression list
    async fn suppressed(&self, list: SuppressionList) -> Result<HashSet<String>, StoreError>;

    /// Whether an address is on a suppression list
    async fn is_suppressed(&self, list: SuppressionList, address: &str) -> Result<bool, StoreError> {
        Ok(self.suppressed(list).await?.contains(&normalize_address(address)))
    }

    /// Add an address to a suppression list; `true` when it was not present
    async fn suppress(&self, list: SuppressionList, address: &str) -> Result<bool, StoreError>;

    /// Current pause flag
    async fn pause_state(&self) -> Result<PauseState, StoreError>;

    /// Overwrite the pause flag
    async fn set_pause_state(&self, state: PauseState) -> Result<(), StoreError>;
}
