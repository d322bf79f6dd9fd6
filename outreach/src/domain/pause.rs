//! Persisted pause flag

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether dispatch may proceed
///
/// Overwritten wholesale on every pause or resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseState {
    /// Dispatch is halted
    pub is_paused: bool,

    /// Why dispatch was halted
    pub reason: Option<String>,

    /// When dispatch was halted
    pub paused_at: Option<DateTime<Utc>>,

    /// Last time this record was written
    pub updated_at: Option<DateTime<Utc>>,
}

impl PauseState {
    /// Paused state with an optional reason
    #[must_use]
    pub const fn paused(reason: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            is_paused: true,
            reason,
            paused_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Running state; reason and pause timestamp are cleared
    #[must_use]
    pub const fn resumed(now: DateTime<Utc>) -> Self {
        Self {
            is_paused: false,
            reason: None,
            paused_at: None,
            updated_at: Some(now),
        }
    }
}
