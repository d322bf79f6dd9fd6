//! Per-recipient send outcomes
//!
//! The log holds at most one entry per normalized address: recording an
//! outcome replaces whatever was there ("latest outcome wins"). A `Sent`
//! entry is the only authority for "already delivered", which is what makes
//! re-running a campaign idempotent.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::validation::normalize_address;

/// Result of one delivery attempt (or of the decision not to attempt)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Accepted by the mail server
    Sent,
    /// Malformed or blocked address
    InvalidAddress,
    /// Skipped or failed because the address is on the bounce list
    Bounced,
    /// Skipped because the recipient opted out
    OptedOut,
    /// Skipped because the daily ceiling was reached
    DailyLimitReached,
    /// Skipped because the campaign was paused mid-run
    Paused,
    /// Transport failure
    Error(String),
}

impl Outcome {
    /// Whether the message was delivered
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Whether this outcome counts as a failure on the dashboard
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::InvalidAddress)
    }
}

/// One line of the send log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendLogEntry {
    /// Normalized recipient address
    pub email: String,

    /// When the outcome was recorded
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub status: Outcome,

    /// Address was (or is now) on the bounce list
    #[serde(default, skip_serializing_if = "is_false")]
    pub bounce: bool,

    /// Address is on the opt-out list
    #[serde(default, skip_serializing_if = "is_false")]
    pub opt_out: bool,

    /// First recorded open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl SendLogEntry {
    /// Entry for `address` (normalized here) recorded at `timestamp`
    pub fn new(address: &str, status: Outcome, timestamp: DateTime<Utc>) -> Self {
        let bounce = status == Outcome::Bounced;
        let opt_out = status == Outcome::OptedOut;
        Self {
            email: normalize_address(address),
            timestamp,
            status,
            bounce,
            opt_out,
            opened_at: None,
        }
    }

    /// Flag the entry as a bounce (transport failure classified permanent)
    #[must_use]
    pub const fn with_bounce(mut self) -> Self {
        self.bounce = true;
        self
    }
}

/// Counts returned by [`SendLog::collapse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseSummary {
    /// Entries before collapsing
    pub before: usize,
    /// Entries after collapsing
    pub after: usize,
    /// Entries dropped
    pub removed: usize,
}

/// The send log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SendLog {
    entries: Vec<SendLogEntry>,
}

impl SendLog {
    /// Log from raw entries (may contain duplicates from older files)
    #[must_use]
    pub const fn from_entries(entries: Vec<SendLogEntry>) -> Self {
        Self { entries }
    }

    /// All entries in file order
    #[must_use]
    pub fn entries(&self) -> &[SendLogEntry] {
        &self.entries
    }

    /// Consume into entries
    #[must_use]
    pub fn into_entries(self) -> Vec<SendLogEntry> {
        self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an outcome, replacing any previous entry for the same address
    pub fn upsert(&mut self, entry: SendLogEntry) {
        let address = entry.email.clone();
        match self.entries.iter().position(|e| e.email == address) {
            Some(index) => {
                self.entries[index] = entry;
                let mut position = 0;
                self.entries.retain(|e| {
                    let keep = position <= index || e.email != address;
                    position += 1;
                    keep
                });
            }
            None => self.entries.push(entry),
        }
    }

    /// Entry for an address
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&SendLogEntry> {
        let address = normalize_address(address);
        self.entries.iter().find(|e| e.email == address)
    }

    /// Whether the address already has a `Sent` entry
    #[must_use]
    pub fn is_sent(&self, address: &str) -> bool {
        let address = normalize_address(address);
        self.entries
            .iter()
            .any(|e| e.email == address && e.status.is_sent())
    }

    /// Addresses with a `Sent` entry
    #[must_use]
    pub fn sent_addresses(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|e| e.status.is_sent())
            .map(|e| e.email.clone())
            .collect()
    }

    /// `Sent` entries whose timestamp falls on `day` in local time
    #[must_use]
    pub fn sent_on(&self, day: NaiveDate) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status.is_sent() && e.timestamp.with_timezone(&Local).date_naive() == day)
            .count()
    }

    /// Most recent `Sent` entry
    #[must_use]
    pub fn last_sent(&self) -> Option<&SendLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.status.is_sent())
            .max_by_key(|e| e.timestamp)
    }

    /// Most recent entry of any kind
    #[must_use]
    pub fn last_entry(&self) -> Option<&SendLogEntry> {
        self.entries.iter().max_by_key(|e| e.timestamp)
    }

    /// Entries matching a predicate on the outcome
    pub fn count_where(&self, predicate: impl Fn(&SendLogEntry) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(e)).count()
    }

    /// Stamp the first open on an address's entry; `false` when there is no entry
    pub fn mark_opened(&mut self, address: &str, at: DateTime<Utc>) -> bool {
        let address = normalize_address(address);
        self.entries
            .iter_mut()
            .find(|e| e.email == address)
            .is_some_and(|entry| {
                entry.opened_at.get_or_insert(at);
                true
            })
    }

    /// Reduce to one entry per address, keeping the latest by timestamp
    ///
    /// Surviving entries stay in order of each address's first appearance.
    /// On a timestamp tie a `Sent` entry wins, otherwise the earlier entry
    /// in the file is kept.
    pub fn collapse(&mut self) -> CollapseSummary {
        let before = self.entries.len();
        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, SendLogEntry> = HashMap::new();

        for entry in self.entries.drain(..) {
            let address = normalize_address(&entry.email);
            match latest.get(&address) {
                Some(current) if supersedes(&entry, current) => {
                    latest.insert(address, entry);
                }
                Some(_) => {}
                None => {
                    order.push(address.clone());
                    latest.insert(address, entry);
                }
            }
        }

        self.entries = order
            .into_iter()
            .filter_map(|address| {
                latest.remove(&address).map(|mut entry| {
                    entry.email = address;
                    entry
                })
            })
            .collect();

        let after = self.entries.len();
        CollapseSummary {
            before,
            after,
            removed: before - after,
        }
    }
}

/// Whether `candidate` replaces `current` when collapsing
fn supersedes(candidate: &SendLogEntry, current: &SendLogEntry) -> bool {
    candidate.timestamp > current.timestamp
        || (candidate.timestamp == current.timestamp
            && candidate.status == Outcome::Sent
            && current.status != Outcome::Sent)
}
