//! In-process store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;

use super::{CampaignStore, StoreError, SuppressionList};
use crate::domain::{
    normalize_address, CollapseSummary, PauseState, Recipient, SendLog, SendLogEntry,
};

#[derive(Debug, Default)]
struct Inner {
    recipients: Vec<Recipient>,
    log: SendLog,
    bounces: HashSet<String>,
    opt_outs: HashSet<String>,
    pause: PauseState,
}

impl Inner {
    const fn list_mut(&mut self, list: SuppressionList) -> &mut HashSet<String> {
        match list {
            SuppressionList::Bounces => &mut self.bounces,
            SuppressionList::OptOuts => &mut self.opt_outs,
        }
    }
}

/// Campaign state held in memory
///
/// # Examples
///
/// ```rust
/// use outreach::domain::Recipient;
/// use outreach::store::{MemoryStore, SuppressionList};
///
/// let store = MemoryStore::new()
///     .with_recipients(vec![Recipient::new("a@x.com")])
///     .with_suppressed(SuppressionList::Bounces, ["c@x.com"]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the recipient list
    #[must_use]
    pub fn with_recipients(self, recipients: Vec<Recipient>) -> Self {
        self.inner.lock().recipients = recipients;
        self
    }

    /// Seed the send log
    #[must_use]
    pub fn with_log(self, entries: Vec<SendLogEntry>) -> Self {
        self.inner.lock().log = SendLog::from_entries(entries);
        self
    }

    /// Seed a suppression list
    #[must_use]
    pub fn with_suppressed<I, S>(self, list: SuppressionList, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        {
            let mut inner = self.inner.lock();
            let set = inner.list_mut(list);
            set.extend(addresses.into_iter().map(|a| normalize_address(a.as_ref())));
        }
        self
    }

    /// Seed the pause flag
    #[must_use]
    pub fn with_pause(self, state: PauseState) -> Self {
        self.inner.lock().pause = state;
        self
    }

    /// Copy of the current send log
    #[must_use]
    pub fn log_snapshot(&self) -> SendLog {
        self.inner.lock().log.clone()
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn recipients(&self) -> Result<Vec<Recipient>, StoreError> {
        Ok(self.inner.lock().recipients.clone())
    }

    async fn send_log(&self) -> Result<SendLog, StoreError> {
        Ok(self.inner.lock().log.clone())
    }

    async fn record(&self, entry: SendLogEntry) -> Result<(), StoreError> {
        self.inner.lock().log.upsert(entry);
        Ok(())
    }

    async fn collapse_log(&self) -> Result<CollapseSummary, StoreError> {
        Ok(self.inner.lock().log.collapse())
    }

    async fn mark_opened(&self, address: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.inner.lock().log.mark_opened(address, at))
    }

    async fn suppressed(&self, list: SuppressionList) -> Result<HashSet<String>, StoreError> {
        Ok(self.inner.lock().list_mut(list).clone())
    }

    async fn suppress(&self, list: SuppressionList, address: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().list_mut(list).insert(normalize_address(address)))
    }

    async fn pause_state(&self) -> Result<PauseState, StoreError> {
        Ok(self.inner.lock().pause.clone())
    }

    async fn set_pause_state(&self, state: PauseState) -> Result<(), StoreError> {
        self.inner.lock().pause = state;
        Ok(())
    }
}
