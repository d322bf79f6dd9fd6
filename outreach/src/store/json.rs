//! Flat JSON file persistence
//!
//! Reads of mutable state fail open: a missing file is empty state, and a
//! malformed file is moved aside to `<name>.corrupt` and treated as empty so
//! the next write cannot silently destroy it. Every write goes to a temporary
//! file in the same directory and is renamed over the target.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{StoreError, SuppressionList};
use crate::config::StorageSettings;
use crate::domain::{
    normalize_address, CollapseSummary, PauseState, Recipient, SendLog, SendLogEntry,
};

/// File-backed campaign state
#[derive(Debug, Clone, Default)]
pub struct JsonFiles {
    settings: StorageSettings,
}

impl JsonFiles {
    /// Files laid out according to `settings`
    #[must_use]
    pub const fn new(settings: StorageSettings) -> Self {
        Self { settings }
    }

    /// Default file names under `data_dir`
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(StorageSettings {
            data_dir: data_dir.into(),
            ..StorageSettings::default()
        })
    }

    /// Absolute path of a state file
    #[must_use]
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.settings.data_dir.join(file_name)
    }

    fn suppression_path(&self, list: SuppressionList) -> PathBuf {
        match list {
            SuppressionList::Bounces => self.path(&self.settings.bounces_file),
            SuppressionList::OptOuts => self.path(&self.settings.opt_outs_file),
        }
    }

    /// Load the recipient list; unlike other state it must exist and parse
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] or [`StoreError::Parse`].
    pub fn load_recipients(&self) -> Result<Vec<Recipient>, StoreError> {
        let path = self.path(&self.settings.recipients_file);
        let raw = std::fs::read(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| StoreError::Parse { path, source })
    }

    /// Current send log (empty when missing or unreadable)
    #[must_use]
    pub fn load_send_log(&self) -> SendLog {
        read_or_default(&self.path(&self.settings.send_log_file))
    }

    /// Replace the send log
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] when the file cannot be replaced.
    pub fn save_send_log(&self, log: &SendLog) -> Result<(), StoreError> {
        write_atomic(&self.path(&self.settings.send_log_file), log)
    }

    /// Members of a suppression list (empty when missing or unreadable)
    #[must_use]
    pub fn load_suppression(&self, list: SuppressionList) -> Vec<String> {
        read_or_default(&self.suppression_path(list))
    }

    /// Current pause flag (running when missing or unreadable)
    #[must_use]
    pub fn load_pause(&self) -> PauseState {
        read_or_default(&self.path(&self.settings.pause_file))
    }

    /// Overwrite the pause flag
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] when the file cannot be replaced.
    pub fn save_pause(&self, state: &PauseState) -> Result<(), StoreError> {
        write_atomic(&self.path(&self.settings.pause_file), state)
    }

    /// Upsert one outcome
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] when the log cannot be replaced.
    pub fn record(&self, entry: SendLogEntry) -> Result<(), StoreError> {
        let mut log = self.load_send_log();
        log.upsert(entry);
        self.save_send_log(&log)
    }

    /// Collapse the log in place
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] when the log cannot be replaced.
    pub fn collapse_log(&self) -> Result<CollapseSummary, StoreError> {
        let mut log = self.load_send_log();
        let summary = log.collapse();
        if summary.removed > 0 {
            self.save_send_log(&log)?;
        }
        Ok(summary)
    }

    /// Stamp the first open for an address
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] when the log cannot be replaced.
    pub fn mark_opened(&self, address: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut log = self.load_send_log();
        if !log.mark_opened(address, at) {
            return Ok(false);
        }
        self.save_send_log(&log)?;
        Ok(true)
    }

    /// Add an address to a suppression list if absent
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] when the list cannot be replaced.
    pub fn suppress(&self, list: SuppressionList, address: &str) -> Result<bool, StoreError> {
        let address = normalize_address(address);
        let mut members = self.load_suppression(list);
        if members.iter().any(|m| normalize_address(m) == address) {
            return Ok(false);
        }
        members.push(address);
        write_atomic(&self.suppression_path(list), &members)?;
        Ok(true)
    }

    /// Suppression list as a lookup set
    #[must_use]
    pub fn suppression_set(&self, list: SuppressionList) -> HashSet<String> {
        self.load_suppression(list)
            .iter()
            .map(|m| normalize_address(m))
            .collect()
    }
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read state file, using empty state");
            return T::default();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(e) => {
            let aside = path.with_extension("json.corrupt");
            tracing::warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "Malformed state file, using empty state"
            );
            if let Err(e) = std::fs::rename(path, &aside) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to move malformed state file aside");
            }
            T::default()
        }
    }
}

fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let body = serde_json::to_vec_pretty(value)?;
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(&body).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
