//! Campaign recipients

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::validation::normalize_address;

/// One candidate from the recipient list
///
/// Only the address has meaning to dispatch. Everything else the source file
/// carries is kept verbatim in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// Address as it appears in the source file
    pub email: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "nome")]
    pub name: Option<String>,

    /// Region used by the trigger filter
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "estado")]
    pub region: Option<String>,

    /// Remaining fields of the source record
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Recipient {
    /// Recipient with only an address
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            region: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the region
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Normalized address
    #[must_use]
    pub fn address(&self) -> String {
        normalize_address(&self.email)
    }

    /// Case-insensitive region match
    #[must_use]
    pub fn in_region(&self, region: &str) -> bool {
        self.region
            .as_deref()
            .is_some_and(|r| r.trim().eq_ignore_ascii_case(region.trim()))
    }
}

/// Collapse recipients sharing a normalized address, first occurrence wins
///
/// Records with a blank address are dropped.
#[must_use]
pub fn distinct_recipients(recipients: impl IntoIterator<Item = Recipient>) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|r| {
            let address = r.address();
            !address.is_empty() && seen.insert(address)
        })
        .collect()
}

/// Sorted distinct regions present in the list
#[must_use]
pub fn regions(recipients: &[Recipient]) -> Vec<String> {
    recipients
        .iter()
        .filter_map(|r| r.region.as_deref())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
