//! Test fixtures
//!
//! Shared by unit tests and the integration tests under `tests/`.

mod email;

pub use email::RecordingSender;

use std::sync::Arc;

use crate::config::{CampaignSettings, DispatchSettings};
use crate::dispatch::Dispatcher;
use crate::domain::Recipient;
use crate::email::EmailSender;
use crate::store::CampaignStore;

/// Recipients with only an address
#[must_use]
pub fn recipients(addresses: &[&str]) -> Vec<Recipient> {
    addresses.iter().map(|a| Recipient::new(*a)).collect()
}

/// Campaign settings with a deliverable sender and unsubscribe link
#[must_use]
pub fn campaign_settings() -> CampaignSettings {
    CampaignSettings {
        from_name: "Clinic News".to_string(),
        from_address: "news@clinic.org".to_string(),
        subject: "Spring update".to_string(),
        unsubscribe_url: "https://clinic.org/api/unsubscribe".to_string(),
        ..CampaignSettings::default()
    }
}

/// Dispatcher with no delays and the given ceiling
#[must_use]
pub fn immediate_dispatcher(
    store: Arc<dyn CampaignStore>,
    sender: Arc<dyn EmailSender>,
    daily_limit: usize,
) -> Arc<Dispatcher> {
    let settings = DispatchSettings {
        daily_limit,
        ..DispatchSettings::immediate()
    };
    Arc::new(Dispatcher::new(store, sender, campaign_settings(), settings))
}
