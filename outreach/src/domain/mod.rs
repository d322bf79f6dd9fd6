//! Campaign domain model: recipients, send log, pause flag and address rules

pub mod pause;
pub mod recipient;
pub mod send_log;
pub mod validation;

pub use pause::PauseState;
pub use recipient::{distinct_recipients, regions, Recipient};
pub use send_log::{CollapseSummary, Outcome, SendLog, SendLogEntry};
pub use validation::{normalize_address, AddressValidator};
