//! Campaign dispatch
//!
//! - [`Dispatcher`]: batched, paced, pausable runs over the recipient list
//! - [`SendGate`]: daily ceiling and cooldown derived from the send log
//! - [`FailureClassifier`]: maps transport errors into [`FailureKind`]
//! - [`sending_status`], [`progress`], [`reputation_report`]: dashboard views

pub mod classify;
pub mod dispatcher;
pub mod gate;
pub mod reputation;
pub mod status;

pub use classify::{FailureClassifier, FailureKind, SignatureClassifier};
pub use dispatcher::{
    DispatchReport, DispatchRun, Dispatcher, RunSummary, StopReason, TriggerOutcome,
    DAILY_LIMIT_REASON,
};
pub use gate::{GateDecision, SendGate};
pub use reputation::{reputation_report, DailyVolume, Health, ReputationReport};
pub use status::{progress, sending_status, DispatchPhase, LastSend, ProgressStats, SendingStatus};
