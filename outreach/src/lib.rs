//! Outreach - guarded campaign mail dispatch
//!
//! Sends one campaign message to every address on a static recipient list,
//! at a pace mailbox providers tolerate:
//! - Fixed-size batches with delays between messages and between batches
//! - A daily ceiling and a cooldown, both derived from the send log
//! - Bounce and opt-out suppression lists checked before every send
//! - A persisted pause flag that stops a run at the next message boundary
//! - An upsert send log that makes re-running a campaign idempotent
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acton_reactive::prelude::ActonApp;
//! use outreach::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     outreach::observability::init()?;
//!
//!     let mut runtime = ActonApp::launch_async().await;
//!     let config = OutreachConfig::load_for_service("campaign")?;
//!     let bind = config.server.bind_address();
//!     let state = OutreachState::new(&mut runtime, config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind(&bind).await?;
//!     axum::serve(listener, outreach::handlers::router(state)).await?;
//!
//!     runtime.shutdown_all().await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::missing_errors_doc)]

pub mod agents;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod email;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod state;
pub mod store;
pub mod testing;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use outreach::prelude::*;
    //! ```

    pub use crate::config::{DispatchSettings, OutreachConfig};
    pub use crate::dispatch::{
        DispatchReport, DispatchRun, Dispatcher, FailureClassifier, FailureKind, StopReason,
        TriggerOutcome,
    };
    pub use crate::domain::{Outcome, PauseState, Recipient, SendLog, SendLogEntry};
    pub use crate::email::{ConsoleBackend, Email, EmailError, EmailSender, SmtpBackend};
    pub use crate::error::OutreachError;
    pub use crate::state::OutreachState;
    pub use crate::store::{AgentStore, CampaignStore, JsonFiles, MemoryStore, SuppressionList};
}
