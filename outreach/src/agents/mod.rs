//! acton-reactive agents
//!
//! The store agent is the single writer for every state file; see
//! [`crate::store::agent`].

use acton_reactive::prelude::{ActorConfig, Ern};

pub mod request_reply;

pub use request_reply::{create_request_reply, send_response, ResponseChannel};

/// Agent configuration rooted at `name`
///
/// # Errors
///
/// Returns an error if `name` is not a valid ERN root.
pub fn default_agent_config(name: &str) -> anyhow::Result<ActorConfig> {
    ActorConfig::new(Ern::with_root(name)?, None, None)
}
