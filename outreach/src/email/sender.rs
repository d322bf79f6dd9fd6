//! Email sender trait abstraction

use async_trait::async_trait;

use super::{Email, EmailError};

/// A mail transport
///
/// Implemented by [`SmtpBackend`](super::SmtpBackend),
/// [`ConsoleBackend`](super::ConsoleBackend) and the recording sender in
/// [`crate::testing`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Hand one message to the transport
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if the message is invalid or the transport rejects it
    async fn send(&self, email: Email) -> Result<(), EmailError>;

    /// Check that the transport is reachable and accepts our credentials
    ///
    /// # Errors
    ///
    /// Returns `EmailError` when the check cannot be performed
    async fn verify(&self) -> Result<bool, EmailError> {
        Ok(true)
    }
}
