//! Console backend: logs messages instead of delivering them

use async_trait::async_trait;

use super::{Email, EmailError, EmailSender};

/// Logs every message at `info` level
///
/// Useful for rehearsing a campaign without an SMTP server. Messages still
/// go through [`Email::validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleBackend {
    verbose: bool,
}

impl ConsoleBackend {
    /// Log recipients and subject only
    #[must_use]
    pub const fn new() -> Self {
        Self { verbose: false }
    }

    /// Log message bodies as well
    #[must_use]
    pub const fn verbose() -> Self {
        Self { verbose: true }
    }
}

#[async_trait]
impl EmailSender for ConsoleBackend {
    async fn send(&self, email: Email) -> Result<(), EmailError> {
        email.validate()?;

        tracing::info!(
            to = ?email.to,
            from = ?email.from,
            subject = ?email.subject,
            headers = email.headers.len(),
            "Email (console backend)"
        );

        if self.verbose {
            if let Some(text) = &email.text {
                tracing::info!(body = %text, "Text body");
            }
            if let Some(html) = &email.html {
                tracing::info!(body = %html, "HTML body");
            }
        }

        Ok(())
    }
}
