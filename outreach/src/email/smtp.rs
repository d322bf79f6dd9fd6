//! SMTP backend
//!
//! One pooled `lettre` transport is built up front and shared by every send.
//! A `governor` limiter caps how many messages per second are handed to the
//! server, independently of the dispatcher's own pacing.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lettre::{
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Mailbox, MultiPart,
    },
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{Email, EmailError, EmailSender};
use crate::config::{SmtpSettings, TlsMode};

/// SMTP email backend
pub struct SmtpBackend {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl SmtpBackend {
    /// Build the pooled transport from settings
    ///
    /// # Errors
    ///
    /// Returns `EmailError::ConfigError` if the relay host cannot be used for TLS.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, EmailError> {
        let mut builder = match settings.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| EmailError::config(e.to_string()))?,
            TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| EmailError::config(e.to_string()))?,
        };

        builder = builder
            .port(settings.port)
            .timeout(Some(Duration::from_secs(settings.timeout_secs)))
            .pool_config(PoolConfig::new().max_size(settings.pool_size.max(1)));

        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ));
        }

        let limiter = NonZeroU32::new(settings.max_per_second)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        tracing::debug!(
            host = %settings.host,
            port = settings.port,
            tls = ?settings.tls,
            pool_size = settings.pool_size,
            max_per_second = settings.max_per_second,
            "SMTP transport configured"
        );

        Ok(Self {
            transport: Arc::new(builder.build()),
            limiter,
        })
    }

    /// Build lettre Message from Email
    fn build_message(email: &Email) -> Result<Message, EmailError> {
        email.validate()?;

        let from_addr = email.from.as_ref().ok_or(EmailError::NoSender)?;
        let from: Mailbox = from_addr
            .parse()
            .map_err(|_| EmailError::InvalidAddress(from_addr.clone()))?;

        let mut builder = Message::builder().from(from);

        for to_addr in &email.to {
            let to: Mailbox = to_addr
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to_addr.clone()))?;
            builder = builder.to(to);
        }

        if let Some(reply_to_addr) = &email.reply_to {
            let reply_to: Mailbox = reply_to_addr
                .parse()
                .map_err(|_| EmailError::InvalidAddress(reply_to_addr.clone()))?;
            builder = builder.reply_to(reply_to);
        }

        let subject = email.subject.as_ref().ok_or(EmailError::NoSubject)?;
        builder = builder.subject(subject);

        for (name, value) in &email.headers {
            let header_name = HeaderName::new_from_ascii(name.clone())
                .map_err(|_| EmailError::InvalidHeader(name.clone()))?;
            builder = builder.raw_header(HeaderValue::new(header_name, value.clone()));
        }

        let message = match (&email.text, &email.html) {
            (Some(text), Some(html)) => builder
                .multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
                .map_err(|e| EmailError::smtp(e.to_string()))?,
            (None, Some(html)) => builder
                .header(ContentType::TEXT_HTML)
                .body(html.clone())
                .map_err(|e| EmailError::smtp(e.to_string()))?,
            (Some(text), None) => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text.clone())
                .map_err(|e| EmailError::smtp(e.to_string()))?,
            (None, None) => return Err(EmailError::NoContent),
        };

        Ok(message)
    }
}

/// Carry the server's verdict into [`EmailError`] so classification does not
/// depend on message wording alone
fn map_transport_error(error: &lettre::transport::smtp::Error) -> EmailError {
    let code = error
        .status()
        .and_then(|code| code.to_string().parse::<u16>().ok());
    EmailError::Smtp {
        message: error.to_string(),
        code,
        permanent: error.is_permanent(),
    }
}

#[async_trait]
impl EmailSender for SmtpBackend {
    async fn send(&self, email: Email) -> Result<(), EmailError> {
        let message = Self::build_message(&email)?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        self.transport
            .send(message)
            .await
            .map_err(|e| map_transport_error(&e))?;

        Ok(())
    }

    async fn verify(&self) -> Result<bool, EmailError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| map_transport_error(&e))
    }
}
