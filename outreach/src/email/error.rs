//! Email error types

use thiserror::Error;

/// Errors that can occur when building or sending an email
#[derive(Debug, Error)]
pub enum EmailError {
    /// Email has no recipients
    #[error("email must have at least one recipient")]
    NoRecipients,

    /// Email has no sender
    #[error("email must have a from address")]
    NoSender,

    /// Email has no subject
    #[error("email must have a subject")]
    NoSubject,

    /// Email has no body content
    #[error("email must have either text or HTML content")]
    NoContent,

    /// Invalid email address format
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid custom header
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Template rendering error
    #[error("failed to render email template: {0}")]
    TemplateError(#[from] askama::Error),

    /// The server or connection rejected the message
    #[error("SMTP error: {message}")]
    Smtp {
        /// Server or transport message
        message: String,
        /// SMTP reply code when the server sent one
        code: Option<u16>,
        /// Server answered with a permanent (5xx) rejection
        permanent: bool,
    },

    /// A configured link is not a valid absolute URL
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Email configuration error
    #[error("email configuration error: {0}")]
    ConfigError(String),
}

impl EmailError {
    /// SMTP error without structured details
    #[must_use]
    pub fn smtp<T: Into<String>>(msg: T) -> Self {
        Self::Smtp {
            message: msg.into(),
            code: None,
            permanent: false,
        }
    }

    /// SMTP error carrying the server's reply code
    #[must_use]
    pub fn smtp_reply<T: Into<String>>(msg: T, code: u16) -> Self {
        Self::Smtp {
            message: msg.into(),
            code: Some(code),
            permanent: (500..600).contains(&code),
        }
    }

    /// Configuration error
    #[must_use]
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::ConfigError(msg.into())
    }
}
