//! Mail transport
//!
//! [`EmailSender`] is the seam between dispatch and delivery. Backends:
//!
//! - [`SmtpBackend`]: pooled, rate-limited SMTP via `lettre`
//! - [`ConsoleBackend`]: logs messages, for rehearsals
//!
//! [`CampaignComposer`] renders the campaign templates for a recipient.

mod builder;
mod console;
mod error;
mod sender;
mod smtp;
mod template;

pub use builder::Email;
pub use console::ConsoleBackend;
pub use error::EmailError;
pub use sender::EmailSender;
pub use smtp::SmtpBackend;
pub use template::{with_email_param, CampaignComposer};

#[cfg(test)]
pub use sender::MockEmailSender;
