//! Email builder with fluent API

use serde::{Deserialize, Serialize};

use super::EmailError;

/// An outgoing message
///
/// ```rust
/// use outreach::email::Email;
///
/// let email = Email::new()
///     .to("ana@mail.com")
///     .from("Campaign <campaign@mail.org>")
///     .subject("Hello")
///     .text("Plain body")
///     .html("<p>HTML body</p>")
///     .header("Precedence", "bulk");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Recipients (To)
    pub to: Vec<String>,

    /// Sender (From), may include a display name
    pub from: Option<String>,

    /// Reply-To address
    pub reply_to: Option<String>,

    /// Subject line
    pub subject: Option<String>,

    /// Plain text body
    pub text: Option<String>,

    /// HTML body
    pub html: Option<String>,

    /// Extra headers in insertion order
    pub headers: Vec<(String, String)>,
}

impl Email {
    /// Empty message
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipient
    #[must_use]
    pub fn to(mut self, address: &str) -> Self {
        self.to.push(address.to_string());
        self
    }

    /// Set the sender
    #[must_use]
    pub fn from(mut self, address: &str) -> Self {
        self.from = Some(address.to_string());
        self
    }

    /// Set the Reply-To address
    #[must_use]
    pub fn reply_to(mut self, address: &str) -> Self {
        self.reply_to = Some(address.to_string());
        self
    }

    /// Set the subject
    #[must_use]
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Set the plain text body
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Set the HTML body
    #[must_use]
    pub fn html(mut self, html: &str) -> Self {
        self.html = Some(html.to_string());
        self
    }

    /// Append a header
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Value of the first header with this name (case-insensitive)
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check that the message can be handed to a transport
    ///
    /// # Errors
    ///
    /// Returns the first missing piece: recipients, sender, subject or body.
    pub fn validate(&self) -> Result<(), EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }
        if self.from.is_none() {
            return Err(EmailError::NoSender);
        }
        if self.subject.is_none() {
            return Err(EmailError::NoSubject);
        }
        if self.text.is_none() && self.html.is_none() {
            return Err(EmailError::NoContent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let email = Email::new()
            .to("a@x.com")
            .from("b@x.com")
            .reply_to("c@x.com")
            .subject("Hi")
            .text("plain")
            .header("Precedence", "bulk");

        assert_eq!(email.to, vec!["a@x.com"]);
        assert_eq!(email.reply_to.as_deref(), Some("c@x.com"));
        assert_eq!(email.header_value("precedence"), Some("bulk"));
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_parts() {
        assert!(matches!(Email::new().validate(), Err(EmailError::NoRecipients)));
        assert!(matches!(Email::new().to("a@x.com").validate(), Err(EmailError::NoSender)));
        assert!(matches!(
            Email::new().to("a@x.com").from("b@x.com").validate(),
            Err(EmailError::NoSubject)
        ));
        assert!(matches!(
            Email::new().to("a@x.com").from("b@x.com").subject("s").validate(),
            Err(EmailError::NoContent)
        ));
    }
}
