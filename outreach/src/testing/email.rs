//! Recording mail transport with scripted failures

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::normalize_address;
use crate::email::{Email, EmailError, EmailSender};

#[derive(Debug, Clone)]
struct ScriptedFailure {
    message: String,
    code: Option<u16>,
    remaining: Option<u32>,
}

impl ScriptedFailure {
    fn error(&self) -> EmailError {
        self.code.map_or_else(
            || EmailError::smtp(self.message.clone()),
            |code| EmailError::smtp_reply(self.message.clone(), code),
        )
    }
}

#[derive(Debug, Default)]
struct Recorded {
    delivered: Vec<Email>,
    attempts: Vec<String>,
    failures: HashMap<String, ScriptedFailure>,
}

/// Sender that keeps every message in memory
///
/// Failures can be scripted per address to exercise bounce, throttling and
/// retry handling.
///
/// # Examples
///
/// ```rust
/// use outreach::email::{Email, EmailSender};
/// use outreach::testing::RecordingSender;
///
/// # async fn example() {
/// let sender = RecordingSender::new();
/// sender.fail("gone@x.com", "550 user unknown", Some(550));
///
/// let email = Email::new()
///     .to("gone@x.com")
///     .from("news@clinic.org")
///     .subject("Hi")
///     .text("Hello");
///
/// assert!(sender.send(email).await.is_err());
/// assert_eq!(sender.delivered_count(), 0);
/// assert_eq!(sender.attempts_for("gone@x.com"), 1);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSender {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSender {
    /// Sender that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every message to `address`
    pub fn fail(&self, address: &str, message: &str, code: Option<u16>) {
        self.script(address, message, code, None);
    }

    /// Reject the first `times` messages to `address`, then accept
    pub fn fail_times(&self, address: &str, times: u32, message: &str, code: Option<u16>) {
        self.script(address, message, code, Some(times));
    }

    fn script(&self, address: &str, message: &str, code: Option<u16>, remaining: Option<u32>) {
        self.recorded.lock().failures.insert(
            normalize_address(address),
            ScriptedFailure {
                message: message.to_string(),
                code,
                remaining,
            },
        );
    }

    /// Messages accepted so far
    #[must_use]
    pub fn delivered(&self) -> Vec<Email> {
        self.recorded.lock().delivered.clone()
    }

    /// Number of messages accepted
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.recorded.lock().delivered.len()
    }

    /// Recipients of accepted messages, in order
    #[must_use]
    pub fn delivered_to(&self) -> Vec<String> {
        self.recorded
            .lock()
            .delivered
            .iter()
            .flat_map(|email| email.to.iter().cloned())
            .collect()
    }

    /// Whether an accepted message went to `address`
    #[must_use]
    pub fn was_sent_to(&self, address: &str) -> bool {
        let address = normalize_address(address);
        self.delivered_to().contains(&address)
    }

    /// Every attempt, successful or not, for `address`
    #[must_use]
    pub fn attempts_for(&self, address: &str) -> usize {
        let address = normalize_address(address);
        self.recorded
            .lock()
            .attempts
            .iter()
            .filter(|a| **a == address)
            .count()
    }

    /// Total attempts
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.recorded.lock().attempts.len()
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, email: Email) -> Result<(), EmailError> {
        email.validate()?;

        let mut recorded = self.recorded.lock();
        for to in &email.to {
            let address = normalize_address(to);
            recorded.attempts.push(address.clone());

            if let Some(failure) = recorded.failures.get_mut(&address) {
                match failure.remaining {
                    Some(0) => {}
                    Some(ref mut left) => {
                        *left -= 1;
                        return Err(failure.error());
                    }
                    None => return Err(failure.error()),
                }
            }
        }

        recorded.delivered.push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> Email {
        Email::new()
            .to(to)
            .from("news@clinic.org")
            .subject("Hi")
            .text("Hello")
    }

    #[tokio::test]
    async fn test_records_deliveries() {
        let sender = RecordingSender::new();
        sender.send(email("a@x.com")).await.unwrap();
        sender.send(email("b@x.com")).await.unwrap();

        assert_eq!(sender.delivered_count(), 2);
        assert_eq!(sender.delivered_to(), vec!["a@x.com", "b@x.com"]);
        assert!(sender.was_sent_to("A@x.com"));
    }

    #[tokio::test]
    async fn test_fail_times_recovers() {
        let sender = RecordingSender::new();
        sender.fail_times("a@x.com", 2, "451 try later", Some(451));

        assert!(sender.send(email("a@x.com")).await.is_err());
        assert!(sender.send(email("a@x.com")).await.is_err());
        assert!(sender.send(email("a@x.com")).await.is_ok());
        assert_eq!(sender.attempts_for("a@x.com"), 3);
        assert_eq!(sender.delivered_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_code_is_carried() {
        let sender = RecordingSender::new();
        sender.fail("a@x.com", "user unknown", Some(550));

        let error = sender.send(email("a@x.com")).await.unwrap_err();
        assert!(matches!(error, EmailError::Smtp { code: Some(550), permanent: true, .. }));
    }
}
