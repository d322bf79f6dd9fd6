//! Delivery failure classification
//!
//! Transport errors are mapped into a closed set of categories before the
//! dispatcher acts on them. Structured SMTP data wins over message wording;
//! wording is only consulted when the server gave no verdict.
//!
//! A 5xx reply only condemns the address when it is about the recipient:
//! enhanced status `5.1.x`/`5.2.x`, or a bare 550/551/553. Authentication,
//! relay and policy refusals are [`FailureKind::Rejected`]; they say nothing
//! about the mailbox and must not grow the bounce list.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::email::EmailError;

/// What a failed delivery means for the address and the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The address will never accept mail; suppress it
    Permanent,
    /// Worth another attempt later
    Transient,
    /// The provider is limiting us; stop the run
    Throttled,
    /// The server refused the session or sender (auth, relay, policy);
    /// stop the run without blaming the address
    Rejected,
}

/// Enhanced status code (RFC 3463) at the start of an SMTP reply text
static ENHANCED_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([245])\.(\d{1,3})\.\d{1,3}\b").expect("Invalid regex"));

/// Basic reply codes that are about the recipient mailbox
const RECIPIENT_CODES: [u16; 3] = [550, 551, 553];

/// Maps a transport error to a [`FailureKind`]
pub trait FailureClassifier: Send + Sync {
    /// Classify one failure
    fn classify(&self, error: &EmailError) -> FailureKind;
}

/// Default classifier: SMTP reply data first, then known message signatures
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    throttle_signatures: Vec<String>,
    permanent_signatures: Vec<String>,
    rejection_signatures: Vec<String>,
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self {
            throttle_signatures: [
                "rate limit",
                "too many",
                "quota",
                "throttl",
                "try again later",
                "sending limit",
            ]
            .map(String::from)
            .to_vec(),
            permanent_signatures: [
                "permanent",
                "bounce",
                "invalid",
                "user unknown",
                "mailbox unavailable",
                "does not exist",
                "no such user",
            ]
            .map(String::from)
            .to_vec(),
            rejection_signatures: [
                "relay",
                "authenticat",
                "credential",
                "policy",
                "spam",
                "sender address rejected",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl SignatureClassifier {
    fn matches(signatures: &[String], message: &str) -> bool {
        let message = message.to_lowercase();
        signatures.iter().any(|s| message.contains(s.as_str()))
    }

    /// Wording-only verdict for errors without a reply code
    fn fallback(&self, message: &str) -> FailureKind {
        if Self::matches(&self.rejection_signatures, message) {
            FailureKind::Rejected
        } else if Self::matches(&self.permanent_signatures, message) {
            FailureKind::Permanent
        } else {
            FailureKind::Transient
        }
    }

    /// Classify a 5xx reply by what it is about
    fn classify_rejection(&self, message: &str, code: u16) -> FailureKind {
        if let Some(subject) = ENHANCED_STATUS
            .captures(message)
            .filter(|caps| &caps[1] == "5")
            .map(|caps| caps[2].to_string())
        {
            return match subject.as_str() {
                "1" | "2" => FailureKind::Permanent,
                _ => FailureKind::Rejected,
            };
        }

        if RECIPIENT_CODES.contains(&code) && !Self::matches(&self.rejection_signatures, message) {
            FailureKind::Permanent
        } else {
            FailureKind::Rejected
        }
    }
}

impl FailureClassifier for SignatureClassifier {
    fn classify(&self, error: &EmailError) -> FailureKind {
        match error {
            EmailError::Smtp { message, code, .. } => {
                if Self::matches(&self.throttle_signatures, message) || *code == Some(421) {
                    return FailureKind::Throttled;
                }
                match code {
                    Some(code) if (500..600).contains(code) => {
                        self.classify_rejection(message, *code)
                    }
                    Some(_) => FailureKind::Transient,
                    None => self.fallback(message),
                }
            }
            EmailError::InvalidAddress(_) => FailureKind::Permanent,
            _ => FailureKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(error: &EmailError) -> FailureKind {
        SignatureClassifier::default().classify(error)
    }

    #[test]
    fn test_5xx_reply_is_permanent() {
        assert_eq!(
            classify(&EmailError::smtp_reply("5.1.1 recipient rejected", 550)),
            FailureKind::Permanent
        );
    }

    #[test]
    fn test_session_and_policy_rejections_do_not_blame_the_address() {
        for (message, code) in [
            ("5.7.8 Username and Password not accepted", 535),
            ("5.7.0 Authentication required", 530),
            ("5.7.1 Relaying denied", 554),
            ("Relay access denied", 550),
            ("5.5.1 Unrecognized command", 500),
            ("Message rejected under policy", 552),
        ] {
            assert_eq!(
                classify(&EmailError::smtp_reply(message, code)),
                FailureKind::Rejected,
                "{code} {message}"
            );
        }
    }

    #[test]
    fn test_recipient_rejections_are_permanent() {
        assert_eq!(
            classify(&EmailError::smtp_reply("mailbox unavailable", 550)),
            FailureKind::Permanent
        );
        assert_eq!(
            classify(&EmailError::smtp_reply("5.2.1 The email account that you tried to reach is disabled", 550)),
            FailureKind::Permanent
        );
        assert_eq!(
            classify(&EmailError::smtp_reply("5.1.10 Recipient not found", 554)),
            FailureKind::Permanent
        );
    }

    #[test]
    fn test_4xx_reply_is_transient_even_with_bounce_wording() {
        assert_eq!(
            classify(&EmailError::smtp_reply("greylisted, invalid state", 451)),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_quota_wording_is_throttled_even_on_5xx() {
        assert_eq!(
            classify(&EmailError::smtp_reply("5.4.5 Daily sending quota exceeded", 550)),
            FailureKind::Throttled
        );
        assert_eq!(
            classify(&EmailError::smtp_reply("too many connections", 421)),
            FailureKind::Throttled
        );
    }

    #[test]
    fn test_unstructured_message_falls_back_to_signatures() {
        assert_eq!(
            classify(&EmailError::smtp("Permanent failure: mailbox unavailable")),
            FailureKind::Permanent
        );
        assert_eq!(
            classify(&EmailError::smtp("Rate limit exceeded")),
            FailureKind::Throttled
        );
        assert_eq!(
            classify(&EmailError::smtp("535 authentication failed")),
            FailureKind::Rejected
        );
        assert_eq!(classify(&EmailError::smtp("connection reset")), FailureKind::Transient);
    }

    #[test]
    fn test_non_transport_errors() {
        assert_eq!(
            classify(&EmailError::InvalidAddress("a b@x.com".into())),
            FailureKind::Permanent
        );
        assert_eq!(classify(&EmailError::NoSubject), FailureKind::Transient);
    }
}
