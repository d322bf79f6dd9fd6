//! Daily ceiling and cooldown gate
//!
//! Both limits are derived from the send log; nothing separate is stored.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::domain::SendLog;

/// Verdict of [`SendGate::evaluate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateDecision {
    /// Sending may proceed
    Open {
        /// Successful sends so far today
        sent_today: usize,
        /// Sends left before the ceiling
        remaining_today: usize,
    },
    /// The day's ceiling is met
    DailyLimitReached {
        /// Successful sends today
        sent_today: usize,
        /// Configured ceiling
        limit: usize,
    },
    /// The last successful send is too recent
    CoolingDown {
        /// Successful sends so far today
        sent_today: usize,
        /// Wait left before the next send
        #[serde(serialize_with = "serialize_secs")]
        remaining: Duration,
        /// Earliest moment sending may resume
        next_send_at: DateTime<Utc>,
    },
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Daily ceiling plus minimum spacing after the last successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendGate {
    daily_limit: usize,
    cooldown: Duration,
}

impl SendGate {
    /// Gate with the given ceiling and cooldown
    #[must_use]
    pub const fn new(daily_limit: usize, cooldown: Duration) -> Self {
        Self {
            daily_limit,
            cooldown,
        }
    }

    /// Configured ceiling
    #[must_use]
    pub const fn daily_limit(&self) -> usize {
        self.daily_limit
    }

    /// Successful sends on the local calendar day containing `now`
    #[must_use]
    pub fn sent_today(log: &SendLog, now: DateTime<Utc>) -> usize {
        log.sent_on(now.with_timezone(&Local).date_naive())
    }

    /// Wait left before the cooldown elapses (zero when it has)
    #[must_use]
    pub fn cooldown_remaining(&self, log: &SendLog, now: DateTime<Utc>) -> Duration {
        log.last_sent()
            .and_then(|last| (now - last.timestamp).to_std().ok())
            .map_or(Duration::ZERO, |elapsed| self.cooldown.saturating_sub(elapsed))
    }

    /// Decide whether sending may proceed at `now`
    #[must_use]
    pub fn evaluate(&self, log: &SendLog, now: DateTime<Utc>) -> GateDecision {
        let sent_today = Self::sent_today(log, now);
        if sent_today >= self.daily_limit {
            return GateDecision::DailyLimitReached {
                sent_today,
                limit: self.daily_limit,
            };
        }

        let remaining = self.cooldown_remaining(log, now);
        if !remaining.is_zero() {
            let next_send_at = now
                + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
            return GateDecision::CoolingDown {
                sent_today,
                remaining,
                next_send_at,
            };
        }

        GateDecision::Open {
            sent_today,
            remaining_today: self.daily_limit - sent_today,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Outcome, SendLogEntry};

    fn sent(address: &str, at: DateTime<Utc>) -> SendLogEntry {
        SendLogEntry::new(address, Outcome::Sent, at)
    }

    #[test]
    fn test_open_on_empty_log() {
        let gate = SendGate::new(100, Duration::from_secs(60));
        assert_eq!(
            gate.evaluate(&SendLog::default(), Utc::now()),
            GateDecision::Open {
                sent_today: 0,
                remaining_today: 100
            }
        );
    }

    #[test]
    fn test_daily_limit_counts_only_sent_today() {
        let now = Utc::now();
        let gate = SendGate::new(2, Duration::ZERO);
        let log = SendLog::from_entries(vec![
            sent("a@x.com", now),
            sent("b@x.com", now - chrono::Duration::days(2)),
            SendLogEntry::new("c@x.com", Outcome::Error("x".into()), now),
        ]);
        assert!(matches!(gate.evaluate(&log, now), GateDecision::Open { sent_today: 1, .. }));

        let log = SendLog::from_entries(vec![sent("a@x.com", now), sent("b@x.com", now)]);
        assert_eq!(
            gate.evaluate(&log, now),
            GateDecision::DailyLimitReached {
                sent_today: 2,
                limit: 2
            }
        );
    }

    #[test]
    fn test_cooldown_reports_remaining_wait() {
        let now = Utc::now();
        let gate = SendGate::new(100, Duration::from_secs(60));
        let log = SendLog::from_entries(vec![sent("a@x.com", now - chrono::Duration::seconds(20))]);

        match gate.evaluate(&log, now) {
            GateDecision::CoolingDown {
                remaining,
                next_send_at,
                ..
            } => {
                assert_eq!(remaining, Duration::from_secs(40));
                assert_eq!(next_send_at, now + chrono::Duration::seconds(40));
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
    }

    #[test]
    fn test_cooldown_ignores_failed_attempts() {
        let now = Utc::now();
        let gate = SendGate::new(100, Duration::from_secs(60));
        let log = SendLog::from_entries(vec![
            sent("a@x.com", now - chrono::Duration::seconds(90)),
            SendLogEntry::new("b@x.com", Outcome::Error("x".into()), now),
        ]);
        assert!(matches!(gate.evaluate(&log, now), GateDecision::Open { .. }));
    }
}
