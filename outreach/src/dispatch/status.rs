//! Dashboard views over the send log

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::gate::SendGate;
use crate::domain::{distinct_recipients, Outcome, PauseState, Recipient, SendLog};

/// Coarse state of the campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    /// The pause flag is set
    Paused,
    /// A run is in flight
    Sending,
    /// The cooldown since the last send has not elapsed
    CoolingDown,
    /// A trigger would start a run
    Ready,
    /// Nothing has been sent yet
    NoSends,
}

impl DispatchPhase {
    /// Human-readable label
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Paused => "Sending is paused",
            Self::Sending => "Sending in progress",
            Self::CoolingDown => "Waiting for the cooldown to elapse",
            Self::Ready => "Ready to send",
            Self::NoSends => "No messages sent yet",
        }
    }
}

/// Most recent log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastSend {
    /// Recipient address
    pub email: String,
    /// When the outcome was recorded
    pub timestamp: DateTime<Utc>,
    /// Recorded outcome
    pub status: Outcome,
}

/// Computed status served to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendingStatus {
    /// Pause flag
    pub is_paused: bool,
    /// Recorded pause reason
    pub pause_reason: Option<String>,
    /// A run is in flight in this process
    pub is_sending: bool,
    /// `Sent` entries
    pub total_sent: usize,
    /// `Error` and `InvalidAddress` entries
    pub total_errors: usize,
    /// `Paused` entries
    pub total_paused: usize,
    /// Successful sends today
    pub sent_today: usize,
    /// Daily ceiling
    pub daily_limit: usize,
    /// Coarse state
    pub phase: DispatchPhase,
    /// Label for `phase`
    pub message: &'static str,
    /// Most recent entry of any kind
    pub last_send: Option<LastSend>,
    /// When the cooldown elapses, if it has not
    pub next_send_at: Option<DateTime<Utc>>,
    /// Seconds of cooldown left
    pub cooldown_remaining_secs: u64,
    /// Seconds since the last successful send
    pub since_last_send_secs: Option<i64>,
    /// When this status was computed
    pub last_updated: DateTime<Utc>,
}

/// Build the dashboard status at `now`
#[must_use]
pub fn sending_status(
    log: &SendLog,
    pause: &PauseState,
    is_sending: bool,
    gate: &SendGate,
    now: DateTime<Utc>,
) -> SendingStatus {
    let cooldown = gate.cooldown_remaining(log, now);
    let last_sent_at = log.last_sent().map(|e| e.timestamp);

    let phase = if pause.is_paused {
        DispatchPhase::Paused
    } else if is_sending {
        DispatchPhase::Sending
    } else if last_sent_at.is_none() {
        DispatchPhase::NoSends
    } else if cooldown.is_zero() {
        DispatchPhase::Ready
    } else {
        DispatchPhase::CoolingDown
    };

    let next_send_at = (!cooldown.is_zero())
        .then(|| chrono::Duration::from_std(cooldown).ok())
        .flatten()
        .map(|remaining| now + remaining);

    SendingStatus {
        is_paused: pause.is_paused,
        pause_reason: pause.reason.clone(),
        is_sending,
        total_sent: log.count_where(|e| e.status.is_sent()),
        total_errors: log.count_where(|e| e.status.is_error()),
        total_paused: log.count_where(|e| e.status == Outcome::Paused),
        sent_today: SendGate::sent_today(log, now),
        daily_limit: gate.daily_limit(),
        phase,
        message: phase.describe(),
        last_send: log.last_entry().map(|e| LastSend {
            email: e.email.clone(),
            timestamp: e.timestamp,
            status: e.status.clone(),
        }),
        next_send_at,
        cooldown_remaining_secs: cooldown.as_secs(),
        since_last_send_secs: last_sent_at.map(|at| (now - at).num_seconds()),
        last_updated: now,
    }
}

/// How far the campaign has progressed through the list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    /// Distinct addresses on the list
    pub unique_recipients: usize,
    /// Of those, delivered
    pub already_sent: usize,
    /// Of those, not yet delivered
    pub remaining: usize,
    /// `already_sent / unique_recipients`, in percent with one decimal
    pub percent_complete: f64,
}

/// Progress of `recipients` according to `log`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress(recipients: &[Recipient], log: &SendLog) -> ProgressStats {
    let distinct = distinct_recipients(recipients.iter().cloned());
    let sent = log.sent_addresses();
    let unique_recipients = distinct.len();
    let already_sent = distinct.iter().filter(|r| sent.contains(&r.address())).count();

    let percent_complete = if unique_recipients == 0 {
        0.0
    } else {
        (already_sent as f64 * 1000.0 / unique_recipients as f64).round() / 10.0
    };

    ProgressStats {
        unique_recipients,
        already_sent,
        remaining: unique_recipients - already_sent,
        percent_complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SendLogEntry;
    use std::time::Duration;

    fn gate() -> SendGate {
        SendGate::new(100, Duration::from_secs(60))
    }

    #[test]
    fn test_empty_log_has_no_sends() {
        let status = sending_status(
            &SendLog::default(),
            &PauseState::default(),
            false,
            &gate(),
            Utc::now(),
        );
        assert_eq!(status.phase, DispatchPhase::NoSends);
        assert!(status.last_send.is_none());
        assert!(status.next_send_at.is_none());
    }

    #[test]
    fn test_pause_wins_over_everything() {
        let now = Utc::now();
        let status = sending_status(
            &SendLog::default(),
            &PauseState::paused(Some("manual".into()), now),
            true,
            &gate(),
            now,
        );
        assert_eq!(status.phase, DispatchPhase::Paused);
        assert_eq!(status.pause_reason.as_deref(), Some("manual"));
        assert!(status.is_sending);
    }

    #[test]
    fn test_recent_send_is_cooling_down() {
        let now = Utc::now();
        let log = SendLog::from_entries(vec![
            SendLogEntry::new("a@x.com", Outcome::Sent, now - chrono::Duration::seconds(15)),
            SendLogEntry::new("b@x.com", Outcome::Error("x".into()), now),
            SendLogEntry::new("c@x.com", Outcome::Paused, now),
        ]);

        let status = sending_status(&log, &PauseState::default(), false, &gate(), now);

        assert_eq!(status.phase, DispatchPhase::CoolingDown);
        assert_eq!(status.cooldown_remaining_secs, 45);
        assert_eq!(status.since_last_send_secs, Some(15));
        assert_eq!((status.total_sent, status.total_errors, status.total_paused), (1, 1, 1));
        assert_eq!(status.sent_today, 1);
    }

    #[test]
    fn test_old_send_is_ready() {
        let now = Utc::now();
        let log = SendLog::from_entries(vec![SendLogEntry::new(
            "a@x.com",
            Outcome::Sent,
            now - chrono::Duration::minutes(5),
        )]);
        let status = sending_status(&log, &PauseState::default(), false, &gate(), now);
        assert_eq!(status.phase, DispatchPhase::Ready);
        assert_eq!(status.message, "Ready to send");
    }

    #[test]
    fn test_progress_counts_distinct_addresses() {
        let recipients = vec![
            Recipient::new("a@x.com"),
            Recipient::new("A@x.com"),
            Recipient::new("b@x.com"),
            Recipient::new("c@x.com"),
        ];
        let log = SendLog::from_entries(vec![SendLogEntry::new("a@x.com", Outcome::Sent, Utc::now())]);

        let stats = progress(&recipients, &log);

        assert_eq!(stats.unique_recipients, 3);
        assert_eq!(stats.already_sent, 1);
        assert_eq!(stats.remaining, 2);
        assert!((stats.percent_complete - 33.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_on_empty_list() {
        let stats = progress(&[], &SendLog::default());
        assert_eq!(stats.remaining, 0);
        assert!(stats.percent_complete.abs() < f64::EPSILON);
    }
}
