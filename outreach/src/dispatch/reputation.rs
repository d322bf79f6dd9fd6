//! Sender reputation report
//!
//! Rates use the number of log entries as the denominator. Health is driven
//! by the bounce rate alone; the suggested ceiling drops with it.

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::Serialize;

use super::gate::SendGate;
use crate::config::ReputationSettings;
use crate::domain::{Outcome, SendLog};

/// Ceiling suggested while health is `warning`
pub const WARNING_DAILY_LIMIT: usize = 50;

/// Ceiling suggested while health is `critical`
pub const CRITICAL_DAILY_LIMIT: usize = 10;

/// Sender health by bounce rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Bounce rate at or under the warning threshold
    Good,
    /// Bounce rate above the warning threshold
    Warning,
    /// Bounce rate above the critical threshold
    Critical,
}

/// Successful sends on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyVolume {
    /// Local calendar day
    pub date: NaiveDate,
    /// `Sent` entries that day
    pub sent: usize,
}

/// Deliverability summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReputationReport {
    /// Log entries
    pub total_entries: usize,
    /// `Sent` entries
    pub total_sent: usize,
    /// Entries flagged as bounces
    pub total_bounced: usize,
    /// Entries flagged as opt-outs
    pub total_opted_out: usize,
    /// Entries with a recorded open
    pub total_opened: usize,
    /// `Error` and `InvalidAddress` entries
    pub total_errors: usize,
    /// Successful sends today
    pub sent_today: usize,
    /// Percent of entries delivered
    pub delivery_rate: f64,
    /// Percent of entries bounced
    pub bounce_rate: f64,
    /// Percent of entries opted out
    pub opt_out_rate: f64,
    /// Percent of delivered messages opened
    pub open_rate: f64,
    /// Bounce list size
    pub bounce_list_size: usize,
    /// Opt-out list size
    pub opt_out_list_size: usize,
    /// Sends per day, oldest first, ending today
    pub last_7_days: Vec<DailyVolume>,
    /// Health verdict
    pub health: Health,
    /// What to do about it
    pub recommendation: &'static str,
    /// Ceiling to use while health stays where it is
    pub suggested_daily_limit: usize,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / whole as f64).round() / 10.0
    }
}

/// Build the report at `now`
#[must_use]
pub fn reputation_report(
    log: &SendLog,
    bounce_list_size: usize,
    opt_out_list_size: usize,
    daily_limit: usize,
    thresholds: &ReputationSettings,
    now: DateTime<Utc>,
) -> ReputationReport {
    let total_entries = log.len();
    let total_sent = log.count_where(|e| e.status.is_sent());
    let total_bounced = log.count_where(|e| e.bounce || e.status == Outcome::Bounced);
    let total_opted_out = log.count_where(|e| e.opt_out || e.status == Outcome::OptedOut);
    let total_opened = log.count_where(|e| e.opened_at.is_some());
    let bounce_rate = percent(total_bounced, total_entries);

    let (health, recommendation, suggested_daily_limit) = if bounce_rate > thresholds.critical_bounce_rate {
        (
            Health::Critical,
            "Bounce rate is critical: pause sending and clean the list before continuing",
            CRITICAL_DAILY_LIMIT,
        )
    } else if bounce_rate > thresholds.warning_bounce_rate {
        (
            Health::Warning,
            "Bounce rate is elevated: lower the daily volume and review recent failures",
            WARNING_DAILY_LIMIT.min(daily_limit),
        )
    } else {
        (Health::Good, "Reputation looks healthy", daily_limit)
    };

    let today = now.with_timezone(&Local).date_naive();
    let last_7_days = (0..7_u64)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(|date| DailyVolume {
            date,
            sent: log.sent_on(date),
        })
        .collect();

    ReputationReport {
        total_entries,
        total_sent,
        total_bounced,
        total_opted_out,
        total_opened,
        total_errors: log.count_where(|e| e.status.is_error()),
        sent_today: SendGate::sent_today(log, now),
        delivery_rate: percent(total_sent, total_entries),
        bounce_rate,
        opt_out_rate: percent(total_opted_out, total_entries),
        open_rate: percent(total_opened, total_sent),
        bounce_list_size,
        opt_out_list_size,
        last_7_days,
        health,
        recommendation,
        suggested_daily_limit: suggested_daily_limit.min(daily_limit),
    }
}
