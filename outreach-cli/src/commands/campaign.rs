//! Campaign commands that talk to a running server

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use console::style;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{INFO, SUCCESS, WARN};
use crate::client::ApiClient;

/// Campaign control commands
#[derive(Debug, Subcommand)]
pub enum CampaignCommand {
    /// Start a dispatch run
    Send {
        /// Only send to recipients in this region
        #[arg(short, long)]
        region: Option<String>,
    },

    /// Pause sending at the next message boundary
    Pause {
        /// Reason shown on the dashboard
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Clear the pause flag
    Resume,

    /// Show the dispatch status
    Status,

    /// Show progress through the recipient list
    Stats,

    /// Show the deliverability report
    Reputation,

    /// List the regions present in the recipient list
    Regions,

    /// Show the most recent send log entries
    Log {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Add an address to the opt-out list
    Unsubscribe {
        /// Address to opt out
        email: String,
    },

    /// Collapse the send log to one entry per address
    Cleanup,
}

#[derive(Debug, Deserialize)]
struct RunSummary {
    total_recipients: usize,
    already_sent: usize,
    pending: usize,
    batches: usize,
    batch_size: usize,
    batch_delay_secs: u64,
    sent_today: usize,
    daily_limit: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum TriggerOutcome {
    AlreadySending,
    Paused {
        reason: Option<String>,
    },
    CoolingDown {
        remaining_secs: u64,
        next_send_at: DateTime<Utc>,
    },
    DailyLimitReached {
        sent_today: usize,
        limit: usize,
    },
    NothingToSend {
        total_recipients: usize,
    },
    Started(RunSummary),
}

#[derive(Debug, Deserialize)]
struct PauseState {
    is_paused: bool,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Progress {
    unique_recipients: usize,
    already_sent: usize,
    remaining: usize,
    percent_complete: f64,
}

#[derive(Debug, Deserialize)]
struct PauseResponse {
    message: String,
    state: PauseState,
    progress: Option<Progress>,
}

#[derive(Debug, Deserialize)]
struct LastSend {
    email: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SendingStatus {
    phase: String,
    message: String,
    is_sending: bool,
    pause_reason: Option<String>,
    total_sent: usize,
    total_errors: usize,
    sent_today: usize,
    daily_limit: usize,
    last_send: Option<LastSend>,
    next_send_at: Option<DateTime<Utc>>,
    cooldown_remaining_secs: u64,
}

#[derive(Debug, Deserialize)]
struct DailyVolume {
    date: String,
    sent: usize,
}

#[derive(Debug, Deserialize)]
struct Reputation {
    total_sent: usize,
    total_bounced: usize,
    total_opted_out: usize,
    total_opened: usize,
    sent_today: usize,
    delivery_rate: f64,
    bounce_rate: f64,
    opt_out_rate: f64,
    open_rate: f64,
    bounce_list_size: usize,
    opt_out_list_size: usize,
    last_7_days: Vec<DailyVolume>,
    health: String,
    recommendation: String,
    suggested_daily_limit: usize,
}

#[derive(Debug, Deserialize)]
struct Regions {
    regions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    email: String,
    timestamp: DateTime<Utc>,
    status: Value,
}

#[derive(Debug, Deserialize)]
struct Unsubscribed {
    email: String,
    already_unsubscribed: bool,
}

#[derive(Debug, Deserialize)]
struct Collapsed {
    before: usize,
    after: usize,
    removed: usize,
}

impl CampaignCommand {
    /// Execute the command against the server behind `client`
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or rejects the request.
    pub fn execute(&self, client: &ApiClient) -> Result<()> {
        match self {
            Self::Send { region } => send(client, region.as_deref()),
            Self::Pause { reason } => pause(client, reason.as_deref()),
            Self::Resume => resume(client),
            Self::Status => status(client),
            Self::Stats => stats(client),
            Self::Reputation => reputation(client),
            Self::Regions => regions(client),
            Self::Log { limit } => log(client, *limit),
            Self::Unsubscribe { email } => unsubscribe(client, email),
            Self::Cleanup => cleanup(client),
        }
    }
}

fn send(client: &ApiClient, region: Option<&str>) -> Result<()> {
    let body = region.map(|region| json!({ "region": region }));
    let outcome: TriggerOutcome = client.post("/api/send-emails", body.as_ref())?;
    println!("{}", describe_trigger(&outcome));
    Ok(())
}

fn describe_trigger(outcome: &TriggerOutcome) -> String {
    match outcome {
        TriggerOutcome::Started(run) => format!(
            "{SUCCESS} Run started: {} of {} recipients pending ({} already sent)\n  \
             {} batches of {}, {}s between batches, {}/{} sent today",
            style(run.pending).green(),
            run.total_recipients,
            run.already_sent,
            run.batches,
            run.batch_size,
            run.batch_delay_secs,
            run.sent_today,
            run.daily_limit,
        ),
        TriggerOutcome::AlreadySending => format!("{INFO} A run is already in progress"),
        TriggerOutcome::Paused { reason } => format!(
            "{WARN} Campaign is paused{}",
            reason
                .as_deref()
                .map(|r| format!(": {}", style(r).yellow()))
                .unwrap_or_default()
        ),
        TriggerOutcome::CoolingDown {
            remaining_secs,
            next_send_at,
        } => format!(
            "{WARN} Cooling down, next send allowed in {remaining_secs}s (at {})",
            next_send_at.format("%H:%M:%S")
        ),
        TriggerOutcome::DailyLimitReached { sent_today, limit } => format!(
            "{WARN} Daily limit reached ({sent_today}/{limit}), try again tomorrow"
        ),
        TriggerOutcome::NothingToSend { total_recipients } => format!(
            "{SUCCESS} Nothing to send, all {total_recipients} recipients already delivered"
        ),
    }
}

fn pause(client: &ApiClient, reason: Option<&str>) -> Result<()> {
    let body = reason.map(|reason| json!({ "reason": reason }));
    let response: PauseResponse = client.post("/api/pause-emails", body.as_ref())?;
    println!("{SUCCESS} {}", response.message);
    if let Some(reason) = response.state.reason {
        println!("  Reason: {}", style(reason).yellow());
    }
    Ok(())
}

fn resume(client: &ApiClient) -> Result<()> {
    let response: PauseResponse = client.post("/api/resume-emails", None)?;
    println!("{SUCCESS} {}", response.message);
    if let Some(progress) = response.progress {
        print_progress(&progress);
    }
    if response.state.is_paused {
        println!("{WARN} Server still reports the campaign as paused");
    }
    Ok(())
}

fn status(client: &ApiClient) -> Result<()> {
    let status: SendingStatus = client.get("/api/email-sending-status")?;

    println!("\n{INFO} {}", style(&status.message).bold());
    println!();
    println!("{}", style("Dispatch").bold().underlined());
    println!("  Phase:           {}", style(&status.phase).cyan());
    println!(
        "  Sending:         {}",
        if status.is_sending {
            style("yes").green()
        } else {
            style("no").dim()
        }
    );
    if let Some(reason) = &status.pause_reason {
        println!("  Pause reason:    {}", style(reason).yellow());
    }
    println!(
        "  Today:           {}/{}",
        style(status.sent_today).cyan(),
        status.daily_limit
    );
    println!("  Total sent:      {}", style(status.total_sent).green());
    println!("  Total errors:    {}", style(status.total_errors).red());
    if let Some(last) = &status.last_send {
        println!(
            "  Last send:       {} at {}",
            last.email,
            last.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if status.cooldown_remaining_secs > 0 {
        println!(
            "  Cooldown:        {}s",
            style(status.cooldown_remaining_secs).yellow()
        );
    }
    if let Some(next) = status.next_send_at {
        println!("  Next send at:    {}", next.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();
    Ok(())
}

fn stats(client: &ApiClient) -> Result<()> {
    let progress: Progress = client.get("/api/email-stats")?;
    println!();
    print_progress(&progress);
    println!();
    Ok(())
}

fn print_progress(progress: &Progress) {
    println!("{}", style("Progress").bold().underlined());
    println!("  Recipients:      {}", style(progress.unique_recipients).cyan());
    println!("  Sent:            {}", style(progress.already_sent).green());
    println!("  Remaining:       {}", style(progress.remaining).blue());
    println!(
        "  Complete:        {}%",
        style(format!("{:.1}", progress.percent_complete)).green()
    );
}

fn reputation(client: &ApiClient) -> Result<()> {
    let report: Reputation = client.get("/api/email-reputation")?;

    println!();
    println!(
        "{} Sender health: {}",
        health_marker(&report.health),
        styled_health(&report.health)
    );
    println!("  {}", report.recommendation);
    println!();

    println!("{}", style("Totals").bold().underlined());
    println!("  Sent:            {}", style(report.total_sent).green());
    println!("  Bounced:         {}", style(report.total_bounced).red());
    println!("  Opted out:       {}", style(report.total_opted_out).yellow());
    println!("  Opened:          {}", style(report.total_opened).cyan());
    println!("  Sent today:      {}", report.sent_today);
    println!();

    println!("{}", style("Rates").bold().underlined());
    println!("  Delivery:        {:.1}%", report.delivery_rate);
    println!("  Bounce:          {:.1}%", report.bounce_rate);
    println!("  Opt-out:         {:.1}%", report.opt_out_rate);
    println!("  Open:            {:.1}%", report.open_rate);
    println!();

    println!("{}", style("Suppression").bold().underlined());
    println!("  Bounce list:     {}", report.bounce_list_size);
    println!("  Opt-out list:    {}", report.opt_out_list_size);
    println!(
        "  Suggested limit: {}/day",
        style(report.suggested_daily_limit).cyan()
    );
    println!();

    if !report.last_7_days.is_empty() {
        println!("{}", style("Last 7 days").bold().underlined());
        for day in &report.last_7_days {
            println!("  {}  {}", day.date, day.sent);
        }
        println!();
    }
    Ok(())
}

fn health_marker(health: &str) -> console::Emoji<'static, 'static> {
    if health == "good" {
        SUCCESS
    } else {
        WARN
    }
}

fn styled_health(health: &str) -> console::StyledObject<&str> {
    match health {
        "good" => style(health).green(),
        "warning" => style(health).yellow(),
        _ => style(health).red(),
    }
}

fn regions(client: &ApiClient) -> Result<()> {
    let response: Regions = client.get("/api/regions")?;
    if response.regions.is_empty() {
        println!("{INFO} No regions in the recipient list");
    } else {
        for region in response.regions {
            println!("  {region}");
        }
    }
    Ok(())
}

fn log(client: &ApiClient, limit: usize) -> Result<()> {
    let entries: Vec<LogEntry> = client.get("/api/email-status")?;
    let shown = entries.len().min(limit);

    println!("\n{INFO} Showing {shown} of {} log entries", entries.len());
    println!("{}", "─".repeat(80));
    println!("{:<40} {:<20} {:<20}", "Email", "Status", "Timestamp");
    println!("{}", "─".repeat(80));

    for entry in entries.iter().rev().take(limit) {
        println!(
            "{:<40} {:<20} {:<20}",
            entry.email,
            describe_status(&entry.status),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    Ok(())
}

/// Log status as text; transport errors serialize as `{"error": "..."}`
fn describe_status(status: &Value) -> String {
    match status {
        Value::String(status) => status.clone(),
        Value::Object(map) => map
            .iter()
            .next()
            .map(|(kind, detail)| match detail.as_str() {
                Some(detail) => format!("{kind}: {detail}"),
                None => kind.clone(),
            })
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

fn unsubscribe(client: &ApiClient, email: &str) -> Result<()> {
    let response: Unsubscribed =
        client.post("/api/unsubscribe", Some(&json!({ "email": email })))?;
    if response.already_unsubscribed {
        println!("{INFO} {} was already unsubscribed", response.email);
    } else {
        println!("{SUCCESS} {} unsubscribed", style(&response.email).cyan());
    }
    Ok(())
}

fn cleanup(client: &ApiClient) -> Result<()> {
    let summary: Collapsed = client.post("/api/clean-duplicate-emails", None)?;
    println!(
        "{SUCCESS} Removed {} duplicate entries ({} -> {})",
        style(summary.removed).cyan(),
        summary.before,
        summary.after
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_outcome_decodes_server_answers() {
        let started: TriggerOutcome = serde_json::from_value(json!({
            "status": "started",
            "run_id": "3f0c7f52-0a4e-4c44-9d59-5d6b0c1b1b1b",
            "total_recipients": 10,
            "already_sent": 4,
            "pending": 6,
            "batches": 2,
            "batch_size": 5,
            "batch_delay_secs": 120,
            "sent_today": 4,
            "daily_limit": 200,
            "remaining_today": 196
        }))
        .unwrap();
        assert!(matches!(started, TriggerOutcome::Started(RunSummary { pending: 6, .. })));
        assert!(describe_trigger(&started).contains("6"));

        let paused: TriggerOutcome =
            serde_json::from_value(json!({ "status": "paused", "reason": "copy review" })).unwrap();
        assert!(describe_trigger(&paused).contains("copy review"));

        let limited: TriggerOutcome = serde_json::from_value(json!({
            "status": "daily_limit_reached",
            "sent_today": 200,
            "limit": 200
        }))
        .unwrap();
        assert!(describe_trigger(&limited).contains("200/200"));
    }

    #[test]
    fn test_describe_status() {
        assert_eq!(describe_status(&json!("sent")), "sent");
        assert_eq!(
            describe_status(&json!({ "error": "421 try later" })),
            "error: 421 try later"
        );
    }
}
