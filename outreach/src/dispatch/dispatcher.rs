//! Campaign dispatcher
//!
//! A run walks the pending recipients in fixed-size batches, one message at a
//! time. Before every batch and every message it re-reads the pause flag, so a
//! pause requested from elsewhere takes effect at the next boundary. The waits
//! between messages and batches are timers raced against the pause signal;
//! a pause wakes them immediately instead of letting the run sleep through it.
//!
//! Only one run may be active per dispatcher. A second trigger while a run is
//! in flight is answered with [`TriggerOutcome::AlreadySending`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classify::{FailureClassifier, FailureKind, SignatureClassifier};
use super::gate::{GateDecision, SendGate};
use crate::config::{CampaignSettings, DispatchSettings};
use crate::domain::{
    distinct_recipients, AddressValidator, Outcome, PauseState, Recipient, SendLogEntry,
};
use crate::email::{CampaignComposer, Email, EmailError, EmailSender};
use crate::store::{CampaignStore, StoreError, SuppressionList};

/// Reason recorded when the daily ceiling pauses the campaign
pub const DAILY_LIMIT_REASON: &str = "daily limit reached";

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every pending recipient was processed
    Completed,
    /// The pause flag was raised
    Paused,
    /// The daily ceiling was met
    DailyLimitReached,
    /// The provider signalled throttling; the campaign was paused
    Throttled,
    /// The server refused the session or sender; the campaign was paused
    Rejected,
}

/// Counts for one finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Run identifier, also present in log events
    pub run_id: Uuid,
    /// Recipients queued at trigger time
    pub pending: usize,
    /// Messages handed to the transport
    pub attempted: usize,
    /// Messages accepted
    pub sent: usize,
    /// Transport failures after retries
    pub failed: usize,
    /// Invalid or blocked addresses skipped
    pub invalid: usize,
    /// Addresses skipped because they were already on the bounce list
    pub bounced: usize,
    /// Addresses skipped because they opted out
    pub opted_out: usize,
    /// Addresses newly added to the bounce list by this run
    pub newly_bounced: usize,
    /// How the run ended
    pub stop: StopReason,
}

impl DispatchReport {
    const fn new(run_id: Uuid, pending: usize) -> Self {
        Self {
            run_id,
            pending,
            attempted: 0,
            sent: 0,
            failed: 0,
            invalid: 0,
            bounced: 0,
            opted_out: 0,
            newly_bounced: 0,
            stop: StopReason::Completed,
        }
    }
}

/// What a trigger will do, reported before the run starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: Uuid,
    /// Distinct recipients matching the filter
    pub total_recipients: usize,
    /// Of those, already delivered
    pub already_sent: usize,
    /// Queued for this run
    pub pending: usize,
    /// Batches the queue splits into
    pub batches: usize,
    /// Recipients per batch
    pub batch_size: usize,
    /// Seconds between batches
    pub batch_delay_secs: u64,
    /// Successful sends so far today
    pub sent_today: usize,
    /// Daily ceiling
    pub daily_limit: usize,
    /// Sends left today
    pub remaining_today: usize,
}

/// Answer to a trigger request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A run is already in flight
    AlreadySending,
    /// The campaign is paused; nothing was touched
    Paused {
        /// Recorded pause reason
        reason: Option<String>,
    },
    /// The last successful send is too recent
    CoolingDown {
        /// Seconds until sending may resume
        remaining_secs: u64,
        /// Earliest moment sending may resume
        next_send_at: DateTime<Utc>,
    },
    /// The daily ceiling is already met
    DailyLimitReached {
        /// Successful sends today
        sent_today: usize,
        /// Configured ceiling
        limit: usize,
    },
    /// Every matching recipient was already delivered
    NothingToSend {
        /// Distinct recipients matching the filter
        total_recipients: usize,
    },
    /// A run was started in the background
    Started(RunSummary),
}

/// Result of [`Dispatcher::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchRun {
    /// The run did not start
    Refused(TriggerOutcome),
    /// The run started and finished
    Finished(DispatchReport),
}

enum Delivery {
    Continue,
    Stop(StopReason),
}

struct Prepared {
    guard: RunGuard,
    summary: RunSummary,
    pending: Vec<Recipient>,
}

/// Clears the running flag when the run ends, however it ends
struct RunGuard {
    dispatcher: Arc<Dispatcher>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.dispatcher.running.store(false, Ordering::Release);
    }
}

/// Orchestrates a campaign run against injected storage and transport
pub struct Dispatcher {
    store: Arc<dyn CampaignStore>,
    sender: Arc<dyn EmailSender>,
    composer: CampaignComposer,
    validator: AddressValidator,
    classifier: Arc<dyn FailureClassifier>,
    settings: DispatchSettings,
    gate: SendGate,
    pause_tx: watch::Sender<bool>,
    running: AtomicBool,
}

impl Dispatcher {
    /// Dispatcher using the default failure classifier
    #[must_use]
    pub fn new(
        store: Arc<dyn CampaignStore>,
        sender: Arc<dyn EmailSender>,
        campaign: CampaignSettings,
        settings: DispatchSettings,
    ) -> Self {
        let (pause_tx, _) = watch::channel(false);
        Self {
            store,
            sender,
            composer: CampaignComposer::new(campaign),
            validator: AddressValidator::new(&settings.blocked_substrings),
            classifier: Arc::new(SignatureClassifier::default()),
            gate: SendGate::new(settings.daily_limit, settings.cooldown()),
            settings,
            pause_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Replace the failure classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Dispatch settings in use
    #[must_use]
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Ceiling and cooldown gate in use
    #[must_use]
    pub const fn gate(&self) -> &SendGate {
        &self.gate
    }

    /// Whether a run is in flight
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a run in the background and report what it will do
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the recipient list or send log cannot be read.
    pub async fn trigger(
        self: &Arc<Self>,
        region: Option<&str>,
    ) -> Result<TriggerOutcome, StoreError> {
        let prepared = match self.prepare(region).await? {
            Ok(prepared) => prepared,
            Err(refusal) => return Ok(refusal),
        };

        let summary = prepared.summary.clone();
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let Prepared {
                guard,
                summary,
                pending,
            } = prepared;
            let report = dispatcher.execute(&summary, pending).await;
            drop(guard);
            debug!(run_id = %report.run_id, "Background run finished");
        });

        Ok(TriggerOutcome::Started(summary))
    }

    /// Run to completion on the current task
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the recipient list or send log cannot be read.
    pub async fn run(self: &Arc<Self>, region: Option<&str>) -> Result<DispatchRun, StoreError> {
        match self.prepare(region).await? {
            Ok(Prepared {
                guard,
                summary,
                pending,
            }) => {
                let report = self.execute(&summary, pending).await;
                drop(guard);
                Ok(DispatchRun::Finished(report))
            }
            Err(refusal) => Ok(DispatchRun::Refused(refusal)),
        }
    }

    /// Persist a pause and wake any waiting run
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the pause flag cannot be written. Running
    /// dispatches still observe the in-process signal.
    pub async fn pause(&self, reason: Option<String>) -> Result<PauseState, StoreError> {
        let state = PauseState::paused(reason, Utc::now());
        self.pause_tx.send_replace(true);
        self.store.set_pause_state(state.clone()).await?;
        info!(reason = ?state.reason, "Campaign paused");
        Ok(state)
    }

    /// Clear the pause flag
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the pause flag cannot be written.
    pub async fn resume(&self) -> Result<PauseState, StoreError> {
        let state = PauseState::resumed(Utc::now());
        self.store.set_pause_state(state.clone()).await?;
        self.pause_tx.send_replace(false);
        info!("Campaign resumed");
        Ok(state)
    }

    async fn prepare(
        self: &Arc<Self>,
        region: Option<&str>,
    ) -> Result<Result<Prepared, TriggerOutcome>, StoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(Err(TriggerOutcome::AlreadySending));
        }
        let guard = RunGuard {
            dispatcher: Arc::clone(self),
        };

        let pause = self.pause_state().await;
        if pause.is_paused {
            info!(reason = ?pause.reason, "Trigger refused: campaign paused");
            return Ok(Err(TriggerOutcome::Paused {
                reason: pause.reason,
            }));
        }
        self.pause_tx.send_replace(false);

        let log = self.store.send_log().await?;
        let now = Utc::now();
        let (sent_today, remaining_today) = match self.gate.evaluate(&log, now) {
            GateDecision::Open {
                sent_today,
                remaining_today,
            } => (sent_today, remaining_today),
            GateDecision::DailyLimitReached { sent_today, limit } => {
                info!(sent_today, limit, "Trigger refused: daily limit reached");
                self.pause_for_daily_limit().await;
                return Ok(Err(TriggerOutcome::DailyLimitReached { sent_today, limit }));
            }
            GateDecision::CoolingDown {
                remaining,
                next_send_at,
                ..
            } => {
                info!(remaining_secs = remaining.as_secs(), "Trigger refused: cooling down");
                return Ok(Err(TriggerOutcome::CoolingDown {
                    remaining_secs: remaining.as_secs().max(1),
                    next_send_at,
                }));
            }
        };

        let candidates = distinct_recipients(
            self.store
                .recipients()
                .await?
                .into_iter()
                .filter(|r| region.is_none_or(|region| r.in_region(region))),
        );
        let total_recipients = candidates.len();
        let pending: Vec<Recipient> = candidates
            .into_iter()
            .filter(|r| !log.is_sent(&r.email))
            .collect();

        if pending.is_empty() {
            info!(total_recipients, "Trigger ignored: nothing left to send");
            return Ok(Err(TriggerOutcome::NothingToSend { total_recipients }));
        }

        let batch_size = self.settings.batch_size.max(1);
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            total_recipients,
            already_sent: total_recipients - pending.len(),
            pending: pending.len(),
            batches: pending.len().div_ceil(batch_size),
            batch_size,
            batch_delay_secs: self.settings.batch_delay_secs,
            sent_today,
            daily_limit: self.gate.daily_limit(),
            remaining_today,
        };

        Ok(Ok(Prepared {
            guard,
            summary,
            pending,
        }))
    }

    async fn execute(&self, summary: &RunSummary, pending: Vec<Recipient>) -> DispatchReport {
        let mut report = DispatchReport::new(summary.run_id, pending.len());
        let mut pause_rx = self.pause_tx.subscribe();
        let mut sent_today = summary.sent_today;

        info!(
            run_id = %summary.run_id,
            pending = summary.pending,
            batches = summary.batches,
            region_total = summary.total_recipients,
            "Dispatch run started"
        );

        'batches: for (index, batch) in pending.chunks(summary.batch_size).enumerate() {
            let Some(first) = batch.first() else {
                continue;
            };

            if index > 0 && !wait_unless_paused(self.settings.batch_delay(), &mut pause_rx).await {
                report.stop = self.halt_paused(first).await;
                break;
            }

            if self.is_paused(&pause_rx).await {
                report.stop = self.halt_paused(first).await;
                break;
            }

            match self.batch_gate(&mut pause_rx, &mut sent_today).await {
                Some(StopReason::Paused) => {
                    report.stop = self.halt_paused(first).await;
                    break;
                }
                Some(stop) => {
                    self.record(&first.email, Outcome::DailyLimitReached).await;
                    report.stop = stop;
                    break;
                }
                None => {}
            }

            debug!(run_id = %summary.run_id, batch = index + 1, size = batch.len(), "Batch started");

            for (position, recipient) in batch.iter().enumerate() {
                if position > 0
                    && !wait_unless_paused(self.settings.message_delay(), &mut pause_rx).await
                {
                    report.stop = self.halt_paused(recipient).await;
                    break 'batches;
                }

                if position > 0 && self.is_paused(&pause_rx).await {
                    report.stop = self.halt_paused(recipient).await;
                    break 'batches;
                }

                if let Delivery::Stop(stop) =
                    self.deliver(recipient, &mut report, &mut sent_today).await
                {
                    report.stop = stop;
                    break 'batches;
                }
            }
        }

        info!(
            run_id = %report.run_id,
            sent = report.sent,
            failed = report.failed,
            invalid = report.invalid,
            bounced = report.bounced,
            opted_out = report.opted_out,
            stop = ?report.stop,
            "Dispatch run finished"
        );

        report
    }

    /// Check the ceiling and wait out any cooldown before a batch
    ///
    /// An open gate resets `sent_today` from the log, so a run that crosses
    /// midnight starts the new day's count from zero.
    async fn batch_gate(
        &self,
        pause_rx: &mut watch::Receiver<bool>,
        sent_today: &mut usize,
    ) -> Option<StopReason> {
        let log = match self.store.send_log().await {
            Ok(log) => log,
            Err(error) => {
                warn!(%error, "Could not read send log for gate check, continuing");
                return None;
            }
        };

        match self.gate.evaluate(&log, Utc::now()) {
            GateDecision::Open {
                sent_today: fresh, ..
            } => {
                *sent_today = fresh;
                None
            }
            GateDecision::DailyLimitReached { sent_today, limit } => {
                info!(sent_today, limit, "Daily limit reached, stopping run");
                self.pause_for_daily_limit().await;
                Some(StopReason::DailyLimitReached)
            }
            GateDecision::CoolingDown { remaining, .. } => {
                debug!(remaining_secs = remaining.as_secs(), "Waiting out cooldown");
                if wait_unless_paused(remaining, pause_rx).await {
                    *sent_today = self
                        .store
                        .send_log()
                        .await
                        .map_or(*sent_today, |log| SendGate::sent_today(&log, Utc::now()));
                    None
                } else {
                    Some(StopReason::Paused)
                }
            }
        }
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        report: &mut DispatchReport,
        sent_today: &mut usize,
    ) -> Delivery {
        let address = recipient.address();

        if !self.validator.is_valid(&address) {
            debug!(%address, "Skipping invalid address");
            self.record(&address, Outcome::InvalidAddress).await;
            report.invalid += 1;
            return Delivery::Continue;
        }

        if self.on_list(SuppressionList::Bounces, &address).await {
            debug!(%address, "Skipping bounced address");
            self.record(&address, Outcome::Bounced).await;
            report.bounced += 1;
            return Delivery::Continue;
        }

        if self.on_list(SuppressionList::OptOuts, &address).await {
            debug!(%address, "Skipping opted-out address");
            self.record(&address, Outcome::OptedOut).await;
            report.opted_out += 1;
            return Delivery::Continue;
        }

        if *sent_today >= self.gate.daily_limit() {
            info!(sent_today = *sent_today, "Daily limit reached mid-run");
            self.record(&address, Outcome::DailyLimitReached).await;
            self.pause_for_daily_limit().await;
            return Delivery::Stop(StopReason::DailyLimitReached);
        }

        let email = match self.composer.compose(recipient) {
            Ok(email) => email,
            Err(error) => {
                warn!(%address, %error, "Could not render message");
                self.record(&address, Outcome::Error(error.to_string())).await;
                report.failed += 1;
                return Delivery::Continue;
            }
        };

        report.attempted += 1;
        match self.send_with_retry(email).await {
            Ok(()) => {
                self.record(&address, Outcome::Sent).await;
                report.sent += 1;
                *sent_today += 1;
                debug!(%address, "Message accepted");
                Delivery::Continue
            }
            Err((FailureKind::Permanent, error)) => {
                warn!(%address, %error, "Permanent failure, suppressing address");
                if let Err(store_error) = self.store.suppress(SuppressionList::Bounces, &address).await {
                    warn!(%address, error = %store_error, "Could not update bounce list");
                }
                let entry = SendLogEntry::new(&address, Outcome::Error(error.to_string()), Utc::now())
                    .with_bounce();
                self.record_entry(entry).await;
                report.failed += 1;
                report.newly_bounced += 1;
                Delivery::Continue
            }
            Err((FailureKind::Throttled, error)) => {
                warn!(%address, %error, "Provider throttling, pausing campaign");
                self.record(&address, Outcome::Error(error.to_string())).await;
                report.failed += 1;
                if let Err(store_error) = self
                    .pause(Some(format!("provider throttling: {error}")))
                    .await
                {
                    warn!(error = %store_error, "Could not persist pause flag");
                }
                Delivery::Stop(StopReason::Throttled)
            }
            Err((FailureKind::Rejected, error)) => {
                warn!(%address, %error, "Server refused the session, pausing campaign");
                self.record(&address, Outcome::Error(error.to_string())).await;
                report.failed += 1;
                if let Err(store_error) = self
                    .pause(Some(format!("SMTP session rejected: {error}")))
                    .await
                {
                    warn!(error = %store_error, "Could not persist pause flag");
                }
                Delivery::Stop(StopReason::Rejected)
            }
            Err((FailureKind::Transient, error)) => {
                warn!(%address, %error, "Delivery failed");
                self.record(&address, Outcome::Error(error.to_string())).await;
                report.failed += 1;
                Delivery::Continue
            }
        }
    }

    async fn send_with_retry(&self, email: Email) -> Result<(), (FailureKind, EmailError)> {
        let mut pause_rx = self.pause_tx.subscribe();
        let mut attempt: u32 = 0;

        loop {
            let error = match self.sender.send(email.clone()).await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            let kind = self.classifier.classify(&error);
            if kind != FailureKind::Transient || attempt >= self.settings.retry_attempts {
                return Err((kind, error));
            }

            let backoff_ms = self
                .settings
                .retry_backoff_ms
                .saturating_mul(2_u64.saturating_pow(attempt));
            attempt += 1;
            debug!(attempt, backoff_ms, %error, "Retrying transient failure");

            if !wait_unless_paused(Duration::from_millis(backoff_ms), &mut pause_rx).await {
                return Err((kind, error));
            }
        }
    }

    async fn halt_paused(&self, next: &Recipient) -> StopReason {
        info!(next = %next.address(), "Campaign paused, stopping run");
        self.record(&next.email, Outcome::Paused).await;
        StopReason::Paused
    }

    async fn pause_for_daily_limit(&self) {
        if !self.settings.pause_on_daily_limit {
            return;
        }
        if let Err(error) = self.pause(Some(DAILY_LIMIT_REASON.to_string())).await {
            warn!(%error, "Could not persist daily-limit pause");
        }
    }

    async fn pause_state(&self) -> PauseState {
        self.store.pause_state().await.unwrap_or_else(|error| {
            warn!(%error, "Could not read pause flag, assuming not paused");
            PauseState::default()
        })
    }

    async fn is_paused(&self, pause_rx: &watch::Receiver<bool>) -> bool {
        let signalled = *pause_rx.borrow();
        signalled || self.pause_state().await.is_paused
    }

    async fn on_list(&self, list: SuppressionList, address: &str) -> bool {
        self.store
            .is_suppressed(list, address)
            .await
            .unwrap_or_else(|error| {
                warn!(%list, %error, "Could not read suppression list, assuming not listed");
                false
            })
    }

    async fn record(&self, address: &str, outcome: Outcome) {
        self.record_entry(SendLogEntry::new(address, outcome, Utc::now()))
            .await;
    }

    async fn record_entry(&self, entry: SendLogEntry) {
        if let Err(error) = self.store.record(entry).await {
            warn!(%error, "Could not record send outcome");
        }
    }
}

/// Sleep for `duration` unless the pause signal fires first
///
/// Returns `false` when interrupted by a pause.
async fn wait_unless_paused(duration: Duration, pause_rx: &mut watch::Receiver<bool>) -> bool {
    if *pause_rx.borrow_and_update() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => return true,
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    sleep.await;
                    return true;
                }
                if *pause_rx.borrow_and_update() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::MockEmailSender;
    use crate::store::MemoryStore;
    use crate::testing::{campaign_settings, immediate_dispatcher, recipients, RecordingSender};

    fn finished(run: DispatchRun) -> DispatchReport {
        match run {
            DispatchRun::Finished(report) => report,
            DispatchRun::Refused(outcome) => panic!("run refused: {outcome:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicates_are_sent_once() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
            "a@x.com", "A@x.com ", "b@x.com",
        ])));
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!(report.sent, 2);
        assert_eq!(sender.delivered_to(), vec!["a@x.com", "b@x.com"]);
        let log = store.log_snapshot();
        assert_eq!(log.len(), 2);
        assert!(log.is_sent("a@x.com") && log.is_sent("b@x.com"));
    }

    #[tokio::test]
    async fn test_transport_never_called_for_suppressed() {
        let store = Arc::new(
            MemoryStore::new()
                .with_recipients(recipients(&["c@x.com", "d@x.com"]))
                .with_suppressed(SuppressionList::Bounces, ["c@x.com"])
                .with_suppressed(SuppressionList::OptOuts, ["d@x.com"]),
        );
        let mut mock = MockEmailSender::new();
        mock.expect_send().never();
        let dispatcher = immediate_dispatcher(store.clone(), Arc::new(mock), 100);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!((report.bounced, report.opted_out, report.attempted), (1, 1, 0));
        let log = store.log_snapshot();
        assert_eq!(log.get("c@x.com").unwrap().status, Outcome::Bounced);
        assert_eq!(log.get("d@x.com").unwrap().status, Outcome::OptedOut);
    }

    #[tokio::test]
    async fn test_invalid_and_blocked_addresses_are_skipped() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
            "not-an-address",
            "noreply@clinic.org",
            "ok@x.com",
        ])));
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!(report.invalid, 2);
        assert_eq!(sender.delivered_to(), vec!["ok@x.com"]);
        assert_eq!(
            store.log_snapshot().get("noreply@clinic.org").unwrap().status,
            Outcome::InvalidAddress
        );
    }

    #[tokio::test]
    async fn test_paused_trigger_leaves_log_untouched() {
        let store = Arc::new(
            MemoryStore::new()
                .with_recipients(recipients(&["d@x.com"]))
                .with_pause(PauseState::paused(Some("maintenance".into()), Utc::now())),
        );
        let mut mock = MockEmailSender::new();
        mock.expect_send().never();
        let dispatcher = immediate_dispatcher(store.clone(), Arc::new(mock), 100);

        let run = dispatcher.run(None).await.unwrap();

        assert_eq!(
            run,
            DispatchRun::Refused(TriggerOutcome::Paused {
                reason: Some("maintenance".into())
            })
        );
        assert!(store.log_snapshot().is_empty());
        assert!(!dispatcher.is_sending());
    }

    #[tokio::test]
    async fn test_daily_limit_stops_and_pauses() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
            "a@x.com", "b@x.com", "c@x.com", "d@x.com",
        ])));
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 2);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!(report.sent, 2);
        assert_eq!(report.stop, StopReason::DailyLimitReached);
        let log = store.log_snapshot();
        assert_eq!(log.get("c@x.com").unwrap().status, Outcome::DailyLimitReached);
        assert!(log.get("d@x.com").is_none());

        let pause = store.pause_state().await.unwrap();
        assert!(pause.is_paused);
        assert_eq!(pause.reason.as_deref(), Some(DAILY_LIMIT_REASON));

        dispatcher.resume().await.unwrap();
        let again = dispatcher.run(None).await.unwrap();
        assert!(matches!(
            again,
            DispatchRun::Refused(TriggerOutcome::DailyLimitReached { sent_today: 2, limit: 2 })
        ));
        assert_eq!(sender.delivered_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_gate_refreshes_stale_daily_count() {
        let yesterday = Utc::now() - chrono::Duration::days(1);
        let store = Arc::new(
            MemoryStore::new()
                .with_recipients(recipients(&["c@x.com", "d@x.com"]))
                .with_log(vec![
                    SendLogEntry::new("a@x.com", Outcome::Sent, yesterday),
                    SendLogEntry::new("b@x.com", Outcome::Sent, yesterday),
                ]),
        );
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 2);
        let pending = recipients(&["c@x.com", "d@x.com"]);
        // Count taken before midnight: yesterday's two sends met the ceiling.
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            total_recipients: 4,
            already_sent: 2,
            pending: 2,
            batches: 1,
            batch_size: 10,
            batch_delay_secs: 0,
            sent_today: 2,
            daily_limit: 2,
            remaining_today: 0,
        };

        let report = dispatcher.execute(&summary, pending).await;

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.sent, 2);
        assert!(!store.pause_state().await.unwrap().is_paused);
    }

    #[tokio::test]
    async fn test_permanent_failure_suppresses_address() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&["gone@x.com", "b@x.com"])));
        let sender = Arc::new(RecordingSender::new());
        sender.fail("gone@x.com", "5.1.1 user unknown", Some(550));
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!((report.sent, report.failed, report.newly_bounced), (1, 1, 1));
        assert!(store.is_suppressed(SuppressionList::Bounces, "gone@x.com").await.unwrap());
        let entry = store.log_snapshot().get("gone@x.com").cloned().unwrap();
        assert!(entry.bounce);
        assert!(matches!(entry.status, Outcome::Error(_)));

        finished(dispatcher.run(None).await.unwrap());
        assert_eq!(sender.attempts_for("gone@x.com"), 1);
    }

    #[tokio::test]
    async fn test_throttling_pauses_campaign() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
            "a@x.com", "b@x.com", "c@x.com",
        ])));
        let sender = Arc::new(RecordingSender::new());
        sender.fail("b@x.com", "Daily sending quota exceeded", None);
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!(report.stop, StopReason::Throttled);
        assert_eq!(sender.delivered_to(), vec!["a@x.com"]);
        assert_eq!(sender.attempts_for("c@x.com"), 0);
        let pause = store.pause_state().await.unwrap();
        assert!(pause.is_paused);
        assert!(pause.reason.unwrap().starts_with("provider throttling"));
    }

    #[tokio::test]
    async fn test_auth_rejection_pauses_without_suppressing() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
            "a@x.com", "b@x.com", "c@x.com",
        ])));
        let sender = Arc::new(RecordingSender::new());
        sender.fail("a@x.com", "5.7.8 Username and Password not accepted", Some(535));
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!(report.stop, StopReason::Rejected);
        assert_eq!((report.failed, report.newly_bounced), (1, 0));
        assert_eq!(sender.attempts_for("b@x.com"), 0);
        assert!(store.suppressed(SuppressionList::Bounces).await.unwrap().is_empty());
        let entry = store.log_snapshot().get("a@x.com").cloned().unwrap();
        assert!(!entry.bounce);
        let pause = store.pause_state().await.unwrap();
        assert!(pause.is_paused);
        assert!(pause.reason.unwrap().starts_with("SMTP session rejected"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&["a@x.com"])));
        let sender = Arc::new(RecordingSender::new());
        sender.fail_times("a@x.com", 2, "451 greylisted", Some(451));
        let settings = DispatchSettings {
            retry_attempts: 2,
            ..DispatchSettings::immediate()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            sender.clone(),
            campaign_settings(),
            settings,
        ));

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!(report.sent, 1);
        assert_eq!(sender.attempts_for("a@x.com"), 3);
        assert!(store.log_snapshot().is_sent("a@x.com"));
    }

    #[tokio::test]
    async fn test_transient_failure_without_retry_continues_batch() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&["a@x.com", "b@x.com"])));
        let sender = Arc::new(RecordingSender::new());
        sender.fail("a@x.com", "connection reset", None);
        let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

        let report = finished(dispatcher.run(None).await.unwrap());

        assert_eq!((report.sent, report.failed), (1, 1));
        assert_eq!(report.stop, StopReason::Completed);
        assert!(!store.is_suppressed(SuppressionList::Bounces, "a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_region_filter() {
        let store = Arc::new(MemoryStore::new().with_recipients(vec![
            Recipient::new("a@x.com").with_region("SP"),
            Recipient::new("b@x.com").with_region("RJ"),
        ]));
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = immediate_dispatcher(store, sender.clone(), 100);

        let report = finished(dispatcher.run(Some("sp")).await.unwrap());

        assert_eq!(report.pending, 1);
        assert_eq!(sender.delivered_to(), vec!["a@x.com"]);
    }

    #[tokio::test]
    async fn test_cooldown_is_reported_not_slept() {
        let store = Arc::new(
            MemoryStore::new()
                .with_recipients(recipients(&["a@x.com", "b@x.com"]))
                .with_log(vec![SendLogEntry::new("a@x.com", Outcome::Sent, Utc::now())]),
        );
        let settings = DispatchSettings {
            cooldown_secs: 300,
            ..DispatchSettings::immediate()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            Arc::new(RecordingSender::new()),
            campaign_settings(),
            settings,
        ));

        let outcome = dispatcher.trigger(None).await.unwrap();

        match outcome {
            TriggerOutcome::CoolingDown { remaining_secs, .. } => {
                assert!(remaining_secs > 290 && remaining_secs <= 300);
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nothing_to_send() {
        let store = Arc::new(
            MemoryStore::new()
                .with_recipients(recipients(&["a@x.com"]))
                .with_log(vec![SendLogEntry::new("a@x.com", Outcome::Sent, Utc::now())]),
        );
        let dispatcher = immediate_dispatcher(store, Arc::new(RecordingSender::new()), 100);

        assert_eq!(
            dispatcher.trigger(None).await.unwrap(),
            TriggerOutcome::NothingToSend { total_recipients: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_interrupts_message_delay() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
            "a@x.com", "b@x.com", "c@x.com", "d@x.com",
        ])));
        let sender = Arc::new(RecordingSender::new());
        let settings = DispatchSettings {
            message_delay_ms: 1_000,
            batch_size: 10,
            ..DispatchSettings::immediate()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            sender.clone(),
            campaign_settings(),
            settings,
        ));

        let outcome = dispatcher.trigger(None).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Started(ref s) if s.pending == 4));
        assert!(dispatcher.is_sending());
        assert_eq!(
            dispatcher.trigger(None).await.unwrap(),
            TriggerOutcome::AlreadySending
        );

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        dispatcher.pause(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sender.delivered_to(), vec!["a@x.com", "b@x.com"]);
        assert_eq!(
            store.log_snapshot().get("c@x.com").unwrap().status,
            Outcome::Paused
        );
        assert!(!dispatcher.is_sending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_interrupts_batch_delay() {
        let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
            "a@x.com", "b@x.com", "c@x.com",
        ])));
        let sender = Arc::new(RecordingSender::new());
        let settings = DispatchSettings {
            batch_size: 2,
            batch_delay_secs: 3_600,
            ..DispatchSettings::immediate()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            sender.clone(),
            campaign_settings(),
            settings,
        ));

        let background = Arc::clone(&dispatcher);
        let run = tokio::spawn(async move { background.run(None).await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        dispatcher.pause(Some("manual".into())).await.unwrap();

        let report = finished(run.await.unwrap().unwrap());
        assert_eq!(report.stop, StopReason::Paused);
        assert_eq!(report.sent, 2);
        assert!(!sender.was_sent_to("c@x.com"));
    }
}
