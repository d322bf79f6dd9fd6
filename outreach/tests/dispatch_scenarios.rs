//! End-to-end dispatch scenarios
//!
//! Each scenario seeds a store, runs the dispatcher to completion and checks
//! the send log and the transport.

use acton_reactive::prelude::ActonApp;
use chrono::Utc;
use outreach::dispatch::{DispatchReport, DispatchRun, TriggerOutcome};
use outreach::domain::{Outcome, PauseState, SendLogEntry};
use outreach::store::{AgentStore, JsonFiles, MemoryStore, SuppressionList};
use outreach::testing::{immediate_dispatcher, recipients, RecordingSender};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn finished(run: DispatchRun) -> DispatchReport {
    match run {
        DispatchRun::Finished(report) => report,
        DispatchRun::Refused(outcome) => panic!("run refused: {outcome:?}"),
    }
}

#[tokio::test]
async fn duplicate_recipients_produce_one_sent_entry_each() {
    let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
        "a@x.com", "a@x.com", "b@x.com",
    ])));
    let sender = Arc::new(RecordingSender::new());
    let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

    finished(dispatcher.run(None).await.unwrap());

    let log = store.log_snapshot();
    assert_eq!(log.len(), 2);
    assert!(log.entries().iter().all(|e| e.status == Outcome::Sent));
    assert_eq!(sender.attempts_for("a@x.com"), 1);
}

#[tokio::test]
async fn already_sent_addresses_are_not_attempted() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipients(recipients(&["a@x.com", "b@x.com"]))
            .with_log(vec![SendLogEntry::new("a@x.com", Outcome::Sent, Utc::now())]),
    );
    let sender = Arc::new(RecordingSender::new());
    let dispatcher = immediate_dispatcher(store, sender.clone(), 100);

    let report = finished(dispatcher.run(None).await.unwrap());

    assert_eq!(report.pending, 1);
    assert_eq!(sender.delivered_to(), vec!["b@x.com"]);
    assert_eq!(sender.attempts_for("a@x.com"), 0);
}

#[tokio::test]
async fn bounced_address_is_logged_and_never_sent() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipients(recipients(&["c@x.com"]))
            .with_suppressed(SuppressionList::Bounces, ["c@x.com"]),
    );
    let sender = Arc::new(RecordingSender::new());
    let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

    finished(dispatcher.run(None).await.unwrap());

    let log = store.log_snapshot();
    assert_eq!(log.len(), 1);
    let entry = log.get("c@x.com").unwrap();
    assert_eq!(entry.status, Outcome::Bounced);
    assert!(entry.bounce);
    assert_eq!(sender.attempt_count(), 0);
}

#[tokio::test]
async fn paused_campaign_returns_paused_without_touching_log() {
    let store = Arc::new(
        MemoryStore::new()
            .with_recipients(recipients(&["d@x.com"]))
            .with_pause(PauseState::paused(None, Utc::now())),
    );
    let sender = Arc::new(RecordingSender::new());
    let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

    let run = dispatcher.run(None).await.unwrap();

    assert_eq!(run, DispatchRun::Refused(TriggerOutcome::Paused { reason: None }));
    assert!(store.log_snapshot().is_empty());
    assert_eq!(sender.attempt_count(), 0);
}

#[tokio::test]
async fn daily_ceiling_holds_across_runs() {
    let store = Arc::new(MemoryStore::new().with_recipients(recipients(&[
        "a@x.com", "b@x.com", "c@x.com", "d@x.com", "e@x.com",
    ])));
    let sender = Arc::new(RecordingSender::new());
    let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 3);

    finished(dispatcher.run(None).await.unwrap());
    dispatcher.resume().await.unwrap();
    let second = dispatcher.run(None).await.unwrap();

    assert!(matches!(
        second,
        DispatchRun::Refused(TriggerOutcome::DailyLimitReached { sent_today: 3, limit: 3 })
    ));
    assert_eq!(sender.delivered_count(), 3);
    assert_eq!(store.log_snapshot().count_where(|e| e.status.is_sent()), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn file_backed_run_persists_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("recipients.json"),
        r#"[
            {"email": "a@x.com", "nome": "Ana", "estado": "SP"},
            {"email": "A@X.com", "nome": "Ana again"},
            {"email": "gone@x.com"},
            {"email": "left@x.com"},
            {"email": "bad address"}
        ]"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("opt-outs.json"), r#"["left@x.com"]"#).unwrap();

    let mut runtime = ActonApp::launch_async().await;
    let store = Arc::new(AgentStore::spawn(&mut runtime, JsonFiles::in_dir(dir.path())).await.unwrap());
    let sender = Arc::new(RecordingSender::new());
    sender.fail("gone@x.com", "550 5.1.1 user unknown", Some(550));
    let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 100);

    let report = finished(dispatcher.run(None).await.unwrap());

    assert_eq!(report.pending, 4);
    assert_eq!(report.sent, 1);
    assert_eq!(report.newly_bounced, 1);
    assert_eq!(report.opted_out, 1);
    assert_eq!(report.invalid, 1);

    let files = JsonFiles::in_dir(dir.path());
    let log = files.load_send_log();
    assert_eq!(log.len(), 4);
    assert!(log.is_sent("a@x.com"));
    assert_eq!(log.get("left@x.com").unwrap().status, Outcome::OptedOut);
    assert!(files.suppression_set(SuppressionList::Bounces).contains("gone@x.com"));

    let rerun = dispatcher.run(None).await.unwrap();
    let rerun = finished(rerun);
    assert_eq!(rerun.sent, 0);
    assert_eq!(rerun.bounced, 1);
    assert_eq!(sender.attempts_for("a@x.com"), 1);
    assert_eq!(sender.attempts_for("gone@x.com"), 1);

    runtime.shutdown_all().await.expect("Failed to shutdown");
}

fn address_pool() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        (0usize..6, any::<bool>()).prop_map(|(n, upper)| {
            let address = format!("user{n}@x.com");
            if upper {
                address.to_uppercase()
            } else {
                address
            }
        }),
        0..20,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn each_distinct_address_is_attempted_once_and_never_resent(
        addresses in address_pool(),
        already_sent in prop::collection::hash_set(0usize..6, 0..3),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let log = already_sent
                .iter()
                .map(|n| SendLogEntry::new(&format!("user{n}@x.com"), Outcome::Sent, Utc::now()))
                .collect();
            let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
            let store = Arc::new(MemoryStore::new().with_recipients(recipients(&refs)).with_log(log));
            let sender = Arc::new(RecordingSender::new());
            let dispatcher = immediate_dispatcher(store.clone(), sender.clone(), 1_000);

            let _ = dispatcher.run(None).await.unwrap();
            let _ = dispatcher.run(None).await.unwrap();

            let distinct: HashSet<String> = addresses.iter().map(|a| a.to_lowercase()).collect();
            for address in &distinct {
                let previously_sent = already_sent
                    .iter()
                    .any(|n| *address == format!("user{n}@x.com"));
                let expected = usize::from(!previously_sent);
                prop_assert_eq!(sender.attempts_for(address), expected);
            }
            Ok(())
        })?;
    }
}
