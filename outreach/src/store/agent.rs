//! Single-writer store agent
//!
//! [`StoreAgent`] owns the [`JsonFiles`] and answers request messages.
//! Every mutation runs in a `mutate_on` handler, which acton-reactive executes
//! one at a time, so each read-modify-write sequence on a state file is
//! atomic with respect to the rest of the process. Pure reads run in
//! `act_on` handlers; writes replace files by rename so a reader never sees a
//! half-written file.
//!
//! [`AgentStore`] is the cloneable handle that implements [`CampaignStore`]
//! on top of the agent's request/reply messages.

use acton_reactive::prelude::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::oneshot;

use super::{CampaignStore, JsonFiles, StoreError, SuppressionList};
use crate::agents::default_agent_config;
use crate::agents::request_reply::{create_request_reply, send_response, ResponseChannel};
use crate::domain::{CollapseSummary, PauseState, Recipient, SendLog, SendLogEntry};

type StoreAgentBuilder = ManagedActor<Idle, StoreAgent>;

type StoreReply<T> = ResponseChannel<Result<T, StoreError>>;

/// Store agent model
#[derive(Debug, Default, Clone)]
pub struct StoreAgent {
    files: JsonFiles,
}

/// Read the recipient list
#[derive(Clone, Debug)]
pub struct LoadRecipients {
    /// Reply channel
    pub response_tx: StoreReply<Vec<Recipient>>,
}

/// Read the send log
#[derive(Clone, Debug)]
pub struct LoadSendLog {
    /// Reply channel
    pub response_tx: StoreReply<SendLog>,
}

/// Upsert an outcome
#[derive(Clone, Debug)]
pub struct RecordOutcome {
    /// Entry to record
    pub entry: SendLogEntry,
    /// Reply channel
    pub response_tx: StoreReply<()>,
}

/// Collapse the send log
#[derive(Clone, Debug)]
pub struct CollapseLog {
    /// Reply channel
    pub response_tx: StoreReply<CollapseSummary>,
}

/// Stamp an open
#[derive(Clone, Debug)]
pub struct MarkOpened {
    /// Recipient address
    pub address: String,
    /// Open time
    pub at: DateTime<Utc>,
    /// Reply channel
    pub response_tx: StoreReply<bool>,
}

/// Read a suppression list
#[derive(Clone, Debug)]
pub struct LoadSuppression {
    /// Which list
    pub list: SuppressionList,
    /// Reply channel
    pub response_tx: StoreReply<HashSet<String>>,
}

/// Add an address to a suppression list
#[derive(Clone, Debug)]
pub struct Suppress {
    /// Which list
    pub list: SuppressionList,
    /// Address to add
    pub address: String,
    /// Reply channel
    pub response_tx: StoreReply<bool>,
}

/// Read the pause flag
#[derive(Clone, Debug)]
pub struct LoadPause {
    /// Reply channel
    pub response_tx: StoreReply<PauseState>,
}

/// Overwrite the pause flag
#[derive(Clone, Debug)]
pub struct SavePause {
    /// New state
    pub state: PauseState,
    /// Reply channel
    pub response_tx: StoreReply<()>,
}

impl StoreAgent {
    /// Spawn the store agent over `files`
    ///
    /// # Errors
    ///
    /// Returns error if agent initialization fails
    pub async fn spawn(runtime: &mut ActorRuntime, files: JsonFiles) -> anyhow::Result<ActorHandle> {
        let config = default_agent_config("campaign_store")?;
        let mut builder = runtime.new_actor_with_config::<Self>(config);
        builder.model.files = files;
        Self::configure_handlers(builder).await
    }

    async fn configure_handlers(mut builder: StoreAgentBuilder) -> anyhow::Result<ActorHandle> {
        builder
            .act_on::<LoadRecipients>(|agent, envelope| {
                let response_tx = envelope.message().response_tx.clone();
                let files = agent.model.files.clone();
                Box::pin(async move {
                    let _ = send_response(response_tx, files.load_recipients()).await;
                })
            })
            .act_on::<LoadSendLog>(|agent, envelope| {
                let response_tx = envelope.message().response_tx.clone();
                let files = agent.model.files.clone();
                Box::pin(async move {
                    let _ = send_response(response_tx, Ok(files.load_send_log())).await;
                })
            })
            .act_on::<LoadSuppression>(|agent, envelope| {
                let list = envelope.message().list;
                let response_tx = envelope.message().response_tx.clone();
                let files = agent.model.files.clone();
                Box::pin(async move {
                    let _ = send_response(response_tx, Ok(files.suppression_set(list))).await;
                })
            })
            .act_on::<LoadPause>(|agent, envelope| {
                let response_tx = envelope.message().response_tx.clone();
                let files = agent.model.files.clone();
                Box::pin(async move {
                    let _ = send_response(response_tx, Ok(files.load_pause())).await;
                })
            })
            .mutate_on::<RecordOutcome>(|agent, envelope| {
                let entry = envelope.message().entry.clone();
                let response_tx = envelope.message().response_tx.clone();
                let result = agent.model.files.record(entry);
                Reply::pending(async move {
                    let _ = send_response(response_tx, result).await;
                })
            })
            .mutate_on::<CollapseLog>(|agent, envelope| {
                let response_tx = envelope.message().response_tx.clone();
                let result = agent.model.files.collapse_log();
                Reply::pending(async move {
                    let _ = send_response(response_tx, result).await;
                })
            })
            .mutate_on::<MarkOpened>(|agent, envelope| {
                let message = envelope.message();
                let response_tx = message.response_tx.clone();
                let result = agent.model.files.mark_opened(&message.address, message.at);
                Reply::pending(async move {
                    let _ = send_response(response_tx, result).await;
                })
            })
            .mutate_on::<Suppress>(|agent, envelope| {
                let message = envelope.message();
                let response_tx = message.response_tx.clone();
                let result = agent.model.files.suppress(message.list, &message.address);
                Reply::pending(async move {
                    let _ = send_response(response_tx, result).await;
                })
            })
            .mutate_on::<SavePause>(|agent, envelope| {
                let state = envelope.message().state.clone();
                let response_tx = envelope.message().response_tx.clone();
                let result = agent.model.files.save_pause(&state);
                Reply::pending(async move {
                    let _ = send_response(response_tx, result).await;
                })
            })
            .after_start(|_agent| async {
                tracing::info!("Campaign store agent started");
            });

        Ok(builder.start().await)
    }
}

/// [`CampaignStore`] backed by a running [`StoreAgent`]
#[derive(Clone)]
pub struct AgentStore {
    handle: ActorHandle,
}

impl AgentStore {
    /// Wrap a handle returned by [`StoreAgent::spawn`]
    #[must_use]
    pub const fn new(handle: ActorHandle) -> Self {
        Self { handle }
    }

    /// Spawn a store agent and wrap its handle
    ///
    /// # Errors
    ///
    /// Returns error if agent initialization fails
    pub async fn spawn(runtime: &mut ActorRuntime, files: JsonFiles) -> anyhow::Result<Self> {
        Ok(Self::new(StoreAgent::spawn(runtime, files).await?))
    }

    async fn request<T, M>(
        &self,
        build: impl FnOnce(StoreReply<T>) -> M + Send,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
        M: ActonMessage + Send + 'static,
    {
        let (response_tx, rx): (StoreReply<T>, oneshot::Receiver<Result<T, StoreError>>) =
            create_request_reply();
        self.handle.send(build(response_tx)).await;
        rx.await
            .map_err(|_| StoreError::Unavailable("store agent dropped the request".to_string()))?
    }
}

#[async_trait]
impl CampaignStore for AgentStore {
    async fn recipients(&self) -> Result<Vec<Recipient>, StoreError> {
        self.request(|response_tx| LoadRecipients { response_tx }).await
    }

    async fn send_log(&self) -> Result<SendLog, StoreError> {
        self.request(|response_tx| LoadSendLog { response_tx }).await
    }

    async fn record(&self, entry: SendLogEntry) -> Result<(), StoreError> {
        self.request(|response_tx| RecordOutcome { entry, response_tx }).await
    }

    async fn collapse_log(&self) -> Result<CollapseSummary, StoreError> {
        self.request(|response_tx| CollapseLog { response_tx }).await
    }

    async fn mark_opened(&self, address: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let address = address.to_string();
        self.request(|response_tx| MarkOpened {
            address,
            at,
            response_tx,
        })
        .await
    }

    async fn suppressed(&self, list: SuppressionList) -> Result<HashSet<String>, StoreError> {
        self.request(|response_tx| LoadSuppression { list, response_tx }).await
    }

    async fn suppress(&self, list: SuppressionList, address: &str) -> Result<bool, StoreError> {
        let address = address.to_string();
        self.request(|response_tx| Suppress {
            list,
            address,
            response_tx,
        })
        .await
    }

    async fn pause_state(&self) -> Result<PauseState, StoreError> {
        self.request(|response_tx| LoadPause { response_tx }).await
    }

    async fn set_pause_state(&self, state: PauseState) -> Result<(), StoreError> {
        self.request(|response_tx| SavePause { state, response_tx }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Outcome;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_agent_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = ActonApp::launch_async().await;
        let store = AgentStore::spawn(&mut runtime, JsonFiles::in_dir(dir.path()))
            .await
            .unwrap();

        store
            .record(SendLogEntry::new("a@x.com", Outcome::Sent, Utc::now()))
            .await
            .unwrap();
        assert!(store.suppress(SuppressionList::Bounces, "c@x.com").await.unwrap());
        store
            .set_pause_state(PauseState::paused(Some("manual".into()), Utc::now()))
            .await
            .unwrap();

        assert!(store.send_log().await.unwrap().is_sent("a@x.com"));
        assert!(store.is_suppressed(SuppressionList::Bounces, "C@x.com").await.unwrap());
        assert!(store.pause_state().await.unwrap().is_paused);

        runtime.shutdown_all().await.expect("Failed to shutdown");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_suppress_does_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = ActonApp::launch_async().await;
        let store = AgentStore::spawn(&mut runtime, JsonFiles::in_dir(dir.path()))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .suppress(SuppressionList::OptOuts, &format!("user{i}@x.com"))
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(store.suppressed(SuppressionList::OptOuts).await.unwrap().len(), 20);

        runtime.shutdown_all().await.expect("Failed to shutdown");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_recipients_surface_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = ActonApp::launch_async().await;
        let store = AgentStore::spawn(&mut runtime, JsonFiles::in_dir(dir.path()))
            .await
            .unwrap();

        assert!(matches!(store.recipients().await, Err(StoreError::Read { .. })));

        runtime.shutdown_all().await.expect("Failed to shutdown");
    }
}
