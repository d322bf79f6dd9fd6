//! Application state shared by every HTTP handler

use acton_reactive::prelude::ActorRuntime;
use std::sync::Arc;

use crate::config::OutreachConfig;
use crate::dispatch::Dispatcher;
use crate::email::{EmailSender, SmtpBackend};
use crate::observability::ObservabilityConfig;
use crate::store::{AgentStore, CampaignStore, JsonFiles};

/// Application state
///
/// Combines:
/// - Configuration
/// - Campaign store (the file-backed store agent in production)
/// - The dispatcher, which owns the transport and the single-run guard
///
/// # Example
///
/// ```rust,ignore
/// use acton_reactive::prelude::ActonApp;
/// use outreach::{config::OutreachConfig, state::OutreachState};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut runtime = ActonApp::launch_async().await;
///     let config = OutreachConfig::load_for_service("campaign")?;
///     let state = OutreachState::new(&mut runtime, config).await?;
///
///     let app = outreach::handlers::router(state);
///     // ... serve ...
///
///     runtime.shutdown_all().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct OutreachState {
    config: Arc<OutreachConfig>,
    observability: Arc<ObservabilityConfig>,
    store: Arc<dyn CampaignStore>,
    dispatcher: Arc<Dispatcher>,
}

impl OutreachState {
    /// State backed by the store agent and the configured SMTP server
    ///
    /// # Errors
    ///
    /// Returns error if the store agent cannot be spawned or the SMTP
    /// transport cannot be built from the configuration
    pub async fn new(runtime: &mut ActorRuntime, config: OutreachConfig) -> anyhow::Result<Self> {
        let sender = SmtpBackend::from_settings(&config.smtp)?;
        Self::with_sender(runtime, config, Arc::new(sender)).await
    }

    /// State backed by the store agent and a caller-chosen transport
    ///
    /// # Errors
    ///
    /// Returns error if the store agent cannot be spawned
    pub async fn with_sender(
        runtime: &mut ActorRuntime,
        config: OutreachConfig,
        sender: Arc<dyn EmailSender>,
    ) -> anyhow::Result<Self> {
        let store = AgentStore::spawn(runtime, JsonFiles::new(config.storage.clone())).await?;
        Ok(Self::from_parts(config, Arc::new(store), sender))
    }

    /// State from already-built parts
    #[must_use]
    pub fn from_parts(
        config: OutreachConfig,
        store: Arc<dyn CampaignStore>,
        sender: Arc<dyn EmailSender>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            sender,
            config.campaign.clone(),
            config.dispatch.clone(),
        );

        Self {
            config: Arc::new(config),
            observability: Arc::new(ObservabilityConfig::default()),
            store,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Replace the observability configuration with the one logging was
    /// initialised from
    #[must_use]
    pub fn with_observability(mut self, observability: ObservabilityConfig) -> Self {
        self.observability = Arc::new(observability);
        self
    }

    /// Application configuration
    #[must_use]
    pub fn config(&self) -> &OutreachConfig {
        &self.config
    }

    /// Observability configuration
    #[must_use]
    pub fn observability(&self) -> &ObservabilityConfig {
        &self.observability
    }

    /// Campaign store
    #[must_use]
    pub fn store(&self) -> &dyn CampaignStore {
        self.store.as_ref()
    }

    /// Campaign dispatcher
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
