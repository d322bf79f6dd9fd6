//! `outreach serve`

use acton_reactive::prelude::ActonApp;
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use outreach::config::OutreachConfig;
use outreach::handlers::router;
use outreach::observability::{self, ObservabilityConfig};
use outreach::state::OutreachState;
use std::path::PathBuf;
use tokio::net::TcpListener;

use super::{load_config, SERVICE_NAME, SUCCESS};

/// Start the HTTP server
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Configuration file (defaults to the standard search path)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen on this port instead of the configured one
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,
}

impl ServeCommand {
    /// Execute the serve command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration cannot be loaded
    /// - The SMTP transport or store agent cannot be built
    /// - The listen address cannot be bound
    pub fn execute(&self) -> Result<()> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(port) = self.port {
            config.server.port = port;
        }

        let mut logging = ObservabilityConfig::new(SERVICE_NAME);
        if self.json_logs {
            logging = logging.with_json_logs();
        }
        observability::init_with(&logging)?;

        tokio::runtime::Runtime::new()
            .context("Failed to start async runtime")?
            .block_on(serve(config, logging))
    }
}

async fn serve(config: OutreachConfig, logging: ObservabilityConfig) -> Result<()> {
    let mut runtime = ActonApp::launch_async().await;
    let bind = config.server.bind_address();
    let data_dir = config.storage.data_dir.clone();
    let state = OutreachState::new(&mut runtime, config)
        .await?
        .with_observability(logging);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    println!(
        "{SUCCESS} Listening on {}",
        style(format!("http://{bind}")).cyan()
    );
    tracing::info!(%bind, data_dir = %data_dir.display(), "Outreach server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    runtime.shutdown_all().await?;
    tracing::info!("Outreach server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown requested");
}
