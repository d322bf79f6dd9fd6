//! `outreach check-smtp`

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use outreach::email::{EmailSender, SmtpBackend};
use std::path::PathBuf;

use super::{load_config, INFO, SUCCESS, WARN};

/// Open a connection to the configured SMTP server and report the result
#[derive(Debug, Args)]
pub struct CheckSmtpCommand {
    /// Configuration file (defaults to the standard search path)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl CheckSmtpCommand {
    /// Execute the check
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded, the transport
    /// cannot be built, or the server refuses the connection.
    pub fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let smtp = &config.smtp;

        println!(
            "{INFO} Checking {}:{} ({:?})",
            style(&smtp.host).cyan(),
            smtp.port,
            smtp.tls
        );

        let backend = SmtpBackend::from_settings(smtp)?;
        let accepted = tokio::runtime::Runtime::new()
            .context("Failed to start async runtime")?
            .block_on(backend.verify())
            .with_context(|| format!("SMTP check against {} failed", smtp.host))?;

        if accepted {
            println!("{SUCCESS} SMTP server accepted the connection");
        } else {
            println!(
                "{WARN} {}",
                style("SMTP server answered but did not accept the connection").yellow()
            );
        }
        Ok(())
    }
}
