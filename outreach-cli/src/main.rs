//! outreach CLI tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use outreach_cli::commands::{CampaignCommand, CheckSmtpCommand, ServeCommand};
use outreach_cli::ApiClient;

#[derive(Parser)]
#[command(name = "outreach")]
#[command(version)]
#[command(about = "Run and control a guarded email campaign", long_about = None)]
struct Cli {
    /// Base URL of a running outreach server
    #[arg(
        long,
        global = true,
        env = "OUTREACH_API_URL",
        default_value = "http://127.0.0.1:3000"
    )]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeCommand),
    /// Check that the configured SMTP server accepts our credentials
    CheckSmtp(CheckSmtpCommand),
    #[command(flatten)]
    Campaign(CampaignCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(cmd) => cmd.execute(),
        Commands::CheckSmtp(cmd) => cmd.execute(),
        Commands::Campaign(cmd) => cmd.execute(&ApiClient::new(cli.url)),
    }
}
