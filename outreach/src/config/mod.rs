//! Configuration management for outreach
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `OUTREACH_` prefix, `__` for nesting)
//! 2. `./outreach.toml` (development)
//! 3. `~/.config/outreach/{service}/config.toml` (user config, XDG)
//! 4. `/etc/outreach/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//!
//! [storage]
//! data_dir = "./data"
//!
//! [dispatch]
//! batch_size = 5
//! batch_delay_secs = 60
//! daily_limit = 100
//!
//! [smtp]
//! host = "smtp.example.org"
//! port = 465
//! tls = "tls"
//! ```
//!
//! SMTP credentials are usually supplied through the environment:
//! `OUTREACH_SMTP__USERNAME` and `OUTREACH_SMTP__PASSWORD`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerSettings {
    /// `host:port` pair suitable for `TcpListener::bind`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where campaign state lives on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding every state file
    pub data_dir: PathBuf,

    /// Recipient list (read-only)
    pub recipients_file: String,

    /// Per-recipient send outcomes
    pub send_log_file: String,

    /// Bounce suppression list
    pub bounces_file: String,

    /// Opt-out suppression list
    pub opt_outs_file: String,

    /// Pause flag
    pub pause_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            recipients_file: "recipients.json".to_string(),
            send_log_file: "send-log.json".to_string(),
            bounces_file: "bounces.json".to_string(),
            opt_outs_file: "opt-outs.json".to_string(),
            pause_file: "pause.json".to_string(),
        }
    }
}

/// Batching, ceilings and pacing of a dispatch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Recipients per batch
    pub batch_size: usize,

    /// Pause between batches in seconds
    pub batch_delay_secs: u64,

    /// Pause between individual messages in milliseconds
    pub message_delay_ms: u64,

    /// Maximum successful sends per calendar day
    pub daily_limit: usize,

    /// Minimum seconds since the last successful send before a new run may start
    pub cooldown_secs: u64,

    /// Persist a pause when the daily ceiling is hit
    pub pause_on_daily_limit: bool,

    /// Extra attempts for transient transport failures (0 disables retry)
    pub retry_attempts: u32,

    /// Base backoff for retries in milliseconds, doubled per attempt
    pub retry_backoff_ms: u64,

    /// Addresses containing any of these substrings are rejected as invalid
    pub blocked_substrings: Vec<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_secs: 60,
            message_delay_ms: 2_000,
            daily_limit: 100,
            cooldown_secs: 60,
            pause_on_daily_limit: true,
            retry_attempts: 0,
            retry_backoff_ms: 1_000,
            blocked_substrings: vec![
                "noreply".to_string(),
                "no-reply".to_string(),
                "test".to_string(),
                "example".to_string(),
            ],
        }
    }
}

impl DispatchSettings {
    /// Inter-batch delay
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }

    /// Inter-message delay
    #[must_use]
    pub const fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms)
    }

    /// Cooldown window
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Settings with every delay zeroed, for tests and dry runs
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            batch_delay_secs: 0,
            message_delay_ms: 0,
            cooldown_secs: 0,
            retry_backoff_ms: 0,
            ..Self::default()
        }
    }
}

/// Transport security for the SMTP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain connection (local relays only)
    None,
    /// Implicit TLS, usually port 465
    Tls,
    /// STARTTLS upgrade, usually port 587
    Starttls,
}

/// SMTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// SMTP server hostname
    pub host: String,

    /// SMTP server port
    pub port: u16,

    /// SMTP username (empty disables authentication)
    pub username: String,

    /// SMTP password
    pub password: String,

    /// Transport security
    pub tls: TlsMode,

    /// Pooled connections kept open
    pub pool_size: u32,

    /// Upper bound on messages handed to the server per second
    pub max_per_second: u32,

    /// Command timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 465,
            username: String::new(),
            password: String::new(),
            tls: TlsMode::Tls,
            pool_size: 3,
            max_per_second: 5,
            timeout_secs: 30,
        }
    }
}

/// Message identity and compliance links
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    /// Display name of the sender
    pub from_name: String,

    /// Sender address
    pub from_address: String,

    /// Optional Reply-To address
    pub reply_to: Option<String>,

    /// Subject line
    pub subject: String,

    /// Public unsubscribe endpoint, the recipient address is appended as `?email=`
    pub unsubscribe_url: String,

    /// Mailbox for `List-Unsubscribe: <mailto:...>`
    pub unsubscribe_mailto: Option<String>,

    /// Open-tracking endpoint; when set a 1x1 image pointing at it is embedded
    pub track_opens_url: Option<String>,

    /// Heading of the message body
    pub headline: String,

    /// Body paragraphs
    pub paragraphs: Vec<String>,

    /// Call-to-action button label
    pub cta_label: Option<String>,

    /// Call-to-action button target
    pub cta_url: Option<String>,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            from_name: "Outreach".to_string(),
            from_address: "campaign@localhost".to_string(),
            reply_to: None,
            subject: "An update for you".to_string(),
            unsubscribe_url: "http://127.0.0.1:3000/api/unsubscribe".to_string(),
            unsubscribe_mailto: None,
            track_opens_url: None,
            headline: "An update for you".to_string(),
            paragraphs: vec!["We have news we think you will find useful.".to_string()],
            cta_label: None,
            cta_url: None,
        }
    }
}

/// Bounce-rate thresholds for the reputation report (percent)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationSettings {
    /// Bounce rate above which health is `warning`
    pub warning_bounce_rate: f64,

    /// Bounce rate above which health is `critical`
    pub critical_bounce_rate: f64,
}

impl Default for ReputationSettings {
    fn default() -> Self {
        Self {
            warning_bounce_rate: 2.0,
            critical_bounce_rate: 5.0,
        }
    }
}

/// Complete outreach configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutreachConfig {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerSettings,

    /// State files
    #[serde(default)]
    pub storage: StorageSettings,

    /// Dispatch pacing and ceilings
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// SMTP transport
    #[serde(default)]
    pub smtp: SmtpSettings,

    /// Message identity
    #[serde(default)]
    pub campaign: CampaignSettings,

    /// Reputation thresholds
    #[serde(default)]
    pub reputation: ReputationSettings,
}

impl OutreachConfig {
    /// Load configuration for a service
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - A configuration file cannot be read or parsed
    /// - Merged values fail type conversion
    pub fn load_for_service(service_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?));

        let system_config = PathBuf::from("/etc/outreach")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./outreach.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        figment = figment.merge(Env::prefixed("OUTREACH_").split("__").lowercase(true));

        Ok(figment.extract()?)
    }

    /// Load configuration from a specific file, still honoring `OUTREACH_*` overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or values fail conversion.
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let config = Figment::new()
            .merge(Toml::string(&toml::to_string(&Self::default())?))
            .merge(Toml::file(path))
            .merge(Env::prefixed("OUTREACH_").split("__").lowercase(true))
            .extract()?;

        Ok(config)
    }

    /// Recommended XDG config path for a service
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./outreach.toml"),
            |config_dir| {
                config_dir
                    .join("outreach")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }
}
