//! CLI command implementations

pub mod campaign;
pub mod serve;
pub mod smtp;

pub use campaign::CampaignCommand;
pub use serve::ServeCommand;
pub use smtp::CheckSmtpCommand;

use anyhow::{Context, Result};
use console::Emoji;
use outreach::config::OutreachConfig;
use std::path::Path;

pub(crate) static SUCCESS: Emoji = Emoji("✓", "√");
pub(crate) static INFO: Emoji = Emoji("ℹ", "i");
pub(crate) static WARN: Emoji = Emoji("⚠", "!");

/// Service name used for configuration lookup and logs
pub const SERVICE_NAME: &str = "outreach";

/// Load configuration from `path`, or from the standard search path
///
/// # Errors
///
/// Returns an error if the file is unreadable, not valid TOML, or the path
/// is not UTF-8.
pub fn load_config(path: Option<&Path>) -> Result<OutreachConfig> {
    match path {
        Some(path) => {
            let path = path
                .to_str()
                .with_context(|| format!("Config path is not valid UTF-8: {}", path.display()))?;
            OutreachConfig::load_from(path).with_context(|| format!("Failed to load {path}"))
        }
        None => OutreachConfig::load_for_service(SERVICE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\ndaily_limit = 25\n\n[server]\nport = 8081").unwrap();

        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.dispatch.daily_limit, 25);
        assert_eq!(config.server.port, 8081);
    }
}
