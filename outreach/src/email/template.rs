//! Campaign message rendering
//!
//! Every message carries a per-recipient unsubscribe link in the footer and
//! the bulk-mail headers mailbox providers look for (`List-Unsubscribe`,
//! one-click `List-Unsubscribe-Post`, `Precedence: bulk`).

use askama::Template;
use url::Url;

use super::{Email, EmailError};
use crate::config::CampaignSettings;
use crate::domain::Recipient;

#[derive(Template)]
#[template(path = "campaign.html")]
struct CampaignHtml<'a> {
    subject: &'a str,
    headline: &'a str,
    name: Option<&'a str>,
    paragraphs: &'a [String],
    cta_url: Option<&'a str>,
    cta_label: &'a str,
    address: &'a str,
    unsubscribe_url: &'a str,
    open_pixel_url: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "campaign.txt")]
struct CampaignText<'a> {
    headline: &'a str,
    name: Option<&'a str>,
    paragraphs: &'a [String],
    cta_url: Option<&'a str>,
    cta_label: &'a str,
    address: &'a str,
    unsubscribe_url: &'a str,
}

/// Turns a recipient into a ready-to-send [`Email`]
#[derive(Debug, Clone)]
pub struct CampaignComposer {
    settings: CampaignSettings,
}

impl CampaignComposer {
    /// Composer for the configured campaign
    #[must_use]
    pub const fn new(settings: CampaignSettings) -> Self {
        Self { settings }
    }

    /// Campaign settings in use
    #[must_use]
    pub const fn settings(&self) -> &CampaignSettings {
        &self.settings
    }

    /// Render the campaign for one recipient
    ///
    /// # Errors
    ///
    /// Returns `EmailError::InvalidUrl` if a configured link does not parse
    /// and `EmailError::TemplateError` if rendering fails.
    pub fn compose(&self, recipient: &Recipient) -> Result<Email, EmailError> {
        let address = recipient.address();
        let settings = &self.settings;
        let unsubscribe_url = with_email_param(&settings.unsubscribe_url, &address)?;
        let open_pixel_url = settings
            .track_opens_url
            .as_deref()
            .map(|base| with_email_param(base, &address))
            .transpose()?;
        let name = recipient.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let cta_label = settings.cta_label.as_deref().unwrap_or("Learn more");

        let html = CampaignHtml {
            subject: &settings.subject,
            headline: &settings.headline,
            name,
            paragraphs: &settings.paragraphs,
            cta_url: settings.cta_url.as_deref(),
            cta_label,
            address: &address,
            unsubscribe_url: &unsubscribe_url,
            open_pixel_url: open_pixel_url.as_deref(),
        }
        .render()?;

        let text = CampaignText {
            headline: &settings.headline,
            name,
            paragraphs: &settings.paragraphs,
            cta_url: settings.cta_url.as_deref(),
            cta_label,
            address: &address,
            unsubscribe_url: &unsubscribe_url,
        }
        .render()?;

        let list_unsubscribe = settings.unsubscribe_mailto.as_deref().map_or_else(
            || format!("<{unsubscribe_url}>"),
            |mailbox| format!("<mailto:{mailbox}?subject=unsubscribe>, <{unsubscribe_url}>"),
        );

        let mut email = Email::new()
            .to(&address)
            .from(&sender_mailbox(settings))
            .subject(&settings.subject)
            .text(&text)
            .html(&html)
            .header("List-Unsubscribe", &list_unsubscribe)
            .header("List-Unsubscribe-Post", "List-Unsubscribe=One-Click")
            .header("Precedence", "bulk")
            .header("X-Auto-Response-Suppress", "OOF, AutoReply")
            .header("X-Mailer", concat!("outreach/", env!("CARGO_PKG_VERSION")));

        if let Some(reply_to) = &settings.reply_to {
            email = email.reply_to(reply_to);
        }

        Ok(email)
    }
}

fn sender_mailbox(settings: &CampaignSettings) -> String {
    let name = settings.from_name.replace('"', "'");
    if name.trim().is_empty() {
        settings.from_address.clone()
    } else {
        format!("\"{name}\" <{}>", settings.from_address)
    }
}

/// Add `email=<address>` to a URL's query string
///
/// Existing query pairs and any fragment are kept in place.
///
/// # Errors
///
/// Returns `EmailError::InvalidUrl` if `base` is not an absolute URL.
pub fn with_email_param(base: &str, address: &str) -> Result<String, EmailError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("email", address);
    Ok(url.into())
}
