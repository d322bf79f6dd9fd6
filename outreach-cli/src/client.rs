//! Blocking client for the outreach HTTP API

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use ureq::Agent;

/// Thin wrapper over `ureq` that knows the server's base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    agent: Agent,
}

impl ApiClient {
    /// Client for the server at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { base_url, agent }
    }

    /// Server base URL without a trailing slash
    #[must_use]
    pub const fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Absolute URL for an API path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET path`, decoding the JSON answer
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached, answers with a
    /// non-success status or sends a body that does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("Failed to reach {url}"))?;
        decode(&url, response)
    }

    /// `POST path` with an optional JSON body, decoding the JSON answer
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached, answers with a
    /// non-success status or sends a body that does not decode as `T`.
    pub fn post<T: DeserializeOwned>(&self, path: &str, body: Option<&Value>) -> Result<T> {
        let url = self.url(path);
        let request = self.agent.post(&url);
        let response = match body {
            Some(body) => request.send_json(body),
            None => request.send_empty(),
        }
        .with_context(|| format!("Failed to reach {url}"))?;
        decode(&url, response)
    }
}

fn decode<T: DeserializeOwned>(url: &str, response: ureq::http::Response<ureq::Body>) -> Result<T> {
    let status = response.status();
    let body = response
        .into_body()
        .read_to_string()
        .context("Failed to read response")?;

    if !status.is_success() {
        bail!("{url} answered {status}: {}", error_message(&body));
    }

    serde_json::from_str(&body).with_context(|| format!("Failed to parse response from {url}"))
}

/// The `error` field of an error body, or the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url("/api/regions"), "http://localhost:3000/api/regions");
        assert_eq!(client.url("health"), "http://localhost:3000/health");
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(error_message(r#"{"error":"email is required"}"#), "email is required");
        assert_eq!(error_message("  bad gateway \n"), "bad gateway");
    }
}
