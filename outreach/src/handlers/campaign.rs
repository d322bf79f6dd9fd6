//! Campaign control, status and recipient self-service handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::dispatch::{self, ProgressStats, TriggerOutcome};
use crate::domain::{normalize_address, PauseState};
use crate::error::OutreachError;
use crate::state::OutreachState;
use crate::store::SuppressionList;

/// Transparent 1x1 GIF served by the open-tracking endpoint
const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

/// Body of `POST /api/send-emails`
#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    /// Only send to recipients in this region
    #[serde(default, alias = "estado")]
    pub region: Option<String>,
}

/// Body of `POST /api/pause-emails`
#[derive(Debug, Default, Deserialize)]
pub struct PauseRequest {
    /// Why sending is being paused
    #[serde(default)]
    pub reason: Option<String>,
}

/// `email` from a query string or body
#[derive(Debug, Default, Deserialize)]
pub struct EmailParam {
    /// Recipient address
    #[serde(default)]
    pub email: Option<String>,
}

impl EmailParam {
    fn address(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(normalize_address)
            .filter(|a| !a.is_empty())
    }
}

/// Response of the pause and resume endpoints
#[derive(Debug, Serialize)]
pub struct PauseResponse {
    /// Confirmation
    pub message: &'static str,
    /// Pause flag as written
    pub state: PauseState,
    /// Progress through the list (resume only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressStats>,
}

/// Parse an optional JSON body; an empty body yields the default
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, OutreachError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| OutreachError::bad_request(format!("invalid JSON body: {e}")))
}

/// Start a dispatch run
///
/// Answers `202 Accepted` with the run summary when a run starts, otherwise
/// `200 OK` with the reason nothing was started.
///
/// # Errors
///
/// Returns 400 for a malformed body and 500 when campaign state cannot be read.
pub async fn send_emails(
    State(state): State<OutreachState>,
    body: Bytes,
) -> Result<Response, OutreachError> {
    let request: SendRequest = optional_json(&body)?;
    let region = request
        .region
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let outcome = state.dispatcher().trigger(region).await?;
    let status = if matches!(outcome, TriggerOutcome::Started(_)) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(outcome)).into_response())
}

/// Raise the pause flag
///
/// # Errors
///
/// Returns 400 for a malformed body and 500 when the flag cannot be written.
pub async fn pause_emails(
    State(state): State<OutreachState>,
    body: Bytes,
) -> Result<Response, OutreachError> {
    let request: PauseRequest = optional_json(&body)?;
    let reason = request.reason.filter(|r| !r.trim().is_empty());
    let pause = state.dispatcher().pause(reason).await?;

    Ok(Json(PauseResponse {
        message: "Sending paused",
        state: pause,
        progress: None,
    })
    .into_response())
}

/// Clear the pause flag and report what is left to send
///
/// # Errors
///
/// Returns 500 when the flag cannot be written.
pub async fn resume_emails(State(state): State<OutreachState>) -> Result<Response, OutreachError> {
    let pause = state.dispatcher().resume().await?;

    let progress = match (state.store().recipients().await, state.store().send_log().await) {
        (Ok(recipients), Ok(log)) => Some(dispatch::progress(&recipients, &log)),
        (Err(error), _) | (_, Err(error)) => {
            tracing::warn!(%error, "Resumed, but progress could not be computed");
            None
        }
    };

    Ok(Json(PauseResponse {
        message: "Sending resumed",
        state: pause,
        progress,
    })
    .into_response())
}

/// Full send log
///
/// # Errors
///
/// Returns 500 when the log cannot be read.
pub async fn email_status(State(state): State<OutreachState>) -> Result<Response, OutreachError> {
    let log = state.store().send_log().await?;
    Ok(Json(log).into_response())
}

/// Computed dashboard status
///
/// # Errors
///
/// Returns 500 when campaign state cannot be read.
pub async fn sending_status(
    State(state): State<OutreachState>,
) -> Result<Response, OutreachError> {
    let log = state.store().send_log().await?;
    let pause = state.store().pause_state().await?;
    let dispatcher = state.dispatcher();

    let status = dispatch::sending_status(
        &log,
        &pause,
        dispatcher.is_sending(),
        dispatcher.gate(),
        Utc::now(),
    );
    Ok(Json(status).into_response())
}

/// Progress through the recipient list
///
/// # Errors
///
/// Returns 500 when campaign state cannot be read.
pub async fn email_stats(State(state): State<OutreachState>) -> Result<Response, OutreachError> {
    let recipients = state.store().recipients().await?;
    let log = state.store().send_log().await?;
    Ok(Json(dispatch::progress(&recipients, &log)).into_response())
}

/// Deliverability report
///
/// # Errors
///
/// Returns 500 when campaign state cannot be read.
pub async fn email_reputation(
    State(state): State<OutreachState>,
) -> Result<Response, OutreachError> {
    let store = state.store();
    let log = store.send_log().await?;
    let bounces = store.suppressed(SuppressionList::Bounces).await?;
    let opt_outs = store.suppressed(SuppressionList::OptOuts).await?;

    let report = dispatch::reputation_report(
        &log,
        bounces.len(),
        opt_outs.len(),
        state.config().dispatch.daily_limit,
        &state.config().reputation,
        Utc::now(),
    );
    Ok(Json(report).into_response())
}

/// Regions present in the recipient list
///
/// # Errors
///
/// Returns 500 when the recipient list cannot be read.
pub async fn regions(State(state): State<OutreachState>) -> Result<Response, OutreachError> {
    let recipients = state.store().recipients().await?;
    Ok(Json(json!({ "regions": crate::domain::regions(&recipients) })).into_response())
}

async fn opt_out(state: &OutreachState, address: &str) -> Result<Response, OutreachError> {
    let added = state
        .store()
        .suppress(SuppressionList::OptOuts, address)
        .await?;

    if added {
        tracing::info!(%address, "Recipient unsubscribed");
    } else {
        tracing::debug!(%address, "Recipient already unsubscribed");
    }

    Ok(Json(json!({
        "success": true,
        "message": "You have been unsubscribed",
        "email": address,
        "already_unsubscribed": !added,
    }))
    .into_response())
}

/// Unsubscribe via link
///
/// # Errors
///
/// Returns 400 when `email` is missing and 500 when the opt-out list cannot be written.
pub async fn unsubscribe(
    State(state): State<OutreachState>,
    Query(param): Query<EmailParam>,
) -> Result<Response, OutreachError> {
    let address = param
        .address()
        .ok_or_else(|| OutreachError::bad_request("email is required"))?;
    opt_out(&state, &address).await
}

/// Unsubscribe via POST
///
/// Accepts `?email=` (RFC 8058 one-click, the body is then form data) or a
/// JSON body `{"email": ...}`.
///
/// # Errors
///
/// Returns 400 when `email` is missing and 500 when the opt-out list cannot be written.
pub async fn unsubscribe_post(
    State(state): State<OutreachState>,
    Query(param): Query<EmailParam>,
    body: Bytes,
) -> Result<Response, OutreachError> {
    let address = match param.address() {
        Some(address) => address,
        None => optional_json::<EmailParam>(&body)?
            .address()
            .ok_or_else(|| OutreachError::bad_request("email is required"))?,
    };
    opt_out(&state, &address).await
}

/// Collapse the send log to one entry per address
///
/// # Errors
///
/// Returns 500 when the log cannot be rewritten.
pub async fn clean_duplicate_emails(
    State(state): State<OutreachState>,
) -> Result<Response, OutreachError> {
    let summary = state.store().collapse_log().await?;
    tracing::info!(
        before = summary.before,
        after = summary.after,
        removed = summary.removed,
        "Send log collapsed"
    );

    Ok(Json(json!({
        "success": true,
        "message": format!("Removed {} duplicate entries", summary.removed),
        "before": summary.before,
        "after": summary.after,
        "removed": summary.removed,
    }))
    .into_response())
}

/// Record an open and answer with a transparent pixel
///
/// Never fails: the pixel is served even when the address is missing or
/// the log cannot be updated.
pub async fn track_email_open(
    State(state): State<OutreachState>,
    Query(param): Query<EmailParam>,
) -> Response {
    if let Some(address) = param.address() {
        match state.store().mark_opened(&address, Utc::now()).await {
            Ok(true) => tracing::debug!(%address, "Open recorded"),
            Ok(false) => tracing::debug!(%address, "Open for unknown address ignored"),
            Err(error) => tracing::warn!(%address, %error, "Could not record open"),
        }
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        TRACKING_PIXEL,
    )
        .into_response()
}
