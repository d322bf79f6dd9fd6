//! HTTP API
//!
//! ```text
//! POST /api/send-emails             start a run (optional {"region"} filter)
//! POST /api/pause-emails            raise the pause flag
//! POST /api/resume-emails           clear the pause flag
//! GET  /api/email-status            full send log
//! GET  /api/email-sending-status    computed dashboard status
//! GET  /api/email-stats             progress through the list
//! GET  /api/email-reputation        deliverability report
//! GET  /api/regions                 regions present in the list
//! GET  /api/unsubscribe?email=      opt out (also POST, JSON or one-click)
//! POST /api/clean-duplicate-emails  collapse the log to one entry per address
//! GET  /api/track-email-open?email= record an open, answers a 1x1 GIF
//! GET  /health                      liveness
//! ```

use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::state::OutreachState;

pub mod campaign;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// Build the application router
#[must_use]
pub fn router(state: OutreachState) -> Router {
    Router::new()
        .route("/api/send-emails", post(campaign::send_emails))
        .route("/api/pause-emails", post(campaign::pause_emails))
        .route("/api/resume-emails", post(campaign::resume_emails))
        .route("/api/email-status", get(campaign::email_status))
        .route("/api/email-sending-status", get(campaign::sending_status))
        .route("/api/email-stats", get(campaign::email_stats))
        .route("/api/email-reputation", get(campaign::email_reputation))
        .route("/api/regions", get(campaign::regions))
        .route(
            "/api/unsubscribe",
            get(campaign::unsubscribe).post(campaign::unsubscribe_post),
        )
        .route(
            "/api/clean-duplicate-emails",
            post(campaign::clean_duplicate_emails),
        )
        .route("/api/track-email-open", get(campaign::track_email_open))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_headers(Any)
                        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]),
                )
                .map_response(|res: axum::response::Response<_>| {
                    res.map(axum::body::Body::new)
                })
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// Liveness check, naming the service it answers for
#[allow(clippy::unused_async)]
pub async fn health(State(state): State<OutreachState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": state.observability().service_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
