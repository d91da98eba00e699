//! HTTP API
//!
//! Endpoints:
//! - `GET /health` - liveness
//! - `POST /api/contact` - contact-form intake
//! - `GET /api/contacts` - stored submissions, newest first
//!
//! Intake runs the admission pipeline in order: body-size ceiling, JSON
//! parse, field validation, then the rate limiter, so malformed requests
//! never consume an admission slot. A 201 means the submission is stored and
//! its notification queued; delivery itself is asynchronous.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use fr_admission::{check_body_size, validate_submission, FieldLimits, RateLimiter, ValidationError};
use fr_common::DeliveryJob;
use fr_compose::Composer;
use fr_queue::QueueHandle;
use fr_store::SqliteStore;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub composer: Arc<Composer>,
    pub queue: QueueHandle,
    pub store: SqliteStore,
    pub limits: FieldLimits,
    pub max_body_bytes: usize,
    pub notify_recipients: Vec<String>,
    pub trust_forwarded_for: bool,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/contact", post(submit_contact))
        .route("/api/contacts", get(list_contacts))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ContactRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    message: String,
}

async fn submit_contact(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = check_body_size(body.len(), state.max_body_bytes) {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, &e.to_string());
    }

    let request: ContactRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body"),
    };

    let submission = match validate_submission(
        &request.name,
        &request.email,
        &request.message,
        &state.limits,
    ) {
        Ok(s) => s,
        Err(e @ ValidationError::BodyTooLarge { .. }) => {
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, &e.to_string());
        }
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let identity = client_identity(&headers, addr, state.trust_forwarded_for);
    if !state.rate_limiter.allow(&identity) {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, please try again later",
        );
    }

    let id = match state.store.insert_submission(&submission).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Failed to store submission");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store submission");
        }
    };

    let composed = state.composer.compose(&submission).await;

    if state.notify_recipients.is_empty() {
        warn!(id = id, "No notification recipients configured, skipping delivery");
    } else {
        // The submitter's address rides along as the candidate display-from;
        // whether it replaces the configured sender is decided by the SMTP
        // allow_from_override setting at dispatch time.
        let job = DeliveryJob::new(
            state.notify_recipients.clone(),
            composed.subject,
            composed.body,
        )
        .with_reply_to(submission.email.clone())
        .with_from_override(submission.email.clone());
        if let Err(e) = state.queue.enqueue(job) {
            warn!(error = %e, id = id, "Failed to enqueue notification");
        }
    }

    info!(id = id, identity = %identity, "Contact submission accepted");
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Contact submitted successfully" })),
    )
        .into_response()
}

async fn list_contacts(State(state): State<AppState>) -> Response {
    match state.store.list_submissions().await {
        Ok(contacts) => Json(json!({ "contacts": contacts })).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to list submissions");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list submissions")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Resolve the client identity used for rate limiting. The forwarded header
/// is honored only when configured, and only its first entry counts.
fn client_identity(headers: &HeaderMap, addr: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }
    addr.ip().to_string()
}
