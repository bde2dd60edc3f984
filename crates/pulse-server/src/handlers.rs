//! HTTP Handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use pulse_licensing::{
    CheckoutRequest, JsonFileLicenseStore, LicenseRecord, LicenseStore, Plan, SIGNATURE_HEADER,
    ValidationOutcome,
};

use crate::error::ApiError;
use crate::extract::ClientAddr;
use crate::state::AppState;

const SUCCESS_POLL_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStatus {
    pub session_id: String,
    /// `ready` once the webhook has minted a key, `pending` before
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

impl CheckoutStatus {
    fn new(session_id: String, record: Option<LicenseRecord>) -> Self {
        match record {
            Some(record) => Self {
                session_id,
                status: "ready".into(),
                license_key: Some(record.key.to_string()),
            },
            None => Self {
                session_id,
                status: "pending".into(),
                license_key: None,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Stripe webhook handler
///
/// The body is taken as raw bytes: the signature covers the exact payload.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let webhooks = Arc::clone(state.webhooks.as_ref().ok_or(ApiError::WebhooksDisabled)?);

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let outcome = blocking(move || webhooks.handle(&body, signature.as_deref())).await??;

    tracing::debug!(outcome = ?outcome, "Webhook processed");
    Ok(Json(WebhookAck { received: true }))
}

/// Create Stripe checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let gateway = state.checkout.as_ref().ok_or(ApiError::PaymentsDisabled)?;
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let plan: Plan = payload.plan.parse()?;

    let session = gateway
        .create_session(CheckoutRequest {
            plan,
            customer_email: payload.email.filter(|e| !e.trim().is_empty()),
        })
        .await?;

    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.id,
    }))
}

/// Redirect straight to the hosted checkout page
pub async fn checkout_redirect(
    State(state): State<AppState>,
    Path(plan): Path<String>,
) -> Result<Redirect, ApiError> {
    let gateway = state.checkout.as_ref().ok_or(ApiError::PaymentsDisabled)?;
    let plan: Plan = plan.parse()?;

    let session = gateway
        .create_session(CheckoutRequest {
            plan,
            customer_email: None,
        })
        .await?;

    Ok(Redirect::to(&session.url))
}

/// Validate a license key
///
/// The body is parsed leniently: anything without a usable `key` is answered
/// as a missing key, after the rate limiter has counted the request.
pub async fn validate_license(
    State(state): State<AppState>,
    ClientAddr(caller): ClientAddr,
    body: Bytes,
) -> Response {
    let request: ValidateRequest = serde_json::from_slice(&body).unwrap_or_default();

    let validation = Arc::clone(&state.validation);
    let outcome = match blocking(move || validation.validate(&caller, request.key.as_deref())).await {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    match outcome {
        ValidationOutcome::Valid(response) | ValidationOutcome::Invalid(response) => {
            Json(response).into_response()
        }
        ValidationOutcome::MissingKey(response) => {
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
        ValidationOutcome::Throttled {
            response,
            retry_after,
        } => {
            let secs = retry_after
                .as_secs()
                .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
                .max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(response),
            )
                .into_response()
        }
    }
}

/// Look up the license minted for a checkout session
pub async fn checkout_status(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<CheckoutStatus>, ApiError> {
    let session_id = required_session(query)?;
    let record = find_by_session(&state.store, &session_id).await?;
    Ok(Json(CheckoutStatus::new(session_id, record)))
}

/// Post-payment landing: give the webhook a moment to land, then report
pub async fn checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<CheckoutStatus>, ApiError> {
    let session_id = required_session(query)?;
    let record = wait_for_license(&state.store, &session_id, state.config.success_wait).await?;

    if record.is_none() {
        tracing::info!(session_id = %session_id, "License not issued yet for session");
    }
    Ok(Json(CheckoutStatus::new(session_id, record)))
}

pub async fn checkout_cancelled() -> Json<CancelResponse> {
    Json(CancelResponse { cancelled: true })
}

fn required_session(query: SessionQuery) -> Result<String, ApiError> {
    query
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("session_id is required".into()))
}

/// Run synchronous store work off the async worker threads
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

async fn find_by_session(
    store: &Arc<JsonFileLicenseStore>,
    session_id: &str,
) -> Result<Option<LicenseRecord>, ApiError> {
    let store = Arc::clone(store);
    let session_id = session_id.to_owned();
    blocking(move || store.find_by_session_id(&session_id)).await
}

async fn wait_for_license(
    store: &Arc<JsonFileLicenseStore>,
    session_id: &str,
    wait: Duration,
) -> Result<Option<LicenseRecord>, ApiError> {
    let deadline = Instant::now() + wait;
    loop {
        if let Some(record) = find_by_session(store, session_id).await? {
            return Ok(Some(record));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(SUCCESS_POLL_INTERVAL.min(deadline - now)).await;
    }
}
