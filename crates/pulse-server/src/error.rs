//! HTTP Error Mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pulse_licensing::LicensingError;

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Licensing(#[from] LicensingError),

    #[error("Payments not configured")]
    PaymentsDisabled,

    #[error("Webhooks not configured")]
    WebhooksDisabled,

    #[error("{0}")]
    BadRequest(String),

    /// A blocking store task panicked or was cancelled
    #[error("store task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Licensing(err) => match err {
                LicensingError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
                LicensingError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
                LicensingError::UnknownPlan(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_PLAN"),
                LicensingError::InvalidKeyFormat(_) => (StatusCode::BAD_REQUEST, "INVALID_KEY_FORMAT"),
                LicensingError::Checkout(_) => (StatusCode::BAD_GATEWAY, "CHECKOUT_ERROR"),
                LicensingError::Storage(_) | LicensingError::Io(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
                }
                LicensingError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
                LicensingError::Json(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::PaymentsDisabled => (StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED"),
            ApiError::WebhooksDisabled => (StatusCode::SERVICE_UNAVAILABLE, "WEBHOOKS_DISABLED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Blocking(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        } else {
            tracing::warn!(error = %self, code, "Request rejected");
        }

        // Internal detail stays in the log.
        let error = match &self {
            ApiError::Licensing(err) => err.user_message().to_string(),
            ApiError::Blocking(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
