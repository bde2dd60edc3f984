//! Licensing Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, LicensingError>;

/// Licensing-related errors
#[derive(Error, Debug)]
pub enum LicensingError {
    /// Webhook signature missing, malformed, stale or mismatched
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Verified webhook payload could not be parsed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Backing store could not be read strictly or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Payment processor rejected or failed a checkout request
    #[error("Checkout error: {0}")]
    Checkout(String),

    /// Plan name is neither `monthly` nor `lifetime`
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    /// License key does not match `PREFIX-XXXX-XXXX-XXXX-XXXX`
    #[error("Invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LicensingError {
    /// Check if the caller (or the processor's redelivery) may retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LicensingError::Storage(_) | LicensingError::Io(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            LicensingError::WebhookSignature(_) => "Webhook signature verification failed.",
            LicensingError::WebhookParse(_) => "Webhook payload could not be parsed.",
            LicensingError::Storage(_) | LicensingError::Io(_) => {
                "License storage is temporarily unavailable."
            }
            LicensingError::Checkout(_) => "Payment processing failed. Please try again.",
            LicensingError::UnknownPlan(_) => "Unknown plan. Choose 'monthly' or 'lifetime'.",
            LicensingError::InvalidKeyFormat(_) => "License key has an invalid format.",
            LicensingError::Config(_) => "Service configuration error.",
            LicensingError::Json(_) => "An error occurred processing your request.",
        }
    }
}
