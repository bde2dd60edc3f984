//! License Validation
//!
//! Answers "is this key usable" for remote callers. Every query first passes
//! the per-caller rate limiter; throttled queries never reach the store.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::license::{LicenseRecord, LicenseStore, LicenseType};
use crate::rate_limit::{Clock, FixedWindowLimiter, RateDecision, SystemClock};

pub const ERR_NO_KEY: &str = "No license key provided";
pub const ERR_INVALID_KEY: &str = "Invalid or inactive license key";
pub const ERR_THROTTLED: &str = "Too many requests. Try again later.";

/// Email reported for the override key
pub const OVERRIDE_EMAIL: &str = "admin";

/// Body of a validation answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub valid: bool,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<LicenseType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResponse {
    pub fn accepted(record: &LicenseRecord) -> Self {
        Self {
            valid: true,
            license_type: Some(record.license_type),
            email: Some(record.email.clone()),
            created_at: Some(record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            error: None,
        }
    }

    fn override_key() -> Self {
        Self {
            valid: true,
            license_type: Some(LicenseType::Lifetime),
            email: Some(OVERRIDE_EMAIL.to_string()),
            created_at: None,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            license_type: None,
            email: None,
            created_at: None,
            error: Some(reason.into()),
        }
    }
}

/// Outcome of one validation query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(ValidationResponse),
    Invalid(ValidationResponse),
    MissingKey(ValidationResponse),
    Throttled {
        response: ValidationResponse,
        retry_after: Duration,
    },
}

impl ValidationOutcome {
    pub fn response(&self) -> &ValidationResponse {
        match self {
            Self::Valid(r) | Self::Invalid(r) | Self::MissingKey(r) => r,
            Self::Throttled { response, .. } => response,
        }
    }

    pub fn into_response(self) -> ValidationResponse {
        match self {
            Self::Valid(r) | Self::Invalid(r) | Self::MissingKey(r) => r,
            Self::Throttled { response, .. } => response,
        }
    }
}

/// Rate-limited validation front end over a license store
pub struct ValidationService<S: LicenseStore, C: Clock = SystemClock> {
    store: Arc<S>,
    override_key: Option<String>,
    limiter: Arc<FixedWindowLimiter<C>>,
}

impl<S: LicenseStore, C: Clock> ValidationService<S, C> {
    pub fn new(store: Arc<S>, limiter: Arc<FixedWindowLimiter<C>>) -> Self {
        Self {
            store,
            override_key: None,
            limiter,
        }
    }

    /// Configure a key that always validates as a lifetime license
    pub fn with_override_key(mut self, key: Option<String>) -> Self {
        self.override_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn limiter(&self) -> &FixedWindowLimiter<C> {
        &self.limiter
    }

    /// Validate `key` on behalf of `caller`
    pub fn validate(&self, caller: &str, key: Option<&str>) -> ValidationOutcome {
        if let RateDecision::Limited { retry_after } = self.limiter.check(caller) {
            tracing::warn!(caller = %caller, retry_after_secs = retry_after.as_secs(), "Validation throttled");
            return ValidationOutcome::Throttled {
                response: ValidationResponse::rejected(ERR_THROTTLED),
                retry_after,
            };
        }

        let Some(key) = key.filter(|k| !k.is_empty()) else {
            return ValidationOutcome::MissingKey(ValidationResponse::rejected(ERR_NO_KEY));
        };

        if self.is_override(key) {
            tracing::info!(caller = %caller, "Override key validated");
            return ValidationOutcome::Valid(ValidationResponse::override_key());
        }

        match self.store.find_by_key(key) {
            Some(record) if record.is_valid() => {
                tracing::debug!(license_key = %record.key, "License validated");
                ValidationOutcome::Valid(ValidationResponse::accepted(&record))
            }
            found => {
                tracing::debug!(caller = %caller, known = found.is_some(), "License rejected");
                ValidationOutcome::Invalid(ValidationResponse::rejected(ERR_INVALID_KEY))
            }
        }
    }

    fn is_override(&self, key: &str) -> bool {
        self.override_key
            .as_deref()
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(key.as_bytes())))
    }
}
