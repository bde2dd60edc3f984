//! Remote validation against the license server

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, header::RETRY_AFTER};

use pulse_licensing::ValidationResponse;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Anything that can answer "is this key usable"
#[async_trait]
pub trait LicenseAuthority: Send + Sync {
    async fn validate(&self, key: &str) -> Result<ValidationResponse>;
}

/// HTTP client for `POST /api/validate-license`
#[derive(Debug, Clone)]
pub struct LicenseClient {
    http: reqwest::Client,
    endpoint: String,
}

impl LicenseClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/validate-license", server_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.server_url, config.timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LicenseAuthority for LicenseClient {
    async fn validate(&self, key: &str) -> Result<ValidationResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "key": key }))
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            tracing::warn!(retry_after = ?retry_after, "License server is throttling validation");
            return Err(ClientError::Throttled { retry_after });
        }
        if status.is_server_error() {
            return Err(ClientError::Unreachable(format!("server returned {status}")));
        }

        // 200 and 400 both carry a validation body.
        response
            .json::<ValidationResponse>()
            .await
            .map_err(|e| ClientError::Protocol(format!("{status}: {e}")))
    }
}
