//! Client Configuration

use std::path::PathBuf;
use std::time::Duration;

use pulse_licensing::DEFAULT_KEY_PREFIX;

use crate::error::{ClientError, Result};

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_DATA_DIR: &str = ".pulse";
const LICENSE_FILENAME: &str = "license.json";
const SUCCESS_FILENAME: &str = "last-success.json";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub data_dir: PathBuf,
    pub key_prefix: String,
    /// Cached validations younger than this are trusted without a round trip
    pub revalidate_after: chrono::Duration,
    /// How long an unreachable server is tolerated after the last good validation
    pub grace_period: chrono::Duration,
    pub staleness_warning_days: i64,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            revalidate_after: chrono::Duration::hours(24),
            grace_period: chrono::Duration::days(3),
            staleness_warning_days: 5,
            timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |name: &str| -> Result<Option<i64>> {
            var(name)
                .map(|raw| {
                    raw.parse::<i64>()
                        .ok()
                        .filter(|n| *n >= 0)
                        .ok_or_else(|| ClientError::Config(format!("{name} must be a non-negative integer, got '{raw}'")))
                })
                .transpose()
        };
        let span = |name: &str, to: fn(i64) -> Option<chrono::Duration>| -> Result<Option<chrono::Duration>> {
            number(name)?
                .map(|n| to(n).ok_or_else(|| ClientError::Config(format!("{name} is out of range"))))
                .transpose()
        };

        let defaults = Self::default();
        Ok(Self {
            server_url: var("LICENSE_SERVER_URL")
                .map_or(defaults.server_url, |url| url.trim_end_matches('/').to_string()),
            data_dir: var("PULSE_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            key_prefix: var("LICENSE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            revalidate_after: span("LICENSE_REVALIDATE_HOURS", chrono::Duration::try_hours)?
                .unwrap_or(defaults.revalidate_after),
            grace_period: span("LICENSE_GRACE_DAYS", chrono::Duration::try_days)?.unwrap_or(defaults.grace_period),
            staleness_warning_days: number("STALENESS_WARNING_DAYS")?.unwrap_or(defaults.staleness_warning_days),
            timeout: number("LICENSE_REQUEST_TIMEOUT_SECS")?
                .map_or(defaults.timeout, |secs| Duration::from_secs(secs.unsigned_abs())),
        })
    }

    pub fn license_file(&self) -> PathBuf {
        self.data_dir.join(LICENSE_FILENAME)
    }

    pub fn success_file(&self) -> PathBuf {
        self.data_dir.join(SUCCESS_FILENAME)
    }
}
