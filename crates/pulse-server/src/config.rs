//! Server Configuration
//!
//! Everything comes from environment variables (optionally seeded from a
//! `.env` file by `main`). Parsing goes through a lookup function so tests can
//! feed a plain map instead of touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use pulse_licensing::{
    DEFAULT_KEY_PREFIX, DEFAULT_MAX_REQUESTS, DEFAULT_TOLERANCE, DEFAULT_WINDOW, LicensingError,
    PlanPrices, ReplayPolicy, Result,
};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LICENSES_FILE: &str = "licenses.json";
const DEFAULT_SUCCESS_WAIT: Duration = Duration::from_millis(2000);

/// Credentials needed to open checkout sessions
#[derive(Clone, Debug)]
pub struct StripeSettings {
    pub secret_key: String,
    pub prices: PlanPrices,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Public base URL used for checkout redirects
    pub server_url: String,
    pub licenses_file: PathBuf,
    /// `None` disables checkout endpoints
    pub stripe: Option<StripeSettings>,
    /// `None` disables the webhook endpoint
    pub webhook_secret: Option<String>,
    pub webhook_tolerance: Duration,
    pub master_license_key: Option<String>,
    pub key_prefix: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub trust_proxy_headers: bool,
    pub replay_policy: ReplayPolicy,
    /// How long `/success` waits for the webhook to land
    pub success_wait: Duration,
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match var("PORT") {
            Some(raw) => parse_number::<u16>("PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| format!("0.0.0.0:{port}"));
        let server_url = var("SERVER_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let stripe = match var("STRIPE_SECRET_KEY") {
            Some(secret_key) => {
                let price = |name: &str| {
                    var(name).ok_or_else(|| {
                        LicensingError::Config(format!("{name} must be set when STRIPE_SECRET_KEY is"))
                    })
                };
                Some(StripeSettings {
                    secret_key,
                    prices: PlanPrices {
                        monthly: price("STRIPE_PRICE_MONTHLY")?,
                        lifetime: price("STRIPE_PRICE_LIFETIME")?,
                    },
                })
            }
            None => None,
        };

        let webhook_tolerance = match var("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => Duration::from_secs(parse_number("STRIPE_WEBHOOK_TOLERANCE_SECS", &raw)?),
            None => DEFAULT_TOLERANCE,
        };
        let rate_limit_window = match var("RATE_LIMIT_WINDOW_SECS") {
            Some(raw) => Duration::from_secs(parse_number("RATE_LIMIT_WINDOW_SECS", &raw)?),
            None => DEFAULT_WINDOW,
        };
        let rate_limit_max_requests = match var("RATE_LIMIT_MAX_REQUESTS") {
            Some(raw) => parse_number("RATE_LIMIT_MAX_REQUESTS", &raw)?,
            None => DEFAULT_MAX_REQUESTS,
        };
        let success_wait = match var("SUCCESS_WAIT_MS") {
            Some(raw) => Duration::from_millis(parse_number("SUCCESS_WAIT_MS", &raw)?),
            None => DEFAULT_SUCCESS_WAIT,
        };
        let trust_proxy_headers = match var("TRUST_PROXY_HEADERS") {
            Some(raw) => parse_bool("TRUST_PROXY_HEADERS", &raw)?,
            None => false,
        };
        let replay_policy = match var("PURCHASE_REPLAY_POLICY") {
            Some(raw) => raw.parse()?,
            None => ReplayPolicy::default(),
        };

        Ok(Self {
            bind_addr,
            server_url,
            licenses_file: var("LICENSES_FILE")
                .map_or_else(|| PathBuf::from(DEFAULT_LICENSES_FILE), PathBuf::from),
            stripe,
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            webhook_tolerance,
            master_license_key: var("MASTER_LICENSE_KEY"),
            key_prefix: var("LICENSE_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            rate_limit_window,
            rate_limit_max_requests,
            trust_proxy_headers,
            replay_policy,
            success_wait,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| LicensingError::Config(format!("{name} must be a non-negative integer, got '{raw}'")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LicensingError::Config(format!("{name} must be true or false, got '{raw}'"))),
    }
}
