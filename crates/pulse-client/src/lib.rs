//! # pulse-client
//!
//! The automation's side of licensing: activate a key once, then check it
//! before every run with a cached validation and a grace period for when the
//! license server cannot be reached.
//!
//! ```text
//! activate(key) ──► format check ──► POST /api/validate-license ──► license.json
//!
//! check(now) ──► license.json younger than revalidate_after? ──► Valid
//!                      │ no
//!                      ▼
//!               POST /api/validate-license
//!                 valid ──► Valid (validatedAt refreshed)
//!                 invalid ──► Invalid
//!                 unreachable / throttled ──► Grace or Invalid
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pulse_client::{Activator, ClientConfig, LicenseClient};
//!
//! let config = ClientConfig::from_env()?;
//! let activator = Activator::new(LicenseClient::from_config(&config)?, &config);
//!
//! if !activator.check(chrono::Utc::now()).await?.allows_run() {
//!     return Ok(());
//! }
//! ```

mod activation;
mod client;
mod config;
mod error;
mod files;
mod marker;

pub use activation::{Activation, ActivationFile, Activator, LicenseState};
pub use client::{LicenseAuthority, LicenseClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use marker::SuccessMarker;
