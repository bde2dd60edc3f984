//! # pulse-licensing
//!
//! License lifecycle for ProfilePulse: key generation, durable license
//! records, Stripe webhook processing, rate-limited validation and hosted
//! checkout.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐     ┌───────────────────┐
//! │   Checkout   │────▶│  Stripe Hosted  │────▶│ WebhookProcessor  │
//! │   Gateway    │     │  Checkout Page  │     │ (verify, mint)    │
//! └──────────────┘     └─────────────────┘     └─────────┬─────────┘
//!                                                        │
//!                                                        ▼
//! ┌──────────────┐     ┌─────────────────┐     ┌───────────────────┐
//! │    Caller    │────▶│ ValidationSvc   │────▶│   LicenseStore    │
//! │ (pulse-client)│    │ (rate limited)  │     │ (licenses.json)   │
//! └──────────────┘     └─────────────────┘     └───────────────────┘
//! ```
//!
//! Only the webhook processor mutates records. Monthly licenses are switched
//! off when the subscription is deleted; lifetime licenses never are.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pulse_licensing::{
//!     FixedWindowLimiter, JsonFileLicenseStore, ValidationService, WebhookProcessor,
//!     WebhookVerifier, DEFAULT_TOLERANCE,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(JsonFileLicenseStore::new("licenses.json"));
//!
//! let webhooks = WebhookProcessor::new(
//!     Arc::clone(&store),
//!     WebhookVerifier::new("whsec_xxx", DEFAULT_TOLERANCE),
//! );
//! webhooks.handle(&raw_body, Some(signature_header))?;
//!
//! let validation = ValidationService::new(store, Arc::new(FixedWindowLimiter::default()));
//! let outcome = validation.validate("203.0.113.7", Some("PULSE-1A2B-3C4D-5E6F-7A8B"));
//! ```

mod checkout;
mod error;
mod file_store;
mod key;
mod license;
mod rate_limit;
mod validation;
mod webhook;

pub use checkout::{CheckoutGateway, CheckoutRequest, CheckoutSession, Plan, PlanPrices, StripeCheckout};
pub use error::{LicensingError, Result};
pub use file_store::JsonFileLicenseStore;
pub use key::{DEFAULT_KEY_PREFIX, KeyGenerator, LicenseKey};
pub use license::{LicenseRecord, LicenseStore, LicenseType, MemoryLicenseStore};
pub use rate_limit::{
    Clock, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW, FixedWindowLimiter, ManualClock, RateDecision,
    SystemClock,
};
pub use validation::{
    ERR_INVALID_KEY, ERR_NO_KEY, ERR_THROTTLED, OVERRIDE_EMAIL, ValidationOutcome,
    ValidationResponse, ValidationService,
};
pub use webhook::{
    DEFAULT_TOLERANCE, Purchase, PurchaseSource, ReplayPolicy, SIGNATURE_HEADER, VerifiedPayload, WebhookEvent,
    WebhookOutcome, WebhookProcessor, WebhookVerifier,
};
