//! # pulse-server
//!
//! HTTP surface of the ProfilePulse license service: Stripe webhooks, hosted
//! checkout, license validation and the post-payment lookup.

mod config;
mod error;
mod extract;
mod handlers;
mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::{ServerConfig, StripeSettings};
pub use error::{ApiError, ErrorResponse};
pub use extract::ClientAddr;
pub use handlers::{CheckoutResponse, CheckoutStatus, HealthResponse, WebhookAck};
pub use state::AppState;

use crate::handlers::{
    checkout_cancelled, checkout_redirect, checkout_status, checkout_success, create_checkout,
    health_check, stripe_webhook, validate_license,
};

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))
        // Licensing API
        .route("/api/webhook", post(stripe_webhook))
        .route("/api/create-checkout", post(create_checkout))
        .route("/api/validate-license", post(validate_license))
        .route("/api/checkout/status", get(checkout_status))
        // Storefront redirects
        .route("/checkout/{plan}", get(checkout_redirect))
        .route("/success", get(checkout_success))
        .route("/cancel", get(checkout_cancelled))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
