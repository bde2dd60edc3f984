//! ProfilePulse license server
//!
//! Issues license keys from Stripe webhooks and validates them for the
//! desktop automation.

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_server::{AppState, ServerConfig, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    if config.stripe.is_some() {
        tracing::info!("✓ Stripe checkout configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - checkout disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY, STRIPE_PRICE_MONTHLY and STRIPE_PRICE_LIFETIME in .env");
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhooks rejected, no licenses will be issued");
    }
    if config.master_license_key.is_some() {
        tracing::info!("Override license key enabled");
    }

    let addr = config.bind_addr.clone();
    tracing::info!(
        licenses_file = %config.licenses_file.display(),
        rate_limit_window_secs = config.rate_limit_window.as_secs(),
        rate_limit_max_requests = config.rate_limit_max_requests,
        replay_policy = ?config.replay_policy,
        "License store ready"
    );

    let app = router(AppState::from_config(config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("ProfilePulse license server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                 - Health check");
    tracing::info!("  POST /api/webhook            - Stripe webhook");
    tracing::info!("  POST /api/create-checkout    - Create Stripe checkout");
    tracing::info!("  POST /api/validate-license   - Validate license key");
    tracing::info!("  GET  /api/checkout/status    - License for a checkout session");
    tracing::info!("  GET  /checkout/{{plan}}        - Redirect to hosted checkout");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
