//! Application State

use std::sync::Arc;

use pulse_licensing::{
    CheckoutGateway, FixedWindowLimiter, JsonFileLicenseStore, KeyGenerator, StripeCheckout,
    ValidationService, WebhookProcessor, WebhookVerifier,
};

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    /// License records on disk
    pub store: Arc<JsonFileLicenseStore>,

    /// Webhook processor (optional - None without a webhook secret)
    pub webhooks: Option<Arc<WebhookProcessor<JsonFileLicenseStore>>>,

    /// Rate-limited validation
    pub validation: Arc<ValidationService<JsonFileLicenseStore>>,

    /// Checkout gateway (optional - None if Stripe is not configured)
    pub checkout: Option<Arc<dyn CheckoutGateway>>,
}

impl AppState {
    /// Wire every component from configuration
    pub fn from_config(config: ServerConfig) -> Self {
        let store = Arc::new(JsonFileLicenseStore::new(config.licenses_file.clone()));

        let webhooks = config.webhook_secret.as_ref().map(|secret| {
            Arc::new(
                WebhookProcessor::new(
                    Arc::clone(&store),
                    WebhookVerifier::new(secret.as_str(), config.webhook_tolerance),
                )
                .with_key_generator(KeyGenerator::new(config.key_prefix.as_str()))
                .with_replay_policy(config.replay_policy),
            )
        });

        let limiter = Arc::new(FixedWindowLimiter::new(
            config.rate_limit_window,
            config.rate_limit_max_requests,
        ));
        let validation = Arc::new(
            ValidationService::new(Arc::clone(&store), limiter)
                .with_override_key(config.master_license_key.clone()),
        );

        let checkout = config.stripe.as_ref().map(|stripe| {
            Arc::new(StripeCheckout::new(
                &stripe.secret_key,
                stripe.prices.clone(),
                &config.server_url,
            )) as Arc<dyn CheckoutGateway>
        });

        Self {
            config: Arc::new(config),
            store,
            webhooks,
            validation,
            checkout,
        }
    }

    /// Replace the checkout gateway
    pub fn with_checkout(mut self, gateway: Arc<dyn CheckoutGateway>) -> Self {
        self.checkout = Some(gateway);
        self
    }
}
