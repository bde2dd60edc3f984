//! Stripe Checkout Integration
//!
//! Opens hosted checkout sessions. The HTTP layer talks to the
//! [`CheckoutGateway`] trait, `StripeCheckout` is the production gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems,
};

use crate::error::{LicensingError, Result};
use crate::license::LicenseType;

/// Purchasable plans
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Monthly,
    Lifetime,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Monthly => "monthly",
            Plan::Lifetime => "lifetime",
        }
    }

    /// License tier a completed purchase of this plan yields
    pub fn license_type(&self) -> LicenseType {
        match self {
            Plan::Monthly => LicenseType::Monthly,
            Plan::Lifetime => LicenseType::Lifetime,
        }
    }

    fn mode(self) -> CheckoutSessionMode {
        match self {
            Plan::Monthly => CheckoutSessionMode::Subscription,
            Plan::Lifetime => CheckoutSessionMode::Payment,
        }
    }
}

impl FromStr for Plan {
    type Err = LicensingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "monthly" => Ok(Plan::Monthly),
            "lifetime" => Ok(Plan::Lifetime),
            other => Err(LicensingError::UnknownPlan(other.to_string())),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processor price ids per plan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanPrices {
    pub monthly: String,
    pub lifetime: String,
}

impl PlanPrices {
    pub fn price_for(&self, plan: Plan) -> &str {
        match plan {
            Plan::Monthly => &self.monthly,
            Plan::Lifetime => &self.lifetime,
        }
    }
}

/// Request to create a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub plan: Plan,

    /// Prefills the processor's email field when present
    pub customer_email: Option<String>,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Processor session ID
    pub id: String,

    /// Hosted page to redirect the buyer to
    pub url: String,
}

/// Anything that can open a hosted checkout session
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;
}

/// Stripe-hosted checkout
pub struct StripeCheckout {
    client: Client,
    prices: PlanPrices,
    server_url: String,
}

impl StripeCheckout {
    pub fn new(secret_key: &str, prices: PlanPrices, server_url: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            prices,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    /// Where the processor sends the buyer after paying
    pub fn success_url(&self) -> String {
        format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", self.server_url)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/cancel", self.server_url)
    }
}

#[async_trait]
impl CheckoutGateway for StripeCheckout {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let success_url = self.success_url();
        let cancel_url = self.cancel_url();

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(request.plan.mode());
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.customer_email = request.customer_email.as_deref();
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(self.prices.price_for(request.plan).to_string()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let mut metadata = HashMap::new();
        metadata.insert("plan".to_string(), request.plan.as_str().to_string());
        params.metadata = Some(metadata);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| LicensingError::Checkout(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| LicensingError::Checkout("No checkout URL returned".into()))?;

        tracing::info!(session_id = %session.id, plan = %request.plan, "Checkout session created");

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }
}
