//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
};
use chrono::Utc;
use tempfile::TempDir;

use pulse_licensing::{
    CheckoutGateway, CheckoutRequest, CheckoutSession, DEFAULT_TOLERANCE, LicensingError,
    WebhookVerifier,
};
use pulse_server::{AppState, ServerConfig};

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const OVERRIDE_KEY: &str = "K7M2-R9X4-BN6W-P3HT";

/// App state over a fresh licenses file in a temp dir
pub fn create_test_app_state(extra: &[(&str, &str)]) -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let licenses = dir.path().join("licenses.json");

    let mut vars: HashMap<String, String> = HashMap::from([
        ("LICENSES_FILE".to_string(), licenses.display().to_string()),
        ("STRIPE_WEBHOOK_SECRET".to_string(), WEBHOOK_SECRET.to_string()),
        ("MASTER_LICENSE_KEY".to_string(), OVERRIDE_KEY.to_string()),
        ("SERVER_URL".to_string(), "https://pulse.example.com".to_string()),
    ]);
    for (k, v) in extra {
        vars.insert((*k).to_string(), (*v).to_string());
    }

    let config = ServerConfig::from_vars(|name| vars.get(name).cloned()).unwrap();
    (dir, AppState::from_config(config))
}

pub fn signed_webhook(event: &serde_json::Value) -> Request<Body> {
    let body = serde_json::to_vec(event).unwrap();
    let signature = WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE)
        .sign(Utc::now().timestamp(), &body)
        .unwrap();

    Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

pub fn checkout_completed(session_id: &str, mode: &str, customer: &str, email: &str) -> serde_json::Value {
    let subscription = (mode == "subscription").then(|| format!("sub_{customer}"));
    serde_json::json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "object": "checkout.session",
            "mode": mode,
            "customer": customer,
            "customer_email": email,
            "subscription": subscription,
        }}
    })
}

/// First invoice of a new subscription, as Stripe sends it alongside the session
pub fn first_invoice(invoice_id: &str, customer: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("evt_{invoice_id}"),
        "type": "invoice.payment_succeeded",
        "data": { "object": {
            "id": invoice_id,
            "object": "invoice",
            "customer": customer,
            "customer_email": email,
            "subscription": format!("sub_{customer}"),
            "billing_reason": "subscription_create",
        }}
    })
}

pub fn subscription_deleted(customer: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": format!("sub_{customer}"), "customer": customer } }
    })
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Attach the TCP peer address `axum::serve` would normally provide
pub fn from_peer(mut request: Request<Body>, ip: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Checkout gateway that records requests instead of calling Stripe
#[derive(Default)]
pub struct FakeGateway {
    pub requests: Mutex<Vec<CheckoutRequest>>,
    pub fail: bool,
}

impl FakeGateway {
    pub fn failing() -> Self {
        Self {
            requests: Mutex::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl CheckoutGateway for FakeGateway {
    async fn create_session(&self, request: CheckoutRequest) -> pulse_licensing::Result<CheckoutSession> {
        if self.fail {
            return Err(LicensingError::Checkout("card_declined".into()));
        }
        let id = format!("cs_test_{}", request.plan);
        self.requests.lock().unwrap().push(request);
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{id}"),
            id,
        })
    }
}

pub fn with_fake_gateway(state: AppState) -> (Arc<FakeGateway>, AppState) {
    let gateway = Arc::new(FakeGateway::default());
    let state = state.with_checkout(Arc::clone(&gateway) as Arc<dyn CheckoutGateway>);
    (gateway, state)
}
