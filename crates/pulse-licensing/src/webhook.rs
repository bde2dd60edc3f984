//! Stripe Webhook Handling
//!
//! Verifies `Stripe-Signature` headers and turns the verified payload into
//! license store mutations: purchases mint keys, subscription deletions
//! deactivate monthly licenses. The payload is only reachable through
//! [`WebhookVerifier::verify`], so nothing can be parsed, let alone applied,
//! before the signature has been checked.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::error::{LicensingError, Result};
use crate::key::{KeyGenerator, LicenseKey};
use crate::license::{LicenseRecord, LicenseStore, LicenseType};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Default maximum age of a signed timestamp
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Invoice billing reasons that mark a renewal rather than a new purchase
const RENEWAL_REASONS: &[&str] = &[
    "subscription_cycle",
    "subscription_update",
    "subscription_threshold",
];

/// Checks `t=<unix>,v1=<hex>` signatures against the shared endpoint secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify against the current time
    pub fn verify<'a>(&self, payload: &'a [u8], header: Option<&str>) -> Result<VerifiedPayload<'a>> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify as if the current unix time were `now`
    pub fn verify_at<'a>(
        &self,
        payload: &'a [u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<VerifiedPayload<'a>> {
        let header = header
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| LicensingError::WebhookSignature("missing signature header".into()))?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for item in header.split(',') {
            match item.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                // Entries that are not valid hex can never match, skip them.
                Some(("v1", value)) => candidates.extend(hex::decode(value).ok()),
                _ => {}
            }
        }

        let raw_ts = timestamp
            .ok_or_else(|| LicensingError::WebhookSignature("no timestamp in signature header".into()))?;
        let signed_at: i64 = raw_ts
            .parse()
            .map_err(|_| LicensingError::WebhookSignature("timestamp is not a number".into()))?;
        if candidates.is_empty() {
            return Err(LicensingError::WebhookSignature("no v1 signature in header".into()));
        }

        if now.saturating_sub(signed_at).unsigned_abs() > self.tolerance.as_secs() {
            return Err(LicensingError::WebhookSignature(
                "timestamp outside the tolerance zone".into(),
            ));
        }

        let expected = self.digest(raw_ts, payload)?;
        let matched = candidates
            .iter()
            .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate.as_slice())));

        if matched {
            Ok(VerifiedPayload(payload))
        } else {
            Err(LicensingError::WebhookSignature(
                "no signature matches the expected signature for the payload".into(),
            ))
        }
    }

    /// Produce a header value for `payload` signed at `timestamp`
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> Result<String> {
        let ts = timestamp.to_string();
        let digest = self.digest(&ts, payload)?;
        Ok(format!("t={ts},v1={}", hex::encode(digest)))
    }

    fn digest(&self, timestamp: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| LicensingError::Config(format!("webhook secret unusable: {e}")))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// A payload whose signature has been checked
#[derive(Clone, Copy, Debug)]
pub struct VerifiedPayload<'a>(&'a [u8]);

impl VerifiedPayload<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        self.0
    }

    /// Parse into a webhook event
    pub fn parse(&self) -> Result<WebhookEvent> {
        let envelope: Envelope = serde_json::from_slice(self.0)
            .map_err(|e| LicensingError::WebhookParse(e.to_string()))?;
        WebhookEvent::from_envelope(envelope)
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

/// `checkout.session` and `invoice` share the fields a purchase needs
#[derive(Deserialize)]
struct PurchaseObject {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    billing_reason: Option<String>,
}

impl PurchaseObject {
    fn email(&self) -> Option<String> {
        self.customer_email
            .clone()
            .or_else(|| self.customer_details.as_ref().and_then(|d| d.email.clone()))
            .filter(|e| !e.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct SubscriptionObject {
    id: String,
    #[serde(default)]
    customer: Option<String>,
}

/// Which event a purchase was read from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurchaseSource {
    CheckoutSession,
    Invoice,
}

/// A completed purchase extracted from a session or invoice
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Purchase {
    pub source: PurchaseSource,
    pub session_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub email: Option<String>,
    pub license_type: LicenseType,
}

impl Purchase {
    /// Whether `record` was already minted for this purchase
    fn replays(&self, record: &LicenseRecord) -> bool {
        record.external_session_id == self.session_id
            || (self.subscription_id.is_some()
                && record.external_subscription_id == self.subscription_id)
    }

    /// Whether `record` was minted from the invoice and should now point at
    /// this checkout session, so the post-payment lookup finds it
    fn relinks(&self, record: &LicenseRecord) -> bool {
        self.source == PurchaseSource::CheckoutSession && record.external_session_id != self.session_id
    }
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Checkout completed or first invoice paid - mint a license
    PurchaseCompleted(Purchase),

    /// Recurring invoice paid - the existing license simply stays active
    RenewalPaid {
        invoice_id: String,
        billing_reason: String,
    },

    /// Subscription deleted - deactivate the customer's monthly licenses
    SubscriptionCancelled {
        subscription_id: String,
        customer_id: Option<String>,
    },

    /// Unhandled event type
    Other { event_type: String },
}

impl WebhookEvent {
    fn from_envelope(envelope: Envelope) -> Result<Self> {
        let object = envelope.data.object;
        let shape_err =
            |e: serde_json::Error| LicensingError::WebhookParse(format!("{}: {e}", envelope.event_type));

        match envelope.event_type.as_str() {
            "checkout.session.completed" => {
                let session: PurchaseObject = serde_json::from_value(object).map_err(shape_err)?;
                let subscription = session.mode.as_deref() == Some("subscription");
                Ok(Self::PurchaseCompleted(Purchase {
                    source: PurchaseSource::CheckoutSession,
                    email: session.email(),
                    license_type: LicenseType::for_purchase(subscription),
                    session_id: session.id,
                    customer_id: session.customer,
                    subscription_id: session.subscription,
                }))
            }
            "invoice.payment_succeeded" => {
                let invoice: PurchaseObject = serde_json::from_value(object).map_err(shape_err)?;
                if let Some(reason) = invoice
                    .billing_reason
                    .as_deref()
                    .filter(|r| RENEWAL_REASONS.contains(r))
                {
                    return Ok(Self::RenewalPaid {
                        billing_reason: reason.to_string(),
                        invoice_id: invoice.id,
                    });
                }
                Ok(Self::PurchaseCompleted(Purchase {
                    source: PurchaseSource::Invoice,
                    email: invoice.email(),
                    license_type: LicenseType::for_purchase(invoice.subscription.is_some()),
                    session_id: invoice.id,
                    customer_id: invoice.customer,
                    subscription_id: invoice.subscription,
                }))
            }
            "customer.subscription.deleted" => {
                let sub: SubscriptionObject = serde_json::from_value(object).map_err(shape_err)?;
                Ok(Self::SubscriptionCancelled {
                    subscription_id: sub.id,
                    customer_id: sub.customer,
                })
            }
            other => Ok(Self::Other {
                event_type: other.to_string(),
            }),
        }
    }
}

/// What to do when a purchase is delivered again
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplayPolicy {
    /// Return the key already minted for the same session or subscription
    #[default]
    Dedupe,
    /// Mint a new key on every delivery
    Mint,
}

impl FromStr for ReplayPolicy {
    type Err = LicensingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dedupe" => Ok(Self::Dedupe),
            "mint" => Ok(Self::Mint),
            other => Err(LicensingError::Config(format!(
                "replay policy must be 'dedupe' or 'mint', got '{other}'"
            ))),
        }
    }
}

/// Result of handling one verified webhook
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    LicenseIssued {
        key: LicenseKey,
        license_type: LicenseType,
    },
    Duplicate {
        key: LicenseKey,
    },
    MissingEmail,
    RenewalIgnored,
    Deactivated {
        count: usize,
    },
    MissingCustomer,
    Ignored {
        event_type: String,
    },
}

/// Webhook processor
pub struct WebhookProcessor<S: LicenseStore> {
    store: Arc<S>,
    verifier: WebhookVerifier,
    keys: KeyGenerator,
    replay: ReplayPolicy,
}

impl<S: LicenseStore> WebhookProcessor<S> {
    pub fn new(store: Arc<S>, verifier: WebhookVerifier) -> Self {
        Self {
            store,
            verifier,
            keys: KeyGenerator::default(),
            replay: ReplayPolicy::default(),
        }
    }

    pub fn with_key_generator(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_replay_policy(mut self, replay: ReplayPolicy) -> Self {
        self.replay = replay;
        self
    }

    /// Verify, parse and apply one webhook delivery
    pub fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let verified = self.verifier.verify(payload, signature).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook");
        })?;
        let event = verified.parse()?;
        self.apply(event)
    }

    /// Apply an already verified event
    fn apply(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        match event {
            WebhookEvent::PurchaseCompleted(purchase) => self.issue(purchase),

            WebhookEvent::RenewalPaid {
                invoice_id,
                billing_reason,
            } => {
                tracing::debug!(invoice_id = %invoice_id, billing_reason = %billing_reason, "Renewal invoice, no new license");
                Ok(WebhookOutcome::RenewalIgnored)
            }

            WebhookEvent::SubscriptionCancelled {
                subscription_id,
                customer_id,
            } => {
                let Some(customer_id) = customer_id else {
                    tracing::warn!(subscription_id = %subscription_id, "Subscription deleted without customer id");
                    return Ok(WebhookOutcome::MissingCustomer);
                };

                let count = self
                    .store
                    .deactivate_where(|record| record.cancelled_by(&customer_id))?;

                tracing::info!(
                    customer_id = %customer_id,
                    subscription_id = %subscription_id,
                    deactivated = count,
                    "Subscription cancelled"
                );
                Ok(WebhookOutcome::Deactivated { count })
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored { event_type })
            }
        }
    }

    fn issue(&self, purchase: Purchase) -> Result<WebhookOutcome> {
        let Some(email) = purchase.email.clone() else {
            tracing::warn!(session_id = %purchase.session_id, "Purchase without email, no license issued");
            return Ok(WebhookOutcome::MissingEmail);
        };

        let dedupe = self.replay == ReplayPolicy::Dedupe;
        let outcome = self.store.mutate(|records| {
            if let Some(existing) = records.iter_mut().find(|r| dedupe && purchase.replays(r)) {
                if purchase.relinks(existing) {
                    tracing::info!(
                        license_key = %existing.key,
                        from = %existing.external_session_id,
                        to = %purchase.session_id,
                        "Linked license to checkout session"
                    );
                    existing.external_session_id.clone_from(&purchase.session_id);
                }
                return WebhookOutcome::Duplicate {
                    key: existing.key.clone(),
                };
            }

            let mut key = self.keys.generate();
            while records.iter().any(|r| r.key == key) {
                key = self.keys.generate();
            }

            records.push(
                LicenseRecord::issue(key.clone(), email.as_str(), purchase.license_type, purchase.session_id.as_str())
                    .with_customer(purchase.customer_id.clone())
                    .with_subscription(purchase.subscription_id.clone()),
            );
            WebhookOutcome::LicenseIssued {
                key,
                license_type: purchase.license_type,
            }
        })?;

        match &outcome {
            WebhookOutcome::LicenseIssued { key, license_type } => tracing::info!(
                license_key = %key,
                email = %email,
                license_type = %license_type,
                session_id = %purchase.session_id,
                "Created new license"
            ),
            WebhookOutcome::Duplicate { key } => tracing::info!(
                license_key = %key,
                session_id = %purchase.session_id,
                "Purchase already licensed, redelivery ignored"
            ),
            _ => {}
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::MemoryLicenseStore;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET, DEFAULT_TOLERANCE)
    }

    fn processor(store: &Arc<MemoryLicenseStore>) -> WebhookProcessor<MemoryLicenseStore> {
        WebhookProcessor::new(Arc::clone(store), verifier())
    }

    fn deliver(processor: &WebhookProcessor<MemoryLicenseStore>, event: &serde_json::Value) -> Result<WebhookOutcome> {
        let body = serde_json::to_vec(event).unwrap();
        let header = verifier().sign(Utc::now().timestamp(), &body).unwrap();
        processor.handle(&body, Some(&header))
    }

    fn checkout(id: &str, mode: &str, email: Option<&str>) -> serde_json::Value {
        let subscription = (mode == "subscription").then_some("sub_1");
        json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": id,
                "object": "checkout.session",
                "mode": mode,
                "customer": "cus_1",
                "customer_email": email,
                "subscription": subscription,
            }}
        })
    }

    fn cancellation(customer: &str) -> serde_json::Value {
        json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1", "customer": customer } }
        })
    }

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"type":"ping","data":{"object":{}}}"#;
        let header = verifier().sign(1_700_000_000, body).unwrap();

        let verified = verifier().verify_at(body, Some(&header), 1_700_000_100).unwrap();
        assert_eq!(verified.as_bytes(), body);
    }

    #[test]
    fn test_signature_rejections() {
        let body = br#"{"type":"ping","data":{"object":{}}}"#;
        let now = 1_700_000_000;
        let good = verifier().sign(now, body).unwrap();
        let foreign = WebhookVerifier::new("whsec_other", DEFAULT_TOLERANCE)
            .sign(now, body)
            .unwrap();

        let cases = [
            None,
            Some(""),
            Some("garbage"),
            Some("v1=abcdef"),
            Some("t=abc,v1=abcdef"),
            Some(foreign.as_str()),
        ];
        for header in cases {
            let err = verifier().verify_at(body, header, now).unwrap_err();
            assert!(matches!(err, LicensingError::WebhookSignature(_)), "accepted {header:?}");
        }

        // Stale timestamp
        assert!(verifier().verify_at(body, Some(&good), now + 301).is_err());
        // Tampered body
        assert!(verifier().verify_at(b"{}", Some(&good), now).is_err());
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let body = b"{}";
        let good = verifier().sign(42, body).unwrap();
        let sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=42,v1={},v0=legacy,v1={sig}", "00".repeat(32));

        assert!(verifier().verify_at(body, Some(&header), 42).is_ok());
    }

    #[test]
    fn test_purchase_creates_one_active_license() {
        let store = Arc::new(MemoryLicenseStore::new());

        let outcome = deliver(&processor(&store), &checkout("cs_1", "subscription", Some("a@example.com"))).unwrap();

        let records = store.load_all();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(matches!(outcome, WebhookOutcome::LicenseIssued { license_type: LicenseType::Monthly, .. }));
        assert!(record.active);
        assert_eq!(record.license_type, LicenseType::Monthly);
        assert_eq!(record.email, "a@example.com");
        assert_eq!(record.external_session_id, "cs_1");
        assert_eq!(record.external_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(record.external_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn test_payment_mode_is_lifetime_and_details_email_is_used() {
        let store = Arc::new(MemoryLicenseStore::new());
        let mut event = checkout("cs_2", "payment", None);
        event["data"]["object"]["customer_details"] = json!({ "email": "details@example.com" });

        deliver(&processor(&store), &event).unwrap();

        let record = store.find_by_session_id("cs_2").unwrap();
        assert_eq!(record.license_type, LicenseType::Lifetime);
        assert_eq!(record.email, "details@example.com");
    }

    #[test]
    fn test_purchase_without_email_issues_nothing() {
        let store = Arc::new(MemoryLicenseStore::new());

        let outcome = deliver(&processor(&store), &checkout("cs_3", "payment", None)).unwrap();

        assert_eq!(outcome, WebhookOutcome::MissingEmail);
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn test_bad_signature_mutates_nothing() {
        let store = Arc::new(MemoryLicenseStore::new());
        let body = serde_json::to_vec(&checkout("cs_4", "payment", Some("a@example.com"))).unwrap();

        let err = processor(&store).handle(&body, Some("t=1,v1=00")).unwrap_err();

        assert!(matches!(err, LicensingError::WebhookSignature(_)));
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn test_redelivery_and_first_invoice_are_deduplicated() {
        let store = Arc::new(MemoryLicenseStore::new());
        let processor = processor(&store);
        let event = checkout("cs_5", "subscription", Some("a@example.com"));

        let first = deliver(&processor, &event).unwrap();
        let again = deliver(&processor, &event).unwrap();
        let invoice = deliver(&processor, &json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "id": "in_1",
                "customer": "cus_1",
                "customer_email": "a@example.com",
                "subscription": "sub_1",
                "billing_reason": "subscription_create"
            }}
        }))
        .unwrap();

        let WebhookOutcome::LicenseIssued { key, .. } = first else {
            panic!("expected a license, got {first:?}");
        };
        assert_eq!(again, WebhookOutcome::Duplicate { key: key.clone() });
        assert_eq!(invoice, WebhookOutcome::Duplicate { key });
        assert_eq!(store.load_all().len(), 1);
    }

    #[test]
    fn test_invoice_before_checkout_keeps_session_lookup() {
        let store = Arc::new(MemoryLicenseStore::new());
        let processor = processor(&store);

        let invoice = deliver(&processor, &json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "id": "in_7",
                "customer": "cus_1",
                "customer_email": "a@example.com",
                "subscription": "sub_1",
                "billing_reason": "subscription_create"
            }}
        }))
        .unwrap();
        let session = deliver(&processor, &checkout("cs_7", "subscription", Some("a@example.com"))).unwrap();

        let WebhookOutcome::LicenseIssued { key, .. } = invoice else {
            panic!("expected a license, got {invoice:?}");
        };
        assert_eq!(session, WebhookOutcome::Duplicate { key: key.clone() });

        let records = store.load_all();
        assert_eq!(records.len(), 1);
        assert_eq!(store.find_by_session_id("cs_7").map(|r| r.key), Some(key));
        assert!(store.find_by_session_id("in_7").is_none());
    }

    #[test]
    fn test_mint_policy_issues_per_delivery() {
        let store = Arc::new(MemoryLicenseStore::new());
        let processor = processor(&store).with_replay_policy(ReplayPolicy::Mint);
        let event = checkout("cs_6", "payment", Some("a@example.com"));

        deliver(&processor, &event).unwrap();
        deliver(&processor, &event).unwrap();

        let records = store.load_all();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].key, records[1].key);
    }

    #[test]
    fn test_renewal_invoice_is_ignored() {
        let store = Arc::new(MemoryLicenseStore::new());
        let outcome = deliver(&processor(&store), &json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "id": "in_2",
                "customer": "cus_1",
                "customer_email": "a@example.com",
                "subscription": "sub_1",
                "billing_reason": "subscription_cycle"
            }}
        }))
        .unwrap();

        assert_eq!(outcome, WebhookOutcome::RenewalIgnored);
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn test_cancellation_touches_only_matching_monthly() {
        let store = Arc::new(MemoryLicenseStore::new());
        let processor = processor(&store);
        deliver(&processor, &checkout("cs_m1", "subscription", Some("a@example.com"))).unwrap();
        deliver(&processor, &checkout("cs_l1", "payment", Some("a@example.com"))).unwrap();
        let mut other = checkout("cs_m2", "subscription", Some("b@example.com"));
        other["data"]["object"]["customer"] = json!("cus_2");
        other["data"]["object"]["subscription"] = json!("sub_2");
        deliver(&processor, &other).unwrap();

        let outcome = deliver(&processor, &cancellation("cus_1")).unwrap();
        let replay = deliver(&processor, &cancellation("cus_1")).unwrap();

        assert_eq!(outcome, WebhookOutcome::Deactivated { count: 1 });
        assert_eq!(replay, WebhookOutcome::Deactivated { count: 0 });
        assert!(!store.find_by_session_id("cs_m1").unwrap().active);
        assert!(store.find_by_session_id("cs_l1").unwrap().active);
        assert!(store.find_by_session_id("cs_m2").unwrap().active);
    }

    #[test]
    fn test_cancellation_without_customer_and_unknown_events() {
        let store = Arc::new(MemoryLicenseStore::new());
        let processor = processor(&store);

        let missing = deliver(&processor, &json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_9" } }
        }))
        .unwrap();
        let other = deliver(&processor, &json!({
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        }))
        .unwrap();

        assert_eq!(missing, WebhookOutcome::MissingCustomer);
        assert_eq!(other, WebhookOutcome::Ignored { event_type: "charge.refunded".into() });
    }

    #[test]
    fn test_malformed_payload_is_parse_error() {
        let store = Arc::new(MemoryLicenseStore::new());
        let body = b"not json";
        let header = verifier().sign(Utc::now().timestamp(), body).unwrap();

        let err = processor(&store).handle(body, Some(&header)).unwrap_err();
        assert!(matches!(err, LicensingError::WebhookParse(_)));
    }

    #[test]
    fn test_replay_policy_from_str() {
        assert_eq!("dedupe".parse::<ReplayPolicy>().unwrap(), ReplayPolicy::Dedupe);
        assert_eq!(" MINT ".parse::<ReplayPolicy>().unwrap(), ReplayPolicy::Mint);
        assert!("sometimes".parse::<ReplayPolicy>().is_err());
    }

    struct FailingStore;

    impl LicenseStore for FailingStore {
        fn load_all(&self) -> Vec<LicenseRecord> {
            Vec::new()
        }

        fn save_all(&self, _records: &[LicenseRecord]) -> Result<()> {
            Err(LicensingError::Storage("read-only".into()))
        }

        fn mutate<T, F>(&self, _f: F) -> Result<T>
        where
            F: FnOnce(&mut Vec<LicenseRecord>) -> T,
        {
            Err(LicensingError::Storage("read-only".into()))
        }
    }

    #[test]
    fn test_store_failure_is_not_acknowledged() {
        let processor = WebhookProcessor::new(Arc::new(FailingStore), verifier());
        let body = serde_json::to_vec(&checkout("cs_7", "payment", Some("a@example.com"))).unwrap();
        let header = verifier().sign(Utc::now().timestamp(), &body).unwrap();

        let err = processor.handle(&body, Some(&header)).unwrap_err();
        assert!(err.is_retryable());
    }
}
