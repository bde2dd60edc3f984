//! License Records and Storage
//!
//! Defines the persisted license record, the `LicenseStore` contract every
//! backend honours, and an in-memory backend for development and tests.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{LicensingError, Result};
use crate::key::LicenseKey;

/// License tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Backed by a recurring subscription; deactivated on cancellation
    Monthly,
    /// One-time purchase; never deactivated automatically
    Lifetime,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseType::Monthly => "monthly",
            LicenseType::Lifetime => "lifetime",
        }
    }

    /// Subscription purchases become monthly licenses, everything else lifetime
    pub fn for_purchase(subscription: bool) -> Self {
        if subscription {
            LicenseType::Monthly
        } else {
            LicenseType::Lifetime
        }
    }
}

impl std::fmt::Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A license record
///
/// Field names on the wire match the `licenses.json` layout already in
/// production, so existing files load without migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    /// License key
    pub key: LicenseKey,

    /// Purchaser email at issuance
    pub email: String,

    /// License tier
    #[serde(rename = "type")]
    pub license_type: LicenseType,

    /// Issuance timestamp
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,

    /// Whether the license currently validates
    pub active: bool,

    /// Processor checkout-session (or invoice) id the key was minted for
    #[serde(rename = "stripeSessionId", alias = "externalSessionId")]
    pub external_session_id: String,

    /// Processor customer id, used to correlate cancellations
    #[serde(rename = "stripeCustomerId", alias = "externalCustomerId", default)]
    pub external_customer_id: Option<String>,

    /// Processor subscription id, used to recognise redelivered purchases
    #[serde(
        rename = "stripeSubscriptionId",
        alias = "externalSubscriptionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_subscription_id: Option<String>,
}

impl LicenseRecord {
    /// Issue a fresh, active license stamped with the current time
    pub fn issue(key: LicenseKey, email: impl Into<String>, license_type: LicenseType, session_id: impl Into<String>) -> Self {
        Self {
            key,
            email: email.into(),
            license_type,
            created_at: Utc::now().trunc_subsecs(3),
            active: true,
            external_session_id: session_id.into(),
            external_customer_id: None,
            external_subscription_id: None,
        }
    }

    pub fn with_customer(mut self, customer_id: Option<String>) -> Self {
        self.external_customer_id = customer_id;
        self
    }

    pub fn with_subscription(mut self, subscription_id: Option<String>) -> Self {
        self.external_subscription_id = subscription_id;
        self
    }

    /// Check if license is valid
    pub fn is_valid(&self) -> bool {
        self.active
    }

    /// Whether a cancellation for `customer_id` should switch this record off
    pub fn cancelled_by(&self, customer_id: &str) -> bool {
        self.license_type == LicenseType::Monthly
            && self.active
            && self.external_customer_id.as_deref() == Some(customer_id)
    }
}

/// `createdAt` is always written with millisecond precision
/// (`2026-02-01T10:00:00.000Z`) so rewriting a file never reformats it.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// License storage contract
///
/// `load_all` never fails: an unreadable backend reads as empty. Every
/// mutation runs through [`LicenseStore::mutate`], which holds the store's
/// writer lock across the whole load→modify→save cycle.
pub trait LicenseStore: Send + Sync {
    /// All records in insertion order
    fn load_all(&self) -> Vec<LicenseRecord>;

    /// Replace the full record set atomically
    fn save_all(&self, records: &[LicenseRecord]) -> Result<()>;

    /// Locked read-modify-write; persists only when the record set changed
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<LicenseRecord>) -> T;

    /// Get license by key (exact match)
    fn find_by_key(&self, key: &str) -> Option<LicenseRecord> {
        self.load_all().into_iter().find(|r| r.key.as_str() == key)
    }

    /// Get license by processor session id
    fn find_by_session_id(&self, session_id: &str) -> Option<LicenseRecord> {
        self.load_all()
            .into_iter()
            .find(|r| r.external_session_id == session_id)
    }

    /// Append a new record
    fn append(&self, record: LicenseRecord) -> Result<()> {
        self.mutate(|records| records.push(record))
    }

    /// Switch off every active record matching `predicate`, returning how many flipped
    fn deactivate_where<P>(&self, predicate: P) -> Result<usize>
    where
        P: Fn(&LicenseRecord) -> bool,
    {
        self.mutate(|records| {
            let mut flipped = 0;
            for record in records.iter_mut().filter(|r| r.active && predicate(r)) {
                record.active = false;
                flipped += 1;
            }
            flipped
        })
    }
}

/// In-memory license store (for development and tests)
#[derive(Default)]
pub struct MemoryLicenseStore {
    records: RwLock<Vec<LicenseRecord>>,
    reads: AtomicUsize,
}

impl MemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<LicenseRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            reads: AtomicUsize::new(0),
        }
    }

    /// How many times `load_all` has been called
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl LicenseStore for MemoryLicenseStore {
    fn load_all(&self) -> Vec<LicenseRecord> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save_all(&self, records: &[LicenseRecord]) -> Result<()> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| LicensingError::Storage("license store lock poisoned".into()))?;
        *guard = records.to_vec();
        Ok(())
    }

    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<LicenseRecord>) -> T,
    {
        let mut guard = self
            .records
            .write()
            .map_err(|_| LicensingError::Storage("license store lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}
