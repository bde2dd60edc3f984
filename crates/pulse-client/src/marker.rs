//! Last-success marker
//!
//! The automation records each successful run so a status check can warn
//! when nothing has succeeded for a while.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::files::{read_json, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Marker {
    last_success: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SuccessMarker {
    path: PathBuf,
}

impl SuccessMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn record(&self, now: DateTime<Utc>) -> Result<()> {
        write_json_atomic(&self.path, &Marker { last_success: now })
    }

    /// When the last successful run happened; unreadable markers count as never
    pub fn last(&self) -> Option<DateTime<Utc>> {
        match read_json::<Marker>(&self.path) {
            Ok(marker) => marker.map(|m| m.last_success),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "Ignoring unreadable success marker");
                None
            }
        }
    }

    /// Whole days since the last success
    pub fn days_since(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last().map(|last| (now - last).num_days())
    }

    /// A run never recorded is not stale, only never run
    pub fn is_stale(&self, now: DateTime<Utc>, warning_days: i64) -> bool {
        self.days_since(now).is_some_and(|days| days >= warning_days)
    }
}
