//! License Key Generation
//!
//! Keys look like `PULSE-1A2B-3C4D-5E6F-7A8B`: a configurable prefix followed
//! by four groups of 16 random bits each, rendered as uppercase hex.

use rand::{CryptoRng, RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};

use crate::error::{LicensingError, Result};

/// Prefix used when none is configured
pub const DEFAULT_KEY_PREFIX: &str = "PULSE";

const GROUPS: usize = 4;
const GROUP_BYTES: usize = 2;
const GROUP_LEN: usize = GROUP_BYTES * 2;

/// License key (formatted: PREFIX-XXXX-XXXX-XXXX-XXXX)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Parse a key, checking it against the expected prefix and group layout.
    ///
    /// Surrounding whitespace is ignored; case is not folded, so lowercase hex
    /// is rejected the same way the issuing side would never produce it.
    pub fn parse(prefix: &str, s: &str) -> Result<Self> {
        let candidate = s.trim();
        let invalid = || LicensingError::InvalidKeyFormat(format!("expected {prefix}-XXXX-XXXX-XXXX-XXXX"));

        let rest = candidate
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(invalid)?;

        let groups: Vec<&str> = rest.split('-').collect();
        let well_formed = groups.len() == GROUPS
            && groups.iter().all(|group| {
                group.len() == GROUP_LEN
                    && group
                        .chars()
                        .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
            });

        if well_formed {
            Ok(Self(candidate.to_string()))
        } else {
            Err(invalid())
        }
    }

    /// Get the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces fresh license keys from the operating system's CSPRNG.
#[derive(Clone, Debug)]
pub struct KeyGenerator {
    prefix: String,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a new license key
    pub fn generate(&self) -> LicenseKey {
        self.generate_with(&mut OsRng)
    }

    /// Generate a key from the given cryptographic RNG
    pub fn generate_with<R: RngCore + CryptoRng>(&self, rng: &mut R) -> LicenseKey {
        let mut bytes = [0u8; GROUPS * GROUP_BYTES];
        rng.fill_bytes(&mut bytes);

        let groups: Vec<String> = bytes.chunks_exact(GROUP_BYTES).map(hex::encode_upper).collect();
        LicenseKey(format!("{}-{}", self.prefix, groups.join("-")))
    }
}
