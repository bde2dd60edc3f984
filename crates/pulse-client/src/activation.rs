//! Local License Activation
//!
//! A key is activated once (format check, remote validation, saved to
//! `license.json`). Every run afterwards calls [`Activator::check`], which
//! trusts the saved validation for a while, re-validates when it is older,
//! and tolerates an unreachable server for a grace period.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pulse_licensing::{LicenseKey, LicenseType};

use crate::client::LicenseAuthority;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::files::{read_json, write_json_atomic};

/// Contents of `license.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    pub key: String,
    #[serde(rename = "type", default)]
    pub license_type: Option<LicenseType>,
    #[serde(default)]
    pub email: Option<String>,
    pub activated_at: DateTime<Utc>,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ActivationFile {
    path: PathBuf,
}

impl ActivationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved activation; a corrupt file reads as no activation
    pub fn load(&self) -> Option<Activation> {
        match read_json::<Activation>(&self.path) {
            Ok(activation) => activation,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "Ignoring unreadable license file");
                None
            }
        }
    }

    pub fn save(&self, activation: &Activation) -> Result<()> {
        write_json_atomic(&self.path, activation)
    }
}

/// Result of a license check before a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseState {
    /// Nothing activated yet
    Missing,
    Valid {
        license_type: Option<LicenseType>,
        /// Whether this check went to the server
        revalidated: bool,
    },
    /// Server unreachable, last good validation still within the grace period
    Grace {
        license_type: Option<LicenseType>,
        warning: String,
        until: DateTime<Utc>,
    },
    Invalid {
        reason: String,
    },
}

impl LicenseState {
    pub fn allows_run(&self) -> bool {
        matches!(self, LicenseState::Valid { .. } | LicenseState::Grace { .. })
    }
}

pub struct Activator<A: LicenseAuthority> {
    authority: A,
    file: ActivationFile,
    key_prefix: String,
    revalidate_after: chrono::Duration,
    grace_period: chrono::Duration,
}

impl<A: LicenseAuthority> Activator<A> {
    pub fn new(authority: A, config: &ClientConfig) -> Self {
        Self {
            authority,
            file: ActivationFile::new(config.license_file()),
            key_prefix: config.key_prefix.clone(),
            revalidate_after: config.revalidate_after,
            grace_period: config.grace_period,
        }
    }

    pub fn file(&self) -> &ActivationFile {
        &self.file
    }

    /// Validate `key` remotely and save it as the active license
    pub async fn activate(&self, key: &str, now: DateTime<Utc>) -> Result<Activation> {
        let key = LicenseKey::parse(&self.key_prefix, key).map_err(|_| {
            ClientError::InvalidKeyFormat(format!("expected {}-XXXX-XXXX-XXXX-XXXX", self.key_prefix))
        })?;

        let response = self.authority.validate(key.as_str()).await?;
        if !response.valid {
            return Err(ClientError::Rejected(
                response.error.unwrap_or_else(|| "Invalid key".to_string()),
            ));
        }

        let activation = Activation {
            key: key.to_string(),
            license_type: response.license_type,
            email: response.email,
            activated_at: now,
            validated_at: now,
        };
        self.file.save(&activation)?;

        tracing::info!(license_type = ?activation.license_type, "License activated");
        Ok(activation)
    }

    /// Decide whether the automation may run at `now`
    pub async fn check(&self, now: DateTime<Utc>) -> Result<LicenseState> {
        let Some(mut activation) = self.file.load() else {
            return Ok(LicenseState::Missing);
        };

        if now - activation.validated_at < self.revalidate_after {
            return Ok(LicenseState::Valid {
                license_type: activation.license_type,
                revalidated: false,
            });
        }

        match self.authority.validate(&activation.key).await {
            Ok(response) if response.valid => {
                activation.validated_at = now;
                if response.license_type.is_some() {
                    activation.license_type = response.license_type;
                }
                self.file.save(&activation)?;
                Ok(LicenseState::Valid {
                    license_type: activation.license_type,
                    revalidated: true,
                })
            }
            Ok(response) => {
                let reason = response
                    .error
                    .unwrap_or_else(|| "License no longer valid".to_string());
                tracing::warn!(reason = %reason, "License re-validation rejected");
                Ok(LicenseState::Invalid { reason })
            }
            Err(err) if err.is_transient() => {
                let until = activation.validated_at + self.grace_period;
                if now <= until {
                    tracing::warn!(error = %err, grace_until = %until, "License server unavailable, running on grace");
                    Ok(LicenseState::Grace {
                        license_type: activation.license_type,
                        warning: err.to_string(),
                        until,
                    })
                } else {
                    Ok(LicenseState::Invalid {
                        reason: err.to_string(),
                    })
                }
            }
            Err(err) => Err(err),
        }
    }
}
