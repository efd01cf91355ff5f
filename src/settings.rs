// src/settings.rs
//! Runtime configuration.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file) under the `MINIAPP_AUTH_` prefix, layered over built-in defaults.
//!
//! ## Environment Variables
//! - `MINIAPP_AUTH_BIND_ADDR`: listen address (default `127.0.0.1:3000`)
//! - `MINIAPP_AUTH_BOT_SECRET_KEY`: hex-encoded HMAC key for init data
//! - `MINIAPP_AUTH_BOT_TOKEN`: raw bot token, used to derive the key when no hex key is set
//! - `MINIAPP_AUTH_ALLOW_ANONYMOUS_FALLBACK`: accept absent init data (default `true`)
//! - `MINIAPP_AUTH_ALLOW_FIXTURE_PAYLOADS`: accept `mock_init_data_for_<uid>` (default `true`)
//! - `MINIAPP_AUTH_MAX_AUTH_AGE_SECS`: reject signed payloads older than this (default unset)
//! - `MINIAPP_AUTH_ISSUANCE_TIMEOUT_MS`: identity provider call timeout (default `5000`)
//! - `MINIAPP_AUTH_PROVIDER`: `identity_toolkit` (default) or `memory`
//! - `MINIAPP_AUTH_PROJECT_ID`: identity platform project (required for `identity_toolkit`)
//! - `MINIAPP_AUTH_IDENTITY_TOOLKIT_URL`: API root (default production endpoint)
//! - `MINIAPP_AUTH_IDENTITY_TOOLKIT_ACCESS_TOKEN`: bearer token for the API
//! - `MINIAPP_AUTH_SERVICE_ACCOUNT_EMAIL` / `MINIAPP_AUTH_SERVICE_ACCOUNT_PRIVATE_KEY`:
//!   signing identity for custom tokens
//! - `MINIAPP_AUTH_ALLOWED_ORIGINS`: comma-separated CORS allowlist

use crate::services::credential_issuer::DEFAULT_ISSUANCE_TIMEOUT;
use crate::services::fallback_policy::FallbackPolicy;
use crate::storage::identity_provider::IdentityProvider;
use crate::storage::identity_toolkit::{IdentityToolkitProvider, DEFAULT_BASE_URL};
use crate::storage::memory_provider::InMemoryIdentityProvider;
use crate::utils::crypto::SecretKey;
use crate::wallet::key_management::ServiceAccountKey;
use config::{Config, Environment, Source};
use log::{info, warn};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "MINIAPP_AUTH";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),
}

/// Which identity provider backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    IdentityToolkit,
    Memory,
}

/// Service configuration, read once at startup.
///
/// Deliberately not `Debug`: it holds the bot secret and the service-account key.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub bot_secret_key: Option<String>,
    pub bot_token: Option<String>,
    pub allow_anonymous_fallback: bool,
    pub allow_fixture_payloads: bool,
    pub max_auth_age_secs: Option<i64>,
    pub issuance_timeout_ms: u64,
    pub provider: String,
    pub project_id: Option<String>,
    pub identity_toolkit_url: String,
    pub identity_toolkit_access_token: Option<String>,
    pub service_account_email: Option<String>,
    pub service_account_private_key: Option<String>,
    pub allowed_origins: String,
}

impl Settings {
    /// Loads settings from `.env` and the `MINIAPP_AUTH_*` environment.
    pub fn load() -> Result<Self, SettingsError> {
        dotenv::dotenv().ok();
        Self::from_source(Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads settings from an arbitrary source layered over the defaults.
    pub fn from_source<S>(source: S) -> Result<Self, SettingsError>
    where
        S: Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .set_default("bind_addr", "127.0.0.1:3000")?
            .set_default("allow_anonymous_fallback", true)?
            .set_default("allow_fixture_payloads", true)?
            .set_default("issuance_timeout_ms", DEFAULT_ISSUANCE_TIMEOUT.as_millis() as i64)?
            .set_default("provider", "identity_toolkit")?
            .set_default("identity_toolkit_url", DEFAULT_BASE_URL)?
            .set_default("allowed_origins", "")?
            .add_source(source)
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.bind_addr.parse().map_err(|e: std::net::AddrParseError| SettingsError::Invalid {
            key: "bind_addr",
            reason: e.to_string(),
        })
    }

    /// The init data HMAC key, or `None` when neither a key nor a bot token is set.
    ///
    /// A hex key takes precedence over a bot token.
    pub fn secret_key(&self) -> Result<Option<SecretKey>, SettingsError> {
        if let Some(encoded) = non_empty(&self.bot_secret_key) {
            return SecretKey::from_hex(encoded).map(Some).map_err(|e| SettingsError::Invalid {
                key: "bot_secret_key",
                reason: e.to_string(),
            });
        }
        Ok(non_empty(&self.bot_token).map(SecretKey::derive_from_bot_token))
    }

    /// Starts from the closed policy and opens each rule that is switched on.
    pub fn fallback_policy(&self) -> FallbackPolicy {
        let mut policy = FallbackPolicy::disabled();
        policy.allow_anonymous = self.allow_anonymous_fallback;
        policy.allow_fixtures = self.allow_fixture_payloads;
        policy
    }

    /// The freshness window for signed payloads, if one is configured.
    ///
    /// # Errors
    /// `SettingsError::Invalid` when the value is negative or too large to be
    /// represented as a duration.
    pub fn max_auth_age(&self) -> Result<Option<chrono::Duration>, SettingsError> {
        let secs = match self.max_auth_age_secs {
            Some(secs) => secs,
            None => return Ok(None),
        };
        if secs < 0 {
            return Err(SettingsError::Invalid {
                key: "max_auth_age_secs",
                reason: format!("must not be negative, got {}", secs),
            });
        }
        chrono::Duration::try_seconds(secs).map(Some).ok_or(SettingsError::Invalid {
            key: "max_auth_age_secs",
            reason: format!("{} seconds is out of range", secs),
        })
    }

    pub fn issuance_timeout(&self) -> Duration {
        Duration::from_millis(self.issuance_timeout_ms)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn provider_kind(&self) -> Result<ProviderKind, SettingsError> {
        match self.provider.trim() {
            "identity_toolkit" => Ok(ProviderKind::IdentityToolkit),
            "memory" => Ok(ProviderKind::Memory),
            other => Err(SettingsError::Invalid {
                key: "provider",
                reason: format!("unknown provider {:?}", other),
            }),
        }
    }

    /// The custom token signing key, if one is configured.
    pub fn signing_key(&self) -> Result<Option<ServiceAccountKey>, SettingsError> {
        let pem = match non_empty(&self.service_account_private_key) {
            Some(pem) => pem,
            None => return Ok(None),
        };
        let email = non_empty(&self.service_account_email)
            .ok_or(SettingsError::Missing("service_account_email"))?;

        ServiceAccountKey::from_pem(email, pem).map(Some).map_err(|e| SettingsError::Invalid {
            key: "service_account_private_key",
            reason: e.to_string(),
        })
    }

    /// Builds the configured identity provider backend.
    pub fn build_provider(&self) -> Result<Arc<dyn IdentityProvider>, SettingsError> {
        let signing_key = self.signing_key()?;
        match &signing_key {
            Some(key) => info!("custom tokens are signed as {}", key.client_email()),
            None => warn!("no service-account key; token minting will fall back to provisioning"),
        }
        match self.provider_kind()? {
            ProviderKind::Memory => Ok(Arc::new(InMemoryIdentityProvider::new(signing_key))),
            ProviderKind::IdentityToolkit => {
                let project_id =
                    non_empty(&self.project_id).ok_or(SettingsError::Missing("project_id"))?;
                let access_token = non_empty(&self.identity_toolkit_access_token)
                    .ok_or(SettingsError::Missing("identity_toolkit_access_token"))?;
                Ok(Arc::new(IdentityToolkitProvider::new(
                    &self.identity_toolkit_url,
                    project_id,
                    access_token,
                    signing_key,
                )))
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
