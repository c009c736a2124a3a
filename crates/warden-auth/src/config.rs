//! Warden configuration.
//!
//! The configuration is loaded once at startup and handed to constructors as
//! an immutable value.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::Client;

/// Minimum length of the HMAC system secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Root configuration for the authorization core.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://auth.example.com"
/// system_secret = "change-me-to-something-at-least-32-bytes"
/// access_token_lifespan = "1h"
///
/// [[auth.clients]]
/// id = "siri"
/// secret_hash = "..."
/// allowed_scopes = ["core", "hydra.warden"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Issuer reported in every authorization context.
    pub issuer: String,

    /// Secret used to sign and verify opaque tokens.
    pub system_secret: String,

    /// Lifespan of access tokens. Also drives the background sweep.
    #[serde(with = "humantime_serde")]
    pub access_token_lifespan: Duration,

    /// Lifespan of refresh tokens.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifespan: Duration,

    /// Lifespan of authorization codes.
    #[serde(with = "humantime_serde")]
    pub authorize_code_lifespan: Duration,

    /// How often expired access tokens are swept. Zero disables the sweeper.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Policy listing pagination.
    pub pagination: PaginationConfig,

    /// Statically registered OAuth 2.0 clients.
    pub clients: Vec<Client>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:4444".to_string(),
            system_secret: String::new(),
            access_token_lifespan: Duration::from_secs(3600),
            refresh_token_lifespan: Duration::from_secs(720 * 3600),
            authorize_code_lifespan: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(600),
            pagination: PaginationConfig::default(),
            clients: Vec::new(),
        }
    }
}

/// Limits applied to `limit`/`offset` query parameters.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when the caller does not pass `limit`.
    pub default_limit: usize,
    /// Largest page size a caller may request.
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 500,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl WardenConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the issuer or the system secret is
    /// empty, and `ConfigError::InvalidValue` if:
    /// - The system secret is shorter than [`MIN_SECRET_LENGTH`]
    /// - The access token lifespan is zero
    /// - The pagination limits are zero or inverted
    /// - Two clients share an id
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }

        if self.system_secret.is_empty() {
            return Err(ConfigError::Missing("system_secret".to_string()));
        }

        if self.system_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "system_secret must be at least {MIN_SECRET_LENGTH} bytes long"
            )));
        }

        if self.access_token_lifespan.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifespan must be greater than zero".to_string(),
            ));
        }

        let p = &self.pagination;
        if p.default_limit == 0 || p.max_limit == 0 || p.default_limit > p.max_limit {
            return Err(ConfigError::InvalidValue(format!(
                "pagination limits are inconsistent: default {} / max {}",
                p.default_limit, p.max_limit
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for client in &self.clients {
            if !seen.insert(client.id.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "client '{}' is registered twice",
                    client.id
                )));
            }
        }

        Ok(())
    }
}
