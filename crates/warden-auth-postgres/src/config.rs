//! Connection settings for the session store database.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{StorageError, StorageResult};

/// How [`PostgresStorage::connect`](crate::PostgresStorage::connect) reaches
/// the database.
///
/// ```toml
/// url = "postgres://hydra:secret@db/hydra"
/// max_connections = 10
/// acquire_timeout = "5s"
/// migrate = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// `postgres://` or `postgresql://` connection URL.
    pub url: String,

    /// Upper bound on pooled connections.
    pub max_connections: u32,

    /// How long a storage call waits for a free connection before it fails
    /// with `store_unavailable`.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Applies the `hydra_*` schema on connect.
    pub migrate: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/hydra".into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }
}

impl PostgresConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_migrations(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    /// Rejects settings the pool cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidInput` for a non-postgres URL, a pool of
    /// zero connections or a zero acquire timeout.
    pub fn validate(&self) -> StorageResult<()> {
        let scheme = self.url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("postgres" | "postgresql")) {
            return Err(StorageError::invalid_input(
                "database url must start with postgres:// or postgresql://",
            ));
        }
        if self.max_connections == 0 {
            return Err(StorageError::invalid_input("max_connections must be at least 1"));
        }
        if self.acquire_timeout.is_zero() {
            return Err(StorageError::invalid_input("acquire_timeout must be positive"));
        }
        Ok(())
    }
}
