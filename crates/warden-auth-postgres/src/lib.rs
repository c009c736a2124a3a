//! PostgreSQL storage backend for warden-auth
//!
//! Provides persistent storage for:
//!
//! - Grant sessions, one `hydra_oauth2_<kind>` table per kind
//! - Access-control policies (`ladon_policy`)
//! - Subject groups (`hydra_warden_group`, `hydra_warden_group_member`)
//!
//! Clients are not stored here; the grant store resolves them through the
//! [`ClientRegistry`](warden_auth::storage::ClientRegistry) it is given.
//!
//! # Example
//!
//! ```ignore
//! use warden_auth_postgres::{PostgresConfig, PostgresStorage};
//!
//! let storage = PostgresStorage::connect(&PostgresConfig::new("postgres://localhost/hydra")).await?;
//! let grants = storage.grant_storage(clients);
//! let policies = storage.policy_storage();
//! ```

pub mod config;
pub mod grant;
pub mod group;
pub mod migrations;
pub mod policy;
pub mod pool;
pub mod storage_adapters;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_core::query::query;
use sqlx_postgres::Postgres;
use warden_auth::AuthError;
use warden_auth::storage::ClientRegistry;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use config::PostgresConfig;
pub use grant::GrantTable;
pub use group::GroupTables;
pub use policy::PolicyTable;
pub use pool::{create_pool, mask_password};
pub use storage_adapters::{PostgresGrantStorage, PostgresGroupStorage, PostgresPolicyStorage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Maps a unique violation to `Conflict` and passes anything else through.
    #[must_use]
    pub fn from_insert(error: sqlx_core::Error, what: impl FnOnce() -> String) -> Self {
        if let sqlx_core::Error::Database(ref db_err) = error
            && db_err.is_unique_violation()
        {
            return Self::conflict(what());
        }
        Self::from(error)
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if the database could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::Io(_)
                    | sqlx_core::Error::Tls(_)
                    | sqlx_core::Error::WorkerCrashed
            )
        )
    }

    /// Returns `true` if a stored value could not be decoded.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_)
                | Self::Database(
                    sqlx_core::Error::ColumnDecode { .. } | sqlx_core::Error::Decode(_)
                )
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(error: StorageError) -> Self {
        if error.is_unavailable() {
            return AuthError::store_unavailable(error.to_string());
        }
        if error.is_decode_error() {
            return AuthError::decode(error.to_string());
        }
        match error {
            StorageError::NotFound(what) => AuthError::not_found(what),
            StorageError::Conflict(what) => AuthError::duplicate(what),
            StorageError::InvalidInput(message) => AuthError::invalid_argument(message),
            StorageError::Database(sqlx_core::Error::Database(ref db_err))
                if db_err.is_unique_violation() =>
            {
                AuthError::duplicate(db_err.message().to_string())
            }
            other => {
                tracing::error!(error = %other, "Unexpected database error");
                AuthError::store_unavailable(other.to_string())
            }
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Storage
// =============================================================================

/// PostgreSQL storage backend.
///
/// Holds the connection pool and hands out the trait implementations used
/// by the warden and the HTTP handlers.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Connects to the database and, if configured, runs migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = create_pool(config).await?;
        if config.migrate {
            migrations::run(&pool).await?;
        }
        Ok(Self::new(Arc::new(pool)))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the Arc-wrapped pool.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    /// Runs `SELECT 1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn ping(&self) -> StorageResult<()> {
        query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Grant session store resolving clients through `clients`.
    #[must_use]
    pub fn grant_storage(&self, clients: Arc<dyn ClientRegistry>) -> PostgresGrantStorage {
        PostgresGrantStorage::new(self.pool_arc(), clients)
    }

    /// Policy store.
    #[must_use]
    pub fn policy_storage(&self) -> PostgresPolicyStorage {
        PostgresPolicyStorage::new(self.pool_arc())
    }

    /// Group store.
    #[must_use]
    pub fn group_storage(&self) -> PostgresGroupStorage {
        PostgresGroupStorage::new(self.pool_arc())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::ErrorKind;

    #[test]
    fn test_storage_error_not_found() {
        let err = StorageError::not_found("policy p1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: policy p1");
        assert_eq!(AuthError::from(err).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_conflict_maps_to_duplicate() {
        let err = StorageError::conflict("signature abc");
        assert!(err.is_conflict());
        assert_eq!(AuthError::from(err).kind(), ErrorKind::Duplicate);
    }

    #[test]
    fn test_pool_errors_map_to_unavailable() {
        let err = StorageError::from(sqlx_core::Error::PoolTimedOut);
        assert!(err.is_unavailable());
        assert_eq!(AuthError::from(err).kind(), ErrorKind::StoreUnavailable);

        let err = StorageError::from(sqlx_core::Error::PoolClosed);
        assert_eq!(AuthError::from(err).kind(), ErrorKind::StoreUnavailable);
    }

    #[test]
    fn test_serialization_maps_to_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = StorageError::from(json_err);
        assert!(err.is_decode_error());
        assert_eq!(AuthError::from(err).kind(), ErrorKind::DecodeError);
    }

    #[test]
    fn test_invalid_input_maps_to_invalid_argument() {
        let err = StorageError::invalid_input("empty group id");
        assert_eq!(AuthError::from(err).kind(), ErrorKind::InvalidArgument);
    }
}
