//! Storage backend bootstrap.
//!
//! Builds the session store, policy manager and group manager for the
//! configured DSN. Clients always come from configuration.

use std::sync::Arc;

use warden_auth::storage::{
    ClientRegistry, GrantStorage, GroupStorage, MemoryClientRegistry, MemoryGrantStorage,
    MemoryGroupStorage, MemoryPolicyStorage, PolicyStorage,
};
use warden_auth::{AuthResult, WardenConfig};
use warden_auth_postgres::{PostgresStorage, mask_password};

use crate::config::StorageConfig;

/// The stores shared by the warden, the HTTP handlers and the sweeper.
#[derive(Clone)]
pub struct Backend {
    pub grants: Arc<dyn GrantStorage>,
    pub policies: Arc<dyn PolicyStorage>,
    pub groups: Arc<dyn GroupStorage>,
    pub clients: Arc<dyn ClientRegistry>,
    /// Display name used by the detailed health check.
    pub name: String,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Backend {
    /// In-process stores.
    pub fn memory(auth: &WardenConfig) -> Self {
        let clients: Arc<dyn ClientRegistry> =
            Arc::new(MemoryClientRegistry::from_clients(auth.clients.iter().cloned()));
        Self {
            grants: Arc::new(MemoryGrantStorage::new(clients.clone())),
            policies: Arc::new(MemoryPolicyStorage::new()),
            groups: Arc::new(MemoryGroupStorage::new()),
            clients,
            name: "memory".to_string(),
        }
    }

    /// Connects the backend selected by `storage.dsn`.
    pub async fn connect(storage: &StorageConfig, auth: &WardenConfig) -> anyhow::Result<Self> {
        let Some(pg) = storage.postgres() else {
            tracing::info!("Using in-memory storage");
            return Ok(Self::memory(auth));
        };

        tracing::info!(url = %mask_password(&pg.url), "Connecting to PostgreSQL");
        let db = PostgresStorage::connect(&pg)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to PostgreSQL: {e}"))?;
        tracing::info!("PostgreSQL storage ready");

        let clients: Arc<dyn ClientRegistry> =
            Arc::new(MemoryClientRegistry::from_clients(auth.clients.iter().cloned()));
        Ok(Self {
            grants: Arc::new(db.grant_storage(clients.clone())),
            policies: Arc::new(db.policy_storage()),
            groups: Arc::new(db.group_storage()),
            clients,
            name: "postgres".to_string(),
        })
    }

    /// Checks that the session store answers.
    pub async fn ping(&self) -> AuthResult<()> {
        self.grants.ping().await
    }
}
