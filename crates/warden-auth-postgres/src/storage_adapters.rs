//! Arc-owning storage adapters.
//!
//! These adapters wrap the lifetime-based table types, own an
//! `Arc<PgPool>` and implement the `warden-auth` storage traits, so they can
//! be shared as `Arc<dyn ...Storage>`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use time::Duration;
use tracing::debug;

use warden_auth::clock::{Clock, SystemClock};
use warden_auth::policy::{PatternMatcher, Policy};
use warden_auth::storage::{
    ClientRegistry, GrantStorage, GroupStorage, PolicyStorage, hydrate, sweep_cutoff,
};
use warden_auth::types::{GrantRequest, GrantRow, Group, JsonSessionCodec, SessionCodec, SessionKind};
use warden_auth::{AuthError, AuthResult};

use crate::grant::{GrantTable, delete_row, insert_row};
use crate::group::GroupTables;
use crate::policy::PolicyTable;
use crate::{PgPool, StorageError};

// =============================================================================
// Grant Storage
// =============================================================================

/// PostgreSQL grant session store.
#[derive(Clone)]
pub struct PostgresGrantStorage {
    pool: Arc<PgPool>,
    codec: Arc<dyn SessionCodec>,
    clients: Arc<dyn ClientRegistry>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PostgresGrantStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresGrantStorage").finish_non_exhaustive()
    }
}

impl PostgresGrantStorage {
    /// Create a grant store resolving clients through `clients`.
    #[must_use]
    pub fn new(pool: Arc<PgPool>, clients: Arc<dyn ClientRegistry>) -> Self {
        Self {
            pool,
            codec: Arc::new(JsonSessionCodec),
            clients,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the session codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the clock used by the access token sweep.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn encode(&self, signature: &str, request: &GrantRequest) -> AuthResult<GrantRow> {
        GrantRow::encode(signature, request, self.codec.as_ref())
    }
}

#[async_trait]
impl GrantStorage for PostgresGrantStorage {
    async fn create(
        &self,
        kind: SessionKind,
        signature: &str,
        request: &GrantRequest,
    ) -> AuthResult<()> {
        let row = self.encode(signature, request)?;
        GrantTable::new(&self.pool).insert(kind, &row).await?;
        Ok(())
    }

    async fn get(&self, kind: SessionKind, signature: &str) -> AuthResult<GrantRequest> {
        let row = GrantTable::new(&self.pool).fetch(kind, signature).await?;
        hydrate(row, self.codec.as_ref(), self.clients.as_ref()).await
    }

    async fn delete(&self, kind: SessionKind, signature: &str) -> AuthResult<()> {
        GrantTable::new(&self.pool).delete(kind, signature).await?;
        Ok(())
    }

    async fn revoke_by_request_id(&self, kind: SessionKind, request_id: &str) -> AuthResult<()> {
        let removed = GrantTable::new(&self.pool)
            .delete_by_request_id(kind, request_id)
            .await?;
        debug!(%kind, request_id, removed, "Revoked sessions");
        Ok(())
    }

    async fn persist_authorize_code_grant(
        &self,
        code_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
        request: &GrantRequest,
    ) -> AuthResult<()> {
        let access = self.encode(access_signature, request)?;
        let refresh = refresh_signature
            .map(|signature| self.encode(signature, request))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
        delete_row(&mut *tx, SessionKind::Code, code_signature).await?;
        insert_row(&mut *tx, SessionKind::Access, &access).await?;
        if let Some(refresh) = &refresh {
            insert_row(&mut *tx, SessionKind::Refresh, refresh).await?;
        }
        tx.commit().await.map_err(StorageError::from)?;
        Ok(())
    }

    async fn persist_refresh_token_grant(
        &self,
        old_refresh_signature: &str,
        access_signature: &str,
        new_refresh_signature: &str,
        request: &GrantRequest,
    ) -> AuthResult<()> {
        let access = self.encode(access_signature, request)?;
        let refresh = self.encode(new_refresh_signature, request)?;

        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
        delete_row(&mut *tx, SessionKind::Refresh, old_refresh_signature).await?;
        insert_row(&mut *tx, SessionKind::Access, &access).await?;
        insert_row(&mut *tx, SessionKind::Refresh, &refresh).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(())
    }

    async fn remove_old_access_tokens(&self, lifespan: Duration) -> AuthResult<u64> {
        let Some(cutoff) = sweep_cutoff(self.clock.now(), lifespan) else {
            return Ok(0);
        };
        Ok(GrantTable::new(&self.pool).delete_access_before(cutoff).await?)
    }

    async fn ping(&self) -> AuthResult<()> {
        query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

// =============================================================================
// Policy Storage
// =============================================================================

/// PostgreSQL policy store.
#[derive(Debug, Clone)]
pub struct PostgresPolicyStorage {
    pool: Arc<PgPool>,
    matcher: Arc<PatternMatcher>,
}

impl PostgresPolicyStorage {
    /// Create a new policy store.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            matcher: Arc::new(PatternMatcher::new()),
        }
    }
}

fn page_bound(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl PolicyStorage for PostgresPolicyStorage {
    async fn create(&self, policy: &Policy) -> AuthResult<()> {
        policy.validate()?;
        PolicyTable::new(&self.pool).insert(policy).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> AuthResult<Policy> {
        Ok(PolicyTable::new(&self.pool).fetch(id).await?)
    }

    async fn update(&self, policy: &Policy) -> AuthResult<()> {
        policy.validate()?;
        PolicyTable::new(&self.pool).update(policy).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AuthResult<()> {
        PolicyTable::new(&self.pool).delete(id).await?;
        Ok(())
    }

    async fn list(&self, limit: usize, offset: usize) -> AuthResult<Vec<Policy>> {
        Ok(PolicyTable::new(&self.pool)
            .list(page_bound(limit), page_bound(offset))
            .await?)
    }

    async fn count(&self) -> AuthResult<u64> {
        let count = PolicyTable::new(&self.pool).count().await?;
        u64::try_from(count).map_err(|e| AuthError::internal(format!("negative policy count: {e}")))
    }

    async fn find_by_subject(&self, subject: &str) -> AuthResult<Vec<Policy>> {
        let candidates = PolicyTable::new(&self.pool)
            .candidates_for_subject(subject)
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|p| self.matcher.matches(&p.subjects, subject).unwrap_or(true))
            .collect())
    }

    async fn find_by_resource(&self, resource: &str) -> AuthResult<Vec<Policy>> {
        let candidates = PolicyTable::new(&self.pool)
            .candidates_for_resource(resource)
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|p| self.matcher.matches(&p.resources, resource).unwrap_or(true))
            .collect())
    }

    async fn search(&self, query: &str) -> AuthResult<Vec<Policy>> {
        Ok(PolicyTable::new(&self.pool).search(query).await?)
    }
}

// =============================================================================
// Group Storage
// =============================================================================

/// PostgreSQL group store.
#[derive(Debug, Clone)]
pub struct PostgresGroupStorage {
    pool: Arc<PgPool>,
}

impl PostgresGroupStorage {
    /// Create a new group store.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupStorage for PostgresGroupStorage {
    async fn create_group(&self, group: &Group) -> AuthResult<()> {
        let mut group = group.clone();
        group.normalize();
        GroupTables::new(&self.pool).insert(&group).await?;
        Ok(())
    }

    async fn get_group(&self, id: &str) -> AuthResult<Group> {
        Ok(GroupTables::new(&self.pool).fetch(id).await?)
    }

    async fn delete_group(&self, id: &str) -> AuthResult<()> {
        GroupTables::new(&self.pool).delete(id).await?;
        Ok(())
    }

    async fn add_members(&self, id: &str, members: &[String]) -> AuthResult<()> {
        GroupTables::new(&self.pool).add_members(id, members).await?;
        Ok(())
    }

    async fn remove_members(&self, id: &str, members: &[String]) -> AuthResult<()> {
        GroupTables::new(&self.pool)
            .remove_members(id, members)
            .await?;
        Ok(())
    }

    async fn find_group_names(&self, member: &str) -> AuthResult<Vec<String>> {
        Ok(GroupTables::new(&self.pool).group_names(member).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bound_saturates() {
        assert_eq!(page_bound(10), 10);
        assert_eq!(page_bound(usize::MAX), i64::MAX);
    }
}
