//! In-memory storage implementations.
//!
//! Every manager keeps its state behind one `tokio::sync::RwLock`. Grant
//! transitions check all of their preconditions and apply all of their
//! writes under a single write guard, so they are atomic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use time::Duration;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::policy::{PatternMatcher, Policy};
use crate::storage::grant::{hydrate, sweep_cutoff};
use crate::storage::policy::policy_contains;
use crate::storage::{ClientRegistry, GrantStorage, GroupStorage, PolicyStorage};
use crate::types::{Client, GrantRequest, GrantRow, Group, JsonSessionCodec, SessionCodec, SessionKind};
use crate::{AuthError, AuthResult};

// =============================================================================
// Client Registry
// =============================================================================

/// Client registry backed by a map.
#[derive(Debug, Default)]
pub struct MemoryClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
}

impl MemoryClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `clients`.
    #[must_use]
    pub fn from_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        Self {
            clients: RwLock::new(clients.into_iter().map(|c| (c.id.clone(), c)).collect()),
        }
    }

    /// Registers or replaces a client.
    pub async fn insert(&self, client: Client) {
        self.clients.write().await.insert(client.id.clone(), client);
    }

    /// Removes a client.
    pub async fn remove(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }
}

#[async_trait]
impl ClientRegistry for MemoryClientRegistry {
    async fn get_client(&self, id: &str) -> AuthResult<Client> {
        self.clients
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::not_found(format!("client '{id}'")))
    }
}

// =============================================================================
// Grant Storage
// =============================================================================

type Table = BTreeMap<String, GrantRow>;

#[derive(Debug, Default)]
struct Tables {
    by_kind: HashMap<SessionKind, Table>,
}

impl Tables {
    fn table(&self, kind: SessionKind) -> Option<&Table> {
        self.by_kind.get(&kind)
    }

    fn table_mut(&mut self, kind: SessionKind) -> &mut Table {
        self.by_kind.entry(kind).or_default()
    }

    fn contains(&self, kind: SessionKind, signature: &str) -> bool {
        self.table(kind).is_some_and(|t| t.contains_key(signature))
    }

    fn ensure_present(&self, kind: SessionKind, signature: &str) -> AuthResult<()> {
        if self.contains(kind, signature) {
            Ok(())
        } else {
            Err(AuthError::not_found(format!("{kind} session")))
        }
    }

    fn ensure_absent(&self, kind: SessionKind, signature: &str) -> AuthResult<()> {
        if self.contains(kind, signature) {
            Err(AuthError::duplicate(format!("{kind} session signature")))
        } else {
            Ok(())
        }
    }
}

/// Grant session store backed by in-process maps.
pub struct MemoryGrantStorage {
    tables: RwLock<Tables>,
    codec: Arc<dyn SessionCodec>,
    clients: Arc<dyn ClientRegistry>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryGrantStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGrantStorage").finish_non_exhaustive()
    }
}

impl MemoryGrantStorage {
    /// Creates an empty store resolving clients through `clients`.
    #[must_use]
    pub fn new(clients: Arc<dyn ClientRegistry>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
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

    /// Number of sessions currently stored under `kind`.
    pub async fn len(&self, kind: SessionKind) -> usize {
        self.tables.read().await.table(kind).map_or(0, BTreeMap::len)
    }

    fn encode(&self, signature: &str, request: &GrantRequest) -> AuthResult<GrantRow> {
        GrantRow::encode(signature, request, self.codec.as_ref())
    }
}

#[async_trait]
impl GrantStorage for MemoryGrantStorage {
    async fn create(
        &self,
        kind: SessionKind,
        signature: &str,
        request: &GrantRequest,
    ) -> AuthResult<()> {
        let row = self.encode(signature, request)?;
        let mut tables = self.tables.write().await;
        tables.ensure_absent(kind, signature)?;
        tables.table_mut(kind).insert(signature.to_string(), row);
        Ok(())
    }

    async fn get(&self, kind: SessionKind, signature: &str) -> AuthResult<GrantRequest> {
        let row = self
            .tables
            .read()
            .await
            .table(kind)
            .and_then(|t| t.get(signature))
            .cloned()
            .ok_or_else(|| AuthError::not_found(format!("{kind} session")))?;

        hydrate(row, self.codec.as_ref(), self.clients.as_ref()).await
    }

    async fn delete(&self, kind: SessionKind, signature: &str) -> AuthResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_present(kind, signature)?;
        tables.table_mut(kind).remove(signature);
        Ok(())
    }

    async fn revoke_by_request_id(&self, kind: SessionKind, request_id: &str) -> AuthResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .table_mut(kind)
            .retain(|_, row| row.request_id != request_id);
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
            .map(|sig| self.encode(sig, request))
            .transpose()?;

        let mut tables = self.tables.write().await;
        tables.ensure_present(SessionKind::Code, code_signature)?;
        tables.ensure_absent(SessionKind::Access, access_signature)?;
        if let Some(sig) = refresh_signature {
            tables.ensure_absent(SessionKind::Refresh, sig)?;
        }

        tables.table_mut(SessionKind::Code).remove(code_signature);
        tables
            .table_mut(SessionKind::Access)
            .insert(access_signature.to_string(), access);
        if let Some(row) = refresh {
            tables
                .table_mut(SessionKind::Refresh)
                .insert(row.signature.clone(), row);
        }
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

        let mut tables = self.tables.write().await;
        tables.ensure_present(SessionKind::Refresh, old_refresh_signature)?;
        tables.ensure_absent(SessionKind::Access, access_signature)?;
        if new_refresh_signature != old_refresh_signature {
            tables.ensure_absent(SessionKind::Refresh, new_refresh_signature)?;
        }

        let refresh_table = tables.table_mut(SessionKind::Refresh);
        refresh_table.remove(old_refresh_signature);
        refresh_table.insert(new_refresh_signature.to_string(), refresh);
        tables
            .table_mut(SessionKind::Access)
            .insert(access_signature.to_string(), access);
        Ok(())
    }

    async fn remove_old_access_tokens(&self, lifespan: Duration) -> AuthResult<u64> {
        let Some(cutoff) = sweep_cutoff(self.clock.now(), lifespan) else {
            return Ok(0);
        };

        let mut tables = self.tables.write().await;
        let table = tables.table_mut(SessionKind::Access);
        let before = table.len();
        table.retain(|_, row| row.requested_at >= cutoff);
        Ok((before - table.len()) as u64)
    }
}

// =============================================================================
// Policy Storage
// =============================================================================

/// Policy store backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryPolicyStorage {
    policies: RwLock<BTreeMap<String, Policy>>,
    matcher: PatternMatcher,
}

impl MemoryPolicyStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn filter(&self, pred: impl Fn(&Policy) -> bool) -> Vec<Policy> {
        self.policies
            .read()
            .await
            .values()
            .filter(|p| pred(p))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PolicyStorage for MemoryPolicyStorage {
    async fn create(&self, policy: &Policy) -> AuthResult<()> {
        policy.validate()?;
        let mut policies = self.policies.write().await;
        if policies.contains_key(&policy.id) {
            return Err(AuthError::duplicate(format!("policy '{}'", policy.id)));
        }
        policies.insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> AuthResult<Policy> {
        self.policies
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::not_found(format!("policy '{id}'")))
    }

    async fn update(&self, policy: &Policy) -> AuthResult<()> {
        policy.validate()?;
        let mut policies = self.policies.write().await;
        match policies.get_mut(&policy.id) {
            Some(existing) => {
                *existing = policy.clone();
                Ok(())
            }
            None => Err(AuthError::not_found(format!("policy '{}'", policy.id))),
        }
    }

    async fn delete(&self, id: &str) -> AuthResult<()> {
        self.policies
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AuthError::not_found(format!("policy '{id}'")))
    }

    async fn list(&self, limit: usize, offset: usize) -> AuthResult<Vec<Policy>> {
        Ok(self
            .policies
            .read()
            .await
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> AuthResult<u64> {
        Ok(self.policies.read().await.len() as u64)
    }

    async fn find_by_subject(&self, subject: &str) -> AuthResult<Vec<Policy>> {
        // a template that fails to compile is returned rather than hidden
        Ok(self
            .filter(|p| self.matcher.matches(&p.subjects, subject).unwrap_or(true))
            .await)
    }

    async fn find_by_resource(&self, resource: &str) -> AuthResult<Vec<Policy>> {
        Ok(self
            .filter(|p| self.matcher.matches(&p.resources, resource).unwrap_or(true))
            .await)
    }

    async fn search(&self, query: &str) -> AuthResult<Vec<Policy>> {
        let needle = query.to_lowercase();
        Ok(self.filter(|p| policy_contains(p, &needle)).await)
    }
}

// =============================================================================
// Group Storage
// =============================================================================

/// Group store backed by an ordered map of member sets.
#[derive(Debug, Default)]
pub struct MemoryGroupStorage {
    groups: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl MemoryGroupStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn group_not_found(id: &str) -> AuthError {
    AuthError::not_found(format!("group '{id}'"))
}

#[async_trait]
impl GroupStorage for MemoryGroupStorage {
    async fn create_group(&self, group: &Group) -> AuthResult<()> {
        if group.id.is_empty() {
            return Err(AuthError::invalid_argument("group id must not be empty"));
        }
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Err(AuthError::duplicate(format!("group '{}'", group.id)));
        }
        groups.insert(group.id.clone(), group.members.iter().cloned().collect());
        Ok(())
    }

    async fn get_group(&self, id: &str) -> AuthResult<Group> {
        let groups = self.groups.read().await;
        let members = groups.get(id).ok_or_else(|| group_not_found(id))?;
        Ok(Group {
            id: id.to_string(),
            members: members.iter().cloned().collect(),
        })
    }

    async fn delete_group(&self, id: &str) -> AuthResult<()> {
        self.groups
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| group_not_found(id))
    }

    async fn add_members(&self, id: &str, members: &[String]) -> AuthResult<()> {
        let mut groups = self.groups.write().await;
        let set = groups.get_mut(id).ok_or_else(|| group_not_found(id))?;
        set.extend(members.iter().cloned());
        Ok(())
    }

    async fn remove_members(&self, id: &str, members: &[String]) -> AuthResult<()> {
        let mut groups = self.groups.write().await;
        let set = groups.get_mut(id).ok_or_else(|| group_not_found(id))?;
        for member in members {
            set.remove(member);
        }
        Ok(())
    }

    async fn find_group_names(&self, member: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .groups
            .read()
            .await
            .iter()
            .filter(|(_, members)| members.contains(member))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::testing;
    use time::macros::datetime;

    fn grant_store() -> MemoryGrantStorage {
        MemoryGrantStorage::new(Arc::new(MemoryClientRegistry::from_clients([
            testing::client(),
        ])))
    }

    #[tokio::test]
    async fn test_grant_store_contract() {
        testing::check_grant_storage(&grant_store()).await;
    }

    #[tokio::test]
    async fn test_grant_transitions() {
        testing::check_grant_transitions(&grant_store()).await;
    }

    #[tokio::test]
    async fn test_concurrent_refresh_rotation() {
        testing::check_concurrent_refresh(Arc::new(grant_store())).await;
    }

    #[tokio::test]
    async fn test_policy_store_contract() {
        testing::check_policy_storage(&MemoryPolicyStorage::new()).await;
    }

    #[tokio::test]
    async fn test_group_store_contract() {
        testing::check_group_storage(&MemoryGroupStorage::new()).await;
    }

    #[tokio::test]
    async fn test_remove_old_access_tokens() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        let clock = Arc::new(FixedClock::new(now));
        let store = grant_store().with_clock(clock);

        let mut fresh = testing::request("fresh");
        fresh.requested_at = now - Duration::minutes(30);
        let mut old = testing::request("old");
        old.requested_at = now - Duration::minutes(61);
        let mut edge = testing::request("edge");
        edge.requested_at = now - Duration::minutes(60);

        store.create(SessionKind::Access, "fresh", &fresh).await.unwrap();
        store.create(SessionKind::Access, "old", &old).await.unwrap();
        store.create(SessionKind::Access, "edge", &edge).await.unwrap();
        store.create(SessionKind::Refresh, "old-refresh", &old).await.unwrap();

        assert_eq!(store.remove_old_access_tokens(Duration::ZERO).await.unwrap(), 0);
        assert_eq!(store.len(SessionKind::Access).await, 3);

        // 59m30s rounds up to one hour
        let removed = store
            .remove_old_access_tokens(Duration::seconds(59 * 60 + 30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(SessionKind::Access, "old").await.is_err());
        assert!(store.get(SessionKind::Access, "edge").await.is_ok());
        assert!(store.get(SessionKind::Access, "fresh").await.is_ok());
        assert_eq!(store.len(SessionKind::Refresh).await, 1);
    }

    #[tokio::test]
    async fn test_remove_old_access_tokens_with_unbounded_lifespan() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        let store = grant_store().with_clock(Arc::new(FixedClock::new(now)));

        let mut ancient = testing::request("ancient");
        ancient.requested_at = datetime!(1970-01-01 00:00:00 UTC);
        store.create(SessionKind::Access, "ancient", &ancient).await.unwrap();

        let removed = store
            .remove_old_access_tokens(Duration::days(365 * 20_000))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.remove_old_access_tokens(Duration::MAX).await.unwrap(), 0);
        assert!(store.get(SessionKind::Access, "ancient").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_with_unknown_client() {
        let store = MemoryGrantStorage::new(Arc::new(MemoryClientRegistry::new()));
        store
            .create(SessionKind::Access, "sig", &testing::request("req"))
            .await
            .unwrap();
        let err = store.get(SessionKind::Access, "sig").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound { .. }));
        assert!(err.to_string().contains("client"));
    }

    #[tokio::test]
    async fn test_corrupt_session_is_decode_error() {
        let store = grant_store();
        let mut row = GrantRow::encode("sig", &testing::request("req"), &JsonSessionCodec).unwrap();
        row.session_data = b"\xff\xfe".to_vec();
        store
            .tables
            .write()
            .await
            .table_mut(SessionKind::Access)
            .insert("sig".to_string(), row);

        let err = store.get(SessionKind::Access, "sig").await.unwrap_err();
        assert!(matches!(err, AuthError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_client_registry() {
        let registry = MemoryClientRegistry::new();
        assert!(registry.get_client("siri").await.is_err());
        registry.insert(Client::new("siri", vec![])).await;
        assert_eq!(registry.get_client("siri").await.unwrap().id, "siri");
        assert!(registry.remove("siri").await.is_some());
    }
}
