//! Policy storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::policy::Policy;

/// Storage trait for access-control policies.
///
/// Listing is ordered by policy id. Subject and resource lookups may return
/// a superset of the policies that actually match; the policy engine
/// re-evaluates every template exactly.
#[async_trait]
pub trait PolicyStorage: Send + Sync {
    /// Stores a new policy.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if the policy does not validate
    /// and `AuthError::Duplicate` if a policy with this id exists.
    async fn create(&self, policy: &Policy) -> AuthResult<()>;

    /// Fetches a policy by id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such policy.
    async fn get(&self, id: &str) -> AuthResult<Policy>;

    /// Replaces the policy with the same id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if the policy does not validate
    /// and `AuthError::NotFound` if there is no such policy.
    async fn update(&self, policy: &Policy) -> AuthResult<()>;

    /// Deletes a policy.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such policy.
    async fn delete(&self, id: &str) -> AuthResult<()>;

    /// Returns one page of policies ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list(&self, limit: usize, offset: usize) -> AuthResult<Vec<Policy>>;

    /// Returns the exact number of stored policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count(&self) -> AuthResult<u64>;

    /// Returns policies whose subjects may match `subject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_subject(&self, subject: &str) -> AuthResult<Vec<Policy>>;

    /// Returns policies whose resources may match `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_resource(&self, resource: &str) -> AuthResult<Vec<Policy>>;

    /// Case-insensitive substring search over id, description, subjects,
    /// resources and actions.
    ///
    /// The query is always bound as a parameter, never spliced into SQL.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn search(&self, query: &str) -> AuthResult<Vec<Policy>>;
}

/// Returns `true` if `policy` contains `query`, ignoring case.
///
/// `query` must already be lowercase.
#[must_use]
pub fn policy_contains(policy: &Policy, query: &str) -> bool {
    let hit = |s: &String| s.to_lowercase().contains(query);
    hit(&policy.id)
        || hit(&policy.description)
        || policy.subjects.iter().any(hit)
        || policy.resources.iter().any(hit)
        || policy.actions.iter().any(hit)
}
