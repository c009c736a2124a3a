//! Client registry trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Resolves client ids to client records.
///
/// The registry is owned outside the authorization core; the session store
/// only reads from it when hydrating a grant.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Looks up a client by id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if no client has this id, or a storage
    /// error if the lookup fails.
    async fn get_client(&self, id: &str) -> AuthResult<Client>;
}
