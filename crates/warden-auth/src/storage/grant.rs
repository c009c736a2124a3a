//! Grant session storage trait.
//!
//! Sessions are partitioned by [`SessionKind`] and keyed by signature within
//! a kind. Rows are never updated: revocation deletes them, and grant
//! transitions delete the old kind and insert the new one under the same
//! request id.

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::storage::ClientRegistry;
use crate::types::{GrantRequest, GrantRow, SessionCodec, SessionKind};

/// Storage trait for grant sessions.
///
/// # Implementations
///
/// - [`MemoryGrantStorage`](crate::storage::MemoryGrantStorage)
/// - `warden-auth-postgres` - one table per kind, transitions in a
///   transaction
#[async_trait]
pub trait GrantStorage: Send + Sync {
    /// Stores `request` under `(kind, signature)`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Duplicate` if the signature already exists for
    /// this kind.
    async fn create(
        &self,
        kind: SessionKind,
        signature: &str,
        request: &GrantRequest,
    ) -> AuthResult<()>;

    /// Fetches and hydrates the session stored under `(kind, signature)`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such row or its client is
    /// unknown, and `AuthError::Decode` if the stored session or form data is
    /// malformed.
    async fn get(&self, kind: SessionKind, signature: &str) -> AuthResult<GrantRequest>;

    /// Deletes the session stored under `(kind, signature)`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if there is no such row.
    async fn delete(&self, kind: SessionKind, signature: &str) -> AuthResult<()>;

    /// Deletes every session of `kind` belonging to `request_id`.
    ///
    /// Missing rows are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the storage operation fails.
    async fn revoke_by_request_id(&self, kind: SessionKind, request_id: &str) -> AuthResult<()>;

    /// Exchanges an authorization code for an access and optional refresh
    /// token.
    ///
    /// Deletes the code, then creates the access session, then the refresh
    /// session if `refresh_signature` is given. Each step runs only if the
    /// previous one succeeded, and the whole transition is atomic.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the code is gone and
    /// `AuthError::Duplicate` if a new signature collides.
    async fn persist_authorize_code_grant(
        &self,
        code_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
        request: &GrantRequest,
    ) -> AuthResult<()>;

    /// Rotates a refresh token.
    ///
    /// Deletes the old refresh session, then creates the access session,
    /// then the new refresh session, atomically. Of two concurrent rotations
    /// of the same refresh token at most one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the old refresh session is gone and
    /// `AuthError::Duplicate` if a new signature collides.
    async fn persist_refresh_token_grant(
        &self,
        old_refresh_signature: &str,
        access_signature: &str,
        new_refresh_signature: &str,
        request: &GrantRequest,
    ) -> AuthResult<()>;

    /// Deletes access sessions requested more than `lifespan` ago.
    ///
    /// `lifespan` is rounded up to whole minutes. A zero or negative lifespan
    /// deletes nothing.
    ///
    /// # Returns
    ///
    /// The number of sessions removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_old_access_tokens(&self, lifespan: Duration) -> AuthResult<u64>;

    /// Stores an access session issued by the implicit flow.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    async fn implicit_access_token(&self, signature: &str, request: &GrantRequest) -> AuthResult<()> {
        self.create(SessionKind::Access, signature, request).await
    }

    /// Revokes every access session of a grant.
    ///
    /// # Errors
    ///
    /// Returns an error only if the storage operation fails.
    async fn revoke_access_token(&self, request_id: &str) -> AuthResult<()> {
        self.revoke_by_request_id(SessionKind::Access, request_id).await
    }

    /// Revokes every refresh session of a grant.
    ///
    /// # Errors
    ///
    /// Returns an error only if the storage operation fails.
    async fn revoke_refresh_token(&self, request_id: &str) -> AuthResult<()> {
        self.revoke_by_request_id(SessionKind::Refresh, request_id).await
    }

    /// Checks that the backing store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if it is not.
    async fn ping(&self) -> AuthResult<()> {
        Ok(())
    }
}

/// Decodes a stored row into a hydrated request.
///
/// The session blob is decoded first, so a corrupt row reports
/// `decode_error` even if its client has since been removed.
///
/// # Errors
///
/// Returns `AuthError::Decode` for malformed rows and `AuthError::NotFound`
/// if the client is unknown.
pub async fn hydrate(
    row: GrantRow,
    codec: &dyn SessionCodec,
    clients: &dyn ClientRegistry,
) -> AuthResult<GrantRequest> {
    let session = codec.decode(&row.session_data)?;
    let client = clients.get_client(&row.client_id).await?;
    row.into_request(client, session)
}

/// Returns the instant before which access sessions are swept, or `None` if
/// nothing should be swept.
///
/// The lifespan is rounded up to the next whole minute. A lifespan reaching
/// past the earliest representable instant sweeps nothing.
#[must_use]
pub fn sweep_cutoff(now: OffsetDateTime, lifespan: Duration) -> Option<OffsetDateTime> {
    if lifespan <= Duration::ZERO {
        return None;
    }
    let whole = lifespan.whole_minutes();
    let partial = lifespan.checked_sub(Duration::minutes(whole))? > Duration::ZERO;
    let minutes = whole.checked_add(i64::from(partial))?;
    let seconds = minutes.checked_mul(60)?;
    now.checked_sub(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sweep_cutoff_rounds_up() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        assert_eq!(
            sweep_cutoff(now, Duration::minutes(60)),
            Some(datetime!(2024-01-01 11:00:00 UTC))
        );
        assert_eq!(
            sweep_cutoff(now, Duration::seconds(61)),
            Some(datetime!(2024-01-01 11:58:00 UTC))
        );
        assert_eq!(
            sweep_cutoff(now, Duration::nanoseconds(1)),
            Some(datetime!(2024-01-01 11:59:00 UTC))
        );
    }

    #[test]
    fn test_sweep_cutoff_non_positive() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        assert_eq!(sweep_cutoff(now, Duration::ZERO), None);
        assert_eq!(sweep_cutoff(now, Duration::seconds(-5)), None);
    }

    #[test]
    fn test_sweep_cutoff_out_of_range_sweeps_nothing() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        assert_eq!(sweep_cutoff(now, Duration::days(365 * 20_000)), None);
        assert_eq!(sweep_cutoff(now, Duration::MAX), None);
        assert_eq!(
            sweep_cutoff(now, Duration::days(365)),
            Some(datetime!(2023-01-01 12:00:00 UTC))
        );
    }
}
