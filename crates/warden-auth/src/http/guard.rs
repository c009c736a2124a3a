//! Caller guard for the warden endpoints.
//!
//! When enabled, the caller's own bearer token must be allowed to perform
//! the endpoint's action on its resource and must carry the endpoint's
//! scope.

use axum::http::HeaderMap;

use crate::AuthResult;
use crate::context::RequestContext;
use crate::http::WardenState;
use crate::http::bearer::token_from_headers;
use crate::warden::TokenRequest;

/// Scope required to call the decision endpoints.
pub const WARDEN_SCOPE: &str = "hydra.warden";

/// Scope required to manage policies.
pub const POLICIES_SCOPE: &str = "hydra.policies";

/// Scope required to manage groups.
pub const GROUPS_SCOPE: &str = "hydra.groups";

/// Resource of `POST /warden/allowed`.
pub const ALLOWED_RESOURCE: &str = "rn:hydra:warden:allowed";

/// Resource of `POST /warden/token/allowed`.
pub const TOKEN_ALLOWED_RESOURCE: &str = "rn:hydra:warden:token:allowed";

/// Resource of the policy collection.
pub const POLICIES_RESOURCE: &str = "rn:hydra:policies";

/// Resource of the group collection.
pub const GROUPS_RESOURCE: &str = "rn:hydra:warden:groups";

/// Checks the caller's token against `resource`/`action` and `scope`.
///
/// A no-op when the guard is disabled.
///
/// # Errors
///
/// Returns the token or policy error that rejected the caller.
pub async fn authorize(
    state: &WardenState,
    headers: &HeaderMap,
    resource: &str,
    action: &str,
    scope: &str,
) -> AuthResult<()> {
    if !state.guard {
        return Ok(());
    }

    let caller = state
        .firewall
        .token_allowed(
            &RequestContext::background(),
            token_from_headers(headers),
            &TokenRequest::new(resource, action),
            &[scope.to_string()],
        )
        .await?;

    tracing::debug!(caller = %caller.subject, resource, action, "Caller authorized");
    Ok(())
}

/// Resource naming a single item of `collection`.
#[must_use]
pub fn item_resource(collection: &str, id: &str) -> String {
    format!("{collection}:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::{TestApp, policy};
    use crate::policy::Effect;
    use crate::storage::PolicyStorage;
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("bearer {token}")).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_disabled_guard_allows_anonymous() {
        let app = TestApp::new().await;
        assert!(
            authorize(&app.state, &HeaderMap::new(), POLICIES_RESOURCE, "list", POLICIES_SCOPE)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_guard_checks_token_scope_and_policy() {
        let app = TestApp::new().await.guarded();
        app.policies
            .create(&policy(
                "admin",
                &["root"],
                &["rn:hydra:policies<.*>"],
                &["<.*>"],
                Effect::Allow,
            ))
            .await
            .unwrap();

        let err = authorize(&app.state, &HeaderMap::new(), POLICIES_RESOURCE, "list", POLICIES_SCOPE)
            .await
            .unwrap_err();
        assert!(err.is_token_error());

        let root = app.issue("root", &[POLICIES_SCOPE]).await;
        authorize(&app.state, &bearer(&root), POLICIES_RESOURCE, "list", POLICIES_SCOPE)
            .await
            .unwrap();
        authorize(
            &app.state,
            &bearer(&root),
            &item_resource(POLICIES_RESOURCE, "p1"),
            "delete",
            POLICIES_SCOPE,
        )
        .await
        .unwrap();

        let unscoped = app.issue("root", &["core"]).await;
        assert!(
            authorize(&app.state, &bearer(&unscoped), POLICIES_RESOURCE, "list", POLICIES_SCOPE)
                .await
                .is_err()
        );

        let alice = app.issue("alice", &[POLICIES_SCOPE]).await;
        assert!(
            authorize(&app.state, &bearer(&alice), POLICIES_RESOURCE, "list", POLICIES_SCOPE)
                .await
                .is_err()
        );
    }
}
