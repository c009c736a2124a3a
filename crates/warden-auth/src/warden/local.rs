//! Warden backed by local session, policy and group stores.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::clock::{Clock, SystemClock};
use crate::context::RequestContext;
use crate::policy::{AccessDecision, AccessRequest, PolicyEngine};
use crate::storage::{GrantStorage, GroupStorage, PolicyStorage};
use crate::token::HmacStrategy;
use crate::types::SessionKind;
use crate::warden::{AuthContext, Firewall, TokenRequest};
use crate::{AuthError, AuthResult};

/// Decides requests against the stores it was built with.
///
/// The subject and each of its groups are evaluated as separate principals.
/// A deny from any principal forbids the request; otherwise one allow from
/// any principal is enough.
pub struct LocalWarden {
    grants: Arc<dyn GrantStorage>,
    policies: Arc<dyn PolicyStorage>,
    groups: Arc<dyn GroupStorage>,
    engine: PolicyEngine,
    tokens: HmacStrategy,
    clock: Arc<dyn Clock>,
    issuer: String,
}

impl std::fmt::Debug for LocalWarden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWarden")
            .field("engine", &self.engine)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl LocalWarden {
    /// Creates a warden using the system clock and the built-in conditions.
    #[must_use]
    pub fn new(
        grants: Arc<dyn GrantStorage>,
        policies: Arc<dyn PolicyStorage>,
        groups: Arc<dyn GroupStorage>,
        tokens: HmacStrategy,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            grants,
            policies,
            groups,
            engine: PolicyEngine::new(),
            tokens,
            clock: Arc::new(SystemClock),
            issuer: issuer.into(),
        }
    }

    /// Replaces the clock used for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the policy engine.
    #[must_use]
    pub fn with_engine(mut self, engine: PolicyEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Issuer reported in every [`AuthContext`].
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    async fn decide_for(
        &self,
        ctx: &RequestContext,
        principal: &str,
        request: &AccessRequest,
    ) -> AuthResult<AccessDecision> {
        let policies = ctx.run(self.policies.find_by_subject(principal)).await?;
        self.engine.evaluate(&policies, &request.for_subject(principal))
    }
}

#[async_trait]
impl Firewall for LocalWarden {
    #[instrument(skip_all, fields(subject = %request.subject, resource = %request.resource, action = %request.action))]
    async fn is_allowed(&self, ctx: &RequestContext, request: &AccessRequest) -> AuthResult<()> {
        let groups = ctx.run(self.groups.find_group_names(&request.subject)).await?;

        let mut allowed_by = None;
        for principal in std::iter::once(request.subject.as_str()).chain(groups.iter().map(String::as_str)) {
            let decision = self.decide_for(ctx, principal, request).await?;
            if decision.is_forcefully_denied() {
                debug!(principal, reason = ?decision.deny_reason(), "Request denied");
                return Err(AuthError::forbidden(format!(
                    "request denied for principal '{principal}'"
                )));
            }
            if let AccessDecision::Allow { policy_id } = decision
                && allowed_by.is_none()
            {
                allowed_by = Some(policy_id);
            }
        }

        match allowed_by {
            Some(policy_id) => {
                debug!(%policy_id, "Request allowed");
                Ok(())
            }
            None => {
                debug!("No policy allows the request");
                Err(AuthError::forbidden("no policy allows the request"))
            }
        }
    }

    #[instrument(skip_all, fields(resource = %request.resource, action = %request.action))]
    async fn token_allowed(
        &self,
        ctx: &RequestContext,
        token: &str,
        request: &TokenRequest,
        scopes: &[String],
    ) -> AuthResult<AuthContext> {
        let signature = self.tokens.validate(token)?;

        let grant = match ctx.run(self.grants.get(SessionKind::Access, signature)).await {
            Ok(grant) => grant,
            Err(AuthError::NotFound { .. }) => {
                return Err(AuthError::invalid_token("token is not active"));
            }
            Err(e) => return Err(e),
        };

        let expires_at = grant
            .session
            .expires_at(SessionKind::Access)
            .ok_or(AuthError::TokenExpired)?;
        if self.clock.now() >= expires_at {
            return Err(AuthError::TokenExpired);
        }

        if let Some(scope) = grant.first_missing_scope(scopes) {
            return Err(AuthError::missing_scope(scope));
        }

        let access = request.clone().into_access_request(grant.session.subject.clone());
        self.is_allowed(ctx, &access).await?;

        Ok(AuthContext {
            subject: grant.session.subject,
            audience: grant.client.id,
            issuer: self.issuer.clone(),
            issued_at: grant.requested_at,
            expires_at,
            granted_scopes: grant.granted_scopes,
            access_token_extra: grant.session.access_token_extra,
        })
    }
}
