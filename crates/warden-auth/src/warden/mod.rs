//! The warden: token validation, group expansion and policy decisions.
//!
//! - [`Firewall`] - the two public decision operations
//! - [`LocalWarden`] - the implementation over local stores

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::context::RequestContext;
use crate::policy::AccessRequest;

pub use local::LocalWarden;

/// A resource/action question asked on behalf of a token's subject.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub resource: String,

    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub context: Map<String, Value>,
}

impl TokenRequest {
    /// Creates a request with an empty context.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            context: Map::new(),
        }
    }

    /// Turns this into an access request for `subject`.
    #[must_use]
    pub fn into_access_request(self, subject: impl Into<String>) -> AccessRequest {
        AccessRequest {
            subject: subject.into(),
            resource: self.resource,
            action: self.action,
            context: self.context,
        }
    }
}

/// Claims about an authorized bearer token.
///
/// Timestamps serialize as Unix seconds. Only access token extension claims
/// are carried; ID token claims never are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub subject: String,

    /// Client the token was issued to.
    pub audience: String,

    pub issuer: String,

    /// When the grant was requested.
    #[serde(with = "time::serde::timestamp")]
    pub issued_at: OffsetDateTime,

    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,

    pub granted_scopes: Vec<String>,

    pub access_token_extra: Map<String, Value>,
}

/// Authorization decisions.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Decides whether `request.subject`, directly or through one of its
    /// groups, may perform `request.action` on `request.resource`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` on denial, `AuthError::Cancelled` if
    /// `ctx` finishes first, or the store error that prevented a decision.
    async fn is_allowed(&self, ctx: &RequestContext, request: &AccessRequest) -> AuthResult<()>;

    /// Validates `token`, checks `scopes` against its grant and decides
    /// `request` on behalf of the token's subject.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken`, `AuthError::TokenExpired`,
    /// `AuthError::MissingScope` or `AuthError::Forbidden` for the
    /// corresponding check, `AuthError::Cancelled` if `ctx` finishes first,
    /// or the store error that prevented a decision.
    async fn token_allowed(
        &self,
        ctx: &RequestContext,
        token: &str,
        request: &TokenRequest,
        scopes: &[String],
    ) -> AuthResult<AuthContext>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_auth_context_wire_format() {
        let mut extra = Map::new();
        extra.insert("foo".to_string(), Value::String("bar".to_string()));
        let ctx = AuthContext {
            subject: "alice".to_string(),
            audience: "siri".to_string(),
            issuer: "tests".to_string(),
            issued_at: datetime!(2024-01-01 00:00:00 UTC),
            expires_at: datetime!(2024-01-01 01:00:00.75 UTC),
            granted_scopes: vec!["core".to_string()],
            access_token_extra: extra,
        };

        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["subject"], "alice");
        assert_eq!(json["audience"], "siri");
        assert_eq!(json["issuedAt"], 1_704_067_200);
        assert_eq!(json["expiresAt"], 1_704_070_800);
        assert_eq!(json["grantedScopes"][0], "core");
        assert_eq!(json["accessTokenExtra"]["foo"], "bar");
    }

    #[test]
    fn test_token_request_into_access_request() {
        let req = TokenRequest::new("matrix", "create").into_access_request("alice");
        assert_eq!(req, AccessRequest::new("alice", "matrix", "create"));
    }
}
