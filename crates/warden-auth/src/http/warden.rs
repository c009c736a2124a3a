//! Warden decision endpoint handlers.
//!
//! # Request Format
//!
//! ```text
//! POST /warden/allowed
//! {"subject": "alice", "resource": "matrix", "action": "create", "context": {}}
//!
//! POST /warden/token/allowed
//! {"token": "<token>", "scopes": ["core"], "resource": "matrix", "action": "create"}
//! ```
//!
//! # Response
//!
//! `{"allowed": true, ...}` on success and `{"allowed": false}` for every
//! kind of failure. The failure kind is logged, never returned.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::http::WardenState;
use crate::http::guard::{self, ALLOWED_RESOURCE, TOKEN_ALLOWED_RESOURCE, WARDEN_SCOPE};
use crate::policy::AccessRequest;
use crate::warden::{AuthContext, TokenRequest};

// =============================================================================
// Request Types
// =============================================================================

/// Body of `POST /warden/token/allowed`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenAllowedBody {
    /// The token to check.
    #[serde(default)]
    pub token: String,

    /// Scopes the token must have been granted.
    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(flatten)]
    pub request: TokenRequest,
}

/// Successful `POST /warden/token/allowed` response.
#[derive(Debug, Serialize)]
pub struct TokenAllowedResponse {
    pub allowed: bool,

    #[serde(flatten)]
    pub context: AuthContext,
}

fn denied() -> Response {
    Json(json!({ "allowed": false })).into_response()
}

fn log_denial(error: &AuthError) {
    if error.is_server_error() {
        tracing::error!(error = %error, kind = %error.kind(), "Warden could not decide request");
    } else {
        tracing::debug!(kind = %error.kind(), "Warden denied request");
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /warden/allowed`
pub async fn allowed_handler(
    State(state): State<WardenState>,
    headers: HeaderMap,
    body: Result<Json<AccessRequest>, JsonRejection>,
) -> Response {
    if let Err(e) = guard::authorize(&state, &headers, ALLOWED_RESOURCE, "decide", WARDEN_SCOPE).await {
        return e.into_response();
    }
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return AuthError::invalid_argument(rejection.body_text()).into_response(),
    };

    match state
        .firewall
        .is_allowed(&RequestContext::background(), &request)
        .await
    {
        Ok(()) => Json(json!({ "allowed": true })).into_response(),
        Err(e) => {
            log_denial(&e);
            denied()
        }
    }
}

/// `POST /warden/token/allowed`
pub async fn token_allowed_handler(
    State(state): State<WardenState>,
    headers: HeaderMap,
    body: Result<Json<TokenAllowedBody>, JsonRejection>,
) -> Response {
    if let Err(e) =
        guard::authorize(&state, &headers, TOKEN_ALLOWED_RESOURCE, "decide", WARDEN_SCOPE).await
    {
        return e.into_response();
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return AuthError::invalid_argument(rejection.body_text()).into_response(),
    };

    match state
        .firewall
        .token_allowed(
            &RequestContext::background(),
            &body.token,
            &body.request,
            &body.scopes,
        )
        .await
    {
        Ok(context) => Json(TokenAllowedResponse {
            allowed: true,
            context,
        })
        .into_response(),
        Err(e) => {
            log_denial(&e);
            denied()
        }
    }
}
