//! OAuth 2.0 client records.

use serde::{Deserialize, Serialize};

/// A registered OAuth 2.0 client.
///
/// Clients are owned by the client registry; the authorization core only
/// reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier, used as the token audience.
    pub id: String,

    /// Hash of the client secret. Never returned over HTTP.
    #[serde(default, skip_serializing)]
    pub secret_hash: String,

    /// Scopes this client may request.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
}

impl Client {
    /// Creates a client without a secret.
    #[must_use]
    pub fn new(id: impl Into<String>, allowed_scopes: Vec<String>) -> Self {
        Self {
            id: id.into(),
            secret_hash: String::new(),
            allowed_scopes,
        }
    }

    /// Returns `true` if the client may request `scope`.
    #[must_use]
    pub fn allows_scope(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|s| s == scope)
    }
}
