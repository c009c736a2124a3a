//! Grant requests and their persisted row shape.

use time::OffsetDateTime;

use crate::types::{Client, Session, SessionCodec};
use crate::{AuthError, AuthResult};

/// Separator between scopes in the `scope` and `granted_scope` columns.
pub const SCOPE_SEPARATOR: char = '|';

/// A hydrated grant session.
///
/// The same request value is stored under every kind it moves through; the
/// `id` ties a code, its access token and its refresh tokens together.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRequest {
    /// Logical grant identifier (`request_id`).
    pub id: String,
    /// When the grant was requested. Input to access token sweeping.
    pub requested_at: OffsetDateTime,
    /// Client the grant was issued to.
    pub client: Client,
    /// Scopes the client asked for.
    pub requested_scopes: Vec<String>,
    /// Scopes actually granted.
    pub granted_scopes: Vec<String>,
    /// Parameters of the original authorization request.
    pub form: Vec<(String, String)>,
    /// Session blob.
    pub session: Session,
}

impl GrantRequest {
    /// Creates a request with no scopes and an empty form.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        requested_at: OffsetDateTime,
        client: Client,
        session: Session,
    ) -> Self {
        Self {
            id: id.into(),
            requested_at,
            client,
            requested_scopes: Vec::new(),
            granted_scopes: Vec::new(),
            form: Vec::new(),
            session,
        }
    }

    /// Sets requested and granted scopes.
    #[must_use]
    pub fn with_scopes(mut self, requested: &[&str], granted: &[&str]) -> Self {
        self.requested_scopes = requested.iter().map(|s| (*s).to_string()).collect();
        self.granted_scopes = granted.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Returns `true` if every scope in `required` was granted.
    #[must_use]
    pub fn has_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.first_missing_scope(required).is_none()
    }

    /// Returns the first scope in `required` that was not granted.
    #[must_use]
    pub fn first_missing_scope<'a, S: AsRef<str>>(&self, required: &'a [S]) -> Option<&'a str> {
        required
            .iter()
            .map(AsRef::as_ref)
            .find(|r| !self.granted_scopes.iter().any(|g| g == r))
    }
}

/// A grant session as it sits in a `hydra_oauth2_<kind>` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRow {
    pub signature: String,
    pub request_id: String,
    pub requested_at: OffsetDateTime,
    pub client_id: String,
    pub scope: String,
    pub granted_scope: String,
    pub form_data: String,
    pub session_data: Vec<u8>,
}

impl GrantRow {
    /// Flattens `request` into a row stored under `signature`.
    ///
    /// `requested_at` is truncated to whole microseconds, the finest
    /// precision every backend keeps.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Decode` if the session or form cannot be encoded.
    pub fn encode(
        signature: &str,
        request: &GrantRequest,
        codec: &dyn SessionCodec,
    ) -> AuthResult<Self> {
        let form_data = serde_urlencoded::to_string(&request.form)
            .map_err(|e| AuthError::decode(format!("failed to encode form data: {e}")))?;

        Ok(Self {
            signature: signature.to_string(),
            request_id: request.id.clone(),
            requested_at: truncate_to_micros(request.requested_at),
            client_id: request.client.id.clone(),
            scope: join_scopes(&request.requested_scopes),
            granted_scope: join_scopes(&request.granted_scopes),
            form_data,
            session_data: codec.encode(&request.session)?,
        })
    }

    /// Rebuilds the request from this row and its resolved client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Decode` if the form data is malformed.
    pub fn into_request(self, client: Client, session: Session) -> AuthResult<GrantRequest> {
        let form: Vec<(String, String)> = serde_urlencoded::from_str(&self.form_data)
            .map_err(|e| AuthError::decode(format!("malformed form data: {e}")))?;

        Ok(GrantRequest {
            id: self.request_id,
            requested_at: self.requested_at,
            client,
            requested_scopes: split_scopes(&self.scope),
            granted_scopes: split_scopes(&self.granted_scope),
            form,
            session,
        })
    }
}

/// Drops the sub-microsecond part of `at`.
#[must_use]
pub fn truncate_to_micros(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_nanosecond(at.nanosecond() / 1_000 * 1_000)
        .unwrap_or(at)
}

/// Joins scopes with `|`.
#[must_use]
pub fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&SCOPE_SEPARATOR.to_string())
}

/// Splits a `|`-joined scope string. The empty string yields no scopes.
#[must_use]
pub fn split_scopes(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(SCOPE_SEPARATOR).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsonSessionCodec, SessionKind};
    use time::macros::datetime;

    fn request() -> GrantRequest {
        let mut r = GrantRequest::new(
            "req-1",
            datetime!(2024-01-01 12:00:00 UTC),
            Client::new("siri", vec!["core".to_string()]),
            Session::new("alice").with_expiry(SessionKind::Access, datetime!(2024-01-01 13:00:00 UTC)),
        )
        .with_scopes(&["core", "offline"], &["core"]);
        r.form = vec![
            ("redirect_uri".to_string(), "https://app.example.com/cb?x=1&y=2".to_string()),
            ("state".to_string(), "a b|c".to_string()),
        ];
        r
    }

    #[test]
    fn test_split_empty_is_empty_set() {
        assert!(split_scopes("").is_empty());
        assert_eq!(split_scopes("core"), vec!["core"]);
        assert_eq!(split_scopes("core|offline"), vec!["core", "offline"]);
    }

    #[test]
    fn test_join_then_split() {
        let scopes = vec!["a".to_string(), "b.c".to_string(), "d".to_string()];
        assert_eq!(join_scopes(&scopes), "a|b.c|d");
        assert_eq!(split_scopes(&join_scopes(&scopes)), scopes);
        assert_eq!(join_scopes::<String>(&[]), "");
    }

    #[test]
    fn test_row_encode_and_rebuild() {
        let req = request();
        let row = GrantRow::encode("sig-1", &req, &JsonSessionCodec).unwrap();
        assert_eq!(row.scope, "core|offline");
        assert_eq!(row.granted_scope, "core");
        assert_eq!(row.client_id, "siri");
        assert!(row.form_data.contains("state=a+b%7Cc"));

        let session = JsonSessionCodec.decode(&row.session_data).unwrap();
        let rebuilt = row.into_request(req.client.clone(), session).unwrap();
        assert_eq!(rebuilt, req);
    }

    #[test]
    fn test_encode_truncates_requested_at_to_micros() {
        let mut req = request();
        req.requested_at = datetime!(2024-01-01 12:00:00.123456789 UTC);
        let row = GrantRow::encode("sig-1", &req, &JsonSessionCodec).unwrap();
        assert_eq!(row.requested_at, datetime!(2024-01-01 12:00:00.123456 UTC));

        let session = JsonSessionCodec.decode(&row.session_data).unwrap();
        let rebuilt = row.into_request(req.client.clone(), session).unwrap();
        assert_eq!(rebuilt.requested_at.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_truncate_to_micros_keeps_whole_micros() {
        let at = datetime!(2024-01-01 12:00:00.000001 UTC);
        assert_eq!(truncate_to_micros(at), at);
        assert_eq!(
            truncate_to_micros(datetime!(2024-01-01 12:00:00.000000999 UTC)),
            datetime!(2024-01-01 12:00:00 UTC)
        );
    }

    #[test]
    fn test_empty_form_round_trips() {
        let mut req = request();
        req.form.clear();
        req.requested_scopes.clear();
        let row = GrantRow::encode("sig-1", &req, &JsonSessionCodec).unwrap();
        assert_eq!(row.form_data, "");
        assert_eq!(row.scope, "");

        let session = JsonSessionCodec.decode(&row.session_data).unwrap();
        let rebuilt = row.into_request(req.client.clone(), session).unwrap();
        assert!(rebuilt.form.is_empty());
        assert!(rebuilt.requested_scopes.is_empty());
    }

    #[test]
    fn test_scope_check() {
        let req = request();
        assert!(req.has_scopes(&["core"]));
        assert!(req.has_scopes::<&str>(&[]));
        assert_eq!(req.first_missing_scope(&["core", "foo"]), Some("foo"));
        assert!(!req.has_scopes(&["cor"]));
    }
}
