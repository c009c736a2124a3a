//! Grant session kinds and the session blob.
//!
//! The store persists the session as opaque bytes produced by a
//! [`SessionCodec`]; it never looks inside.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{AuthError, AuthResult};

/// Partition of the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Authorization codes.
    Code,
    /// Access tokens.
    Access,
    /// Refresh tokens.
    Refresh,
    /// OpenID Connect sessions.
    Oidc,
}

impl SessionKind {
    /// Every kind, in table creation order.
    pub const ALL: [SessionKind; 4] = [Self::Access, Self::Refresh, Self::Code, Self::Oidc];

    /// Short name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Oidc => "oidc",
        }
    }

    /// Name of the SQL table holding this kind.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Code => "hydra_oauth2_code",
            Self::Access => "hydra_oauth2_access",
            Self::Refresh => "hydra_oauth2_refresh",
            Self::Oidc => "hydra_oauth2_oidc",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session attached to a grant.
///
/// Carries the subject, per-kind expiry instants and the custom claims set
/// at consent time. `access_token_extra` is surfaced by the warden;
/// `id_token_extra` never is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Session {
    /// Subject the grant was issued for.
    #[serde(default)]
    pub subject: String,

    /// Optional human-readable name of the subject.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    /// Expiry per session kind.
    #[serde(default, with = "expiry_map")]
    pub expires_at: BTreeMap<SessionKind, OffsetDateTime>,

    /// Claims exposed alongside the access token.
    #[serde(default, rename = "at_ext")]
    pub access_token_extra: Map<String, Value>,

    /// Claims reserved for the ID token.
    #[serde(default, rename = "id_ext")]
    pub id_token_extra: Map<String, Value>,
}

impl Session {
    /// Creates a session for `subject` with no expiry set.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Sets the expiry of `kind`.
    #[must_use]
    pub fn with_expiry(mut self, kind: SessionKind, at: OffsetDateTime) -> Self {
        self.expires_at.insert(kind, at);
        self
    }

    /// Returns the expiry of `kind`, if one was recorded.
    #[must_use]
    pub fn expires_at(&self, kind: SessionKind) -> Option<OffsetDateTime> {
        self.expires_at.get(&kind).copied()
    }
}

/// Serializes sessions to and from the bytes stored in `session_data`.
pub trait SessionCodec: Send + Sync {
    /// Encodes a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Decode` if the session cannot be serialized.
    fn encode(&self, session: &Session) -> AuthResult<Vec<u8>>;

    /// Decodes a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Decode` if the bytes are not a valid session.
    fn decode(&self, bytes: &[u8]) -> AuthResult<Session>;
}

/// JSON session codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSessionCodec;

impl SessionCodec for JsonSessionCodec {
    fn encode(&self, session: &Session) -> AuthResult<Vec<u8>> {
        serde_json::to_vec(session)
            .map_err(|e| AuthError::decode(format!("failed to encode session: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> AuthResult<Session> {
        serde_json::from_slice(bytes)
            .map_err(|e| AuthError::decode(format!("failed to decode session: {e}")))
    }
}

/// RFC 3339 encoding for the expiry map, keeping nanosecond precision.
mod expiry_map {
    use std::collections::BTreeMap;

    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    use super::SessionKind;

    pub fn serialize<S>(
        map: &BTreeMap<SessionKind, OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (kind, at) in map {
            let formatted = at.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
            out.serialize_entry(kind, &formatted)?;
        }
        out.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<SessionKind, OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<SessionKind, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(kind, s)| {
                OffsetDateTime::parse(&s, &Rfc3339)
                    .map(|at| (kind, at))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_table_names() {
        assert_eq!(SessionKind::Code.table_name(), "hydra_oauth2_code");
        assert_eq!(SessionKind::Oidc.table_name(), "hydra_oauth2_oidc");
        assert_eq!(SessionKind::Access.to_string(), "access");
    }

    #[test]
    fn test_json_codec_preserves_session() {
        let mut session = Session::new("alice")
            .with_expiry(SessionKind::Access, datetime!(2024-05-01 10:00:00.123456789 UTC));
        session.username = "Alice".to_string();
        session
            .access_token_extra
            .insert("foo".to_string(), Value::String("bar".to_string()));
        session
            .id_token_extra
            .insert("email".to_string(), Value::String("a@example.com".to_string()));

        let codec = JsonSessionCodec;
        let bytes = codec.encode(&session).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, session);
    }

    #[test]
    fn test_json_codec_wire_names() {
        let session = Session::new("alice")
            .with_expiry(SessionKind::Access, datetime!(2024-05-01 10:00:00 UTC));
        let json: Value = serde_json::from_slice(&JsonSessionCodec.encode(&session).unwrap()).unwrap();
        assert_eq!(json["subject"], "alice");
        assert_eq!(json["expires_at"]["access"], "2024-05-01T10:00:00Z");
        assert!(json.get("at_ext").is_some());
        assert!(json.get("username").is_none());
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = JsonSessionCodec.decode(b"{not json").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DecodeError);
    }

    #[test]
    fn test_decode_bad_timestamp_is_decode_error() {
        let err = JsonSessionCodec
            .decode(br#"{"subject":"a","expires_at":{"access":"yesterday"}}"#)
            .unwrap_err();
        assert!(matches!(err, AuthError::Decode { .. }));
    }
}
