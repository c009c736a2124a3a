//! Authorization error types.
//!
//! Every fallible operation in the session store, the policy and group
//! managers and the warden reports one of these variants. The variant is the
//! observable failure kind; the message is for logs only and is never sent
//! back from the warden endpoints.

use std::fmt;

/// Errors that can occur while storing grants or deciding access requests.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The row or entity does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// A unique constraint was violated on insert.
    #[error("Duplicate: {message}")]
    Duplicate {
        /// What collided.
        message: String,
    },

    /// A stored session blob or form bag could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the malformed data.
        message: String,
    },

    /// The bearer token is unknown, malformed, or carries a bad signature.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The access token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token was not granted a scope the caller requires.
    #[error("Missing scope: {scope}")]
    MissingScope {
        /// The first required scope that was not granted.
        scope: String,
    },

    /// The policy engine denied the request.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of the denial.
        message: String,
    },

    /// The backing store could not be reached.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the connectivity failure.
        message: String,
    },

    /// The request context was cancelled or its deadline passed.
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Why the call was cut short.
        message: String,
    },

    /// The request is malformed.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the malformed input.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Duplicate` error.
    #[must_use]
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate {
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `MissingScope` error.
    #[must_use]
    pub fn missing_scope(scope: impl Into<String>) -> Self {
        Self::MissingScope {
            scope: scope.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Cancelled` error.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller caused this error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Duplicate { .. }
                | Self::InvalidToken { .. }
                | Self::TokenExpired
                | Self::MissingScope { .. }
                | Self::Forbidden { .. }
                | Self::InvalidArgument { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::StoreUnavailable { .. }
                | Self::Cancelled { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is a token validation failure.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::TokenExpired | Self::MissingScope { .. }
        )
    }

    /// Returns the observable failure kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Duplicate { .. } => ErrorKind::Duplicate,
            Self::Decode { .. } => ErrorKind::DecodeError,
            Self::InvalidToken { .. } => ErrorKind::InvalidToken,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::MissingScope { .. } => ErrorKind::MissingScope,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Failure kinds surfaced by the authorization core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Duplicate,
    DecodeError,
    InvalidToken,
    TokenExpired,
    MissingScope,
    Forbidden,
    StoreUnavailable,
    Cancelled,
    InvalidArgument,
    Configuration,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::DecodeError => "decode_error",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::MissingScope => "missing_scope",
            Self::Forbidden => "forbidden",
            Self::StoreUnavailable => "store_unavailable",
            Self::Cancelled => "cancelled",
            Self::InvalidArgument => "invalid_argument",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::not_found("access session");
        assert_eq!(err.to_string(), "Not found: access session");

        let err = AuthError::TokenExpired;
        assert_eq!(err.to_string(), "Token expired");

        let err = AuthError::missing_scope("foo");
        assert_eq!(err.to_string(), "Missing scope: foo");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::duplicate("signature");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(!err.is_token_error());

        let err = AuthError::TokenExpired;
        assert!(err.is_client_error());
        assert!(err.is_token_error());

        let err = AuthError::store_unavailable("pool timed out");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());

        let err = AuthError::decode("bad blob");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(AuthError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(AuthError::decode("x").kind(), ErrorKind::DecodeError);
        assert_eq!(AuthError::TokenExpired.kind(), ErrorKind::TokenExpired);
        assert_eq!(AuthError::cancelled("x").kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::DecodeError.to_string(), "decode_error");
        assert_eq!(ErrorKind::StoreUnavailable.to_string(), "store_unavailable");
        assert_eq!(ErrorKind::InvalidArgument.to_string(), "invalid_argument");
        assert_eq!(ErrorKind::MissingScope.to_string(), "missing_scope");
    }
}
