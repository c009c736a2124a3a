//! HMAC-SHA256 token strategy.
//!
//! `generate` draws a random 256-bit key and signs it with the system
//! secret. Both parts are base64url without padding. A presented token is
//! valid when its signature part equals a fresh HMAC of its key part; the
//! comparison runs in constant time.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::MIN_SECRET_LENGTH;
use crate::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

const KEY_LENGTH: usize = 32;

/// Issues and verifies opaque `key.signature` tokens.
#[derive(Clone)]
pub struct HmacStrategy {
    secret: Vec<u8>,
}

impl std::fmt::Debug for HmacStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacStrategy").finish_non_exhaustive()
    }
}

impl HmacStrategy {
    /// Creates a strategy signing with `secret`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the secret is shorter than
    /// 32 bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> AuthResult<Self> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(AuthError::configuration(format!(
                "token secret must be at least {MIN_SECRET_LENGTH} bytes"
            )));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// Generates a new token and returns it with its signature.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the MAC cannot be initialised.
    pub fn generate(&self) -> AuthResult<(String, String)> {
        let mut key = [0u8; KEY_LENGTH];
        rand::Rng::fill(&mut rand::thread_rng(), &mut key);

        let signature = URL_SAFE_NO_PAD.encode(self.sign(&key)?);
        let token = format!("{}.{}", URL_SAFE_NO_PAD.encode(key), signature);
        Ok((token, signature))
    }

    /// Returns the signature part of `token`, or `""` if there is none.
    #[must_use]
    pub fn signature<'a>(&self, token: &'a str) -> &'a str {
        token.split_once('.').map_or("", |(_, signature)| signature)
    }

    /// Verifies `token` and returns its signature.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is malformed or its
    /// signature does not match.
    pub fn validate<'a>(&self, token: &'a str) -> AuthResult<&'a str> {
        let Some((key, signature)) = token.split_once('.') else {
            return Err(AuthError::invalid_token("token is malformed"));
        };
        if key.is_empty() || signature.is_empty() {
            return Err(AuthError::invalid_token("token is malformed"));
        }

        let key_bytes = URL_SAFE_NO_PAD
            .decode(key)
            .map_err(|_| AuthError::invalid_token("token key is not base64url"))?;
        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::invalid_token("token signature is not base64url"))?;

        let expected = self.sign(&key_bytes)?;
        if bool::from(expected.as_slice().ct_eq(presented.as_slice())) {
            Ok(signature)
        } else {
            Err(AuthError::invalid_token("token signature does not match"))
        }
    }

    fn sign(&self, key: &[u8]) -> AuthResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::internal(format!("failed to initialise HMAC: {e}")))?;
        mac.update(key);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_rejects_short_secret() {
        let err = HmacStrategy::new("short").unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[test]
    fn test_generate_and_validate() {
        let strategy = HmacStrategy::new(SECRET).unwrap();
        let (token, signature) = strategy.generate().unwrap();

        assert_eq!(strategy.signature(&token), signature);
        assert_eq!(strategy.validate(&token).unwrap(), signature);
        // 32 bytes of key and of MAC, base64url without padding
        assert_eq!(token.len(), 43 + 1 + 43);
    }

    #[test]
    fn test_tokens_are_unique() {
        let strategy = HmacStrategy::new(SECRET).unwrap();
        let (a, _) = strategy.generate().unwrap();
        let (b, _) = strategy.generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let strategy = HmacStrategy::new(SECRET).unwrap();
        let (token, _) = strategy.generate().unwrap();
        let (key, _) = token.split_once('.').unwrap();
        let forged = format!("{key}.{}", URL_SAFE_NO_PAD.encode([7u8; 32]));
        let err = strategy.validate(&forged).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let issuer = HmacStrategy::new(SECRET).unwrap();
        let other = HmacStrategy::new("fedcba9876543210fedcba9876543210").unwrap();
        let (token, _) = issuer.generate().unwrap();
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_malformed_tokens() {
        let strategy = HmacStrategy::new(SECRET).unwrap();
        assert!(strategy.validate("").is_err());
        assert!(strategy.validate("no-dot").is_err());
        assert!(strategy.validate(".sig").is_err());
        assert!(strategy.validate("key.").is_err());
        assert!(strategy.validate("!!!.???").is_err());
        assert_eq!(strategy.signature("no-dot"), "");
    }
}
