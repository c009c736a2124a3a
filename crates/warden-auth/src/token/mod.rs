//! Opaque token strategy.
//!
//! Tokens are `<key>.<signature>`; only the signature is ever stored.

pub mod hmac;

pub use self::hmac::HmacStrategy;
