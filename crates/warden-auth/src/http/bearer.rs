//! Bearer token extraction.

use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Returns the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively. A missing or malformed header
/// yields the empty string, which never validates.
#[must_use]
pub fn token_from_headers(headers: &HeaderMap) -> &str {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map_or("", |(_, token)| token)
}
