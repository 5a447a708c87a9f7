//! Connection auth handshake (§4.6, §6): the first envelope a client
//! sends MUST be `auth`; the token is compared byte-exact against the
//! configured token. Replaces the teacher's axum `Authorization: Bearer`
//! middleware with an envelope-level check, since the wire protocol here
//! is NDJSON over a raw socket rather than HTTP.

/// Byte-exact comparison — no trimming, no case folding. A client that
/// sends a token differing only in trailing whitespace is rejected, same
/// as the teacher's `Authorization` header comparison.
pub fn token_matches(expected: &str, provided: &str) -> bool {
    expected.as_bytes() == provided.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_tokens_match() {
        assert!(token_matches("secret", "secret"));
    }

    #[test]
    fn differing_tokens_do_not_match() {
        assert!(!token_matches("secret", "secret "));
        assert!(!token_matches("secret", "Secret"));
        assert!(!token_matches("secret", ""));
    }
}
