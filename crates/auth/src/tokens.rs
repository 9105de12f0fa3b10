//! Opaque credentials: refresh tokens and client secrets. 256-bit random,
//! stored only as SHA-256 hex digests, compared in constant time.

use std::time::Duration;

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// 256 bits of OS randomness, hex-encoded.
pub(crate) fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn hash_opaque_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time comparison of a presented secret against a stored digest.
pub(crate) fn secret_matches(presented: &str, stored_hash_hex: &str) -> bool {
    let presented_hash = Sha256::digest(presented.as_bytes());
    match hex::decode(stored_hash_hex) {
        Ok(stored) => presented_hash.as_slice().ct_eq(&stored).into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_hex() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_matches_its_token() {
        let token = generate_opaque_token();
        let hash = hash_opaque_token(&token);
        assert!(secret_matches(&token, &hash));
        assert!(!secret_matches("something-else", &hash));
    }
}
