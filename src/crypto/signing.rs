//! Request signing digests for the signature-credential path.
//!
//! A signed request proves possession of an identity's Ed25519 key without
//! a session: the signature covers `SHA-256(caller id ∥ decimal nonce ∥
//! method-specific extra bytes)`. Both client and server derive the digest
//! from the decoded payload, so any tampering with the covered fields
//! invalidates the signature. Nonces must be strictly increasing per
//! identity; the verifier rejects replays.

use sha2::{Digest, Sha256};

/// The base signing bytes: caller id followed by the decimal nonce.
fn signing_bytes(caller_id: &str, nonce: i64) -> Vec<u8> {
    format!("{}{}", caller_id, nonce).into_bytes()
}

/// The digest a request signature must cover.
pub fn request_digest(caller_id: &str, nonce: i64, extra: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(signing_bytes(caller_id, nonce));
    hasher.update(extra);
    hasher.finalize().into()
}

/// Extra bytes for a batched put: a digest over every pair, so large
/// batches sign a fixed-size summary.
pub fn multi_put_extra(pairs: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for (key, value) in pairs {
        hasher.update(key.as_bytes());
        hasher.update(value);
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_every_input() {
        let base = request_digest("uid", 7, b"x");
        assert_ne!(base, request_digest("uid2", 7, b"x"));
        assert_ne!(base, request_digest("uid", 8, b"x"));
        assert_ne!(base, request_digest("uid", 7, b"y"));
    }

    #[test]
    fn multi_put_extra_is_order_sensitive() {
        let a = multi_put_extra(&[("k1".into(), vec![1]), ("k2".into(), vec![2])]);
        let b = multi_put_extra(&[("k2".into(), vec![2]), ("k1".into(), vec![1])]);
        assert_ne!(a, b);
    }
}
