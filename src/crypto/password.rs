//! Argon2id password hashing for identity credentials.
//!
//! Hashes are stored as PHC strings; verification is constant-time in the
//! candidate password by construction.

use crate::crypto::error::{CryptoError, CryptoResult};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Hash a password into a PHC-format Argon2id string.
pub fn hash_password(password: &str) -> CryptoResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a candidate password against a stored PHC string.
pub fn verify_password(stored: &str, candidate: &str) -> CryptoResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| CryptoError::PasswordHash {
        message: format!("Stored hash is malformed: {}", e),
    })?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Burn one verification against a fixed hash so unknown-handle logins take
/// as long as wrong-password logins.
pub fn burn_verification(candidate: &str) {
    static DUMMY_HASH: once_cell::sync::Lazy<String> =
        once_cell::sync::Lazy::new(|| hash_password("stratadb-timing-pad").unwrap_or_default());
    let _ = verify_password(&DUMMY_HASH, candidate);
}
