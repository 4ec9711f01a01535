//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Error during key deserialization
    #[error("Failed to deserialize key: {message}")]
    Deserialization { message: String },

    /// Ed25519 signature verification error
    #[error("Ed25519 signature verification failed")]
    SignatureVerification,

    /// Invalid signature format
    #[error("Invalid signature format: {message}")]
    InvalidSignature { message: String },

    /// Error during password hashing or verification
    #[error("Password hashing failed: {message}")]
    PasswordHash { message: String },
}

impl From<ed25519_dalek::SignatureError> for CryptoError {
    fn from(_err: ed25519_dalek::SignatureError) -> Self {
        CryptoError::SignatureVerification
    }
}

impl From<argon2::password_hash::Error> for CryptoError {
    fn from(err: argon2::password_hash::Error) -> Self {
        CryptoError::PasswordHash {
            message: err.to_string(),
        }
    }
}
