//! Cryptographic primitives: Ed25519 signature credentials, Argon2id
//! password hashing, and the request-signing digest scheme.

pub mod ed25519;
pub mod error;
pub mod password;
pub mod signing;

pub use ed25519::{generate_signing_key, sign_message, PublicKey, SIGNATURE_LENGTH};
pub use error::{CryptoError, CryptoResult};
pub use password::{burn_verification, hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use signing::{multi_put_extra, request_digest};
