//! Ed25519 key handling for identity credentials.
//!
//! Identities may register an Ed25519 public key; requests signed with the
//! matching private key authenticate without a session token. Keys travel
//! on the wire and rest in the identity store as base64 strings.

use crate::crypto::error::{CryptoError, CryptoResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ed25519 public key length in bytes
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 secret key length in bytes
pub const SECRET_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// A wrapper around an Ed25519 public key used as an identity credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Create a PublicKey from a VerifyingKey
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self { inner: key }
    }

    /// Create a PublicKey from bytes
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LENGTH]) -> CryptoResult<Self> {
        // Reject cryptographically weak public keys
        if bytes == &[0u8; PUBLIC_KEY_LENGTH] {
            return Err(CryptoError::Deserialization {
                message: "All-zeros public key is not allowed".to_string(),
            });
        }

        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::Deserialization {
                message: "Invalid public key bytes".to_string(),
            })?;
        Ok(Self {
            inner: verifying_key,
        })
    }

    /// Parse a base64-encoded public key (the wire representation)
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Deserialization {
                message: format!("Invalid base64 public key: {}", e),
            })?;
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(CryptoError::Deserialization {
                message: format!(
                    "Invalid public key length: expected {}, got {}",
                    PUBLIC_KEY_LENGTH,
                    bytes.len()
                ),
            });
        }
        let mut byte_array = [0u8; PUBLIC_KEY_LENGTH];
        byte_array.copy_from_slice(&bytes);
        Self::from_bytes(&byte_array)
    }

    /// Convert to bytes for storage
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.inner.to_bytes()
    }

    /// The base64 wire representation
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Verify a signature against this public key
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let sig = Signature::try_from(signature).map_err(|_| CryptoError::InvalidSignature {
            message: "Invalid signature format".to_string(),
        })?;
        self.inner.verify(message, &sig)?;
        Ok(())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_base64(&encoded)
            .map_err(|e| D::Error::custom(format!("Invalid public key: {}", e)))
    }
}

/// Generate a fresh Ed25519 keypair (client and test side).
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Sign a message, returning the raw 64-byte signature.
pub fn sign_message(signing_key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    signing_key.sign(message).to_bytes()
}
