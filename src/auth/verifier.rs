//! Resolving who is calling: session token or signature proof.
//!
//! Token callers present the token in envelope metadata; signature callers
//! embed a [`ProofOfCredential`] in the payload, signing the request digest
//! with their registered Ed25519 key. Nonces must be strictly increasing
//! per identity; the last-seen nonce is tracked in memory, so after a
//! restart the first nonce seen is accepted (clients derive nonces from
//! wall-clock nanos, keeping cross-restart replays impractical).

use crate::auth::session::SessionStore;
use crate::constants::SESSION_TOKEN_KEY;
use crate::crypto::signing::request_digest;
use crate::error::{StrataDbError, StrataDbResult};
use crate::identity::{IdentityRecord, IdentityStore};
use crate::protocol::messages::ProofOfCredential;
use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The authenticated caller of one request.
pub struct RequestContext {
    pub identity: IdentityRecord,
    /// true when authenticated by session token rather than signature
    pub via_token: bool,
}

pub struct CredentialVerifier {
    sessions: SessionStore,
    identities: Arc<IdentityStore>,
    last_nonce: Mutex<HashMap<String, i64>>,
}

impl CredentialVerifier {
    pub fn new(sessions: SessionStore, identities: Arc<IdentityStore>) -> Self {
        Self {
            sessions,
            identities,
            last_nonce: Mutex::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Authenticate a request from its metadata and optional embedded
    /// proof. `extra` is the method-specific signing extra of the decoded
    /// payload.
    pub fn resolve(
        &self,
        metadata: &HashMap<String, String>,
        credential: Option<&ProofOfCredential>,
        extra: &[u8],
    ) -> StrataDbResult<RequestContext> {
        if let Some(token) = metadata.get(SESSION_TOKEN_KEY) {
            return self.resolve_token(token);
        }
        if let Some(proof) = credential {
            return self.resolve_signature(proof, extra);
        }
        Err(StrataDbError::Unauthorized(
            "No session token or signature credential presented".to_string(),
        ))
    }

    fn resolve_token(&self, token: &str) -> StrataDbResult<RequestContext> {
        let session = self.sessions.validate(token)?.ok_or_else(|| {
            StrataDbError::Unauthorized("Unknown or expired session token".to_string())
        })?;
        let identity = self.identities.get(&session.identity_id)?.ok_or_else(|| {
            StrataDbError::Unauthorized("Session identity no longer exists".to_string())
        })?;
        Ok(RequestContext {
            identity,
            via_token: true,
        })
    }

    fn resolve_signature(
        &self,
        proof: &ProofOfCredential,
        extra: &[u8],
    ) -> StrataDbResult<RequestContext> {
        let identity = self.identities.get(&proof.caller_id)?.ok_or_else(|| {
            StrataDbError::Unauthorized(format!("Unknown identity: {}", proof.caller_id))
        })?;
        let public_key = identity.public_key.as_ref().ok_or_else(|| {
            StrataDbError::Unauthorized("Identity has no registered public key".to_string())
        })?;

        let digest = request_digest(&proof.caller_id, proof.nonce, extra);
        public_key
            .verify(&digest, &proof.signature)
            .map_err(|_| StrataDbError::Unauthorized("Signature verification failed".to_string()))?;

        // Replay rejection: nonces are strictly increasing per identity.
        // Only a verified signature may advance the recorded nonce.
        {
            let mut nonces = self.last_nonce.lock().expect("nonce lock poisoned");
            if let Some(last) = nonces.get(&proof.caller_id) {
                if proof.nonce <= *last {
                    warn!(
                        "rejected replayed nonce {} (last {}) for {}",
                        proof.nonce, last, proof.caller_id
                    );
                    return Err(StrataDbError::Unauthorized(
                        "Nonce is not strictly increasing".to_string(),
                    ));
                }
            }
            nonces.insert(proof.caller_id.clone(), proof.nonce);
        }

        Ok(RequestContext {
            identity,
            via_token: false,
        })
    }
}
