//! Session tokens issued by LoginUser.
//!
//! Tokens are opaque 32-byte random values, base64url on the wire. The
//! server keeps only the SHA-256 digest of each token, mapped to the
//! identity and an expiry.

use crate::error::StrataDbResult;
use crate::identity::IdentityRecord;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub identity_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    tree: sled::Tree,
    ttl: Duration,
}

fn token_digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

impl SessionStore {
    pub fn new(db: &sled::Db, ttl_secs: u64) -> StrataDbResult<Self> {
        Ok(Self {
            tree: db.open_tree(crate::constants::SESSIONS_TREE)?,
            ttl: Duration::seconds(ttl_secs as i64),
        })
    }

    /// Issue a fresh token for an identity.
    pub fn issue(&self, identity: &IdentityRecord) -> StrataDbResult<(String, DateTime<Utc>)> {
        let mut raw = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);

        let record = SessionRecord {
            identity_id: identity.id.clone(),
            owner_id: identity.owner_id.clone(),
            expires_at: Utc::now() + self.ttl,
        };
        self.tree
            .insert(token_digest(&token), serde_json::to_vec(&record)?)?;
        self.tree.flush()?;
        Ok((token, record.expires_at))
    }

    /// Resolve a presented token. Expired sessions are dropped on sight.
    pub fn validate(&self, token: &str) -> StrataDbResult<Option<SessionRecord>> {
        let digest = token_digest(token);
        match self.tree.get(digest)? {
            Some(bytes) => {
                let record: SessionRecord = serde_json::from_slice(&bytes)?;
                if record.expires_at < Utc::now() {
                    self.tree.remove(digest)?;
                    return Ok(None);
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Drop every expired session; returns how many were removed.
    pub fn purge_expired(&self) -> StrataDbResult<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for entry in self.tree.iter() {
            let (key, bytes) = entry?;
            let record: SessionRecord = serde_json::from_slice(&bytes)?;
            if record.expires_at < now {
                self.tree.remove(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
