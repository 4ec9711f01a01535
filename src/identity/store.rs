//! The identity store: two-phase registration, sub-identity delegation,
//! and credential verification.
//!
//! Trees:
//! - `identities`: id → IdentityRecord (active identities)
//! - `pending`:    id → PendingRegistration
//! - `handles`:    "{owner}:{handle}" → id (uniqueness index, spans pending)
//! - `subindex`:   "idx:{owner}:{seq}" → sub id (insertion order), plus
//!                 "count:{owner}" sequence counters
//!
//! Mutating operations hold the registration mutex so duplicate-handle
//! races cannot occur.

use crate::config::NodeConfig;
use crate::crypto::{self, PublicKey};
use crate::error::{StrataDbError, StrataDbResult};
use crate::identity::delivery::CodeDelivery;
use crate::identity::throttle::LoginThrottle;
use crate::identity::types::{
    validate_email, validate_handle, validate_mobile, IdentityRecord, NewIdentitySpec,
    PendingRegistration,
};
use crate::protocol::messages::SubIdentityModify;
use chrono::{Duration, Utc};
use log::{info, warn};
use rand::Rng;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct IdentityStore {
    identities: sled::Tree,
    pending: sled::Tree,
    handles: sled::Tree,
    subindex: sled::Tree,
    delivery: Arc<dyn CodeDelivery>,
    throttle: LoginThrottle,
    registration_lock: Mutex<()>,
    pending_ttl: Duration,
    max_sub_identities: usize,
    signup_code: Option<String>,
}

fn handle_key(owner: Option<&str>, handle: &str) -> String {
    format!("{}:{}", owner.unwrap_or(""), handle)
}

fn subindex_key(owner: &str, seq: u64) -> String {
    format!("idx:{}:{:020}", owner, seq)
}

fn counter_key(owner: &str) -> String {
    format!("count:{}", owner)
}

fn verification_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

impl IdentityStore {
    pub fn new(
        db: &sled::Db,
        config: &NodeConfig,
        delivery: Arc<dyn CodeDelivery>,
    ) -> StrataDbResult<Self> {
        Ok(Self {
            identities: db.open_tree(crate::constants::IDENTITIES_TREE)?,
            pending: db.open_tree(crate::constants::PENDING_TREE)?,
            handles: db.open_tree(crate::constants::HANDLES_TREE)?,
            subindex: db.open_tree(crate::constants::SUBINDEX_TREE)?,
            delivery,
            throttle: LoginThrottle::new(
                config.auth_backoff_base_secs,
                config.auth_backoff_max_secs,
            ),
            registration_lock: Mutex::new(()),
            pending_ttl: Duration::seconds(config.pending_ttl_secs as i64),
            max_sub_identities: config.limits.max_sub_identities,
            signup_code: config.signup_code.clone(),
        })
    }

    /// Look up an active identity by id.
    pub fn get(&self, id: &str) -> StrataDbResult<Option<IdentityRecord>> {
        match self.identities.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Two-phase registration, step one: create a pending primary identity
    /// and deliver its verification code. Returns the new id.
    pub async fn register(&self, spec: NewIdentitySpec) -> StrataDbResult<String> {
        spec.validate()?;
        // Hash outside the lock; Argon2id is deliberately slow.
        let password_hash = crypto::hash_password(&spec.password)?;
        let id = self.insert_pending(None, &spec, password_hash, 0)?;
        self.delivery.deliver(&spec.handle, &spec.email, &self.code_of(&id)?).await?;
        info!("registered pending identity {} ({})", id, spec.handle);
        Ok(id)
    }

    /// Create a pending sub-identity owned by `owner`. Quota-checked, and
    /// gated by the configured signup code when one is set.
    pub async fn create_sub_identity(
        &self,
        owner: &IdentityRecord,
        spec: NewIdentitySpec,
        signup_code: Option<&str>,
    ) -> StrataDbResult<String> {
        if owner.is_sub_identity() {
            return Err(StrataDbError::Unauthorized(
                "Sub-identities cannot own further sub-identities".to_string(),
            ));
        }
        if let Some(expected) = &self.signup_code {
            if signup_code != Some(expected.as_str()) {
                return Err(StrataDbError::InvalidArgument(
                    "Wrong or missing signup code".to_string(),
                ));
            }
        }
        spec.validate()?;
        let password_hash = crypto::hash_password(&spec.password)?;

        let id = {
            let _guard = self.registration_lock.lock().expect("registration lock poisoned");
            if self.count_sub_identities(&owner.id)? >= self.max_sub_identities {
                return Err(StrataDbError::QuotaExceeded(format!(
                    "Owner {} already has {} sub-identities",
                    owner.id, self.max_sub_identities
                )));
            }
            let seq = self.next_seq(&owner.id)?;
            self.insert_pending_locked(Some(&owner.id), &spec, password_hash, seq)?
        };

        self.delivery.deliver(&spec.handle, &spec.email, &self.code_of(&id)?).await?;
        info!("registered pending sub-identity {} under {}", id, owner.id);
        Ok(id)
    }

    fn insert_pending(
        &self,
        owner: Option<&str>,
        spec: &NewIdentitySpec,
        password_hash: String,
        seq: u64,
    ) -> StrataDbResult<String> {
        let _guard = self.registration_lock.lock().expect("registration lock poisoned");
        self.insert_pending_locked(owner, spec, password_hash, seq)
    }

    fn insert_pending_locked(
        &self,
        owner: Option<&str>,
        spec: &NewIdentitySpec,
        password_hash: String,
        seq: u64,
    ) -> StrataDbResult<String> {
        let hkey = handle_key(owner, &spec.handle);
        if let Some(existing) = self.handles.get(hkey.as_bytes())? {
            let existing_id = String::from_utf8_lossy(&existing).to_string();
            if !self.pending_is_reclaimable(&existing_id)? {
                return Err(StrataDbError::AlreadyExists(format!(
                    "Handle already taken: {}",
                    spec.handle
                )));
            }
            self.pending.remove(existing_id.as_bytes())?;
        }

        let id = Uuid::new_v4().to_string();
        let record = IdentityRecord {
            id: id.clone(),
            owner_id: owner.map(|o| o.to_string()),
            handle: spec.handle.clone(),
            email: spec.email.clone(),
            mobile: spec.mobile.clone(),
            password_hash,
            public_key: spec.public_key.clone(),
            group_id: spec.group_id.clone(),
            seq,
            created_at: Utc::now(),
        };
        let pending = PendingRegistration {
            record,
            verification_code: verification_code(),
            expires_at: Utc::now() + self.pending_ttl,
            confirmed: false,
        };
        self.pending.insert(id.as_bytes(), serde_json::to_vec(&pending)?)?;
        self.handles.insert(hkey.as_bytes(), id.as_bytes())?;
        self.pending.flush()?;
        Ok(id)
    }

    /// Whether a handle-index entry points at something that may be
    /// replaced: an expired, unconfirmed pending registration.
    fn pending_is_reclaimable(&self, id: &str) -> StrataDbResult<bool> {
        if self.identities.contains_key(id.as_bytes())? {
            return Ok(false);
        }
        match self.pending.get(id.as_bytes())? {
            Some(bytes) => {
                let pending: PendingRegistration = serde_json::from_slice(&bytes)?;
                Ok(!pending.confirmed && pending.expires_at < Utc::now())
            }
            // Dangling index entry; reclaim it.
            None => Ok(true),
        }
    }

    fn code_of(&self, id: &str) -> StrataDbResult<String> {
        let bytes = self
            .pending
            .get(id.as_bytes())?
            .ok_or_else(|| StrataDbError::Internal(format!("Pending record vanished: {}", id)))?;
        let pending: PendingRegistration = serde_json::from_slice(&bytes)?;
        Ok(pending.verification_code)
    }

    /// Two-phase registration, step two: finalize exactly once. Replaying
    /// a successful confirmation returns the original success.
    pub fn confirm(&self, id: &str, parent_id: &str, code: &str) -> StrataDbResult<()> {
        let _guard = self.registration_lock.lock().expect("registration lock poisoned");

        let bytes = self.pending.get(id.as_bytes())?.ok_or_else(|| {
            StrataDbError::InvalidConfirmation(format!("No pending registration: {}", id))
        })?;
        let mut pending: PendingRegistration = serde_json::from_slice(&bytes)?;

        let expected_parent = pending.record.owner_id.as_deref().unwrap_or("");
        if expected_parent != parent_id {
            return Err(StrataDbError::InvalidConfirmation(
                "Parent identity mismatch".to_string(),
            ));
        }
        if pending.verification_code != code {
            return Err(StrataDbError::InvalidConfirmation(
                "Wrong verification code".to_string(),
            ));
        }
        if pending.confirmed {
            // Idempotent replay of a successful confirmation.
            return Ok(());
        }
        if pending.expires_at < Utc::now() {
            return Err(StrataDbError::InvalidConfirmation(
                "Confirmation window expired".to_string(),
            ));
        }

        self.identities
            .insert(id.as_bytes(), serde_json::to_vec(&pending.record)?)?;
        if let Some(owner) = &pending.record.owner_id {
            self.subindex.insert(
                subindex_key(owner, pending.record.seq).as_bytes(),
                id.as_bytes(),
            )?;
        }
        pending.confirmed = true;
        self.pending.insert(id.as_bytes(), serde_json::to_vec(&pending)?)?;
        self.identities.flush()?;
        info!("confirmed identity {}", id);
        Ok(())
    }

    /// Apply owner-requested changes to a sub-identity. `None` fields stay
    /// unchanged.
    pub fn modify_sub_identity(
        &self,
        owner_id: &str,
        changes: &SubIdentityModify,
    ) -> StrataDbResult<()> {
        let _guard = self.registration_lock.lock().expect("registration lock poisoned");

        let mut record = self.get(&changes.sub_id)?.ok_or_else(|| {
            StrataDbError::NotFound(format!("No sub-identity: {}", changes.sub_id))
        })?;
        if record.owner_id.as_deref() != Some(owner_id) {
            return Err(StrataDbError::Unauthorized(
                "Caller does not own this sub-identity".to_string(),
            ));
        }

        if let Some(new_handle) = non_empty(&changes.new_handle) {
            validate_handle(new_handle)?;
            let new_key = handle_key(Some(owner_id), new_handle);
            if self.handles.contains_key(new_key.as_bytes())? {
                return Err(StrataDbError::AlreadyExists(format!(
                    "Handle already taken: {}",
                    new_handle
                )));
            }
            let old_key = handle_key(Some(owner_id), &record.handle);
            self.handles.remove(old_key.as_bytes())?;
            self.handles.insert(new_key.as_bytes(), record.id.as_bytes())?;
            record.handle = new_handle.to_string();
        }
        if let Some(new_email) = non_empty(&changes.new_email) {
            validate_email(new_email)?;
            record.email = new_email.to_string();
        }
        if let Some(new_mobile) = non_empty(&changes.new_mobile) {
            validate_mobile(new_mobile)?;
            record.mobile = new_mobile.to_string();
        }
        if let Some(new_password) = non_empty(&changes.new_password) {
            if new_password.len() < crypto::MIN_PASSWORD_LENGTH {
                return Err(StrataDbError::InvalidArgument(format!(
                    "Password must be at least {} characters",
                    crypto::MIN_PASSWORD_LENGTH
                )));
            }
            record.password_hash = crypto::hash_password(new_password)?;
        }
        if let Some(new_key) = non_empty(&changes.new_public_key) {
            record.public_key = Some(PublicKey::from_base64(new_key).map_err(|e| {
                StrataDbError::InvalidArgument(format!("Bad public key: {}", e))
            })?);
        }
        if let Some(new_group) = non_empty(&changes.new_group_id) {
            record.group_id = Some(new_group.to_string());
        }

        self.identities
            .insert(record.id.as_bytes(), serde_json::to_vec(&record)?)?;
        self.identities.flush()?;
        Ok(())
    }

    /// Active sub-identities of an owner, in insertion order.
    pub fn list_sub_identities(&self, owner_id: &str) -> StrataDbResult<Vec<IdentityRecord>> {
        let prefix = format!("idx:{}:", owner_id);
        let mut records = Vec::new();
        for entry in self.subindex.scan_prefix(prefix.as_bytes()) {
            let (_, id_bytes) = entry?;
            let id = String::from_utf8_lossy(&id_bytes).to_string();
            match self.get(&id)? {
                Some(record) => records.push(record),
                None => warn!("subindex points at missing identity {}", id),
            }
        }
        Ok(records)
    }

    fn count_sub_identities(&self, owner_id: &str) -> StrataDbResult<usize> {
        let prefix = format!("idx:{}:", owner_id);
        let mut count = 0;
        for entry in self.subindex.scan_prefix(prefix.as_bytes()) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn next_seq(&self, owner_id: &str) -> StrataDbResult<u64> {
        let key = counter_key(owner_id);
        let next = match self.subindex.get(key.as_bytes())? {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf) + 1
            }
            None => 0,
        };
        self.subindex.insert(key.as_bytes(), &next.to_be_bytes())?;
        Ok(next)
    }

    /// Verify login credentials for a (parent, handle) pair, returning the
    /// identity on success. Unknown handles burn a hash verification so
    /// timing does not reveal handle existence; repeated failures lock the
    /// pair out with exponential backoff.
    pub fn verify_login(
        &self,
        parent_id: &str,
        handle: &str,
        password: &str,
    ) -> StrataDbResult<IdentityRecord> {
        let throttle_key = format!("{}:{}", parent_id, handle);
        self.throttle.check(&throttle_key)?;

        let owner = if parent_id.is_empty() {
            None
        } else {
            Some(parent_id)
        };
        let hkey = handle_key(owner, handle);
        let record = match self.handles.get(hkey.as_bytes())? {
            Some(id_bytes) => self.get(&String::from_utf8_lossy(&id_bytes))?,
            None => None,
        };

        let Some(record) = record else {
            crypto::burn_verification(password);
            self.throttle.record_failure(&throttle_key);
            return Err(StrataDbError::InvalidCredentials(
                "Unknown handle or wrong password".to_string(),
            ));
        };

        if crypto::verify_password(&record.password_hash, password)? {
            self.throttle.record_success(&throttle_key);
            Ok(record)
        } else {
            self.throttle.record_failure(&throttle_key);
            Err(StrataDbError::InvalidCredentials(
                "Unknown handle or wrong password".to_string(),
            ))
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}
