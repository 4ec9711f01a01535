//! Grant storage and the central authorization check.
//!
//! Every data-path call runs through [`PermissionManager::check`] before
//! touching storage; dispatch owns that sequencing so no entry point can
//! bypass authorization.

use crate::error::StrataDbResult;
use crate::permissions::types::{PermissionAudience, PermissionGrant, PermissionLevel};
use log::debug;

/// Evaluates and persists permission entries on the `grants` tree.
#[derive(Clone)]
pub struct PermissionManager {
    grants: sled::Tree,
}

fn grant_key(owner: &str, table: &str, audience: &PermissionAudience) -> String {
    format!("grant:{}:{}:{}", owner, table, audience.storage_key())
}

fn table_prefix(owner: &str, table: &str) -> String {
    format!("grant:{}:{}:", owner, table)
}

impl PermissionManager {
    pub fn new(grants: sled::Tree) -> Self {
        Self { grants }
    }

    /// Upsert a grant, keyed by (audience, table). Last write wins.
    pub fn set(&self, owner: &str, table: &str, grant: &PermissionGrant) -> StrataDbResult<()> {
        let key = grant_key(owner, table, &grant.audience);
        let bytes = serde_json::to_vec(grant)?;
        self.grants.insert(key.as_bytes(), bytes)?;
        self.grants.flush()?;
        Ok(())
    }

    /// All grants attached to a table.
    pub fn table_grants(&self, owner: &str, table: &str) -> StrataDbResult<Vec<PermissionGrant>> {
        let mut grants = Vec::new();
        for entry in self.grants.scan_prefix(table_prefix(owner, table).as_bytes()) {
            let (_, bytes) = entry?;
            grants.push(serde_json::from_slice(&bytes)?);
        }
        Ok(grants)
    }

    /// Raw grant keys for a table, used by the catalog's cascade delete.
    pub(crate) fn grant_keys(&self, owner: &str, table: &str) -> StrataDbResult<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for entry in self.grants.scan_prefix(table_prefix(owner, table).as_bytes()) {
            let (key, _) = entry?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.grants
    }

    /// Decide whether a caller may perform an operation needing `required`
    /// on `(owner, table)`, optionally scoped to one row key.
    ///
    /// The table owner is always allowed. Otherwise the caller's Individual
    /// grant, a SubUsers grant (when the caller is a sub-identity of the
    /// owner), or a Public grant may satisfy the level.
    pub fn check(
        &self,
        caller_id: &str,
        caller_owner: Option<&str>,
        owner: &str,
        table: &str,
        required: PermissionLevel,
        key: Option<&str>,
    ) -> StrataDbResult<bool> {
        if caller_id == owner {
            return Ok(true);
        }

        let mut audiences = vec![PermissionAudience::Individual(caller_id.to_string())];
        if caller_owner == Some(owner) {
            audiences.push(PermissionAudience::SubUsers);
        }
        audiences.push(PermissionAudience::Public);

        for audience in &audiences {
            let lookup = grant_key(owner, table, audience);
            if let Some(bytes) = self.grants.get(lookup.as_bytes())? {
                let grant: PermissionGrant = serde_json::from_slice(&bytes)?;
                if grant.permits(required, caller_id, key) {
                    return Ok(true);
                }
            }
        }

        debug!(
            "permission denied: caller={} table={}/{} required={:?}",
            caller_id, owner, table, required
        );
        Ok(false)
    }
}
