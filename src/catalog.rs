//! Table catalog: namespaced descriptors, creation, listing, and the
//! visibility-atomic half of cascading deletion.
//!
//! Descriptors live on the `tables` tree under `table:{owner}:{name}`.
//! Deleting a table removes its descriptor and grants in one sled
//! transaction, so the table disappears atomically; the data tree is
//! dropped afterwards and any interruption is repaired by the orphan
//! sweep at node open.

use crate::config::LimitsConfig;
use crate::error::{StrataDbError, StrataDbResult};
use crate::identity::IdentityRecord;
use crate::permissions::{PermissionLevel, PermissionManager};
use crate::protocol::messages::{IndexedField, TableCreate, TableDataFormat, TableDescriptorMsg};
use chrono::{DateTime, Utc};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sled::Transactional;
use std::sync::Mutex;

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,63}$").expect("valid table regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub owner_id: String,
    pub name: String,
    pub data_format: TableDataFormat,
    #[serde(default)]
    pub indexed_fields: Vec<IndexedField>,
    pub allow_token_auth: bool,
    pub created_at: DateTime<Utc>,
}

impl TableDescriptor {
    pub fn to_msg(&self) -> TableDescriptorMsg {
        TableDescriptorMsg {
            owner_id: self.owner_id.clone(),
            table: self.name.clone(),
            data_format: self.data_format,
            allow_token_auth: self.allow_token_auth,
            created_at: self.created_at,
        }
    }
}

pub struct TableCatalog {
    tables: sled::Tree,
    create_lock: Mutex<()>,
    max_tables_per_owner: usize,
}

fn table_key(owner: &str, name: &str) -> String {
    format!("table:{}:{}", owner, name)
}

fn owner_prefix(owner: &str) -> String {
    format!("table:{}:", owner)
}

impl TableCatalog {
    pub fn new(db: &sled::Db, limits: &LimitsConfig) -> StrataDbResult<Self> {
        Ok(Self {
            tables: db.open_tree(crate::constants::TABLES_TREE)?,
            create_lock: Mutex::new(()),
            max_tables_per_owner: limits.max_tables_per_owner,
        })
    }

    /// Create a table in the owner's namespace, installing its initial
    /// permission entries. Serialized by the catalog mutex so duplicate
    /// names cannot race in.
    pub fn create(
        &self,
        perms: &PermissionManager,
        owner: &str,
        request: &TableCreate,
    ) -> StrataDbResult<TableDescriptor> {
        if !TABLE_NAME_RE.is_match(&request.table) {
            return Err(StrataDbError::InvalidArgument(format!(
                "Malformed table name: {}",
                request.table
            )));
        }

        let _guard = self.create_lock.lock().expect("catalog lock poisoned");

        // A duplicate name is a duplicate even at quota.
        let key = table_key(owner, &request.table);
        if self.tables.contains_key(key.as_bytes())? {
            return Err(StrataDbError::AlreadyExists(format!(
                "Table already exists: {}",
                request.table
            )));
        }

        let mut count = 0;
        for entry in self.tables.scan_prefix(owner_prefix(owner).as_bytes()) {
            entry?;
            count += 1;
        }
        if count >= self.max_tables_per_owner {
            return Err(StrataDbError::QuotaExceeded(format!(
                "Owner {} already has {} tables",
                owner, self.max_tables_per_owner
            )));
        }

        let descriptor = TableDescriptor {
            owner_id: owner.to_string(),
            name: request.table.clone(),
            data_format: request.data_format,
            indexed_fields: request.indexed_fields.clone(),
            allow_token_auth: request.allow_token_auth,
            created_at: Utc::now(),
        };
        self.tables
            .insert(key.as_bytes(), serde_json::to_vec(&descriptor)?)?;
        for grant in &request.permissions {
            perms.set(owner, &request.table, grant)?;
        }
        self.tables.flush()?;
        info!("created table {}/{}", owner, request.table);
        Ok(descriptor)
    }

    pub fn get(&self, owner: &str, name: &str) -> StrataDbResult<Option<TableDescriptor>> {
        match self.tables.get(table_key(owner, name).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up a table or fail with `NotFound`.
    pub fn require(&self, owner: &str, name: &str) -> StrataDbResult<TableDescriptor> {
        self.get(owner, name)?.ok_or_else(|| {
            StrataDbError::NotFound(format!("No such table: {}/{}", owner, name))
        })
    }

    /// Tables in `namespace` the caller may see: all of them for the
    /// namespace owner, otherwise only those with a Read-satisfying grant.
    /// Ordered by name.
    pub fn list_visible(
        &self,
        perms: &PermissionManager,
        caller: &IdentityRecord,
        namespace: &str,
    ) -> StrataDbResult<Vec<TableDescriptor>> {
        let mut visible = Vec::new();
        for entry in self.tables.scan_prefix(owner_prefix(namespace).as_bytes()) {
            let (_, bytes) = entry?;
            let descriptor: TableDescriptor = serde_json::from_slice(&bytes)?;
            let allowed = caller.id == namespace
                || perms.check(
                    &caller.id,
                    caller.owner_id.as_deref(),
                    namespace,
                    &descriptor.name,
                    PermissionLevel::Read,
                    None,
                )?;
            if allowed {
                visible.push(descriptor);
            }
        }
        // scan_prefix already yields key order, which is name order here
        Ok(visible)
    }

    /// Remove a table's descriptor and grants in one transaction. The
    /// caller drops the data tree afterwards.
    pub fn delete(
        &self,
        perms: &PermissionManager,
        owner: &str,
        name: &str,
    ) -> StrataDbResult<()> {
        let key = table_key(owner, name);
        if !self.tables.contains_key(key.as_bytes())? {
            return Err(StrataDbError::NotFound(format!(
                "No such table: {}/{}",
                owner, name
            )));
        }
        let grant_keys = perms.grant_keys(owner, name)?;

        (&self.tables, perms.tree())
            .transaction(|(tables, grants)| {
                tables.remove(key.as_bytes())?;
                for grant_key in &grant_keys {
                    grants.remove(grant_key.as_slice())?;
                }
                Ok::<(), sled::transaction::ConflictableTransactionError<StrataDbError>>(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Abort(err) => err,
                sled::transaction::TransactionError::Storage(err) => err.into(),
            })?;
        self.tables.flush()?;
        info!("deleted table {}/{}", owner, name);
        Ok(())
    }

    /// Every (owner, name) pair in the catalog; used by the orphan sweep.
    pub fn all_tables(&self) -> StrataDbResult<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for entry in self.tables.iter() {
            let (key, _) = entry?;
            let key = String::from_utf8_lossy(&key);
            if let Some(rest) = key.strip_prefix("table:") {
                if let Some((owner, name)) = rest.split_once(':') {
                    pairs.push((owner.to_string(), name.to_string()));
                }
            }
        }
        Ok(pairs)
    }
}
