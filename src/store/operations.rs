//! The key/value storage engine: one sled tree per table.
//!
//! Tree names are `data:{owner}:{table}`; key bytes are the row key and
//! value bytes the blob. A per-table RwLock serializes writers against
//! each other and against in-call scans, giving each call a consistent
//! view (last-committed-wins per table, no cross-table transactions).
//! Writes are flushed before acknowledging, so read-your-writes holds for
//! a client session.

use crate::catalog::{TableCatalog, TableDescriptor};
use crate::config::LimitsConfig;
use crate::constants::DATA_TREE_PREFIX;
use crate::error::{StrataDbError, StrataDbResult};
use crate::protocol::messages::{DataPair, TableDataFormat};
use crate::query::{self, QueryExpr};
use crate::store::pagination::{paginate, Page};
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

pub struct TableStore {
    db: sled::Db,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    limits: LimitsConfig,
}

fn tree_name(owner: &str, table: &str) -> String {
    format!("{}{}:{}", DATA_TREE_PREFIX, owner, table)
}

impl TableStore {
    pub fn new(db: sled::Db, limits: LimitsConfig) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
            limits,
        }
    }

    fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().expect("table lock map poisoned");
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn tree(&self, descriptor: &TableDescriptor) -> StrataDbResult<sled::Tree> {
        Ok(self
            .db
            .open_tree(tree_name(&descriptor.owner_id, &descriptor.name))?)
    }

    fn validate_pair(
        &self,
        descriptor: &TableDescriptor,
        key: &str,
        value: &[u8],
    ) -> StrataDbResult<()> {
        if key.is_empty() {
            return Err(StrataDbError::InvalidArgument(
                "Row key must not be empty".to_string(),
            ));
        }
        if key.len() > self.limits.max_key_bytes {
            return Err(StrataDbError::InvalidArgument(format!(
                "Key of {} bytes exceeds the {} byte limit",
                key.len(),
                self.limits.max_key_bytes
            )));
        }
        if value.len() > self.limits.max_value_bytes {
            return Err(StrataDbError::InvalidArgument(format!(
                "Value of {} bytes exceeds the {} byte limit",
                value.len(),
                self.limits.max_value_bytes
            )));
        }
        if descriptor.data_format == TableDataFormat::Json {
            serde_json::from_slice::<serde_json::Value>(value).map_err(|e| {
                StrataDbError::InvalidArgument(format!(
                    "Table requires JSON values; key {}: {}",
                    key, e
                ))
            })?;
        }
        Ok(())
    }

    /// Atomic point upsert. `overwrite = false` turns it into an insert
    /// that fails with `AlreadyExists` when the key is present.
    pub async fn put(
        &self,
        descriptor: &TableDescriptor,
        key: &str,
        value: &[u8],
        overwrite: bool,
    ) -> StrataDbResult<()> {
        self.validate_pair(descriptor, key, value)?;
        let name = tree_name(&descriptor.owner_id, &descriptor.name);
        let lock = self.lock_for(&name);
        let _guard = lock.write().await;

        let tree = self.tree(descriptor)?;
        if overwrite {
            tree.insert(key.as_bytes(), value)?;
        } else {
            tree.compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value))?
                .map_err(|_| {
                    StrataDbError::AlreadyExists(format!("Key already exists: {}", key))
                })?;
        }
        tree.flush()?;
        Ok(())
    }

    /// Apply a batch in a single sled transaction: all rows become durable
    /// or none do. Every pair is validated up front, so a bad entry fails
    /// the batch before anything is written.
    pub async fn put_multi(
        &self,
        descriptor: &TableDescriptor,
        pairs: &[DataPair],
        overwrite: bool,
    ) -> StrataDbResult<()> {
        if pairs.is_empty() {
            return Err(StrataDbError::InvalidArgument(
                "Empty batch".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for pair in pairs {
            self.validate_pair(descriptor, &pair.key, &pair.value)?;
            if !seen.insert(pair.key.as_str()) {
                return Err(StrataDbError::InvalidArgument(format!(
                    "Duplicate key in batch: {}",
                    pair.key
                )));
            }
        }

        let name = tree_name(&descriptor.owner_id, &descriptor.name);
        let lock = self.lock_for(&name);
        let _guard = lock.write().await;

        let tree = self.tree(descriptor)?;
        if !overwrite {
            for pair in pairs {
                if tree.contains_key(pair.key.as_bytes())? {
                    return Err(StrataDbError::AlreadyExists(format!(
                        "Key already exists: {}",
                        pair.key
                    )));
                }
            }
        }
        tree.transaction(|tx| {
            for pair in pairs {
                tx.insert(pair.key.as_bytes(), pair.value.clone())?;
            }
            Ok::<(), sled::transaction::ConflictableTransactionError<StrataDbError>>(())
        })
        .map_err(StrataDbError::from)?;
        tree.flush()?;
        Ok(())
    }

    /// Multi-key point read in request order. A single-key request for an
    /// absent key fails `NotFound`; multi-key requests omit absent keys.
    pub async fn get_page(
        &self,
        descriptor: &TableDescriptor,
        keys: &[String],
        page: &Page,
    ) -> StrataDbResult<(Vec<DataPair>, bool)> {
        let name = tree_name(&descriptor.owner_id, &descriptor.name);
        let lock = self.lock_for(&name);
        let _guard = lock.read().await;

        let tree = self.tree(descriptor)?;
        let mut found = Vec::new();
        for key in keys {
            if let Some(value) = tree.get(key.as_bytes())? {
                found.push(DataPair {
                    key: key.clone(),
                    value: value.to_vec(),
                });
            }
        }
        if keys.len() == 1 && found.is_empty() {
            return Err(StrataDbError::NotFound(format!(
                "No such key: {}",
                keys[0]
            )));
        }
        paginate(found.into_iter().map(Ok), page, pair_weight)
    }

    /// Evaluate a predicate over the table in one locked pass, returning
    /// matching pairs in lexicographic key order.
    pub async fn query_page(
        &self,
        descriptor: &TableDescriptor,
        expr: &QueryExpr,
        page: &Page,
    ) -> StrataDbResult<(Vec<DataPair>, bool)> {
        if descriptor.data_format != TableDataFormat::Json {
            return Err(StrataDbError::InvalidArgument(
                "Field queries require a Json table".to_string(),
            ));
        }
        let name = tree_name(&descriptor.owner_id, &descriptor.name);
        let lock = self.lock_for(&name);
        let _guard = lock.read().await;

        let tree = self.tree(descriptor)?;
        let matches = tree.iter().filter_map(|entry| match entry {
            Ok((key, value)) => {
                let doc: serde_json::Value = match serde_json::from_slice(&value) {
                    Ok(doc) => doc,
                    // Values are validated at write time; tolerate stragglers.
                    Err(_) => return None,
                };
                if query::matches(expr, &doc) {
                    Some(Ok(DataPair {
                        key: String::from_utf8_lossy(&key).to_string(),
                        value: value.to_vec(),
                    }))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(StrataDbError::from(e))),
        });
        paginate(matches, page, pair_weight)
    }

    /// Keys in lexicographic byte order. `""`/`"%"` lists all, `p%` is a
    /// prefix scan, anything else an exact match.
    pub async fn list_keys(
        &self,
        descriptor: &TableDescriptor,
        pattern: &str,
        page: &Page,
    ) -> StrataDbResult<(Vec<String>, bool)> {
        let name = tree_name(&descriptor.owner_id, &descriptor.name);
        let lock = self.lock_for(&name);
        let _guard = lock.read().await;

        let tree = self.tree(descriptor)?;
        let keys: Box<dyn Iterator<Item = StrataDbResult<String>>> =
            if pattern.is_empty() || pattern == "%" {
                Box::new(tree.iter().keys().map(decode_key))
            } else if let Some(prefix) = pattern.strip_suffix('%') {
                Box::new(tree.scan_prefix(prefix.as_bytes()).keys().map(decode_key))
            } else if tree.contains_key(pattern.as_bytes())? {
                Box::new(std::iter::once(Ok(pattern.to_string())))
            } else {
                Box::new(std::iter::empty())
            };
        paginate(keys, page, |k| k.len())
    }

    /// Point delete; `NotFound` if the key is absent.
    pub async fn delete_key(&self, descriptor: &TableDescriptor, key: &str) -> StrataDbResult<()> {
        let name = tree_name(&descriptor.owner_id, &descriptor.name);
        let lock = self.lock_for(&name);
        let _guard = lock.write().await;

        let tree = self.tree(descriptor)?;
        if tree.remove(key.as_bytes())?.is_none() {
            return Err(StrataDbError::NotFound(format!("No such key: {}", key)));
        }
        tree.flush()?;
        Ok(())
    }

    /// Drop a table's data tree after its descriptor is gone.
    pub async fn drop_table(&self, owner: &str, table: &str) -> StrataDbResult<()> {
        let name = tree_name(owner, table);
        let lock = self.lock_for(&name);
        let _guard = lock.write().await;
        self.db.drop_tree(name.as_bytes())?;
        self.locks
            .lock()
            .expect("table lock map poisoned")
            .remove(&name);
        Ok(())
    }

    /// Drop data trees whose table no longer exists in the catalog. This is
    /// the repair path for a cascade delete interrupted between the
    /// descriptor transaction and the tree drop.
    pub fn sweep_orphans(&self, catalog: &TableCatalog) -> StrataDbResult<usize> {
        let live: HashSet<String> = catalog
            .all_tables()?
            .into_iter()
            .map(|(owner, name)| tree_name(&owner, &name))
            .collect();

        let mut swept = 0;
        for name in self.db.tree_names() {
            let name = String::from_utf8_lossy(&name).to_string();
            if name.starts_with(DATA_TREE_PREFIX) && !live.contains(&name) {
                warn!("sweeping orphan data tree {}", name);
                self.db.drop_tree(name.as_bytes())?;
                swept += 1;
            }
        }
        if swept > 0 {
            info!("swept {} orphan data trees", swept);
        }
        Ok(swept)
    }
}

fn pair_weight(pair: &DataPair) -> usize {
    pair.key.len() + pair.value.len()
}

fn decode_key(entry: Result<sled::IVec, sled::Error>) -> StrataDbResult<String> {
    let key = entry?;
    Ok(String::from_utf8_lossy(&key).to_string())
}
