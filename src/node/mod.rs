//! The server node: owns every component and wires dispatch to them.

pub mod dispatch;
pub mod server;

pub use server::TcpServer;

use crate::auth::{CredentialVerifier, SessionStore};
use crate::catalog::TableCatalog;
use crate::config::NodeConfig;
use crate::error::StrataDbResult;
use crate::identity::{CodeDelivery, IdentityStore};
use crate::permissions::PermissionManager;
use crate::store::TableStore;
use log::info;
use std::sync::Arc;

/// A StrataDB node: identity store, permission engine, table catalog, and
/// storage engine behind one dispatch surface.
pub struct StrataNode {
    pub(crate) config: NodeConfig,
    pub(crate) identities: Arc<IdentityStore>,
    pub(crate) verifier: CredentialVerifier,
    pub(crate) permissions: PermissionManager,
    pub(crate) catalog: TableCatalog,
    pub(crate) store: TableStore,
}

impl StrataNode {
    /// Open (or create) a node at `config.storage_path`. Sweeps orphan
    /// data trees and expired sessions left behind by earlier runs.
    pub fn open(config: NodeConfig, delivery: Arc<dyn CodeDelivery>) -> StrataDbResult<Self> {
        config.validate()?;
        let db = sled::open(&config.storage_path)?;
        Self::open_with_db(db, config, delivery)
    }

    /// Open a node on an existing sled handle (tests use temporary DBs).
    pub fn open_with_db(
        db: sled::Db,
        config: NodeConfig,
        delivery: Arc<dyn CodeDelivery>,
    ) -> StrataDbResult<Self> {
        config.validate()?;
        let identities = Arc::new(IdentityStore::new(&db, &config, delivery)?);
        let sessions = SessionStore::new(&db, config.session_ttl_secs)?;
        let verifier = CredentialVerifier::new(sessions, Arc::clone(&identities));
        let permissions = PermissionManager::new(db.open_tree(crate::constants::GRANTS_TREE)?);
        let catalog = TableCatalog::new(&db, &config.limits)?;
        let store = TableStore::new(db, config.limits.clone());

        store.sweep_orphans(&catalog)?;
        let purged = verifier.sessions().purge_expired()?;
        if purged > 0 {
            info!("purged {} expired sessions", purged);
        }

        Ok(Self {
            config,
            identities,
            verifier,
            permissions,
            catalog,
            store,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }
}
