//! StrataDB: a permissioned, multi-tenant key/value table store.
//!
//! Identities own namespaced tables of key/value rows and may delegate
//! scoped access to sub-identities or other identities through leveled
//! permission grants. Clients talk to a node over a framed JSON protocol,
//! authenticating with session tokens or per-request Ed25519 signatures.

pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod node;
pub mod permissions;
pub mod protocol;
pub mod query;
pub mod store;

pub use client::StrataClient;
pub use config::NodeConfig;
pub use error::{ErrorCode, StrataDbError, StrataDbResult};
pub use node::{StrataNode, TcpServer};
