//! Permission engine: leveled grants with audiences and key constraints.

pub mod manager;
pub mod types;

pub use manager::PermissionManager;
pub use types::{key_pattern_matches, PermissionAudience, PermissionGrant, PermissionLevel};
