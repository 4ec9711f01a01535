//! Permission entry types: levels, audiences, and key constraints.

use serde::{Deserialize, Serialize};

/// Access level of a grant. Derived ordering gives Read < Write < Admin;
/// a higher level implies every lower one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    Write,
    Admin,
}

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PermissionAudience {
    /// Everyone, authenticated or not known to the table owner
    Public,
    /// Any sub-identity of the table owner
    SubUsers,
    /// One specific identity or sub-identity
    Individual(String),
}

impl PermissionAudience {
    /// Stable storage key component; also the upsert key of a grant.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Public => "pub".to_string(),
            Self::SubUsers => "sub".to_string(),
            Self::Individual(id) => format!("ind:{}", id),
        }
    }

    fn type_byte(&self) -> u8 {
        match self {
            Self::Public => 0,
            Self::SubUsers => 1,
            Self::Individual(_) => 2,
        }
    }
}

/// A permission entry: (audience, level, optional key constraint), attached
/// to one table. Upsert key is the audience; last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub audience: PermissionAudience,
    pub level: PermissionLevel,
    /// Restricts the grant to row keys matching this pattern: a trailing
    /// `%` matches any suffix, `@uid` substitutes the caller's id.
    #[serde(default)]
    pub key_constraint: Option<String>,
}

impl PermissionGrant {
    /// Whether this grant satisfies `required` for `caller_id` on `key`.
    ///
    /// Key-constrained grants only apply to single-key operations: a check
    /// spanning the whole table (`key` = None) is never satisfied by them.
    pub fn permits(&self, required: PermissionLevel, caller_id: &str, key: Option<&str>) -> bool {
        if self.level < required {
            return false;
        }
        match &self.key_constraint {
            None => true,
            Some(pattern) => match key {
                None => false,
                Some(k) => key_pattern_matches(pattern, caller_id, k),
            },
        }
    }

    /// Deterministic bytes covered by request signatures that carry a grant.
    pub fn signing_bytes(&self, table: &str) -> Vec<u8> {
        let mut bytes = vec![self.audience.type_byte(), self.level as u8];
        bytes.extend_from_slice(table.as_bytes());
        bytes.extend_from_slice(self.audience.storage_key().as_bytes());
        if let Some(constraint) = &self.key_constraint {
            bytes.extend_from_slice(constraint.as_bytes());
        }
        bytes
    }
}

/// Match a row key against a constraint pattern after `@uid` substitution.
pub fn key_pattern_matches(pattern: &str, caller_id: &str, key: &str) -> bool {
    let substituted = pattern.replace("@uid", caller_id);
    if let Some(prefix) = substituted.strip_suffix('%') {
        key.starts_with(prefix)
    } else {
        key == substituted
    }
}
