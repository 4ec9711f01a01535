use crate::constants;
use crate::error::{StrataDbError, StrataDbResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a StrataNode instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Path where the node will store its data
    pub storage_path: PathBuf,
    /// TCP listening address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Seconds a session token stays valid after login
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Seconds an unconfirmed registration stays confirmable
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    /// Base of the exponential login-failure backoff, in seconds
    #[serde(default = "default_auth_backoff_base_secs")]
    pub auth_backoff_base_secs: u64,
    /// Cap on the login-failure backoff, in seconds
    #[serde(default = "default_auth_backoff_max_secs")]
    pub auth_backoff_max_secs: u64,
    /// When set, CreateUser requires this signup code
    #[serde(default)]
    pub signup_code: Option<String>,
    /// Size and quota limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_listen_address() -> String {
    constants::DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_pending_ttl_secs() -> u64 {
    60 * 60
}

fn default_auth_backoff_base_secs() -> u64 {
    1
}

fn default_auth_backoff_max_secs() -> u64 {
    15 * 60
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(constants::DEFAULT_STORAGE_PATH),
            listen_address: default_listen_address(),
            session_ttl_secs: default_session_ttl_secs(),
            pending_ttl_secs: default_pending_ttl_secs(),
            auth_backoff_base_secs: default_auth_backoff_base_secs(),
            auth_backoff_max_secs: default_auth_backoff_max_secs(),
            signup_code: None,
            limits: LimitsConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Create a new node configuration with the specified storage path
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Default::default()
        }
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> StrataDbResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&raw)
            .map_err(|e| StrataDbError::InvalidArgument(format!("Bad config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the TCP listening address
    pub fn with_listen_address(mut self, address: &str) -> Self {
        self.listen_address = address.to_string();
        self
    }

    /// Require a signup code for sub-identity creation
    pub fn with_signup_code(mut self, code: &str) -> Self {
        self.signup_code = Some(code.to_string());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> StrataDbResult<()> {
        if self.session_ttl_secs == 0 {
            return Err(StrataDbError::InvalidArgument(
                "session_ttl_secs must be positive".to_string(),
            ));
        }
        if self.auth_backoff_base_secs > self.auth_backoff_max_secs {
            return Err(StrataDbError::InvalidArgument(
                "auth_backoff_base_secs exceeds auth_backoff_max_secs".to_string(),
            ));
        }
        self.limits.validate()
    }
}

/// Size and quota limits enforced by the catalog and storage engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum row key size in bytes
    #[serde(default = "default_max_key_bytes")]
    pub max_key_bytes: usize,
    /// Maximum row value size in bytes
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
    /// Maximum sub-identities per owner
    #[serde(default = "default_max_sub_identities")]
    pub max_sub_identities: usize,
    /// Maximum tables per owner namespace
    #[serde(default = "default_max_tables_per_owner")]
    pub max_tables_per_owner: usize,
    /// Default page size for paged responses
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Byte budget per page
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: usize,
}

fn default_max_key_bytes() -> usize {
    constants::DEFAULT_MAX_KEY_BYTES
}

fn default_max_value_bytes() -> usize {
    constants::DEFAULT_MAX_VALUE_BYTES
}

fn default_max_sub_identities() -> usize {
    constants::DEFAULT_MAX_SUB_IDENTITIES
}

fn default_max_tables_per_owner() -> usize {
    constants::DEFAULT_MAX_TABLES_PER_OWNER
}

fn default_page_size() -> usize {
    constants::DEFAULT_PAGE_SIZE
}

fn default_max_page_bytes() -> usize {
    constants::MAX_PAGE_BYTES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_key_bytes: default_max_key_bytes(),
            max_value_bytes: default_max_value_bytes(),
            max_sub_identities: default_max_sub_identities(),
            max_tables_per_owner: default_max_tables_per_owner(),
            page_size: default_page_size(),
            max_page_bytes: default_max_page_bytes(),
        }
    }
}

impl LimitsConfig {
    fn validate(&self) -> StrataDbResult<()> {
        if self.max_key_bytes == 0 || self.max_value_bytes == 0 {
            return Err(StrataDbError::InvalidArgument(
                "row size limits must be positive".to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > constants::MAX_PAGE_SIZE {
            return Err(StrataDbError::InvalidArgument(format!(
                "page_size must be between 1 and {}",
                constants::MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        NodeConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_fields_default() {
        let config: NodeConfig = toml::from_str("storage_path = \"/tmp/sdb\"").unwrap();
        assert_eq!(config.listen_address, constants::DEFAULT_LISTEN_ADDRESS);
        assert_eq!(config.limits.page_size, constants::DEFAULT_PAGE_SIZE);
        assert!(config.signup_code.is_none());
    }

    #[test]
    fn rejects_zero_page_size() {
        let mut config = NodeConfig::default();
        config.limits.page_size = 0;
        assert!(config.validate().is_err());
    }
}
