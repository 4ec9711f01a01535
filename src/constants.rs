/// Common constants used across StrataDB.
///
/// These defaults back command line arguments and configuration when
/// explicit values are not provided.
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:9090";
pub const DEFAULT_STORAGE_PATH: &str = "data";

/// Hard cap on a single wire frame (length prefix + JSON body).
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Server and protocol version surface returned by VersionInfo.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_CLIENT_VERSION: &str = "0.1.0";

/// Pagination defaults; requests may lower but never raise the caps.
pub const DEFAULT_PAGE_SIZE: usize = 256;
pub const MAX_PAGE_SIZE: usize = 1024;
pub const MAX_PAGE_BYTES: usize = 1024 * 1024;

/// Row size limits (overridable via `LimitsConfig`).
pub const DEFAULT_MAX_KEY_BYTES: usize = 1024;
pub const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;

/// Quotas.
pub const DEFAULT_MAX_SUB_IDENTITIES: usize = 128;
pub const DEFAULT_MAX_TABLES_PER_OWNER: usize = 256;

/// Sled tree names and key prefixes.
pub const IDENTITIES_TREE: &str = "identities";
pub const PENDING_TREE: &str = "pending";
pub const HANDLES_TREE: &str = "handles";
pub const SUBINDEX_TREE: &str = "subindex";
pub const SESSIONS_TREE: &str = "sessions";
pub const GRANTS_TREE: &str = "grants";
pub const TABLES_TREE: &str = "tables";
pub const DATA_TREE_PREFIX: &str = "data:";

/// Metadata key carrying the session token on authenticated calls.
pub const SESSION_TOKEN_KEY: &str = "session-token";
