use crate::crypto::CryptoError;
use std::fmt;
use std::io;

/// Unified error type for the entire application.
///
/// Every component reports failures through this enum; the dispatch layer
/// maps each variant to a stable wire code (`ErrorCode`) before replying.
/// Business-rule violations carry their own variants; unexpected faults
/// (storage, serialization, IO) collapse to `Internal` on the wire.
#[derive(Debug)]
pub enum StrataDbError {
    /// Caller lacks the credential or permission the operation requires
    Unauthorized(String),

    /// Referenced table, key, or identity does not exist
    NotFound(String),

    /// Name or key already taken
    AlreadyExists(String),

    /// Malformed or out-of-bounds request data
    InvalidArgument(String),

    /// Login failed: unknown handle, wrong password, or lockout
    InvalidCredentials(String),

    /// Registration confirmation failed: wrong code, unknown or expired pending id
    InvalidConfirmation(String),

    /// A configured quota (sub-identities, tables) would be exceeded
    QuotaExceeded(String),

    /// Errors from cryptographic operations
    Crypto(CryptoError),

    /// Errors from the sled storage engine
    Database(String),

    /// Errors during serialization/deserialization
    Serialization(String),

    /// Errors from IO operations
    Io(io::Error),

    /// Other unexpected faults
    Internal(String),
}

impl fmt::Display for StrataDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::InvalidCredentials(msg) => write!(f, "Invalid credentials: {}", msg),
            Self::InvalidConfirmation(msg) => write!(f, "Invalid confirmation: {}", msg),
            Self::QuotaExceeded(msg) => write!(f, "Quota exceeded: {}", msg),
            Self::Crypto(err) => write!(f, "Crypto error: {}", err),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for StrataDbError {}

impl From<io::Error> for StrataDbError {
    fn from(error: io::Error) -> Self {
        StrataDbError::Io(error)
    }
}

impl From<serde_json::Error> for StrataDbError {
    fn from(error: serde_json::Error) -> Self {
        StrataDbError::Serialization(error.to_string())
    }
}

impl From<sled::Error> for StrataDbError {
    fn from(error: sled::Error) -> Self {
        StrataDbError::Database(error.to_string())
    }
}

impl From<CryptoError> for StrataDbError {
    fn from(error: CryptoError) -> Self {
        StrataDbError::Crypto(error)
    }
}

impl From<sled::transaction::TransactionError<StrataDbError>> for StrataDbError {
    fn from(error: sled::transaction::TransactionError<StrataDbError>) -> Self {
        match error {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => err.into(),
        }
    }
}

/// Result type alias for StrataDB operations.
pub type StrataDbResult<T> = Result<T, StrataDbError>;

/// Stable machine-readable error codes carried on the wire.
///
/// Client integrations branch on these; the numeric values and names are
/// part of the protocol contract and must not be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Unauthorized = 1,
    NotFound = 2,
    AlreadyExists = 3,
    InvalidArgument = 4,
    InvalidCredentials = 5,
    InvalidConfirmation = 6,
    QuotaExceeded = 7,
    Internal = 8,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Unauthorized),
            2 => Some(Self::NotFound),
            3 => Some(Self::AlreadyExists),
            4 => Some(Self::InvalidArgument),
            5 => Some(Self::InvalidCredentials),
            6 => Some(Self::InvalidConfirmation),
            7 => Some(Self::QuotaExceeded),
            8 => Some(Self::Internal),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::InvalidConfirmation => "InvalidConfirmation",
            Self::QuotaExceeded => "QuotaExceeded",
            Self::Internal => "Internal",
        }
    }
}

impl StrataDbError {
    /// The wire code this error maps to at the dispatch boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::InvalidCredentials(_) => ErrorCode::InvalidCredentials,
            Self::InvalidConfirmation(_) => ErrorCode::InvalidConfirmation,
            Self::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            Self::Crypto(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Reconstruct a typed error from a wire code + message (client side).
    pub fn from_wire(code: u16, message: String) -> Self {
        match ErrorCode::from_u16(code) {
            Some(ErrorCode::Unauthorized) => Self::Unauthorized(message),
            Some(ErrorCode::NotFound) => Self::NotFound(message),
            Some(ErrorCode::AlreadyExists) => Self::AlreadyExists(message),
            Some(ErrorCode::InvalidArgument) => Self::InvalidArgument(message),
            Some(ErrorCode::InvalidCredentials) => Self::InvalidCredentials(message),
            Some(ErrorCode::InvalidConfirmation) => Self::InvalidConfirmation(message),
            Some(ErrorCode::QuotaExceeded) => Self::QuotaExceeded(message),
            Some(ErrorCode::Internal) | None => Self::Internal(message),
        }
    }
}
