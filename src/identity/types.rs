//! Identity records and registration specs.

use crate::crypto::PublicKey;
use crate::error::{StrataDbError, StrataDbResult};
use crate::protocol::messages::SubIdentitySummary;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// One identity, primary or delegated. Sub-identities carry the id of
/// their owner; primaries have `owner_id = None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub handle: String,
    pub email: String,
    pub mobile: String,
    pub password_hash: String,
    #[serde(default)]
    pub public_key: Option<PublicKey>,
    #[serde(default)]
    pub group_id: Option<String>,
    /// Insertion sequence within the owner's namespace, for ordered listing
    #[serde(default)]
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn is_sub_identity(&self) -> bool {
        self.owner_id.is_some()
    }

    pub fn summary(&self) -> SubIdentitySummary {
        SubIdentitySummary {
            id: self.id.clone(),
            handle: self.handle.clone(),
            email: self.email.clone(),
            mobile: self.mobile.clone(),
            group_id: self.group_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// An unconfirmed registration. Kept after confirmation (marked) so a
/// replayed ConfirmNewIdentity returns the original success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub record: IdentityRecord,
    pub verification_code: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub confirmed: bool,
}

/// Fields of a registration request, validated before anything persists.
/// The plaintext password is wiped when the spec is dropped.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct NewIdentitySpec {
    pub handle: String,
    pub email: String,
    pub mobile: String,
    pub password: String,
    #[zeroize(skip)]
    pub public_key: Option<PublicKey>,
    pub group_id: Option<String>,
}

static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,63}$").expect("valid handle regex"));

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static MOBILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+(?:[0-9] ?){6,14}[0-9]$").expect("valid mobile regex"));

impl NewIdentitySpec {
    pub fn validate(&self) -> StrataDbResult<()> {
        if !HANDLE_RE.is_match(&self.handle) {
            return Err(StrataDbError::InvalidArgument(format!(
                "Malformed handle: {}",
                self.handle
            )));
        }
        if !EMAIL_RE.is_match(&self.email) {
            return Err(StrataDbError::InvalidArgument(format!(
                "Malformed email: {}",
                self.email
            )));
        }
        if !MOBILE_RE.is_match(&self.mobile) {
            return Err(StrataDbError::InvalidArgument(format!(
                "Malformed mobile number: {}",
                self.mobile
            )));
        }
        if self.password.len() < crate::crypto::MIN_PASSWORD_LENGTH {
            return Err(StrataDbError::InvalidArgument(format!(
                "Password must be at least {} characters",
                crate::crypto::MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_handle(handle: &str) -> StrataDbResult<()> {
    if HANDLE_RE.is_match(handle) {
        Ok(())
    } else {
        Err(StrataDbError::InvalidArgument(format!(
            "Malformed handle: {}",
            handle
        )))
    }
}

pub(crate) fn validate_email(email: &str) -> StrataDbResult<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(StrataDbError::InvalidArgument(format!(
            "Malformed email: {}",
            email
        )))
    }
}

pub(crate) fn validate_mobile(mobile: &str) -> StrataDbResult<()> {
    if MOBILE_RE.is_match(mobile) {
        Ok(())
    } else {
        Err(StrataDbError::InvalidArgument(format!(
            "Malformed mobile number: {}",
            mobile
        )))
    }
}
