//! Typed request/response payloads of the RPC contract.
//!
//! Every payload is a serde struct carried as JSON inside a frame; binary
//! values travel as base64 strings. Requests that authenticate by signature
//! embed a [`ProofOfCredential`]; session-token callers leave it out and
//! put the token in the envelope metadata instead.

use crate::crypto::signing;
use crate::permissions::PermissionGrant;
use crate::query::{QueryExpr, QueryOrdering};
use serde::{Deserialize, Serialize};

/// Serde helper: `Vec<u8>` as a base64 string.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        use serde::de::Error;
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(|e| D::Error::custom(format!("Invalid base64: {}", e)))
    }
}

/// Per-request signature credential: the signature covers
/// `SHA-256(caller_id ∥ decimal(nonce) ∥ method extra bytes)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOfCredential {
    pub caller_id: String,
    pub nonce: i64,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Value discipline of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableDataFormat {
    Json,
    PlainText,
    Binary,
}

/// Hint that a field of a Json table is worth indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedField {
    pub field: String,
    pub ordering: QueryOrdering,
    /// Language code for full-text fields
    #[serde(default)]
    pub language: Option<String>,
}

/// What a DeleteObject request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemObjectType {
    Table,
    Key,
}

/// Empty request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Empty success response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDetails {
    pub server_version: String,
    pub min_client_version: String,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentityRequest {
    pub handle: String,
    pub email: String,
    pub mobile: String,
    pub password: String,
    /// Base64 Ed25519 public key
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentityResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentityConfirm {
    pub id: String,
    /// Empty for primary identities; the owner id for sub-identities
    #[serde(default)]
    pub parent_id: String,
    pub verification_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateUser {
    /// Empty for primary identities; the owner id for sub-identities
    #[serde(default)]
    pub parent_id: String,
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateUserResponse {
    pub id: String,
    pub session_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubIdentityRequest {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub handle: String,
    pub email: String,
    pub mobile: String,
    pub password: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub signup_code: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

/// Empty/None fields mean "leave unchanged".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubIdentityModify {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub sub_id: String,
    #[serde(default)]
    pub new_handle: Option<String>,
    #[serde(default)]
    pub new_email: Option<String>,
    #[serde(default)]
    pub new_mobile: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub new_public_key: Option<String>,
    #[serde(default)]
    pub new_group_id: Option<String>,
}

/// Authenticated request with no other parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleRequest {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubIdentitySummary {
    pub id: String,
    pub handle: String,
    pub email: String,
    pub mobile: String,
    #[serde(default)]
    pub group_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubIdentitiesList {
    pub sub_identities: Vec<SubIdentitySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCreate {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub table: String,
    pub data_format: TableDataFormat,
    #[serde(default)]
    pub indexed_fields: Vec<IndexedField>,
    /// Whether session-token callers may touch this table's data paths
    #[serde(default = "default_true")]
    pub allow_token_auth: bool,
    /// Permission entries installed together with the table
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTablesRequest {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    /// Namespace to list; defaults to the caller's own
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptorMsg {
    pub owner_id: String,
    pub table: String,
    pub data_format: TableDataFormat,
    pub allow_token_auth: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTablesResponse {
    pub tables: Vec<TableDescriptorMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsEntry {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub table_owner_id: String,
    pub table: String,
    pub grant: PermissionGrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePut {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub table_owner_id: String,
    pub table: String,
    pub key: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    /// false turns the put into an insert that fails on existing keys
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPair {
    pub key: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePutMulti {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub table_owner_id: String,
    pub table: String,
    pub pairs: Vec<DataPair>,
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableGet {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub table_owner_id: String,
    pub table: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub page_index: u64,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableGetResponse {
    pub pairs: Vec<DataPair>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableQuery {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub table_owner_id: String,
    pub table: String,
    pub query: QueryExpr,
    #[serde(default)]
    pub page_index: u64,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListKeysRequest {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub table_owner_id: String,
    pub table: String,
    /// `""` or `"%"` lists everything, `p%` is a prefix scan, anything
    /// else is an exact match
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub page_index: u64,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListKeysResponse {
    pub keys: Vec<String>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSystemObjectRequest {
    #[serde(default)]
    pub credential: Option<ProofOfCredential>,
    pub object_type: SystemObjectType,
    pub table_owner_id: String,
    pub table: String,
    #[serde(default)]
    pub key: Option<String>,
}

/// Method-specific extra bytes covered by request signatures.
///
/// Signing these fields means a signature cannot be replayed against a
/// different table, key, value, or grant.
pub trait SigningExtra {
    fn signing_extra(&self) -> Vec<u8> {
        Vec::new()
    }
}

impl SigningExtra for NewSubIdentityRequest {}
impl SigningExtra for SubIdentityModify {}
impl SigningExtra for SimpleRequest {}
impl SigningExtra for ListTablesRequest {}
impl SigningExtra for TableGet {}
impl SigningExtra for TableQuery {}
impl SigningExtra for ListKeysRequest {}

impl SigningExtra for TableCreate {
    fn signing_extra(&self) -> Vec<u8> {
        let mut bytes = self.table.as_bytes().to_vec();
        for grant in &self.permissions {
            bytes.extend_from_slice(&grant.signing_bytes(&self.table));
        }
        bytes
    }
}

impl SigningExtra for PermissionsEntry {
    fn signing_extra(&self) -> Vec<u8> {
        self.grant.signing_bytes(&self.table)
    }
}

impl SigningExtra for TablePut {
    fn signing_extra(&self) -> Vec<u8> {
        let mut bytes = self.key.as_bytes().to_vec();
        bytes.extend_from_slice(&self.value);
        bytes
    }
}

impl SigningExtra for TablePutMulti {
    fn signing_extra(&self) -> Vec<u8> {
        let pairs: Vec<(String, Vec<u8>)> = self
            .pairs
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect();
        signing::multi_put_extra(&pairs)
    }
}

impl SigningExtra for DeleteSystemObjectRequest {
    fn signing_extra(&self) -> Vec<u8> {
        let mut bytes = self.table.as_bytes().to_vec();
        if let Some(key) = &self.key {
            bytes.extend_from_slice(key.as_bytes());
        }
        bytes
    }
}
