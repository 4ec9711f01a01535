//! Typed client for the StrataDB wire protocol.
//!
//! One TCP connection, one in-flight request at a time (calls serialize on
//! an internal mutex). Authentication is either a session token obtained
//! from [`StrataClient::login`] or per-request Ed25519 signatures after
//! [`StrataClient::set_signing_identity`]. When both are present the
//! signature wins, since signature-only tables reject token callers.

use crate::constants::{SERVER_VERSION, SESSION_TOKEN_KEY};
use crate::crypto::{sign_message, PublicKey};
use crate::error::{StrataDbError, StrataDbResult};
use crate::permissions::PermissionGrant;
use crate::protocol::envelope::{
    Method, RequestEnvelope, ResponseEnvelope, RpcResult, PROTOCOL_VERSION,
};
use crate::protocol::messages::*;
use crate::protocol::wire::{read_frame, write_frame};
use crate::query::QueryExpr;
use ed25519_dalek::SigningKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

pub struct StrataClient {
    stream: Mutex<TcpStream>,
    session_token: Option<String>,
    identity_id: Option<String>,
    signing_key: Option<SigningKey>,
    nonce: AtomicI64,
}

fn nonce_seed() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i64,
        Err(_) => 1,
    }
}

/// `a >= b` under dotted numeric version ordering; missing segments are 0.
fn version_at_least(a: &str, b: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    for i in 0..a.len().max(b.len()) {
        let (x, y) = (
            a.get(i).copied().unwrap_or(0),
            b.get(i).copied().unwrap_or(0),
        );
        if x != y {
            return x > y;
        }
    }
    true
}

impl StrataClient {
    /// Connect and verify version compatibility with the server.
    pub async fn connect(addr: &str) -> StrataDbResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let client = Self {
            stream: Mutex::new(stream),
            session_token: None,
            identity_id: None,
            signing_key: None,
            nonce: AtomicI64::new(nonce_seed()),
        };
        let version = client.version_info().await?;
        if version.protocol_version != PROTOCOL_VERSION {
            return Err(StrataDbError::InvalidArgument(format!(
                "Server speaks protocol {}, client speaks {}",
                version.protocol_version, PROTOCOL_VERSION
            )));
        }
        // This build's own version must satisfy the server's floor.
        if !version_at_least(SERVER_VERSION, &version.min_client_version) {
            return Err(StrataDbError::InvalidArgument(format!(
                "Server requires client {} or newer",
                version.min_client_version
            )));
        }
        Ok(client)
    }

    /// Use per-request signature authentication as `identity_id`.
    pub fn set_signing_identity(&mut self, identity_id: String, key: SigningKey) {
        self.identity_id = Some(identity_id);
        self.signing_key = Some(key);
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Resume an earlier session without logging in again.
    pub fn set_session_token(&mut self, token: String) {
        self.session_token = Some(token);
    }

    fn next_nonce(&self) -> i64 {
        self.nonce.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// A signature credential over `extra`, or None when running on a
    /// session token.
    fn proof(&self, extra: &[u8]) -> Option<ProofOfCredential> {
        let (id, key) = match (&self.identity_id, &self.signing_key) {
            (Some(id), Some(key)) => (id, key),
            _ => return None,
        };
        let nonce = self.next_nonce();
        let digest = crate::crypto::signing::request_digest(id, nonce, extra);
        Some(ProofOfCredential {
            caller_id: id.clone(),
            nonce,
            signature: sign_message(key, &digest).to_vec(),
        })
    }

    async fn call<Q, R>(&self, method: Method, payload: &Q) -> StrataDbResult<R>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let mut metadata = HashMap::new();
        if self.signing_key.is_none() {
            if let Some(token) = &self.session_token {
                metadata.insert(SESSION_TOKEN_KEY.to_string(), token.clone());
            }
        }
        let envelope = RequestEnvelope {
            version: PROTOCOL_VERSION,
            method,
            metadata,
            payload: serde_json::to_value(payload)?,
        };

        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &envelope).await?;
        let response: Option<ResponseEnvelope> = read_frame(&mut *stream).await?;
        drop(stream);

        let response = response.ok_or_else(|| {
            StrataDbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ))
        })?;
        match response.result {
            RpcResult::Ok(value) => Ok(serde_json::from_value(value)?),
            RpcResult::Err(wire) => Err(StrataDbError::from_wire(wire.code, wire.message)),
        }
    }

    pub async fn version_info(&self) -> StrataDbResult<VersionDetails> {
        self.call(Method::VersionInfo, &Empty {}).await
    }

    /// Start a registration; the verification code goes out of band.
    pub async fn register(
        &self,
        handle: &str,
        email: &str,
        mobile: &str,
        password: &str,
        public_key: Option<&PublicKey>,
    ) -> StrataDbResult<String> {
        let request = NewIdentityRequest {
            handle: handle.to_string(),
            email: email.to_string(),
            mobile: mobile.to_string(),
            password: password.to_string(),
            public_key: public_key.map(|k| k.to_base64()),
        };
        let response: NewIdentityResponse =
            self.call(Method::RegisterNewIdentity, &request).await?;
        Ok(response.id)
    }

    pub async fn confirm(&self, id: &str, parent_id: &str, code: &str) -> StrataDbResult<()> {
        let request = NewIdentityConfirm {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            verification_code: code.to_string(),
        };
        let _: Ack = self.call(Method::ConfirmNewIdentity, &request).await?;
        Ok(())
    }

    /// Log in and keep the session token for subsequent calls. Pass an
    /// empty `parent_id` for primary identities.
    pub async fn login(
        &mut self,
        parent_id: &str,
        handle: &str,
        password: &str,
    ) -> StrataDbResult<AuthenticateUserResponse> {
        let request = AuthenticateUser {
            parent_id: parent_id.to_string(),
            handle: handle.to_string(),
            password: password.to_string(),
        };
        let response: AuthenticateUserResponse = self.call(Method::LoginUser, &request).await?;
        self.session_token = Some(response.session_token.clone());
        Ok(response)
    }

    pub async fn create_sub_identity(
        &self,
        mut request: NewSubIdentityRequest,
    ) -> StrataDbResult<String> {
        request.credential = self.proof(&request.signing_extra());
        let response: NewIdentityResponse = self.call(Method::CreateUser, &request).await?;
        Ok(response.id)
    }

    pub async fn modify_sub_identity(&self, mut request: SubIdentityModify) -> StrataDbResult<()> {
        request.credential = self.proof(&request.signing_extra());
        let _: Ack = self.call(Method::ModifySubIdentity, &request).await?;
        Ok(())
    }

    pub async fn list_sub_identities(&self) -> StrataDbResult<Vec<SubIdentitySummary>> {
        let mut request = SimpleRequest::default();
        request.credential = self.proof(&request.signing_extra());
        let response: SubIdentitiesList = self.call(Method::ListSubIdentities, &request).await?;
        Ok(response.sub_identities)
    }

    pub async fn create_table(&self, mut request: TableCreate) -> StrataDbResult<()> {
        request.credential = self.proof(&request.signing_extra());
        let _: Ack = self.call(Method::CreateTable, &request).await?;
        Ok(())
    }

    /// Tables visible to the caller in `owner`'s namespace (own namespace
    /// when `None`).
    pub async fn list_tables(
        &self,
        owner: Option<&str>,
    ) -> StrataDbResult<Vec<TableDescriptorMsg>> {
        let mut request = ListTablesRequest {
            credential: None,
            owner_id: owner.map(|s| s.to_string()),
        };
        request.credential = self.proof(&request.signing_extra());
        let response: ListTablesResponse = self.call(Method::ListTables, &request).await?;
        Ok(response.tables)
    }

    pub async fn set_permission(
        &self,
        table_owner_id: &str,
        table: &str,
        grant: PermissionGrant,
    ) -> StrataDbResult<()> {
        let mut request = PermissionsEntry {
            credential: None,
            table_owner_id: table_owner_id.to_string(),
            table: table.to_string(),
            grant,
        };
        request.credential = self.proof(&request.signing_extra());
        let _: Ack = self.call(Method::SetPermission, &request).await?;
        Ok(())
    }

    pub async fn put(
        &self,
        table_owner_id: &str,
        table: &str,
        key: &str,
        value: Vec<u8>,
        overwrite: bool,
    ) -> StrataDbResult<()> {
        let mut request = TablePut {
            credential: None,
            table_owner_id: table_owner_id.to_string(),
            table: table.to_string(),
            key: key.to_string(),
            value,
            overwrite,
        };
        request.credential = self.proof(&request.signing_extra());
        let _: Ack = self.call(Method::PutData, &request).await?;
        Ok(())
    }

    /// Atomic batch put: all pairs land or none do.
    pub async fn put_multi(
        &self,
        table_owner_id: &str,
        table: &str,
        pairs: Vec<DataPair>,
        overwrite: bool,
    ) -> StrataDbResult<()> {
        let mut request = TablePutMulti {
            credential: None,
            table_owner_id: table_owner_id.to_string(),
            table: table.to_string(),
            pairs,
            overwrite,
        };
        request.credential = self.proof(&request.signing_extra());
        let _: Ack = self.call(Method::PutDataMulti, &request).await?;
        Ok(())
    }

    pub async fn get(
        &self,
        table_owner_id: &str,
        table: &str,
        keys: Vec<String>,
        page_index: u64,
        page_size: Option<usize>,
    ) -> StrataDbResult<TableGetResponse> {
        let mut request = TableGet {
            credential: None,
            table_owner_id: table_owner_id.to_string(),
            table: table.to_string(),
            keys,
            page_index,
            page_size,
        };
        request.credential = self.proof(&request.signing_extra());
        self.call(Method::GetData, &request).await
    }

    pub async fn query(
        &self,
        table_owner_id: &str,
        table: &str,
        query: QueryExpr,
        page_index: u64,
        page_size: Option<usize>,
    ) -> StrataDbResult<TableGetResponse> {
        let mut request = TableQuery {
            credential: None,
            table_owner_id: table_owner_id.to_string(),
            table: table.to_string(),
            query,
            page_index,
            page_size,
        };
        request.credential = self.proof(&request.signing_extra());
        self.call(Method::QueryData, &request).await
    }

    pub async fn list_keys(
        &self,
        table_owner_id: &str,
        table: &str,
        pattern: &str,
        page_index: u64,
        page_size: Option<usize>,
    ) -> StrataDbResult<ListKeysResponse> {
        let mut request = ListKeysRequest {
            credential: None,
            table_owner_id: table_owner_id.to_string(),
            table: table.to_string(),
            pattern: pattern.to_string(),
            page_index,
            page_size,
        };
        request.credential = self.proof(&request.signing_extra());
        self.call(Method::ListKeys, &request).await
    }

    /// Delete a table and everything in it.
    pub async fn delete_table(&self, table_owner_id: &str, table: &str) -> StrataDbResult<()> {
        self.delete_object(table_owner_id, table, SystemObjectType::Table, None)
            .await
    }

    /// Delete one key from a table.
    pub async fn delete_key(
        &self,
        table_owner_id: &str,
        table: &str,
        key: &str,
    ) -> StrataDbResult<()> {
        self.delete_object(
            table_owner_id,
            table,
            SystemObjectType::Key,
            Some(key.to_string()),
        )
        .await
    }

    async fn delete_object(
        &self,
        table_owner_id: &str,
        table: &str,
        object_type: SystemObjectType,
        key: Option<String>,
    ) -> StrataDbResult<()> {
        let mut request = DeleteSystemObjectRequest {
            credential: None,
            object_type,
            table_owner_id: table_owner_id.to_string(),
            table: table.to_string(),
            key,
        };
        request.credential = self.proof(&request.signing_extra());
        let _: Ack = self.call(Method::DeleteObject, &request).await?;
        Ok(())
    }
}
