//! Shared harness: an in-memory node driven through dispatch, with
//! verification codes captured over a channel.
#![allow(dead_code)] // each test binary uses a different subset

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use stratadb::config::NodeConfig;
use stratadb::error::{StrataDbError, StrataDbResult};
use stratadb::identity::ChannelDelivery;
use stratadb::node::StrataNode;
use stratadb::protocol::envelope::{Method, RequestEnvelope, RpcResult, PROTOCOL_VERSION};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;

pub const PASSWORD: &str = "hunter2-pw";

pub struct TestNode {
    pub node: Arc<StrataNode>,
    pub db: sled::Db,
    codes: Mutex<UnboundedReceiver<(String, String)>>,
}

pub fn test_config() -> NodeConfig {
    NodeConfig::new("unused".into()).with_listen_address("127.0.0.1:0")
}

pub fn open_node_with(config: NodeConfig) -> TestNode {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let (delivery, codes) = ChannelDelivery::new();
    let node = StrataNode::open_with_db(db.clone(), config, Arc::new(delivery)).unwrap();
    TestNode {
        node: Arc::new(node),
        db,
        codes: Mutex::new(codes),
    }
}

pub fn open_node() -> TestNode {
    open_node_with(test_config())
}

/// Open a node over an existing sled handle; used by restart tests.
pub fn open_node_on(db: sled::Db, config: NodeConfig) -> TestNode {
    let (delivery, codes) = ChannelDelivery::new();
    let node = StrataNode::open_with_db(db.clone(), config, Arc::new(delivery)).unwrap();
    TestNode {
        node: Arc::new(node),
        db,
        codes: Mutex::new(codes),
    }
}

impl TestNode {
    /// Dispatch one call, unwrapping the envelope into a plain Result.
    pub async fn call(
        &self,
        method: Method,
        token: Option<&str>,
        payload: serde_json::Value,
    ) -> StrataDbResult<serde_json::Value> {
        let mut metadata = HashMap::new();
        if let Some(token) = token {
            metadata.insert("session-token".to_string(), token.to_string());
        }
        let response = self
            .node
            .dispatch(RequestEnvelope {
                version: PROTOCOL_VERSION,
                method,
                metadata,
                payload,
            })
            .await;
        match response.result {
            RpcResult::Ok(value) => Ok(value),
            RpcResult::Err(wire) => Err(StrataDbError::from_wire(wire.code, wire.message)),
        }
    }

    /// The verification code from the most recent registration.
    pub async fn next_code(&self) -> String {
        self.codes
            .lock()
            .await
            .recv()
            .await
            .expect("no verification code delivered")
            .1
    }

    /// Register, confirm, and log in a primary identity. Returns
    /// (identity id, session token).
    pub async fn new_identity(&self, handle: &str) -> (String, String) {
        let registered = self
            .call(
                Method::RegisterNewIdentity,
                None,
                json!({
                    "handle": handle,
                    "email": format!("{}@example.com", handle),
                    "mobile": "+14155550101",
                    "password": PASSWORD,
                }),
            )
            .await
            .unwrap();
        let id = registered["id"].as_str().unwrap().to_string();
        let code = self.next_code().await;
        self.call(
            Method::ConfirmNewIdentity,
            None,
            json!({"id": id, "verification_code": code}),
        )
        .await
        .unwrap();
        let login = self
            .call(
                Method::LoginUser,
                None,
                json!({"handle": handle, "password": PASSWORD}),
            )
            .await
            .unwrap();
        let token = login["session_token"].as_str().unwrap().to_string();
        (id, token)
    }

    /// Create a JSON-format table in the caller's namespace.
    pub async fn create_table(&self, token: &str, name: &str) {
        self.call(
            Method::CreateTable,
            Some(token),
            json!({"table": name, "data_format": "json"}),
        )
        .await
        .unwrap();
    }

    /// Put a JSON value under a key.
    pub async fn put_json(
        &self,
        token: &str,
        owner: &str,
        table: &str,
        key: &str,
        value: serde_json::Value,
    ) -> StrataDbResult<serde_json::Value> {
        self.call(
            Method::PutData,
            Some(token),
            json!({
                "table_owner_id": owner,
                "table": table,
                "key": key,
                "value": b64(value.to_string().as_bytes()),
            }),
        )
        .await
    }
}

pub fn b64(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn from_b64(encoded: &str) -> Vec<u8> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap()
}

/// Assert an error carries the expected wire code.
pub fn assert_err_code(result: StrataDbResult<serde_json::Value>, code: stratadb::ErrorCode) {
    match result {
        Err(e) => assert_eq!(e.code(), code, "unexpected error: {}", e),
        Ok(v) => panic!("expected {:?}, got Ok({:?})", code, v),
    }
}
