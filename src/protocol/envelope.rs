//! Request/response envelopes and the static method table.
//!
//! Each frame carries one envelope. Dispatch matches on the `Method` enum
//! exhaustively; `METHODS` is the compile-time descriptor table mapping
//! method names to their payload type names.

use crate::error::{ErrorCode, StrataDbError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Version of the envelope format itself.
pub const PROTOCOL_VERSION: u32 = 1;

/// The 16 operations of the RPC surface. All unary request/response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    VersionInfo,
    RegisterNewIdentity,
    ConfirmNewIdentity,
    LoginUser,
    CreateUser,
    ModifySubIdentity,
    ListSubIdentities,
    CreateTable,
    ListTables,
    SetPermission,
    PutData,
    PutDataMulti,
    GetData,
    QueryData,
    ListKeys,
    DeleteObject,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        self.descriptor().name
    }

    pub fn descriptor(self) -> &'static MethodDescriptor {
        &METHODS[self as usize]
    }
}

/// Compile-time descriptor of one method: its name and payload type names.
pub struct MethodDescriptor {
    pub name: &'static str,
    pub request: &'static str,
    pub response: &'static str,
}

/// Static method table, indexed by `Method as usize`.
pub static METHODS: [MethodDescriptor; 16] = [
    MethodDescriptor { name: "VersionInfo", request: "Empty", response: "VersionDetails" },
    MethodDescriptor { name: "RegisterNewIdentity", request: "NewIdentityRequest", response: "NewIdentityResponse" },
    MethodDescriptor { name: "ConfirmNewIdentity", request: "NewIdentityConfirm", response: "Ack" },
    MethodDescriptor { name: "LoginUser", request: "AuthenticateUser", response: "AuthenticateUserResponse" },
    MethodDescriptor { name: "CreateUser", request: "NewSubIdentityRequest", response: "NewIdentityResponse" },
    MethodDescriptor { name: "ModifySubIdentity", request: "SubIdentityModify", response: "Ack" },
    MethodDescriptor { name: "ListSubIdentities", request: "SimpleRequest", response: "SubIdentitiesList" },
    MethodDescriptor { name: "CreateTable", request: "TableCreate", response: "Ack" },
    MethodDescriptor { name: "ListTables", request: "ListTablesRequest", response: "ListTablesResponse" },
    MethodDescriptor { name: "SetPermission", request: "PermissionsEntry", response: "Ack" },
    MethodDescriptor { name: "PutData", request: "TablePut", response: "Ack" },
    MethodDescriptor { name: "PutDataMulti", request: "TablePutMulti", response: "Ack" },
    MethodDescriptor { name: "GetData", request: "TableGet", response: "TableGetResponse" },
    MethodDescriptor { name: "QueryData", request: "TableQuery", response: "TableGetResponse" },
    MethodDescriptor { name: "ListKeys", request: "ListKeysRequest", response: "ListKeysResponse" },
    MethodDescriptor { name: "DeleteObject", request: "DeleteSystemObjectRequest", response: "Ack" },
];

/// One inbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub version: u32,
    pub method: Method,
    /// Caller-supplied key/value metadata; carries the session token
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub payload: serde_json::Value,
}

/// One outbound reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub version: u32,
    pub result: RpcResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcResult {
    Ok(serde_json::Value),
    Err(WireError),
}

/// Structured error value: stable code + human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: u16,
    pub name: String,
    pub message: String,
}

impl ResponseEnvelope {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            result: RpcResult::Ok(payload),
        }
    }

    pub fn err(error: &StrataDbError) -> Self {
        let code = error.code();
        // Internal detail stays in the server log, not on the wire.
        let message = if code == ErrorCode::Internal {
            "internal error".to_string()
        } else {
            error.to_string()
        };
        Self {
            version: PROTOCOL_VERSION,
            result: RpcResult::Err(WireError {
                code: code.as_u16(),
                name: code.name().to_string(),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_table_is_aligned_with_the_enum() {
        assert_eq!(Method::VersionInfo.as_str(), "VersionInfo");
        assert_eq!(Method::DeleteObject.as_str(), "DeleteObject");
        assert_eq!(Method::PutDataMulti.descriptor().request, "TablePutMulti");
        assert_eq!(METHODS.len(), 16);
    }

    #[test]
    fn methods_serialize_by_name() {
        let json = serde_json::to_string(&Method::GetData).unwrap();
        assert_eq!(json, "\"GetData\"");
        let back: Method = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Method::GetData);
    }

    #[test]
    fn internal_errors_are_redacted_on_the_wire() {
        let response = ResponseEnvelope::err(&StrataDbError::Database("sled: /secret/path".into()));
        match response.result {
            RpcResult::Err(e) => {
                assert_eq!(e.code, ErrorCode::Internal.as_u16());
                assert!(!e.message.contains("secret"));
            }
            RpcResult::Ok(_) => panic!("expected error"),
        }
    }
}
