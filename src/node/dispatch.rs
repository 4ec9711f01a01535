//! Per-method request handling: decode, authenticate, authorize, execute.
//!
//! Every call follows the same sequence. The payload is decoded into its
//! typed request, the credential (token or signature) is resolved with the
//! request's signing extra, the permission engine is consulted, and only
//! then does the operation touch a component. Authorization cannot be
//! bypassed because dispatch is the only entry point.

use crate::error::{StrataDbError, StrataDbResult};
use crate::identity::NewIdentitySpec;
use crate::node::StrataNode;
use crate::permissions::PermissionLevel;
use crate::protocol::envelope::{Method, RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION};
use crate::protocol::messages::*;
use crate::store::Page;
use crate::{catalog::TableDescriptor, crypto::PublicKey};
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

fn decode<T: DeserializeOwned>(payload: serde_json::Value) -> StrataDbResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| StrataDbError::InvalidArgument(format!("Malformed payload: {}", e)))
}

fn encode<T: Serialize>(response: &T) -> StrataDbResult<serde_json::Value> {
    Ok(serde_json::to_value(response)?)
}

fn parse_public_key(encoded: &Option<String>) -> StrataDbResult<Option<PublicKey>> {
    match encoded.as_deref().filter(|s| !s.is_empty()) {
        Some(b64) => Ok(Some(PublicKey::from_base64(b64).map_err(|e| {
            StrataDbError::InvalidArgument(format!("Bad public key: {}", e))
        })?)),
        None => Ok(None),
    }
}

impl StrataNode {
    /// Handle one envelope. Never returns an error; failures become error
    /// envelopes and internal detail stays in the server log.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        if request.version != PROTOCOL_VERSION {
            return ResponseEnvelope::err(&StrataDbError::InvalidArgument(format!(
                "Unsupported protocol version {}",
                request.version
            )));
        }
        let method = request.method;
        match self.handle(method, &request.metadata, request.payload).await {
            Ok(payload) => ResponseEnvelope::ok(payload),
            Err(err) => {
                match &err {
                    StrataDbError::Database(_)
                    | StrataDbError::Io(_)
                    | StrataDbError::Internal(_) => {
                        error!("{} failed: {}", method.as_str(), err)
                    }
                    _ => debug!("{} rejected: {}", method.as_str(), err),
                }
                ResponseEnvelope::err(&err)
            }
        }
    }

    async fn handle(
        &self,
        method: Method,
        metadata: &HashMap<String, String>,
        payload: serde_json::Value,
    ) -> StrataDbResult<serde_json::Value> {
        match method {
            Method::VersionInfo => {
                let _: Empty = decode(payload)?;
                encode(&VersionDetails {
                    server_version: crate::constants::SERVER_VERSION.to_string(),
                    min_client_version: crate::constants::MIN_CLIENT_VERSION.to_string(),
                    protocol_version: PROTOCOL_VERSION,
                })
            }

            Method::RegisterNewIdentity => {
                let req: NewIdentityRequest = decode(payload)?;
                let spec = NewIdentitySpec {
                    handle: req.handle,
                    email: req.email,
                    mobile: req.mobile,
                    password: req.password,
                    public_key: parse_public_key(&req.public_key)?,
                    group_id: None,
                };
                let id = self.identities.register(spec).await?;
                encode(&NewIdentityResponse { id })
            }

            Method::ConfirmNewIdentity => {
                let req: NewIdentityConfirm = decode(payload)?;
                self.identities
                    .confirm(&req.id, &req.parent_id, &req.verification_code)?;
                encode(&Ack {})
            }

            Method::LoginUser => {
                let req: AuthenticateUser = decode(payload)?;
                let identity =
                    self.identities
                        .verify_login(&req.parent_id, &req.handle, &req.password)?;
                let (session_token, expires_at) =
                    self.verifier.sessions().issue(&identity)?;
                encode(&AuthenticateUserResponse {
                    id: identity.id,
                    session_token,
                    expires_at,
                })
            }

            Method::CreateUser => {
                let req: NewSubIdentityRequest = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let spec = NewIdentitySpec {
                    handle: req.handle,
                    email: req.email,
                    mobile: req.mobile,
                    password: req.password,
                    public_key: parse_public_key(&req.public_key)?,
                    group_id: req.group_id,
                };
                let id = self
                    .identities
                    .create_sub_identity(&ctx.identity, spec, req.signup_code.as_deref())
                    .await?;
                encode(&NewIdentityResponse { id })
            }

            Method::ModifySubIdentity => {
                let req: SubIdentityModify = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                self.identities.modify_sub_identity(&ctx.identity.id, &req)?;
                encode(&Ack {})
            }

            Method::ListSubIdentities => {
                let req: SimpleRequest = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let sub_identities = self
                    .identities
                    .list_sub_identities(&ctx.identity.id)?
                    .iter()
                    .map(|r| r.summary())
                    .collect();
                encode(&SubIdentitiesList { sub_identities })
            }

            Method::CreateTable => {
                let req: TableCreate = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                self.catalog
                    .create(&self.permissions, &ctx.identity.id, &req)?;
                encode(&Ack {})
            }

            Method::ListTables => {
                let req: ListTablesRequest = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let namespace = req
                    .owner_id
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(&ctx.identity.id);
                let tables = self
                    .catalog
                    .list_visible(&self.permissions, &ctx.identity, namespace)?
                    .iter()
                    .map(TableDescriptor::to_msg)
                    .collect();
                encode(&ListTablesResponse { tables })
            }

            Method::SetPermission => {
                let req: PermissionsEntry = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                self.catalog.require(&req.table_owner_id, &req.table)?;
                self.authorize(
                    &ctx,
                    &req.table_owner_id,
                    &req.table,
                    PermissionLevel::Admin,
                    None,
                )?;
                self.permissions
                    .set(&req.table_owner_id, &req.table, &req.grant)?;
                encode(&Ack {})
            }

            Method::PutData => {
                let req: TablePut = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let descriptor = self.catalog.require(&req.table_owner_id, &req.table)?;
                self.check_token_policy(&descriptor, &ctx)?;
                self.authorize(
                    &ctx,
                    &req.table_owner_id,
                    &req.table,
                    PermissionLevel::Write,
                    Some(&req.key),
                )?;
                self.store
                    .put(&descriptor, &req.key, &req.value, req.overwrite)
                    .await?;
                encode(&Ack {})
            }

            Method::PutDataMulti => {
                let req: TablePutMulti = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let descriptor = self.catalog.require(&req.table_owner_id, &req.table)?;
                self.check_token_policy(&descriptor, &ctx)?;
                for pair in &req.pairs {
                    self.authorize(
                        &ctx,
                        &req.table_owner_id,
                        &req.table,
                        PermissionLevel::Write,
                        Some(&pair.key),
                    )?;
                }
                self.store
                    .put_multi(&descriptor, &req.pairs, req.overwrite)
                    .await?;
                encode(&Ack {})
            }

            Method::GetData => {
                let req: TableGet = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let descriptor = self.catalog.require(&req.table_owner_id, &req.table)?;
                self.check_token_policy(&descriptor, &ctx)?;
                for key in &req.keys {
                    self.authorize(
                        &ctx,
                        &req.table_owner_id,
                        &req.table,
                        PermissionLevel::Read,
                        Some(key),
                    )?;
                }
                let page = Page::new(req.page_index, req.page_size, &self.config.limits);
                let (pairs, has_next_page) =
                    self.store.get_page(&descriptor, &req.keys, &page).await?;
                encode(&TableGetResponse {
                    pairs,
                    has_next_page,
                })
            }

            Method::QueryData => {
                let req: TableQuery = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let descriptor = self.catalog.require(&req.table_owner_id, &req.table)?;
                self.check_token_policy(&descriptor, &ctx)?;
                // Queries span the table, so key-constrained grants never apply.
                self.authorize(
                    &ctx,
                    &req.table_owner_id,
                    &req.table,
                    PermissionLevel::Read,
                    None,
                )?;
                let page = Page::new(req.page_index, req.page_size, &self.config.limits);
                let (pairs, has_next_page) =
                    self.store.query_page(&descriptor, &req.query, &page).await?;
                encode(&TableGetResponse {
                    pairs,
                    has_next_page,
                })
            }

            Method::ListKeys => {
                let req: ListKeysRequest = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let descriptor = self.catalog.require(&req.table_owner_id, &req.table)?;
                self.check_token_policy(&descriptor, &ctx)?;
                self.authorize(
                    &ctx,
                    &req.table_owner_id,
                    &req.table,
                    PermissionLevel::Read,
                    None,
                )?;
                let page = Page::new(req.page_index, req.page_size, &self.config.limits);
                let (keys, has_next_page) =
                    self.store.list_keys(&descriptor, &req.pattern, &page).await?;
                encode(&ListKeysResponse {
                    keys,
                    has_next_page,
                })
            }

            Method::DeleteObject => {
                let req: DeleteSystemObjectRequest = decode(payload)?;
                let ctx = self.verifier.resolve(
                    metadata,
                    req.credential.as_ref(),
                    &req.signing_extra(),
                )?;
                let descriptor = self.catalog.require(&req.table_owner_id, &req.table)?;
                match req.object_type {
                    SystemObjectType::Table => {
                        self.authorize(
                            &ctx,
                            &req.table_owner_id,
                            &req.table,
                            PermissionLevel::Admin,
                            None,
                        )?;
                        self.catalog
                            .delete(&self.permissions, &req.table_owner_id, &req.table)?;
                        self.store
                            .drop_table(&req.table_owner_id, &req.table)
                            .await?;
                    }
                    SystemObjectType::Key => {
                        let key = req.key.as_deref().ok_or_else(|| {
                            StrataDbError::InvalidArgument(
                                "Key deletion requires a key".to_string(),
                            )
                        })?;
                        self.check_token_policy(&descriptor, &ctx)?;
                        self.authorize(
                            &ctx,
                            &req.table_owner_id,
                            &req.table,
                            PermissionLevel::Write,
                            Some(key),
                        )?;
                        self.store.delete_key(&descriptor, key).await?;
                    }
                }
                encode(&Ack {})
            }
        }
    }

    fn authorize(
        &self,
        ctx: &crate::auth::RequestContext,
        owner: &str,
        table: &str,
        required: PermissionLevel,
        key: Option<&str>,
    ) -> StrataDbResult<()> {
        let allowed = self.permissions.check(
            &ctx.identity.id,
            ctx.identity.owner_id.as_deref(),
            owner,
            table,
            required,
            key,
        )?;
        if allowed {
            Ok(())
        } else {
            Err(StrataDbError::Unauthorized(format!(
                "Missing {:?} permission on {}/{}",
                required, owner, table
            )))
        }
    }

    /// Tables created with `allow_token_auth = false` only accept
    /// signature-authenticated callers on their data paths.
    fn check_token_policy(
        &self,
        descriptor: &TableDescriptor,
        ctx: &crate::auth::RequestContext,
    ) -> StrataDbResult<()> {
        if !descriptor.allow_token_auth && ctx.via_token {
            return Err(StrataDbError::Unauthorized(
                "This table requires signature authentication".to_string(),
            ));
        }
        Ok(())
    }
}
