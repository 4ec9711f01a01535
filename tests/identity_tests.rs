//! Registration, confirmation, login, and sub-identity delegation.

mod common;

use common::{assert_err_code, open_node, open_node_with, test_config, PASSWORD};
use serde_json::json;
use stratadb::error::ErrorCode;
use stratadb::protocol::envelope::Method;

#[tokio::test]
async fn register_confirm_login_flow() {
    let harness = open_node();

    let registered = harness
        .call(
            Method::RegisterNewIdentity,
            None,
            json!({
                "handle": "alice",
                "email": "alice@example.com",
                "mobile": "+14155550101",
                "password": PASSWORD,
            }),
        )
        .await
        .unwrap();
    let id = registered["id"].as_str().unwrap().to_string();
    let code = harness.next_code().await;

    // Login is refused until the registration is confirmed.
    let early = harness
        .call(
            Method::LoginUser,
            None,
            json!({"handle": "alice", "password": PASSWORD}),
        )
        .await;
    assert_err_code(early, ErrorCode::InvalidCredentials);

    // Wrong code is refused, right code finalizes.
    let wrong = harness
        .call(
            Method::ConfirmNewIdentity,
            None,
            json!({"id": id, "verification_code": "000000x"}),
        )
        .await;
    assert_err_code(wrong, ErrorCode::InvalidConfirmation);
    harness
        .call(
            Method::ConfirmNewIdentity,
            None,
            json!({"id": id, "verification_code": code}),
        )
        .await
        .unwrap();

    // Replaying the successful confirmation stays successful.
    harness
        .call(
            Method::ConfirmNewIdentity,
            None,
            json!({"id": id, "verification_code": code}),
        )
        .await
        .unwrap();

    let wrong_password = harness
        .call(
            Method::LoginUser,
            None,
            json!({"handle": "alice", "password": "not-it-at-all"}),
        )
        .await;
    assert_err_code(wrong_password, ErrorCode::InvalidCredentials);

    let login = harness
        .call(
            Method::LoginUser,
            None,
            json!({"handle": "alice", "password": PASSWORD}),
        )
        .await
        .unwrap();
    assert_eq!(login["id"].as_str().unwrap(), id);
    let token = login["session_token"].as_str().unwrap();

    // The session token authenticates subsequent calls.
    let tables = harness
        .call(Method::ListTables, Some(token), json!({}))
        .await
        .unwrap();
    assert_eq!(tables["tables"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn duplicate_handle_is_rejected() {
    let harness = open_node();
    harness.new_identity("alice").await;

    let again = harness
        .call(
            Method::RegisterNewIdentity,
            None,
            json!({
                "handle": "alice",
                "email": "other@example.com",
                "mobile": "+14155550102",
                "password": PASSWORD,
            }),
        )
        .await;
    assert_err_code(again, ErrorCode::AlreadyExists);
}

#[tokio::test]
async fn confirming_unknown_id_fails() {
    let harness = open_node();
    let result = harness
        .call(
            Method::ConfirmNewIdentity,
            None,
            json!({"id": "no-such-id", "verification_code": "123456"}),
        )
        .await;
    assert_err_code(result, ErrorCode::InvalidConfirmation);
}

#[tokio::test]
async fn sub_identity_lifecycle() {
    let harness = open_node();
    let (alice_id, token) = harness.new_identity("alice").await;

    // Two sub-identities, confirmed against the parent id.
    let mut sub_ids = Vec::new();
    for handle in ["svc-ingest", "svc-report"] {
        let created = harness
            .call(
                Method::CreateUser,
                Some(&token),
                json!({
                    "handle": handle,
                    "email": format!("{}@example.com", handle),
                    "mobile": "+14155550103",
                    "password": PASSWORD,
                }),
            )
            .await
            .unwrap();
        let sub_id = created["id"].as_str().unwrap().to_string();
        let code = harness.next_code().await;

        // Confirmation must name the parent.
        let orphaned = harness
            .call(
                Method::ConfirmNewIdentity,
                None,
                json!({"id": sub_id, "verification_code": code}),
            )
            .await;
        assert_err_code(orphaned, ErrorCode::InvalidConfirmation);
        harness
            .call(
                Method::ConfirmNewIdentity,
                None,
                json!({"id": sub_id, "parent_id": alice_id, "verification_code": code}),
            )
            .await
            .unwrap();
        sub_ids.push(sub_id);
    }

    // Listed in insertion order.
    let listed = harness
        .call(Method::ListSubIdentities, Some(&token), json!({}))
        .await
        .unwrap();
    let listed: Vec<&str> = listed["sub_identities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(listed, sub_ids.iter().map(String::as_str).collect::<Vec<_>>());

    // Sub-identity logs in with the parent id qualifier.
    let login = harness
        .call(
            Method::LoginUser,
            None,
            json!({"parent_id": alice_id, "handle": "svc-ingest", "password": PASSWORD}),
        )
        .await
        .unwrap();
    assert_eq!(login["id"].as_str().unwrap(), sub_ids[0]);

    // Owner renames the sub-identity; login follows the new handle.
    harness
        .call(
            Method::ModifySubIdentity,
            Some(&token),
            json!({"sub_id": sub_ids[0], "new_handle": "svc-etl"}),
        )
        .await
        .unwrap();
    harness
        .call(
            Method::LoginUser,
            None,
            json!({"parent_id": alice_id, "handle": "svc-etl", "password": PASSWORD}),
        )
        .await
        .unwrap();
    let stale = harness
        .call(
            Method::LoginUser,
            None,
            json!({"parent_id": alice_id, "handle": "svc-ingest", "password": PASSWORD}),
        )
        .await;
    assert_err_code(stale, ErrorCode::InvalidCredentials);
}

#[tokio::test]
async fn sub_identities_cannot_delegate_further() {
    let harness = open_node();
    let (alice_id, token) = harness.new_identity("alice").await;

    let created = harness
        .call(
            Method::CreateUser,
            Some(&token),
            json!({
                "handle": "svc",
                "email": "svc@example.com",
                "mobile": "+14155550103",
                "password": PASSWORD,
            }),
        )
        .await
        .unwrap();
    let sub_id = created["id"].as_str().unwrap().to_string();
    let code = harness.next_code().await;
    harness
        .call(
            Method::ConfirmNewIdentity,
            None,
            json!({"id": sub_id, "parent_id": alice_id, "verification_code": code}),
        )
        .await
        .unwrap();

    let sub_login = harness
        .call(
            Method::LoginUser,
            None,
            json!({"parent_id": alice_id, "handle": "svc", "password": PASSWORD}),
        )
        .await
        .unwrap();
    let sub_token = sub_login["session_token"].as_str().unwrap().to_string();

    let nested = harness
        .call(
            Method::CreateUser,
            Some(&sub_token),
            json!({
                "handle": "deeper",
                "email": "deeper@example.com",
                "mobile": "+14155550104",
                "password": PASSWORD,
            }),
        )
        .await;
    assert_err_code(nested, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn sub_identity_quota_is_enforced() {
    let mut config = test_config();
    config.limits.max_sub_identities = 1;
    let harness = open_node_with(config);
    let (_, token) = harness.new_identity("alice").await;

    harness
        .call(
            Method::CreateUser,
            Some(&token),
            json!({
                "handle": "svc1",
                "email": "svc1@example.com",
                "mobile": "+14155550103",
                "password": PASSWORD,
            }),
        )
        .await
        .unwrap();
    harness.next_code().await;

    let over = harness
        .call(
            Method::CreateUser,
            Some(&token),
            json!({
                "handle": "svc2",
                "email": "svc2@example.com",
                "mobile": "+14155550104",
                "password": PASSWORD,
            }),
        )
        .await;
    assert_err_code(over, ErrorCode::QuotaExceeded);
}

#[tokio::test]
async fn signup_code_gates_sub_identity_creation() {
    let config = test_config().with_signup_code("sesame");
    let harness = open_node_with(config);
    let (_, token) = harness.new_identity("alice").await;

    let without = harness
        .call(
            Method::CreateUser,
            Some(&token),
            json!({
                "handle": "svc",
                "email": "svc@example.com",
                "mobile": "+14155550103",
                "password": PASSWORD,
            }),
        )
        .await;
    assert_err_code(without, ErrorCode::InvalidArgument);

    harness
        .call(
            Method::CreateUser,
            Some(&token),
            json!({
                "handle": "svc",
                "email": "svc@example.com",
                "mobile": "+14155550103",
                "password": PASSWORD,
                "signup_code": "sesame",
            }),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn repeated_login_failures_lock_the_account() {
    let mut config = test_config();
    config.auth_backoff_base_secs = 60;
    config.auth_backoff_max_secs = 900;
    let harness = open_node_with(config);
    harness.new_identity("alice").await;

    for _ in 0..3 {
        let attempt = harness
            .call(
                Method::LoginUser,
                None,
                json!({"handle": "alice", "password": "wrong-every-time"}),
            )
            .await;
        assert_err_code(attempt, ErrorCode::InvalidCredentials);
    }

    // Locked out now, even with the right password.
    let locked = harness
        .call(
            Method::LoginUser,
            None,
            json!({"handle": "alice", "password": PASSWORD}),
        )
        .await;
    assert_err_code(locked, ErrorCode::InvalidCredentials);
}

#[tokio::test]
async fn malformed_registration_fields_are_rejected() {
    let harness = open_node();
    for (field, value) in [
        ("handle", "has spaces"),
        ("email", "not-an-email"),
        ("mobile", "5550101"),
        ("password", "tiny"),
    ] {
        let mut payload = json!({
            "handle": "alice",
            "email": "alice@example.com",
            "mobile": "+14155550101",
            "password": PASSWORD,
        });
        payload[field] = json!(value);
        let result = harness.call(Method::RegisterNewIdentity, None, payload).await;
        assert_err_code(result, ErrorCode::InvalidArgument);
    }
}
