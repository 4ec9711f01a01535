//! Authorization: grants, audiences, levels, and key constraints, checked
//! end to end through dispatch.

mod common;

use common::{assert_err_code, b64, open_node, PASSWORD};
use serde_json::json;
use stratadb::error::ErrorCode;
use stratadb::protocol::envelope::Method;

async fn get_key(
    harness: &common::TestNode,
    token: &str,
    owner: &str,
    table: &str,
    key: &str,
) -> stratadb::StrataDbResult<serde_json::Value> {
    harness
        .call(
            Method::GetData,
            Some(token),
            json!({"table_owner_id": owner, "table": table, "keys": [key]}),
        )
        .await
}

#[tokio::test]
async fn strangers_are_denied_by_default() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (_, bob_token) = harness.new_identity("bob").await;

    harness.create_table(&alice_token, "notes").await;
    harness
        .put_json(&alice_token, &alice, "notes", "k1", json!({"n": 1}))
        .await
        .unwrap();

    let read = get_key(&harness, &bob_token, &alice, "notes", "k1").await;
    assert_err_code(read, ErrorCode::Unauthorized);
    let write = harness
        .put_json(&bob_token, &alice, "notes", "k2", json!({"n": 2}))
        .await;
    assert_err_code(write, ErrorCode::Unauthorized);

    // The table is invisible to bob as well.
    let listed = harness
        .call(
            Method::ListTables,
            Some(&bob_token),
            json!({"owner_id": alice}),
        )
        .await
        .unwrap();
    assert_eq!(listed["tables"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn read_grant_does_not_imply_write() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (bob, bob_token) = harness.new_identity("bob").await;

    harness.create_table(&alice_token, "notes").await;
    harness
        .put_json(&alice_token, &alice, "notes", "k1", json!({"n": 1}))
        .await
        .unwrap();

    harness
        .call(
            Method::SetPermission,
            Some(&alice_token),
            json!({
                "table_owner_id": alice,
                "table": "notes",
                "grant": {
                    "audience": {"type": "individual", "id": bob},
                    "level": "read",
                },
            }),
        )
        .await
        .unwrap();

    get_key(&harness, &bob_token, &alice, "notes", "k1")
        .await
        .unwrap();
    let write = harness
        .put_json(&bob_token, &alice, "notes", "k2", json!({"n": 2}))
        .await;
    assert_err_code(write, ErrorCode::Unauthorized);

    // Visibility follows readability.
    let listed = harness
        .call(
            Method::ListTables,
            Some(&bob_token),
            json!({"owner_id": alice}),
        )
        .await
        .unwrap();
    assert_eq!(listed["tables"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn higher_level_implies_lower() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (bob, bob_token) = harness.new_identity("bob").await;

    harness.create_table(&alice_token, "notes").await;
    harness
        .call(
            Method::SetPermission,
            Some(&alice_token),
            json!({
                "table_owner_id": alice,
                "table": "notes",
                "grant": {
                    "audience": {"type": "individual", "id": bob},
                    "level": "write",
                },
            }),
        )
        .await
        .unwrap();

    harness
        .put_json(&bob_token, &alice, "notes", "k1", json!({"n": 1}))
        .await
        .unwrap();
    get_key(&harness, &bob_token, &alice, "notes", "k1")
        .await
        .unwrap();
}

#[tokio::test]
async fn key_constrained_grant_scopes_rows() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (bob, bob_token) = harness.new_identity("bob").await;

    harness.create_table(&alice_token, "mailboxes").await;
    harness
        .call(
            Method::SetPermission,
            Some(&alice_token),
            json!({
                "table_owner_id": alice,
                "table": "mailboxes",
                "grant": {
                    "audience": {"type": "individual", "id": bob},
                    "level": "write",
                    "key_constraint": "@uid/%",
                },
            }),
        )
        .await
        .unwrap();

    // Writes under bob's own prefix pass; anything else is denied.
    harness
        .put_json(
            &bob_token,
            &alice,
            "mailboxes",
            &format!("{}/msg1", bob),
            json!({"body": "hi"}),
        )
        .await
        .unwrap();
    let outside = harness
        .put_json(&bob_token, &alice, "mailboxes", "alice/msg1", json!({"body": "hi"}))
        .await;
    assert_err_code(outside, ErrorCode::Unauthorized);

    // Table-spanning operations are never satisfied by a constrained grant.
    let predicate = serde_json::to_value(stratadb::query::q_eq(
        "body",
        stratadb::query::QueryLiteral::Str("hi".into()),
    ))
    .unwrap();
    let query = harness
        .call(
            Method::QueryData,
            Some(&bob_token),
            json!({
                "table_owner_id": alice,
                "table": "mailboxes",
                "query": predicate,
            }),
        )
        .await;
    assert_err_code(query, ErrorCode::Unauthorized);
    let keys = harness
        .call(
            Method::ListKeys,
            Some(&bob_token),
            json!({"table_owner_id": alice, "table": "mailboxes", "pattern": ""}),
        )
        .await;
    assert_err_code(keys, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn public_grant_admits_any_identity() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (_, carol_token) = harness.new_identity("carol").await;

    harness
        .call(
            Method::CreateTable,
            Some(&alice_token),
            json!({
                "table": "feed",
                "data_format": "json",
                "permissions": [
                    {"audience": {"type": "public"}, "level": "read"},
                ],
            }),
        )
        .await
        .unwrap();
    harness
        .put_json(&alice_token, &alice, "feed", "post-1", json!({"title": "hello"}))
        .await
        .unwrap();

    get_key(&harness, &carol_token, &alice, "feed", "post-1")
        .await
        .unwrap();
    let write = harness
        .put_json(&carol_token, &alice, "feed", "post-2", json!({"title": "spam"}))
        .await;
    assert_err_code(write, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn sub_users_grant_admits_only_the_owners_subs() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (_, bob_token) = harness.new_identity("bob").await;

    // A confirmed sub-identity of alice.
    let created = harness
        .call(
            Method::CreateUser,
            Some(&alice_token),
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
            json!({"id": sub_id, "parent_id": alice, "verification_code": code}),
        )
        .await
        .unwrap();
    let sub_login = harness
        .call(
            Method::LoginUser,
            None,
            json!({"parent_id": alice, "handle": "svc", "password": PASSWORD}),
        )
        .await
        .unwrap();
    let sub_token = sub_login["session_token"].as_str().unwrap().to_string();

    harness
        .call(
            Method::CreateTable,
            Some(&alice_token),
            json!({
                "table": "jobs",
                "data_format": "json",
                "permissions": [
                    {"audience": {"type": "sub_users"}, "level": "write"},
                ],
            }),
        )
        .await
        .unwrap();

    harness
        .put_json(&sub_token, &alice, "jobs", "job-1", json!({"state": "queued"}))
        .await
        .unwrap();
    let outsider = get_key(&harness, &bob_token, &alice, "jobs", "job-1").await;
    assert_err_code(outsider, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn set_permission_requires_admin() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (bob, bob_token) = harness.new_identity("bob").await;
    let (carol, _) = harness.new_identity("carol").await;

    harness.create_table(&alice_token, "notes").await;

    let grant_for_carol = json!({
        "table_owner_id": alice,
        "table": "notes",
        "grant": {
            "audience": {"type": "individual", "id": carol},
            "level": "read",
        },
    });
    let denied = harness
        .call(Method::SetPermission, Some(&bob_token), grant_for_carol.clone())
        .await;
    assert_err_code(denied, ErrorCode::Unauthorized);

    // With an Admin grant, bob can manage the table's permissions.
    harness
        .call(
            Method::SetPermission,
            Some(&alice_token),
            json!({
                "table_owner_id": alice,
                "table": "notes",
                "grant": {
                    "audience": {"type": "individual", "id": bob},
                    "level": "admin",
                },
            }),
        )
        .await
        .unwrap();
    harness
        .call(Method::SetPermission, Some(&bob_token), grant_for_carol)
        .await
        .unwrap();
}

#[tokio::test]
async fn regrant_replaces_the_previous_level() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;
    let (bob, bob_token) = harness.new_identity("bob").await;

    harness.create_table(&alice_token, "notes").await;
    let grant = |level: &str| {
        json!({
            "table_owner_id": alice,
            "table": "notes",
            "grant": {
                "audience": {"type": "individual", "id": bob},
                "level": level,
            },
        })
    };

    harness
        .call(Method::SetPermission, Some(&alice_token), grant("write"))
        .await
        .unwrap();
    harness
        .put_json(&bob_token, &alice, "notes", "k1", json!({"n": 1}))
        .await
        .unwrap();

    // Downgrade to read: writes stop, reads continue.
    harness
        .call(Method::SetPermission, Some(&alice_token), grant("read"))
        .await
        .unwrap();
    let write = harness
        .put_json(&bob_token, &alice, "notes", "k2", json!({"n": 2}))
        .await;
    assert_err_code(write, ErrorCode::Unauthorized);
    get_key(&harness, &bob_token, &alice, "notes", "k1")
        .await
        .unwrap();
}

#[tokio::test]
async fn granting_on_a_missing_table_fails() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;

    let result = harness
        .call(
            Method::SetPermission,
            Some(&alice_token),
            json!({
                "table_owner_id": alice,
                "table": "ghost",
                "grant": {"audience": {"type": "public"}, "level": "read"},
            }),
        )
        .await;
    assert_err_code(result, ErrorCode::NotFound);
}

#[tokio::test]
async fn signature_only_table_rejects_token_callers() {
    let harness = open_node();
    let (alice, alice_token) = harness.new_identity("alice").await;

    harness
        .call(
            Method::CreateTable,
            Some(&alice_token),
            json!({"table": "vault", "data_format": "binary", "allow_token_auth": false}),
        )
        .await
        .unwrap();

    // Even the owner is refused over a session token on the data path.
    let put = harness
        .call(
            Method::PutData,
            Some(&alice_token),
            json!({
                "table_owner_id": alice,
                "table": "vault",
                "key": "secret",
                "value": b64(b"payload"),
            }),
        )
        .await;
    assert_err_code(put, ErrorCode::Unauthorized);
}
