//! Storage engine behavior through the RPC surface: durability semantics,
//! batch atomicity, pagination, listing, and cascading deletion.

mod common;

use common::{assert_err_code, b64, from_b64, open_node, open_node_with, test_config};
use serde_json::json;
use stratadb::error::ErrorCode;
use stratadb::protocol::envelope::Method;

#[tokio::test]
async fn put_get_roundtrip_preserves_bytes() {
    let harness = open_node();
    let (alice, token) = harness.new_identity("alice").await;
    harness
        .call(
            Method::CreateTable,
            Some(&token),
            json!({"table": "blobs", "data_format": "binary"}),
        )
        .await
        .unwrap();

    let value = vec![0u8, 159, 146, 150, 255];
    harness
        .call(
            Method::PutData,
            Some(&token),
            json!({
                "table_owner_id": alice,
                "table": "blobs",
                "key": "b1",
                "value": b64(&value),
            }),
        )
        .await
        .unwrap();

    let got = harness
        .call(
            Method::GetData,
            Some(&token),
            json!({"table_owner_id": alice, "table": "blobs", "keys": ["b1"]}),
        )
        .await
        .unwrap();
    let pairs = got["pairs"].as_array().unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(from_b64(pairs[0]["value"].as_str().unwrap()), value);
    assert!(!got["has_next_page"].as_bool().unwrap());
}

#[tokio::test]
async fn overwrite_false_is_insert_only() {
    let harness = open_node();
    let (alice, token) = harness.new_identity("alice").await;
    harness.create_table(&token, "notes").await;

    let put = |overwrite: bool, n: u64| {
        json!({
            "table_owner_id": alice,
            "table": "notes",
            "key": "k1",
            "value": b64(json!({"n": n}).to_string().as_bytes()),
            "overwrite": overwrite,
        })
    };

    harness
        .call(Method::PutData, Some(&token), put(false, 1))
        .await
        .unwrap();
    let collision = harness
        .call(Method::PutData, Some(&token), put(false, 2))
        .await;
    assert_err_code(collision, ErrorCode::AlreadyExists);

    // Overwrite mode replaces, and insert works again after deletion.
    harness
        .call(Method::PutData, Some(&token), put(true, 3))
        .await
        .unwrap();
    harness
        .call(
            Method::DeleteObject,
            Some(&token),
            json!({
                "object_type": "key",
                "table_owner_id": alice,
                "table": "notes",
                "key": "k1",
            }),
        )
        .await
        .unwrap();
    harness
        .call(Method::PutData, Some(&token), put(false, 4))
        .await
        .unwrap();
}

#[tokio::test]
async fn batch_put_is_atomic() {
    let mut config = test_config();
    config.limits.max_value_bytes = 64;
    let harness = open_node_with(config);
    let (alice, token) = harness.new_identity("alice").await;
    harness
        .call(
            Method::CreateTable,
            Some(&token),
            json!({"table": "rows", "data_format": "plain_text"}),
        )
        .await
        .unwrap();

    // One oversized value fails the whole batch before anything lands.
    let oversized = "x".repeat(100);
    let failed = harness
        .call(
            Method::PutDataMulti,
            Some(&token),
            json!({
                "table_owner_id": alice,
                "table": "rows",
                "pairs": [
                    {"key": "a", "value": b64(b"ok")},
                    {"key": "b", "value": b64(oversized.as_bytes())},
                ],
            }),
        )
        .await;
    assert_err_code(failed, ErrorCode::InvalidArgument);

    let keys = harness
        .call(
            Method::ListKeys,
            Some(&token),
            json!({"table_owner_id": alice, "table": "rows", "pattern": ""}),
        )
        .await
        .unwrap();
    assert_eq!(keys["keys"].as_array().unwrap().len(), 0);

    // A clean batch lands in full.
    harness
        .call(
            Method::PutDataMulti,
            Some(&token),
            json!({
                "table_owner_id": alice,
                "table": "rows",
                "pairs": [
                    {"key": "a", "value": b64(b"1")},
                    {"key": "b", "value": b64(b"2")},
                    {"key": "c", "value": b64(b"3")},
                ],
            }),
        )
        .await
        .unwrap();
    let keys = harness
        .call(
            Method::ListKeys,
            Some(&token),
            json!({"table_owner_id": alice, "table": "rows", "pattern": ""}),
        )
        .await
        .unwrap();
    assert_eq!(keys["keys"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn batch_with_duplicate_keys_is_rejected() {
    let harness = open_node();
    let (alice, token) = harness.new_identity("alice").await;
    harness
        .call(
            Method::CreateTable,
            Some(&token),
            json!({"table": "rows", "data_format": "plain_text"}),
        )
        .await
        .unwrap();

    let failed = harness
        .call(
            Method::PutDataMulti,
            Some(&token),
            json!({
                "table_owner_id": alice,
                "table": "rows",
                "pairs": [
                    {"key": "a", "value": b64(b"1")},
                    {"key": "a", "value": b64(b"2")},
                ],
            }),
        )
        .await;
    assert_err_code(failed, ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn json_tables_validate_values_at_write_time() {
    let harness = open_node();
    let (alice, token) = harness.new_identity("alice").await;
    harness.create_table(&token, "docs").await;

    let invalid = harness
        .call(
            Method::PutData,
            Some(&token),
            json!({
                "table_owner_id": alice,
                "table": "docs",
                "key": "k1",
                "value": b64(b"{not json"),
            }),
        )
        .await;
    assert_err_code(invalid, ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn key_listing_patterns_and_pagination() {
    let mut config = test_config();
    config.limits.page_size = 3;
    let harness = open_node_with(config);
    let (alice, token) = harness.new_identity("alice").await;
    harness
        .call(
            Method::CreateTable,
            Some(&token),
            json!({"table": "rows", "data_format": "plain_text"}),
        )
        .await
        .unwrap();

    for key in ["app/1", "app/2", "app/3", "log/1", "log/2"] {
        harness
            .call(
                Method::PutData,
                Some(&token),
                json!({
                    "table_owner_id": alice,
                    "table": "rows",
                    "key": key,
                    "value": b64(b"v"),
                }),
            )
            .await
            .unwrap();
    }

    let list = |pattern: &str, page: u64| {
        json!({
            "table_owner_id": alice,
            "table": "rows",
            "pattern": pattern,
            "page_index": page,
        })
    };

    // Prefix scan.
    let apps = harness
        .call(Method::ListKeys, Some(&token), list("app/%", 0))
        .await
        .unwrap();
    assert_eq!(
        apps["keys"].as_array().unwrap().len(),
        3,
        "prefix scan should match app/*"
    );

    // Exact match, hit and miss.
    let exact = harness
        .call(Method::ListKeys, Some(&token), list("log/1", 0))
        .await
        .unwrap();
    assert_eq!(exact["keys"].as_array().unwrap().len(), 1);
    let miss = harness
        .call(Method::ListKeys, Some(&token), list("log/9", 0))
        .await
        .unwrap();
    assert_eq!(miss["keys"].as_array().unwrap().len(), 0);

    // Full listing pages at the configured size, restartable by index.
    let page0 = harness
        .call(Method::ListKeys, Some(&token), list("", 0))
        .await
        .unwrap();
    assert_eq!(page0["keys"].as_array().unwrap().len(), 3);
    assert!(page0["has_next_page"].as_bool().unwrap());
    let page1 = harness
        .call(Method::ListKeys, Some(&token), list("", 1))
        .await
        .unwrap();
    let page1_keys: Vec<&str> = page1["keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k.as_str().unwrap())
        .collect();
    assert_eq!(page1_keys, vec!["log/1", "log/2"]);
    assert!(!page1["has_next_page"].as_bool().unwrap());
}

#[tokio::test]
async fn multi_key_get_omits_absences_single_key_fails() {
    let harness = open_node();
    let (alice, token) = harness.new_identity("alice").await;
    harness.create_table(&token, "docs").await;
    harness
        .put_json(&token, &alice, "docs", "k1", json!({"n": 1}))
        .await
        .unwrap();

    let multi = harness
        .call(
            Method::GetData,
            Some(&token),
            json!({"table_owner_id": alice, "table": "docs", "keys": ["k1", "ghost"]}),
        )
        .await
        .unwrap();
    assert_eq!(multi["pairs"].as_array().unwrap().len(), 1);

    let single = harness
        .call(
            Method::GetData,
            Some(&token),
            json!({"table_owner_id": alice, "table": "docs", "keys": ["ghost"]}),
        )
        .await;
    assert_err_code(single, ErrorCode::NotFound);
}

#[tokio::test]
async fn deleting_a_table_cascades() {
    let harness = open_node();
    let (alice, token) = harness.new_identity("alice").await;
    let (bob, _) = harness.new_identity("bob").await;

    harness.create_table(&token, "notes").await;
    harness
        .put_json(&token, &alice, "notes", "k1", json!({"n": 1}))
        .await
        .unwrap();
    harness
        .call(
            Method::SetPermission,
            Some(&token),
            json!({
                "table_owner_id": alice,
                "table": "notes",
                "grant": {"audience": {"type": "individual", "id": bob}, "level": "read"},
            }),
        )
        .await
        .unwrap();

    harness
        .call(
            Method::DeleteObject,
            Some(&token),
            json!({"object_type": "table", "table_owner_id": alice, "table": "notes"}),
        )
        .await
        .unwrap();

    let listed = harness
        .call(Method::ListTables, Some(&token), json!({}))
        .await
        .unwrap();
    assert_eq!(listed["tables"].as_array().unwrap().len(), 0);
    let gone = harness
        .call(
            Method::GetData,
            Some(&token),
            json!({"table_owner_id": alice, "table": "notes", "keys": ["k1"]}),
        )
        .await;
    assert_err_code(gone, ErrorCode::NotFound);

    // Recreating the name yields an empty table with no inherited grants.
    harness.create_table(&token, "notes").await;
    let keys = harness
        .call(
            Method::ListKeys,
            Some(&token),
            json!({"table_owner_id": alice, "table": "notes", "pattern": ""}),
        )
        .await
        .unwrap();
    assert_eq!(keys["keys"].as_array().unwrap().len(), 0);
    assert_eq!(
        harness
            .node
            .permissions()
            .table_grants(&alice, "notes")
            .unwrap()
            .len(),
        0
    );
}

#[tokio::test]
async fn table_quota_is_enforced() {
    let mut config = test_config();
    config.limits.max_tables_per_owner = 2;
    let harness = open_node_with(config);
    let (_, token) = harness.new_identity("alice").await;

    harness.create_table(&token, "t1").await;

    // Duplicate names are refused while under quota.
    let duplicate = harness
        .call(
            Method::CreateTable,
            Some(&token),
            json!({"table": "t1", "data_format": "json"}),
        )
        .await;
    assert_err_code(duplicate, ErrorCode::AlreadyExists);

    harness.create_table(&token, "t2").await;
    let over = harness
        .call(
            Method::CreateTable,
            Some(&token),
            json!({"table": "t3", "data_format": "json"}),
        )
        .await;
    assert_err_code(over, ErrorCode::QuotaExceeded);

    // At quota, re-creating an existing table is still a duplicate.
    let duplicate = harness
        .call(
            Method::CreateTable,
            Some(&token),
            json!({"table": "t1", "data_format": "json"}),
        )
        .await;
    assert_err_code(duplicate, ErrorCode::AlreadyExists);
}

#[tokio::test]
async fn data_survives_a_node_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");

    let alice = {
        let harness = common::open_node_on(sled::open(&path).unwrap(), test_config());
        let (alice, token) = harness.new_identity("alice").await;
        harness.create_table(&token, "notes").await;
        harness
            .put_json(&token, &alice, "notes", "k1", json!({"n": 1}))
            .await
            .unwrap();
        alice
    };

    let harness = common::open_node_on(sled::open(&path).unwrap(), test_config());
    let login = harness
        .call(
            Method::LoginUser,
            None,
            json!({"handle": "alice", "password": common::PASSWORD}),
        )
        .await
        .unwrap();
    let token = login["session_token"].as_str().unwrap();
    let got = harness
        .call(
            Method::GetData,
            Some(token),
            json!({"table_owner_id": alice, "table": "notes", "keys": ["k1"]}),
        )
        .await
        .unwrap();
    assert_eq!(got["pairs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn orphan_data_trees_are_swept_at_open() {
    use std::sync::Arc;
    use stratadb::identity::LogDelivery;
    use stratadb::node::StrataNode;

    let db = sled::Config::new().temporary(true).open().unwrap();
    // A data tree with no catalog entry, as an interrupted cascade leaves.
    let stray = db.open_tree("data:ghost-owner:ghost-table").unwrap();
    stray.insert(b"k", b"v").unwrap();

    StrataNode::open_with_db(db.clone(), test_config(), Arc::new(LogDelivery)).unwrap();

    let names: Vec<String> = db
        .tree_names()
        .into_iter()
        .map(|n| String::from_utf8_lossy(&n).to_string())
        .collect();
    assert!(
        !names.iter().any(|n| n == "data:ghost-owner:ghost-table"),
        "orphan tree should be dropped, found {:?}",
        names
    );
}
