/*!
 * Bill Storage Tests
 *
 * Verifies the bill round-trip through the JSON weight/split columns, the
 * newest-first ordering, and the recharge pairing used by prepaid rewrites.
 */

mod common;

use axum::http::StatusCode;
use common::{
    TEST_BASE_TIMESTAMP, bill_payload, insert_test_activity, insert_test_bill,
    insert_test_recharge, setup_test_db, test_activity, test_bill, test_recharge,
};
use split_ledger_server::bills::{
    delete_bill_and_linked_recharge, fetch_bill, fetch_bills, record_bill,
};
use split_ledger_server::recharges::fetch_recharges;

#[tokio::test]
async fn fetch_bill_round_trip() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], false, None);
    insert_test_activity(&db, &activity).await;

    let bill = test_bill(
        &activity.id,
        90.0,
        "alice",
        &[("alice", 1.0), ("bob", 2.0)],
        TEST_BASE_TIMESTAMP,
    );
    insert_test_bill(&db, &bill).await;

    let loaded = fetch_bill(&db, &bill.id).await.expect("bill should exist");

    assert_eq!(loaded.id, bill.id);
    assert_eq!(loaded.activity_id, activity.id);
    assert_eq!(loaded.amount, 90.0);
    assert_eq!(loaded.payer, "alice");
    assert_eq!(loaded.participants["bob"], 2.0);
    assert_eq!(loaded.split_detail["alice"], 30.0);
    assert_eq!(loaded.split_detail["bob"], 60.0);
}

#[tokio::test]
async fn fetch_bills_newest_first() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], false, None);
    insert_test_activity(&db, &activity).await;

    let weights = [("alice", 1.0), ("bob", 1.0)];
    let old = test_bill(&activity.id, 10.0, "alice", &weights, TEST_BASE_TIMESTAMP);
    let mid = test_bill(
        &activity.id,
        20.0,
        "bob",
        &weights,
        TEST_BASE_TIMESTAMP + 3600,
    );
    let new = test_bill(
        &activity.id,
        30.0,
        "alice",
        &weights,
        TEST_BASE_TIMESTAMP + 7200,
    );
    // Insertion order deliberately differs from bill_time order
    insert_test_bill(&db, &mid).await;
    insert_test_bill(&db, &new).await;
    insert_test_bill(&db, &old).await;

    let bills = fetch_bills(&db, &activity.id)
        .await
        .expect("bills should load");

    let ids: Vec<&str> = bills.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec![new.id.as_str(), mid.id.as_str(), old.id.as_str()]);
}

#[tokio::test]
async fn fetch_bills_scoped_to_activity() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let first = test_activity(&["alice", "bob"], false, None);
    let second = test_activity(&["carol", "dave"], false, None);
    insert_test_activity(&db, &first).await;
    insert_test_activity(&db, &second).await;

    let bill = test_bill(
        &first.id,
        50.0,
        "alice",
        &[("alice", 1.0), ("bob", 1.0)],
        TEST_BASE_TIMESTAMP,
    );
    insert_test_bill(&db, &bill).await;

    let other = fetch_bills(&db, &second.id).await.expect("bills should load");
    assert!(other.is_empty());
}

#[tokio::test]
async fn linked_recharge_keeps_source_bill_id() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], true, Some("alice"));
    insert_test_activity(&db, &activity).await;

    let bill = test_bill(
        &activity.id,
        40.0,
        "alice",
        &[("alice", 1.0), ("bob", 1.0)],
        TEST_BASE_TIMESTAMP,
    );
    insert_test_bill(&db, &bill).await;

    let mut recharge = test_recharge(&activity.id, 40.0, "bob", "alice");
    recharge.source_bill_id = Some(bill.id.clone());
    insert_test_recharge(&db, &recharge).await;

    let recharges = fetch_recharges(&db, &activity.id)
        .await
        .expect("recharges should load");
    assert_eq!(recharges.len(), 1);
    assert_eq!(recharges[0].source_bill_id.as_deref(), Some(bill.id.as_str()));
}

#[tokio::test]
async fn prepaid_bill_rewrites_payer_to_keeper() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], true, Some("alice"));
    insert_test_activity(&db, &activity).await;

    let payload = bill_payload(40.0, "bob", &[("alice", 1.0), ("bob", 1.0)]);
    let response = record_bill(&db, &activity, &payload, "alice")
        .await
        .expect("bill should be recorded");

    assert_eq!(response.bill.payer, "alice");
    assert_eq!(response.original_payer.as_deref(), Some("bob"));

    let deposit = response
        .auto_recharge
        .expect("rewrite should create a deposit");
    assert_eq!(deposit.payer, "bob");
    assert_eq!(deposit.keeper, "alice");
    assert_eq!(deposit.amount, 40.0);
    assert_eq!(
        deposit.source_bill_id.as_deref(),
        Some(response.bill.id.as_str())
    );

    let stored = fetch_recharges(&db, &activity.id)
        .await
        .expect("recharges should load");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, deposit.id);
}

#[tokio::test]
async fn keeper_paid_bill_creates_no_deposit() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], true, Some("alice"));
    insert_test_activity(&db, &activity).await;

    let payload = bill_payload(25.0, "alice", &[("alice", 1.0), ("bob", 1.0)]);
    let response = record_bill(&db, &activity, &payload, "alice")
        .await
        .expect("bill should be recorded");

    assert_eq!(response.bill.payer, "alice");
    assert_eq!(response.original_payer, None);
    assert!(response.auto_recharge.is_none());

    let stored = fetch_recharges(&db, &activity.id)
        .await
        .expect("recharges should load");
    assert!(stored.is_empty());
}

#[tokio::test]
async fn direct_bill_keeps_submitted_payer() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], false, None);
    insert_test_activity(&db, &activity).await;

    let payload = bill_payload(30.0, "bob", &[("alice", 1.0), ("bob", 1.0)]);
    let response = record_bill(&db, &activity, &payload, "alice")
        .await
        .expect("bill should be recorded");

    assert_eq!(response.bill.payer, "bob");
    assert_eq!(response.original_payer, None);
    assert!(response.auto_recharge.is_none());
}

#[tokio::test]
async fn deleting_bill_cascades_to_linked_recharge() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], true, Some("alice"));
    insert_test_activity(&db, &activity).await;

    let payload = bill_payload(40.0, "bob", &[("alice", 1.0), ("bob", 1.0)]);
    let response = record_bill(&db, &activity, &payload, "alice")
        .await
        .expect("bill should be recorded");
    assert!(response.auto_recharge.is_some());

    delete_bill_and_linked_recharge(&db, &response.bill.id)
        .await
        .expect("delete should run");

    let bills = fetch_bills(&db, &activity.id)
        .await
        .expect("bills should load");
    assert!(bills.is_empty());
    let recharges = fetch_recharges(&db, &activity.id)
        .await
        .expect("recharges should load");
    assert!(recharges.is_empty());
}

#[tokio::test]
async fn fetch_missing_bill_is_not_found() {
    let (db, _data_path, _temp_dir) = setup_test_db().await;

    let err = fetch_bill(&db, "no-such-bill")
        .await
        .expect_err("missing bill should fail");
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}
