/*!
 * Backup and Restore Tests
 *
 * Exercises the collection dump, the retention sweep, and the restore path
 * against a real temporary database.
 */

mod common;

use common::{
    TEST_BASE_TIMESTAMP, insert_test_activity, insert_test_bill, insert_test_recharge,
    setup_test_db, test_activity, test_bill, test_recharge,
};
use split_ledger_server::activities::fetch_activity;
use split_ledger_server::backup::{cleanup_old_backups, restore_backup, run_backup};
use split_ledger_server::bills::fetch_bills;
use split_ledger_server::constants::BACKUP_DIR;

#[tokio::test]
async fn run_backup_writes_artifact_with_counts() {
    let (db, data_path, _temp_dir) = setup_test_db().await;

    let activity = test_activity(&["alice", "bob"], false, None);
    insert_test_activity(&db, &activity).await;
    let bill = test_bill(
        &activity.id,
        60.0,
        "alice",
        &[("alice", 1.0), ("bob", 1.0)],
        TEST_BASE_TIMESTAMP,
    );
    insert_test_bill(&db, &bill).await;

    let summary = run_backup(&db, &data_path).await.expect("backup should run");

    assert!(summary.file_name.starts_with("backup_"));
    assert!(summary.file_name.ends_with(".json"));

    let path = std::path::Path::new(&data_path)
        .join(BACKUP_DIR)
        .join(&summary.file_name);
    assert!(path.exists());

    let count_of = |name: &str| {
        summary
            .collections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.count)
    };
    assert_eq!(count_of("users"), Some(0));
    assert_eq!(count_of("activities"), Some(1));
    assert_eq!(count_of("bills"), Some(1));
    assert_eq!(count_of("recharges"), Some(0));
}

#[tokio::test]
async fn restore_replaces_collection_contents() {
    let (db, data_path, _temp_dir) = setup_test_db().await;

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
    let recharge = test_recharge(&activity.id, 100.0, "bob", "alice");
    insert_test_recharge(&db, &recharge).await;

    let summary = run_backup(&db, &data_path).await.expect("backup should run");

    // Wipe everything, then bring it back from the artifact
    {
        let conn = db.write().await;
        for table in ["activities", "bills", "recharges"] {
            conn.execute(&format!("DELETE FROM {}", table), ())
                .await
                .expect("Failed to clear table");
        }
    }

    let restored = restore_backup(&db, &data_path, &summary.file_name)
        .await
        .expect("restore should run");
    let count_of = |name: &str| {
        restored
            .collections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.count)
    };
    assert_eq!(count_of("activities"), Some(1));
    assert_eq!(count_of("bills"), Some(1));
    assert_eq!(count_of("recharges"), Some(1));

    let loaded = fetch_activity(&db, &activity.id)
        .await
        .expect("restored activity should exist");
    assert_eq!(loaded.keeper.as_deref(), Some("alice"));
    assert_eq!(loaded.members.len(), 2);

    let bills = fetch_bills(&db, &activity.id)
        .await
        .expect("restored bills should load");
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].amount, 40.0);
    assert_eq!(bills[0].split_detail["bob"], 20.0);
}

#[tokio::test]
async fn restore_rejects_path_like_names() {
    let (db, data_path, _temp_dir) = setup_test_db().await;

    for name in ["../secrets.json", "a/b.json", "a\\b.json"] {
        let result = restore_backup(&db, &data_path, name).await;
        assert!(result.is_err(), "{} should be rejected", name);
    }
}

#[tokio::test]
async fn cleanup_removes_only_expired_artifacts() {
    let (db, data_path, _temp_dir) = setup_test_db().await;

    let summary = run_backup(&db, &data_path).await.expect("backup should run");

    let dir = std::path::Path::new(&data_path).join(BACKUP_DIR);
    let stale = dir.join("backup_2020-01-01_00-00-00.json");
    tokio::fs::write(&stale, b"{}")
        .await
        .expect("Failed to write stale artifact");
    let unrelated = dir.join("notes.txt");
    tokio::fs::write(&unrelated, b"keep me")
        .await
        .expect("Failed to write unrelated file");

    cleanup_old_backups(&data_path, 7)
        .await
        .expect("cleanup should run");

    assert!(!stale.exists());
    assert!(dir.join(&summary.file_name).exists());
    assert!(unrelated.exists());
}
