use std::collections::BTreeMap;

use split_ledger_server::database::{Db, init_app_db};
use split_ledger_server::models::{Activity, Bill, CreateBillPayload, Member, Recharge};
use split_ledger_server::settlement::compute_split;
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_BASE_TIMESTAMP: i64 = 1700000000; // Nov 14, 2023 22:13:20 UTC

pub async fn setup_test_db() -> (Db, String, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let data_path = temp_dir
        .path()
        .to_str()
        .expect("Failed to convert path to string")
        .to_string();

    let db = init_app_db(&data_path)
        .await
        .unwrap_or_else(|e| panic!("Failed to initialize database at {}: {}", data_path, e));

    (db, data_path, temp_dir)
}

pub fn members(names: &[&str]) -> Vec<Member> {
    names
        .iter()
        .map(|name| Member {
            name: name.to_string(),
            active: true,
        })
        .collect()
}

pub fn participants(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(n, w)| (n.to_string(), *w)).collect()
}

pub fn test_activity(names: &[&str], is_prepaid: bool, keeper: Option<&str>) -> Activity {
    Activity {
        id: Uuid::new_v4().to_string(),
        name: "Test Activity".to_string(),
        activity_type: "dinner".to_string(),
        members: members(names),
        creator: names[0].to_string(),
        is_prepaid,
        keeper: keeper.map(str::to_string),
        remark: String::new(),
        created_at: TEST_BASE_TIMESTAMP,
    }
}

/// Builds a bill with its split detail derived the same way the handlers do.
pub fn test_bill(
    activity_id: &str,
    amount: f64,
    payer: &str,
    weights: &[(&str, f64)],
    bill_time: i64,
) -> Bill {
    let participants = participants(weights);
    let split_detail = compute_split(amount, &participants).expect("test weights must be valid");
    Bill {
        id: Uuid::new_v4().to_string(),
        activity_id: activity_id.to_string(),
        title: "Test Bill".to_string(),
        bill_type: "dinner".to_string(),
        amount,
        payer: payer.to_string(),
        participants,
        split_detail,
        bill_time,
        remark: String::new(),
        creator: payer.to_string(),
        created_at: bill_time,
    }
}

/// Request payload as a client would submit it to the bill endpoints.
pub fn bill_payload(amount: f64, payer: &str, weights: &[(&str, f64)]) -> CreateBillPayload {
    CreateBillPayload {
        title: "Test Bill".to_string(),
        bill_type: "dinner".to_string(),
        amount,
        payer: payer.to_string(),
        participants: participants(weights),
        bill_time: Some(TEST_BASE_TIMESTAMP),
        remark: String::new(),
    }
}

pub fn test_recharge(activity_id: &str, amount: f64, payer: &str, keeper: &str) -> Recharge {
    Recharge {
        id: Uuid::new_v4().to_string(),
        activity_id: activity_id.to_string(),
        amount,
        payer: payer.to_string(),
        keeper: keeper.to_string(),
        recharge_date: TEST_BASE_TIMESTAMP,
        recorder: payer.to_string(),
        creator: payer.to_string(),
        source_bill_id: None,
        created_at: TEST_BASE_TIMESTAMP,
    }
}

pub async fn insert_test_activity(db: &Db, activity: &Activity) {
    let members_json =
        serde_json::to_string(&activity.members).expect("Failed to encode members");
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO activities (id, name, activity_type, members, creator, is_prepaid, keeper, remark, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            activity.id.as_str(),
            activity.name.as_str(),
            activity.activity_type.as_str(),
            members_json.as_str(),
            activity.creator.as_str(),
            activity.is_prepaid as i64,
            activity.keeper.as_deref(),
            activity.remark.as_str(),
            activity.created_at,
        ),
    )
    .await
    .expect("Failed to insert test activity");
}

pub async fn insert_test_bill(db: &Db, bill: &Bill) {
    let participants_json =
        serde_json::to_string(&bill.participants).expect("Failed to encode participants");
    let split_detail_json =
        serde_json::to_string(&bill.split_detail).expect("Failed to encode split detail");
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO bills (id, activity_id, title, bill_type, amount, payer, participants, \
         split_detail, bill_time, remark, creator, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            bill.id.as_str(),
            bill.activity_id.as_str(),
            bill.title.as_str(),
            bill.bill_type.as_str(),
            bill.amount,
            bill.payer.as_str(),
            participants_json.as_str(),
            split_detail_json.as_str(),
            bill.bill_time,
            bill.remark.as_str(),
            bill.creator.as_str(),
            bill.created_at,
        ),
    )
    .await
    .expect("Failed to insert test bill");
}

pub async fn insert_test_recharge(db: &Db, recharge: &Recharge) {
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO recharges (id, activity_id, amount, payer, keeper, recharge_date, recorder, \
         creator, source_bill_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            recharge.id.as_str(),
            recharge.activity_id.as_str(),
            recharge.amount,
            recharge.payer.as_str(),
            recharge.keeper.as_str(),
            recharge.recharge_date,
            recharge.recorder.as_str(),
            recharge.creator.as_str(),
            recharge.source_bill_id.as_deref(),
            recharge.created_at,
        ),
    )
    .await
    .expect("Failed to insert test recharge");
}
