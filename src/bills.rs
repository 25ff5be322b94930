use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::activities::fetch_activity;
use crate::auth::get_current_user;
use crate::constants::*;
use crate::database::Db;
use crate::models::{Activity, Bill, CreateBillPayload, CreateBillResponse, Recharge};
use crate::settlement::compute_split;
use crate::utils::{db_error, db_error_with_context, validate_amount};

pub fn extract_bill_from_row(row: libsql::Row) -> Result<Bill, (StatusCode, String)> {
    let id: String = row
        .get(0)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let activity_id: String = row
        .get(1)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let title: String = row
        .get(2)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let bill_type: String = row
        .get(3)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let amount: f64 = row
        .get(4)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let payer: String = row
        .get(5)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let participants_json: String = row
        .get(6)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let split_detail_json: String = row
        .get(7)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let bill_time: i64 = row
        .get(8)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let remark: String = row
        .get(9)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let creator: String = row
        .get(10)
        .map_err(|_| db_error_with_context("invalid bill data"))?;
    let created_at: i64 = row
        .get(11)
        .map_err(|_| db_error_with_context("invalid bill data"))?;

    let participants: BTreeMap<String, f64> = serde_json::from_str(&participants_json)
        .map_err(|_| db_error_with_context("invalid bill participants"))?;
    let split_detail: BTreeMap<String, f64> = serde_json::from_str(&split_detail_json)
        .map_err(|_| db_error_with_context("invalid bill split detail"))?;

    Ok(Bill {
        id,
        activity_id,
        title,
        bill_type,
        amount,
        payer,
        participants,
        split_detail,
        bill_time,
        remark,
        creator,
        created_at,
    })
}

/// All bills of an activity, newest first.
pub async fn fetch_bills(db: &Db, activity_id: &str) -> Result<Vec<Bill>, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, activity_id, title, bill_type, amount, payer, participants, split_detail, \
             bill_time, remark, creator, created_at \
             FROM bills WHERE activity_id = ? ORDER BY bill_time DESC",
            [activity_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to query bills"))?;

    let mut bills = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        bills.push(extract_bill_from_row(row)?);
    }
    Ok(bills)
}

pub async fn fetch_bill(db: &Db, bill_id: &str) -> Result<Bill, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, activity_id, title, bill_type, amount, payer, participants, split_detail, \
             bill_time, remark, creator, created_at \
             FROM bills WHERE id = ?",
            [bill_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load bill"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => extract_bill_from_row(row),
        None => Err((StatusCode::NOT_FOUND, "Bill not found".to_string())),
    }
}

/// Restricts the submitted weight map to the current roster, so stored keys
/// never include stale members, and every roster member gets an entry.
fn normalize_participants(
    submitted: &BTreeMap<String, f64>,
    activity: &Activity,
) -> BTreeMap<String, f64> {
    activity
        .members
        .iter()
        .map(|m| {
            let weight = submitted.get(&m.name).copied().unwrap_or(0.0);
            (m.name.clone(), weight)
        })
        .collect()
}

fn validate_bill_payload(
    payload: &CreateBillPayload,
    activity: &Activity,
) -> Result<(), (StatusCode, String)> {
    validate_amount(payload.amount)?;
    if payload.title.len() > MAX_BILL_TITLE_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Bill title must be less than {} characters", MAX_BILL_TITLE_LENGTH),
        ));
    }
    if !activity.members.iter().any(|m| m.name == payload.payer) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Payer must be one of the activity members".to_string(),
        ));
    }
    Ok(())
}

/// Prepaid rule: every bill is recorded against the keeper. A bill fronted
/// by someone else reports them as the original payer and becomes an
/// implicit deposit, tracked by `source_bill_id` so the two records stay
/// paired.
pub fn resolve_payer(activity: &Activity, submitted: &str) -> (String, Option<String>) {
    if activity.is_prepaid {
        if let Some(keeper) = &activity.keeper {
            if submitted != keeper {
                return (keeper.clone(), Some(submitted.to_string()));
            }
        }
    }
    (submitted.to_string(), None)
}

fn make_auto_recharge(bill: &Bill, original_payer: &str, keeper: &str, recorder: &str) -> Recharge {
    Recharge {
        id: Uuid::new_v4().to_string(),
        activity_id: bill.activity_id.clone(),
        amount: bill.amount,
        payer: original_payer.to_string(),
        keeper: keeper.to_string(),
        recharge_date: bill.bill_time,
        recorder: recorder.to_string(),
        creator: recorder.to_string(),
        source_bill_id: Some(bill.id.clone()),
        created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
    }
}

async fn insert_recharge(
    conn: &libsql::Connection,
    recharge: &Recharge,
) -> Result<(), (StatusCode, String)> {
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
    .map_err(|_| db_error_with_context("recharge creation failed"))?;
    Ok(())
}

/// Validates and stores a bill for the activity, applying the prepaid payer
/// rewrite and creating the linked deposit when one is needed.
pub async fn record_bill(
    db: &Db,
    activity: &Activity,
    payload: &CreateBillPayload,
    recorder: &str,
) -> Result<CreateBillResponse, (StatusCode, String)> {
    validate_bill_payload(payload, activity)?;

    let participants = normalize_participants(&payload.participants, activity);
    let split_detail = compute_split(payload.amount, &participants)
        .map_err(|_| (StatusCode::BAD_REQUEST, ERR_NO_POSITIVE_WEIGHT.to_string()))?;

    let (payer, original_payer) = resolve_payer(activity, &payload.payer);

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let bill = Bill {
        id: Uuid::new_v4().to_string(),
        activity_id: activity.id.clone(),
        title: payload.title.trim().to_string(),
        bill_type: payload.bill_type.trim().to_string(),
        amount: payload.amount,
        payer,
        participants,
        split_detail,
        bill_time: payload.bill_time.unwrap_or(now),
        remark: payload.remark.trim().to_string(),
        creator: recorder.to_string(),
        created_at: now,
    };

    let auto_recharge = original_payer.as_ref().map(|original| {
        make_auto_recharge(
            &bill,
            original,
            activity.keeper.as_deref().unwrap_or_default(),
            recorder,
        )
    });

    let participants_json = serde_json::to_string(&bill.participants)
        .map_err(|_| db_error_with_context("failed to encode participants"))?;
    let split_detail_json = serde_json::to_string(&bill.split_detail)
        .map_err(|_| db_error_with_context("failed to encode split detail"))?;

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
    .map_err(|_| db_error_with_context("bill creation failed"))?;

    if let Some(recharge) = &auto_recharge {
        insert_recharge(&conn, recharge).await?;
    }

    Ok(CreateBillResponse {
        bill,
        original_payer,
        auto_recharge,
    })
}

pub async fn create_bill(
    State(db): State<Db>,
    session: Session,
    Path(activity_id): Path<String>,
    Json(payload): Json<CreateBillPayload>,
) -> Result<(StatusCode, Json<CreateBillResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let activity = fetch_activity(&db, &activity_id).await?;

    let response = record_bill(&db, &activity, &payload, &user.username).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn update_bill(
    State(db): State<Db>,
    session: Session,
    Path(bill_id): Path<String>,
    Json(payload): Json<CreateBillPayload>,
) -> Result<(StatusCode, Json<CreateBillResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let existing = fetch_bill(&db, &bill_id).await?;

    if existing.creator != user.username {
        return Err((StatusCode::FORBIDDEN, ERR_NOT_CREATOR.to_string()));
    }

    let activity = fetch_activity(&db, &existing.activity_id).await?;
    validate_bill_payload(&payload, &activity)?;

    // Split is always recomputed from the submitted weights; the stored
    // detail fully replaces the old one, clearing any stale member keys.
    let participants = normalize_participants(&payload.participants, &activity);
    let split_detail = compute_split(payload.amount, &participants)
        .map_err(|_| (StatusCode::BAD_REQUEST, ERR_NO_POSITIVE_WEIGHT.to_string()))?;

    let (payer, original_payer) = resolve_payer(&activity, &payload.payer);

    let updated = Bill {
        title: payload.title.trim().to_string(),
        bill_type: payload.bill_type.trim().to_string(),
        amount: payload.amount,
        payer,
        participants,
        split_detail,
        bill_time: payload.bill_time.unwrap_or(existing.bill_time),
        remark: payload.remark.trim().to_string(),
        ..existing
    };

    let participants_json = serde_json::to_string(&updated.participants)
        .map_err(|_| db_error_with_context("failed to encode participants"))?;
    let split_detail_json = serde_json::to_string(&updated.split_detail)
        .map_err(|_| db_error_with_context("failed to encode split detail"))?;

    let conn = db.write().await;
    conn.execute(
        "UPDATE bills SET title = ?, bill_type = ?, amount = ?, payer = ?, participants = ?, \
         split_detail = ?, bill_time = ?, remark = ? WHERE id = ?",
        (
            updated.title.as_str(),
            updated.bill_type.as_str(),
            updated.amount,
            updated.payer.as_str(),
            participants_json.as_str(),
            split_detail_json.as_str(),
            updated.bill_time,
            updated.remark.as_str(),
            bill_id.as_str(),
        ),
    )
    .await
    .map_err(|_| db_error_with_context("bill update failed"))?;

    // Keep the paired recharge in sync with the rewritten payer.
    conn.execute(
        "DELETE FROM recharges WHERE source_bill_id = ?",
        [bill_id.as_str()],
    )
    .await
    .map_err(|_| db_error_with_context("failed to update linked recharge"))?;

    let auto_recharge = match &original_payer {
        Some(original) => {
            let recharge = make_auto_recharge(
                &updated,
                original,
                activity.keeper.as_deref().unwrap_or_default(),
                &user.username,
            );
            insert_recharge(&conn, &recharge).await?;
            Some(recharge)
        }
        None => None,
    };

    Ok((
        StatusCode::OK,
        Json(CreateBillResponse {
            bill: updated,
            original_payer,
            auto_recharge,
        }),
    ))
}

/// Removes a bill together with the recharge it auto-created, if any, so the
/// implicit deposit never outlives the expense it came from.
pub async fn delete_bill_and_linked_recharge(
    db: &Db,
    bill_id: &str,
) -> Result<(), (StatusCode, String)> {
    let conn = db.write().await;
    conn.execute("DELETE FROM recharges WHERE source_bill_id = ?", [bill_id])
        .await
        .map_err(|_| db_error_with_context("failed to delete linked recharge"))?;
    conn.execute("DELETE FROM bills WHERE id = ?", [bill_id])
        .await
        .map_err(|_| db_error_with_context("failed to delete bill"))?;
    Ok(())
}

pub async fn delete_bill(
    State(db): State<Db>,
    session: Session,
    Path(bill_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let existing = fetch_bill(&db, &bill_id).await?;

    if existing.creator != user.username {
        return Err((StatusCode::FORBIDDEN, ERR_NOT_CREATOR.to_string()));
    }

    delete_bill_and_linked_recharge(&db, &bill_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
