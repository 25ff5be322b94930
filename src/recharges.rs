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
use crate::models::{CreateRechargePayload, Recharge};
use crate::utils::{db_error, db_error_with_context, validate_amount};

pub fn extract_recharge_from_row(row: libsql::Row) -> Result<Recharge, (StatusCode, String)> {
    let id: String = row
        .get(0)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let activity_id: String = row
        .get(1)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let amount: f64 = row
        .get(2)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let payer: String = row
        .get(3)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let keeper: String = row
        .get(4)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let recharge_date: i64 = row
        .get(5)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let recorder: String = row
        .get(6)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let creator: String = row
        .get(7)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let source_bill_id: Option<String> = row
        .get(8)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;
    let created_at: i64 = row
        .get(9)
        .map_err(|_| db_error_with_context("invalid recharge data"))?;

    Ok(Recharge {
        id,
        activity_id,
        amount,
        payer,
        keeper,
        recharge_date,
        recorder,
        creator,
        source_bill_id,
        created_at,
    })
}

/// All recharges of an activity, newest deposit first.
pub async fn fetch_recharges(
    db: &Db,
    activity_id: &str,
) -> Result<Vec<Recharge>, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, activity_id, amount, payer, keeper, recharge_date, recorder, creator, \
             source_bill_id, created_at \
             FROM recharges WHERE activity_id = ? ORDER BY recharge_date DESC",
            [activity_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to query recharges"))?;

    let mut recharges = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        recharges.push(extract_recharge_from_row(row)?);
    }
    Ok(recharges)
}

pub async fn fetch_recharge(
    db: &Db,
    recharge_id: &str,
) -> Result<Recharge, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, activity_id, amount, payer, keeper, recharge_date, recorder, creator, \
             source_bill_id, created_at \
             FROM recharges WHERE id = ?",
            [recharge_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load recharge"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => extract_recharge_from_row(row),
        None => Err((StatusCode::NOT_FOUND, "Recharge not found".to_string())),
    }
}

pub async fn create_recharge(
    State(db): State<Db>,
    session: Session,
    Path(activity_id): Path<String>,
    Json(payload): Json<CreateRechargePayload>,
) -> Result<(StatusCode, Json<Recharge>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let activity = fetch_activity(&db, &activity_id).await?;

    let keeper = match (&activity.keeper, activity.is_prepaid) {
        (Some(keeper), true) => keeper.clone(),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Recharges are only valid for prepaid activities".to_string(),
            ));
        }
    };

    validate_amount(payload.amount)?;

    let payer = payload.payer.trim();
    if !activity.members.iter().any(|m| m.name == payer) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Depositor must be one of the activity members".to_string(),
        ));
    }

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let recharge = Recharge {
        id: Uuid::new_v4().to_string(),
        activity_id,
        amount: payload.amount,
        payer: payer.to_string(),
        keeper,
        recharge_date: payload.recharge_date.unwrap_or(now),
        recorder: user.username.clone(),
        creator: user.username,
        source_bill_id: None,
        created_at: now,
    };

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
    .map_err(|_| db_error_with_context("recharge creation failed"))?;

    Ok((StatusCode::CREATED, Json(recharge)))
}

/// Removes a recharge; an auto-created one takes its source bill with it,
/// since the two records describe one real-world payment and must not drift
/// apart.
pub async fn delete_recharge_and_source_bill(
    db: &Db,
    recharge: &Recharge,
) -> Result<(), (StatusCode, String)> {
    let conn = db.write().await;
    if let Some(bill_id) = &recharge.source_bill_id {
        conn.execute("DELETE FROM bills WHERE id = ?", [bill_id.as_str()])
            .await
            .map_err(|_| db_error_with_context("failed to delete source bill"))?;
    }
    conn.execute("DELETE FROM recharges WHERE id = ?", [recharge.id.as_str()])
        .await
        .map_err(|_| db_error_with_context("failed to delete recharge"))?;
    Ok(())
}

pub async fn delete_recharge(
    State(db): State<Db>,
    session: Session,
    Path(recharge_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let existing = fetch_recharge(&db, &recharge_id).await?;

    if existing.creator != user.username {
        return Err((StatusCode::FORBIDDEN, ERR_NOT_CREATOR.to_string()));
    }

    delete_recharge_and_source_bill(&db, &existing).await?;

    Ok(StatusCode::NO_CONTENT)
}
