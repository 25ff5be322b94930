use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::get_current_user;
use crate::bills;
use crate::constants::*;
use crate::database::Db;
use crate::models::{
    Activity, ActivityDetailResponse, ActivityListResponse, Bill, CreateActivityPayload, Member,
    Recharge, UpdateActivityPayload,
};
use crate::recharges;
use crate::settlement::{SettlementMode, compute_ledger, suggest_next_payer};
use crate::utils::{date_range, db_error, db_error_with_context, validate_limit,
    validate_string_length};

#[derive(Deserialize, Debug)]
pub struct ListActivitiesQuery {
    pub limit: Option<u32>,
}

pub fn extract_activity_from_row(row: libsql::Row) -> Result<Activity, (StatusCode, String)> {
    let id: String = row
        .get(0)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let name: String = row
        .get(1)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let activity_type: String = row
        .get(2)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let members_json: String = row
        .get(3)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let creator: String = row
        .get(4)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let is_prepaid: i64 = row
        .get(5)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let keeper: Option<String> = row
        .get(6)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let remark: String = row
        .get(7)
        .map_err(|_| db_error_with_context("invalid activity data"))?;
    let created_at: i64 = row
        .get(8)
        .map_err(|_| db_error_with_context("invalid activity data"))?;

    let members: Vec<Member> = serde_json::from_str(&members_json)
        .map_err(|_| db_error_with_context("invalid activity member list"))?;

    Ok(Activity {
        id,
        name,
        activity_type,
        members,
        creator,
        is_prepaid: is_prepaid != 0,
        keeper,
        remark,
        created_at,
    })
}

pub async fn fetch_activity(db: &Db, activity_id: &str) -> Result<Activity, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, name, activity_type, members, creator, is_prepaid, keeper, remark, created_at \
             FROM activities WHERE id = ?",
            [activity_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load activity"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => extract_activity_from_row(row),
        None => Err((StatusCode::NOT_FOUND, "Activity not found".to_string())),
    }
}

/// Normalizes a raw member-name list: trims, drops empties and duplicates,
/// and pins the creator to the first slot. The creator cannot be removed.
fn build_roster(member_names: &[String], creator: &str) -> Result<Vec<Member>, (StatusCode, String)> {
    let mut names: Vec<String> = Vec::new();
    for raw in member_names {
        let name = raw.trim();
        if name.is_empty() || name == creator {
            continue;
        }
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names.insert(0, creator.to_string());

    if names.len() > MAX_MEMBERS_PER_ACTIVITY {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("An activity can have at most {} members", MAX_MEMBERS_PER_ACTIVITY),
        ));
    }

    Ok(names
        .into_iter()
        .map(|name| Member { name, active: true })
        .collect())
}

fn validate_keeper(
    keeper: &Option<String>,
    is_prepaid: bool,
    members: &[Member],
) -> Result<Option<String>, (StatusCode, String)> {
    if !is_prepaid {
        return Ok(None);
    }
    let keeper = keeper
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "A prepaid activity requires a keeper".to_string(),
        ))?;
    if !members.iter().any(|m| m.name == keeper) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Keeper must be one of the activity members".to_string(),
        ));
    }
    Ok(Some(keeper.to_string()))
}

/// Members referenced by stored records must stay on the roster: a bill
/// share or deposit keyed by a name missing from the member list would drop
/// out of the ledger and break its zero-sum.
pub fn ensure_members_unreferenced(
    removed: &[String],
    bills: &[Bill],
    recharges: &[Recharge],
) -> Result<(), (StatusCode, String)> {
    for name in removed {
        let in_bills = bills.iter().any(|b| {
            b.payer == *name || b.participants.get(name).copied().unwrap_or(0.0) > 0.0
        });
        let in_recharges = recharges.iter().any(|r| r.payer == *name);
        if in_bills || in_recharges {
            return Err((
                StatusCode::BAD_REQUEST,
                format!(
                    "Cannot remove {}: existing bills or recharges still reference them",
                    name
                ),
            ));
        }
    }
    Ok(())
}

pub async fn create_activity(
    State(db): State<Db>,
    session: Session,
    Json(payload): Json<CreateActivityPayload>,
) -> Result<(StatusCode, Json<Activity>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    validate_string_length(&payload.name, "Activity name", MAX_ACTIVITY_NAME_LENGTH)?;
    if payload.remark.len() > MAX_REMARK_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Remark must be less than {} characters", MAX_REMARK_LENGTH),
        ));
    }

    let members = build_roster(&payload.member_names, &user.username)?;
    let keeper = validate_keeper(&payload.keeper, payload.is_prepaid, &members)?;

    let activity = Activity {
        id: Uuid::new_v4().to_string(),
        name: payload.name.trim().to_string(),
        activity_type: payload.activity_type.trim().to_string(),
        members,
        creator: user.username.clone(),
        is_prepaid: payload.is_prepaid,
        keeper,
        remark: payload.remark.trim().to_string(),
        created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
    };

    let members_json = serde_json::to_string(&activity.members)
        .map_err(|_| db_error_with_context("failed to encode member list"))?;

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
    .map_err(|_| db_error_with_context("activity creation failed"))?;

    Ok((StatusCode::CREATED, Json(activity)))
}

/// Lists activities whose roster contains the current user, newest first.
pub async fn get_activities(
    State(db): State<Db>,
    session: Session,
    Query(query): Query<ListActivitiesQuery>,
) -> Result<(StatusCode, Json<ActivityListResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let limit = validate_limit(query.limit, DEFAULT_ACTIVITIES_LIMIT)?;

    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, name, activity_type, members, creator, is_prepaid, keeper, remark, created_at \
             FROM activities ORDER BY created_at DESC",
            (),
        )
        .await
        .map_err(|_| db_error_with_context("failed to query activities"))?;

    // Membership lives inside the JSON roster, so filtering happens here
    // rather than in SQL. Activity counts are small.
    let mut activities = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let activity = extract_activity_from_row(row)?;
        if activity.members.iter().any(|m| m.name == user.username) {
            activities.push(activity);
        }
    }

    let total_count = activities.len() as u32;
    activities.truncate(limit as usize);

    Ok((
        StatusCode::OK,
        Json(ActivityListResponse {
            activities,
            total_count,
        }),
    ))
}

/// The activity view: raw records plus the ledger recomputed from them.
pub async fn get_activity(
    State(db): State<Db>,
    session: Session,
    Path(activity_id): Path<String>,
) -> Result<(StatusCode, Json<ActivityDetailResponse>), (StatusCode, String)> {
    get_current_user(&session).await?;

    let activity = fetch_activity(&db, &activity_id).await?;
    let bills = bills::fetch_bills(&db, &activity_id).await?;
    let recharges = recharges::fetch_recharges(&db, &activity_id).await?;

    let mode = SettlementMode::for_activity(&activity);
    let ledger = compute_ledger(&activity.members, &bills, &recharges, &mode);
    let suggested_next_payer = suggest_next_payer(&ledger).cloned();

    let total_spent: f64 = bills.iter().map(|b| b.amount).sum();
    let total_recharged: f64 = recharges.iter().map(|r| r.amount).sum();
    let remaining = if activity.is_prepaid {
        total_recharged - total_spent
    } else {
        0.0
    };
    let date_range = date_range(&bills);

    Ok((
        StatusCode::OK,
        Json(ActivityDetailResponse {
            activity,
            bills,
            recharges,
            ledger,
            suggested_next_payer,
            total_spent,
            total_recharged,
            remaining,
            date_range,
        }),
    ))
}

pub async fn update_activity(
    State(db): State<Db>,
    session: Session,
    Path(activity_id): Path<String>,
    Json(payload): Json<UpdateActivityPayload>,
) -> Result<(StatusCode, Json<Activity>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let existing = fetch_activity(&db, &activity_id).await?;

    if existing.creator != user.username {
        return Err((StatusCode::FORBIDDEN, ERR_NOT_CREATOR.to_string()));
    }

    validate_string_length(&payload.name, "Activity name", MAX_ACTIVITY_NAME_LENGTH)?;

    // The creator slot is pinned to the original creator, not the caller of
    // this request (they are the same here, but the invariant is the point).
    let members = build_roster(&payload.member_names, &existing.creator)?;
    let keeper = validate_keeper(&payload.keeper, existing.is_prepaid, &members)?;

    let removed: Vec<String> = existing
        .members
        .iter()
        .filter(|old| !members.iter().any(|m| m.name == old.name))
        .map(|old| old.name.clone())
        .collect();
    if !removed.is_empty() {
        let bills = bills::fetch_bills(&db, &activity_id).await?;
        let recharges = recharges::fetch_recharges(&db, &activity_id).await?;
        ensure_members_unreferenced(&removed, &bills, &recharges)?;
    }

    let updated = Activity {
        name: payload.name.trim().to_string(),
        activity_type: payload.activity_type.trim().to_string(),
        members,
        keeper,
        remark: payload.remark.trim().to_string(),
        ..existing
    };

    let members_json = serde_json::to_string(&updated.members)
        .map_err(|_| db_error_with_context("failed to encode member list"))?;

    let conn = db.write().await;
    conn.execute(
        "UPDATE activities SET name = ?, activity_type = ?, members = ?, keeper = ?, remark = ? \
         WHERE id = ?",
        (
            updated.name.as_str(),
            updated.activity_type.as_str(),
            members_json.as_str(),
            updated.keeper.as_deref(),
            updated.remark.as_str(),
            activity_id.as_str(),
        ),
    )
    .await
    .map_err(|_| db_error_with_context("activity update failed"))?;

    Ok((StatusCode::OK, Json(updated)))
}

/// Deleting an activity removes its bills and recharges in the same sweep, so
/// no orphaned records survive to confuse a later ledger computation.
pub async fn delete_activity(
    State(db): State<Db>,
    session: Session,
    Path(activity_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let existing = fetch_activity(&db, &activity_id).await?;

    if existing.creator != user.username {
        return Err((StatusCode::FORBIDDEN, ERR_NOT_CREATOR.to_string()));
    }

    let conn = db.write().await;
    conn.execute("DELETE FROM bills WHERE activity_id = ?", [activity_id.as_str()])
        .await
        .map_err(|_| db_error_with_context("failed to delete activity bills"))?;
    conn.execute(
        "DELETE FROM recharges WHERE activity_id = ?",
        [activity_id.as_str()],
    )
    .await
    .map_err(|_| db_error_with_context("failed to delete activity recharges"))?;
    conn.execute("DELETE FROM activities WHERE id = ?", [activity_id.as_str()])
        .await
        .map_err(|_| db_error_with_context("failed to delete activity"))?;

    Ok(StatusCode::NO_CONTENT)
}
