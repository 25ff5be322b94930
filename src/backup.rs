//! Collection dump/restore: every collection is serialized into a
//! timestamped JSON artifact under the data directory, artifacts older than
//! the retention window are pruned, and a restore replaces collection
//! contents from a named artifact.

use std::path::{Path as FsPath, PathBuf};

use anyhow::{Context, Result, anyhow};
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Duration, OffsetDateTime};
use tower_sessions::Session;

use crate::auth::get_current_user;
use crate::constants::*;
use crate::database::{AppState, Db};

const COLLECTIONS: [&str; 4] = ["users", "activities", "bills", "recharges"];

#[derive(Serialize, Deserialize, Debug)]
pub struct BackupArtifact {
    pub timestamp: String,
    pub collections: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Debug)]
pub struct BackupSummary {
    pub file_name: String,
    pub collections: Vec<CollectionCount>,
}

#[derive(Serialize, Debug)]
pub struct CollectionCount {
    pub name: String,
    pub count: usize,
}

#[derive(Deserialize, Debug)]
pub struct RestorePayload {
    pub file_name: String,
}

fn value_to_json(value: libsql::Value) -> serde_json::Value {
    match value {
        libsql::Value::Null => serde_json::Value::Null,
        libsql::Value::Integer(i) => serde_json::Value::from(i),
        libsql::Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        libsql::Value::Text(s) => serde_json::Value::String(s),
        // No blob columns exist in the schema
        libsql::Value::Blob(_) => serde_json::Value::Null,
    }
}

fn json_to_value(value: &serde_json::Value) -> libsql::Value {
    match value {
        serde_json::Value::Null => libsql::Value::Null,
        serde_json::Value::Bool(b) => libsql::Value::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                libsql::Value::Integer(i)
            } else {
                libsql::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => libsql::Value::Text(s.clone()),
        other => libsql::Value::Text(other.to_string()),
    }
}

async fn dump_collection(conn: &libsql::Connection, table: &str) -> Result<serde_json::Value> {
    let mut rows = conn
        .query(&format!("SELECT * FROM {}", table), ())
        .await
        .with_context(|| format!("failed to query collection {}", table))?;

    let column_count = rows.column_count();
    let column_names: Vec<String> = (0..column_count)
        .map(|i| rows.column_name(i).unwrap_or_default().to_string())
        .collect();

    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut record = serde_json::Map::new();
        for (i, name) in column_names.iter().enumerate() {
            let value = row.get_value(i as i32)?;
            record.insert(name.clone(), value_to_json(value));
        }
        records.push(serde_json::Value::Object(record));
    }
    Ok(serde_json::Value::Array(records))
}

fn backup_dir(data_dir: &str) -> PathBuf {
    FsPath::new(data_dir).join(BACKUP_DIR)
}

/// Dumps every collection to `backups/backup_YYYY-MM-DD_HH-MM-SS.json` and
/// prunes artifacts older than the retention window.
pub async fn run_backup(db: &Db, data_dir: &str) -> Result<BackupSummary> {
    let now = OffsetDateTime::now_utc();
    let mut artifact = BackupArtifact {
        timestamp: now
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        collections: serde_json::Map::new(),
    };

    let mut counts = Vec::new();
    {
        let conn = db.read().await;
        for table in COLLECTIONS {
            let records = dump_collection(&conn, table).await?;
            let count = records.as_array().map(Vec::len).unwrap_or(0);
            counts.push(CollectionCount {
                name: table.to_string(),
                count,
            });
            artifact.collections.insert(table.to_string(), records);
        }
    }

    let stamp_format = format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let file_name = format!("backup_{}.json", now.format(&stamp_format)?);

    let dir = backup_dir(data_dir);
    tokio::fs::create_dir_all(&dir).await?;
    let body = serde_json::to_vec_pretty(&artifact)?;
    tokio::fs::write(dir.join(&file_name), body).await?;

    cleanup_old_backups(data_dir, BACKUP_RETENTION_DAYS).await?;

    Ok(BackupSummary {
        file_name,
        collections: counts,
    })
}

/// Removes backup artifacts whose filename date is older than the cutoff.
pub async fn cleanup_old_backups(data_dir: &str, days_to_keep: i64) -> Result<()> {
    let dir = backup_dir(data_dir);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    let date_format = format_description!("[year]-[month]-[day]");
    let cutoff = OffsetDateTime::now_utc().date() - Duration::days(days_to_keep);

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(stamp) = name
            .strip_prefix("backup_")
            .and_then(|rest| rest.get(..10))
        else {
            continue;
        };
        let Ok(file_date) = time::Date::parse(stamp, &date_format) else {
            continue;
        };
        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(file = %name, error = %e, "failed to remove old backup");
            } else {
                tracing::info!(file = %name, "removed old backup");
            }
        }
    }
    Ok(())
}

/// Replaces the contents of every collection present in the artifact.
pub async fn restore_backup(db: &Db, data_dir: &str, file_name: &str) -> Result<BackupSummary> {
    // Artifact names are server-generated; reject anything path-like
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(anyhow!("invalid backup file name"));
    }

    let path = backup_dir(data_dir).join(file_name);
    let body = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read backup {}", file_name))?;
    let artifact: BackupArtifact =
        serde_json::from_slice(&body).context("malformed backup artifact")?;

    let mut counts = Vec::new();
    let conn = db.write().await;
    for table in COLLECTIONS {
        let Some(serde_json::Value::Array(records)) = artifact.collections.get(table) else {
            continue;
        };

        conn.execute(&format!("DELETE FROM {}", table), ())
            .await
            .with_context(|| format!("failed to clear collection {}", table))?;

        let mut restored = 0usize;
        for record in records {
            let Some(fields) = record.as_object() else {
                continue;
            };
            let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            );
            let values: Vec<libsql::Value> = fields.values().map(json_to_value).collect();
            conn.execute(&sql, libsql::params::Params::Positional(values))
                .await
                .with_context(|| format!("failed to restore a {} record", table))?;
            restored += 1;
        }
        counts.push(CollectionCount {
            name: table.to_string(),
            count: restored,
        });
    }

    Ok(BackupSummary {
        file_name: file_name.to_string(),
        collections: counts,
    })
}

pub async fn backup_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<BackupSummary>), (StatusCode, String)> {
    get_current_user(&session).await?;

    let summary = run_backup(&state.db, &state.data_path)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((StatusCode::OK, Json(summary)))
}

pub async fn restore_handler(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<RestorePayload>,
) -> Result<(StatusCode, Json<BackupSummary>), (StatusCode, String)> {
    get_current_user(&session).await?;

    let summary = restore_backup(&state.db, &state.data_path, &payload.file_name)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok((StatusCode::OK, Json(summary)))
}

/// Daily dump loop.
pub fn spawn_backup_task(db: Db, data_dir: String) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(BACKUP_INTERVAL_HOURS * 3600));
        // first tick fires immediately; skip it so startup stays quiet
        interval.tick().await;
        loop {
            interval.tick().await;
            match run_backup(&db, &data_dir).await {
                Ok(summary) => {
                    tracing::info!(file = %summary.file_name, "scheduled backup complete")
                }
                Err(e) => tracing::error!(error = %e, "scheduled backup failed"),
            }
        }
    });
}
