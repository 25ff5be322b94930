use anyhow::Result;
use axum::extract::FromRef;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id             TEXT PRIMARY KEY,
    name           TEXT UNIQUE NOT NULL,
    password_hash  TEXT NOT NULL
);
"#;

const CREATE_ACTIVITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS activities (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    activity_type  TEXT NOT NULL DEFAULT '',
    members        TEXT NOT NULL,
    creator        TEXT NOT NULL,
    is_prepaid     INTEGER NOT NULL DEFAULT 0,
    keeper         TEXT,
    remark         TEXT NOT NULL DEFAULT '',
    created_at     INTEGER NOT NULL
);
"#;

const CREATE_BILLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS bills (
    id             TEXT PRIMARY KEY,
    activity_id    TEXT NOT NULL,
    title          TEXT NOT NULL DEFAULT '',
    bill_type      TEXT NOT NULL DEFAULT '',
    amount         REAL NOT NULL,
    payer          TEXT NOT NULL,
    participants   TEXT NOT NULL,
    split_detail   TEXT NOT NULL,
    bill_time      INTEGER NOT NULL,
    remark         TEXT NOT NULL DEFAULT '',
    creator        TEXT NOT NULL,
    created_at     INTEGER NOT NULL
);
"#;

const CREATE_RECHARGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS recharges (
    id             TEXT PRIMARY KEY,
    activity_id    TEXT NOT NULL,
    amount         REAL NOT NULL,
    payer          TEXT NOT NULL,
    keeper         TEXT NOT NULL,
    recharge_date  INTEGER NOT NULL,
    recorder       TEXT NOT NULL,
    creator        TEXT NOT NULL,
    source_bill_id TEXT,
    created_at     INTEGER NOT NULL
);
"#;

const CREATE_BILLS_ACTIVITY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_bills_activity ON bills (activity_id, bill_time);";
const CREATE_RECHARGES_ACTIVITY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_recharges_activity ON recharges (activity_id, recharge_date);";

pub type Db = Arc<RwLock<Connection>>;

/// Shared handler state: the connection plus the data directory it lives in.
/// Most handlers extract only the `Db`; the backup handlers need the
/// directory too.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub data_path: String,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Db {
        state.db.clone()
    }
}

/// Application database (ledger.db). Activities are shared between members,
/// so everything lives in one database rather than per-user files.
pub async fn init_app_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join("ledger.db");
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_ACTIVITIES_TABLE, ()).await?;
    conn.execute(CREATE_BILLS_TABLE, ()).await?;
    conn.execute(CREATE_RECHARGES_TABLE, ()).await?;
    conn.execute(CREATE_BILLS_ACTIVITY_INDEX, ()).await?;
    conn.execute(CREATE_RECHARGES_ACTIVITY_INDEX, ()).await?;
    Ok(Arc::new(RwLock::new(conn)))
}
