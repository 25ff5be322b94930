// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_DATA_PATH: &str = "data";

// Session configuration
pub const SESSION_NAME: &str = "ledger_session";
pub const SESSION_EXPIRY_DAYS: i64 = 30;
pub const MIN_SESSION_SECRET_LENGTH: usize = 64;

// Backup configuration
pub const BACKUP_DIR: &str = "backups";
pub const BACKUP_RETENTION_DAYS: i64 = 7;
pub const BACKUP_INTERVAL_HOURS: u64 = 24;

// Query limits and defaults
pub const DEFAULT_ACTIVITIES_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

// Validation limits
pub const MAX_ACTIVITY_NAME_LENGTH: usize = 100;
pub const MAX_BILL_TITLE_LENGTH: usize = 50;
pub const MAX_REMARK_LENGTH: usize = 255;
pub const MAX_MEMBERS_PER_ACTIVITY: usize = 50;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_USERNAME_LENGTH: usize = 2;
pub const MIN_PASSWORD_LENGTH: usize = 6;

// Settlement rounding: stored split shares are fixed at two decimal places
pub const SPLIT_SCALE: f64 = 100.0;
pub const BALANCE_TOLERANCE: f64 = 0.005;

// Error messages
pub const ERR_DATABASE_OPERATION: &str = "Database operation failed";
pub const ERR_UNAUTHORIZED: &str = "Not logged in";
pub const ERR_NOT_CREATOR: &str = "Only the creator can modify this";
pub const ERR_NO_POSITIVE_WEIGHT: &str =
    "At least one participant must have a weight greater than zero";
