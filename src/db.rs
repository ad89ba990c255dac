mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for login.
    pub username: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
    /// Address of the last successful login.
    pub last_login_ip: Option<String>,
}

/// Library collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    /// Unique library ID.
    pub id: String,
    /// Library name.
    pub name: String,
    /// Path on filesystem.
    pub path: String,
    /// Whether every user may see the library.
    pub is_public: bool,
    /// Creation timestamp.
    pub created_at: i64,
}

/// What the scanner remembers about an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStamp {
    /// File size in bytes.
    pub size: Option<u64>,
    /// File modification timestamp.
    pub modified: i64,
    /// First indexed timestamp.
    pub created: i64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
