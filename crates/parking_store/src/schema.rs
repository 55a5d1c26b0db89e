//! Database schema and row types.

use chrono::{DateTime, SecondsFormat, Utc};
use entities::{HistoryAction, ParkingHistory, ParkingSpace, SpaceStatus, User};
use sqlx::FromRow;

use crate::{StoreError, StoreResult};

/// SQL schema definition
pub(crate) const SCHEMA_SQL: &str = r#"
-- Operator accounts
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT,
    external_id TEXT UNIQUE,
    email TEXT,
    first_name TEXT,
    last_name TEXT,
    profile_image_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Parking spaces
CREATE TABLE IF NOT EXISTS parking_spaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_number TEXT NOT NULL UNIQUE,
    section TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'available'
        CHECK (status IN ('available', 'occupied', 'maintenance')),
    last_updated TEXT NOT NULL,
    occupied_by TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_parking_spaces_section ON parking_spaces (section);

-- Append-only history of actions against spaces
CREATE TABLE IF NOT EXISTS parking_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL REFERENCES parking_spaces(id),
    action TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    user_id INTEGER REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_parking_history_timestamp ON parking_history (timestamp);
"#;

/// Formats a timestamp for storage.
///
/// Fixed precision keeps the text lexicographically ordered.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(entity_type: &'static str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(entity_type, format!("bad timestamp {value:?}: {e}")))
}

/// Database row for User
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: Option<String>,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            external_id: row.external_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_image_url: row.profile_image_url,
            created_at: parse_timestamp("user", &row.created_at)?,
            updated_at: parse_timestamp("user", &row.updated_at)?,
        })
    }
}

/// Database row for ParkingSpace
#[derive(Debug, FromRow)]
pub(crate) struct ParkingSpaceRow {
    pub id: i64,
    pub space_number: String,
    pub section: String,
    pub status: String,
    pub last_updated: String,
    pub occupied_by: Option<String>,
    pub created_at: String,
}

impl TryFrom<ParkingSpaceRow> for ParkingSpace {
    type Error = StoreError;

    fn try_from(row: ParkingSpaceRow) -> StoreResult<Self> {
        let status: SpaceStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::corrupt("parking space", e))?;

        Ok(Self {
            id: row.id,
            space_number: row.space_number,
            section: row.section,
            status,
            last_updated: parse_timestamp("parking space", &row.last_updated)?,
            occupied_by: row.occupied_by,
            created_at: parse_timestamp("parking space", &row.created_at)?,
        })
    }
}

/// Database row for ParkingHistory
#[derive(Debug, FromRow)]
pub(crate) struct ParkingHistoryRow {
    pub id: i64,
    pub space_id: i64,
    pub action: String,
    pub timestamp: String,
    pub user_id: Option<i64>,
}

impl TryFrom<ParkingHistoryRow> for ParkingHistory {
    type Error = StoreError;

    fn try_from(row: ParkingHistoryRow) -> StoreResult<Self> {
        let action: HistoryAction = row
            .action
            .parse()
            .map_err(|e| StoreError::corrupt("parking history", e))?;

        Ok(Self {
            id: row.id,
            space_id: row.space_id,
            action,
            timestamp: parse_timestamp("parking history", &row.timestamp)?,
            user_id: row.user_id,
        })
    }
}

/// Column list shared by user queries.
pub(crate) const USER_COLUMNS: &str = "id, username, password_hash, external_id, email, \
     first_name, last_name, profile_image_url, created_at, updated_at";

/// Column list shared by parking space queries.
pub(crate) const SPACE_COLUMNS: &str =
    "id, space_number, section, status, last_updated, occupied_by, created_at";

/// Column list shared by history queries.
pub(crate) const HISTORY_COLUMNS: &str = "id, space_id, action, timestamp, user_id";
