//! Parking history entity definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    /// The space was created.
    Created,
    /// The space became occupied.
    Occupied,
    /// The space became available.
    Freed,
    /// The space was put under maintenance.
    Maintenance,
    /// Fields other than the status changed.
    Updated,
}

/// Error returned when a string is not a known history action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown history action: {0}")]
pub struct UnknownAction(pub String);

impl HistoryAction {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Occupied => "occupied",
            Self::Freed => "freed",
            Self::Maintenance => "maintenance",
            Self::Updated => "updated",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "occupied" => Ok(Self::Occupied),
            "freed" => Ok(Self::Freed),
            "maintenance" => Ok(Self::Maintenance),
            "updated" => Ok(Self::Updated),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Immutable audit record of an action against a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingHistory {
    /// Unique identifier.
    pub id: i64,
    /// The space the action applied to.
    pub space_id: i64,
    /// What happened.
    pub action: HistoryAction,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Who did it, when known.
    pub user_id: Option<i64>,
}
