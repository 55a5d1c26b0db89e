//! Parking space entity definitions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::HistoryAction;

/// Status of a parking space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceStatus {
    /// Free to park in.
    #[default]
    Available,
    /// Currently in use.
    Occupied,
    /// Closed for maintenance.
    Maintenance,
}

/// Error returned when a string is not a known space status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown space status: {0}")]
pub struct UnknownStatus(pub String);

impl SpaceStatus {
    /// All statuses, in display order.
    pub const ALL: [SpaceStatus; 3] = [Self::Available, Self::Occupied, Self::Maintenance];

    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::Maintenance => "maintenance",
        }
    }

    /// Returns the status a toggle moves to.
    ///
    /// Toggling flips between available and occupied. Maintenance is inert
    /// and has no toggle target.
    pub fn toggled(self) -> Option<Self> {
        match self {
            Self::Available => Some(Self::Occupied),
            Self::Occupied => Some(Self::Available),
            Self::Maintenance => None,
        }
    }

    /// Returns the history action recorded when a space moves into this status.
    pub fn history_action(self) -> HistoryAction {
        match self {
            Self::Available => HistoryAction::Freed,
            Self::Occupied => HistoryAction::Occupied,
            Self::Maintenance => HistoryAction::Maintenance,
        }
    }
}

impl fmt::Display for SpaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpaceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "occupied" => Ok(Self::Occupied),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A single parking slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSpace {
    /// Unique identifier.
    pub id: i64,
    /// Human-readable number, unique across the lot (e.g. `B7`).
    pub space_number: String,
    /// Section label (e.g. `B`).
    pub section: String,
    /// Current status.
    pub status: SpaceStatus,
    /// When the status or occupant last changed.
    pub last_updated: DateTime<Utc>,
    /// Free-form occupant reference (plate, badge, name).
    pub occupied_by: Option<String>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl ParkingSpace {
    /// Returns the numeric suffix of the space number, if any.
    pub fn number_suffix(&self) -> Option<u32> {
        space_number_suffix(&self.space_number)
    }

    /// Compares two spaces in grid order: section, then numeric suffix,
    /// then the raw space number.
    pub fn grid_cmp(&self, other: &Self) -> Ordering {
        self.section
            .cmp(&other.section)
            .then_with(|| cmp_suffix(self.number_suffix(), other.number_suffix()))
            .then_with(|| self.space_number.cmp(&other.space_number))
    }
}

/// Parses the trailing run of ASCII digits in a space number.
///
/// `"C12"` yields `Some(12)`; `"VIP"` yields `None`.
pub fn space_number_suffix(space_number: &str) -> Option<u32> {
    let digits_start = space_number
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(idx, _)| idx)?;
    space_number[digits_start..].parse().ok()
}

// Spaces without a numeric suffix sort after numbered ones.
fn cmp_suffix(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sorts spaces into grid order.
pub fn sort_spaces(spaces: &mut [ParkingSpace]) {
    spaces.sort_by(ParkingSpace::grid_cmp);
}

/// Number of grid columns used to lay out a section.
pub fn section_grid_columns(section: &str) -> u32 {
    match section {
        "A" => 8,
        "B" => 10,
        _ => 12,
    }
}

/// Data for creating a parking space.
#[derive(Debug, Clone, PartialEq)]
pub struct NewParkingSpace {
    pub space_number: String,
    pub section: String,
    pub status: SpaceStatus,
    pub occupied_by: Option<String>,
}

impl NewParkingSpace {
    /// Creates an available space.
    pub fn new(space_number: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            space_number: space_number.into(),
            section: section.into(),
            status: SpaceStatus::Available,
            occupied_by: None,
        }
    }

    /// Sets the initial status.
    pub fn with_status(mut self, status: SpaceStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the occupant reference.
    pub fn with_occupied_by(mut self, occupied_by: impl Into<String>) -> Self {
        self.occupied_by = Some(occupied_by.into());
        self
    }
}

/// Partial update of a parking space.
///
/// `occupied_by` distinguishes "leave unchanged" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParkingSpaceUpdate {
    pub status: Option<SpaceStatus>,
    pub occupied_by: Option<Option<String>>,
}

impl ParkingSpaceUpdate {
    /// Creates an update that only changes the status.
    pub fn status(status: SpaceStatus) -> Self {
        Self {
            status: Some(status),
            occupied_by: None,
        }
    }

    /// Returns the history action this update should be logged as.
    pub fn history_action(&self) -> HistoryAction {
        self.status
            .map(SpaceStatus::history_action)
            .unwrap_or(HistoryAction::Updated)
    }
}
