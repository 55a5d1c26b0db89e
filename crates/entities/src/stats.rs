//! Derived occupancy statistics.

use serde::{Deserialize, Serialize};

use crate::{ParkingSpace, SpaceStatus, section_grid_columns};

/// Occupancy counts for a set of spaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingStats {
    pub total: u64,
    pub available: u64,
    pub occupied: u64,
    pub maintenance: u64,
    /// Percentage of spaces that are occupied; `0` for an empty set.
    pub occupancy_rate: f64,
}

impl ParkingStats {
    /// Builds stats from per-status counts. Repeated statuses are summed.
    pub fn from_counts(counts: impl IntoIterator<Item = (SpaceStatus, u64)>) -> Self {
        let mut stats = Self::default();
        for (status, count) in counts {
            stats.total += count;
            match status {
                SpaceStatus::Available => stats.available += count,
                SpaceStatus::Occupied => stats.occupied += count,
                SpaceStatus::Maintenance => stats.maintenance += count,
            }
        }
        stats.occupancy_rate = occupancy_rate(stats.occupied, stats.total);
        stats
    }

    /// Builds stats by counting the given spaces.
    pub fn from_spaces<'a>(spaces: impl IntoIterator<Item = &'a ParkingSpace>) -> Self {
        Self::from_counts(spaces.into_iter().map(|space| (space.status, 1)))
    }
}

/// Returns `occupied / total * 100`, or `0` when `total` is zero.
pub fn occupancy_rate(occupied: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    occupied as f64 / total as f64 * 100.0
}

/// One section of the lot with its spaces in grid order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub section: String,
    /// Width of the section's grid, in spaces.
    pub grid_columns: u32,
    pub stats: ParkingStats,
    pub spaces: Vec<ParkingSpace>,
}

/// Groups spaces (already in grid order) by section.
pub fn group_by_section(spaces: Vec<ParkingSpace>) -> Vec<SectionSummary> {
    let mut sections: Vec<SectionSummary> = Vec::new();
    for space in spaces {
        match sections.last_mut() {
            Some(summary) if summary.section == space.section => summary.spaces.push(space),
            _ => sections.push(SectionSummary {
                section: space.section.clone(),
                grid_columns: section_grid_columns(&space.section),
                stats: ParkingStats::default(),
                spaces: vec![space],
            }),
        }
    }
    for summary in &mut sections {
        summary.stats = ParkingStats::from_spaces(&summary.spaces);
    }
    sections
}
