//! Default parking lot layout.

use entities::{NewParkingSpace, SpaceStatus};

/// A section of the default layout.
#[derive(Debug, Clone, Copy)]
pub struct SeedSection {
    /// Section label.
    pub section: &'static str,
    /// Number of spaces, numbered from 1.
    pub spaces: u32,
    /// Every n-th space starts occupied.
    pub occupied_every: u32,
    /// Space that starts under maintenance, if any.
    pub maintenance_slot: Option<u32>,
}

/// The default lot: 30 spaces across sections A, B and C.
pub const DEFAULT_LAYOUT: [SeedSection; 3] = [
    SeedSection {
        section: "A",
        spaces: 8,
        occupied_every: 3,
        maintenance_slot: None,
    },
    SeedSection {
        section: "B",
        spaces: 10,
        occupied_every: 4,
        maintenance_slot: None,
    },
    SeedSection {
        section: "C",
        spaces: 12,
        occupied_every: 5,
        maintenance_slot: Some(8),
    },
];

impl SeedSection {
    /// Status of the given 1-based slot. Occupancy wins over maintenance.
    pub fn status_of(&self, slot: u32) -> SpaceStatus {
        if slot % self.occupied_every == 0 {
            SpaceStatus::Occupied
        } else if self.maintenance_slot == Some(slot) {
            SpaceStatus::Maintenance
        } else {
            SpaceStatus::Available
        }
    }

    /// Expands the section into spaces.
    pub fn spaces(&self) -> impl Iterator<Item = NewParkingSpace> + '_ {
        (1..=self.spaces).map(move |slot| {
            NewParkingSpace::new(format!("{}{}", self.section, slot), self.section)
                .with_status(self.status_of(slot))
        })
    }
}

/// Expands the default layout into the spaces to insert.
pub fn default_layout() -> Vec<NewParkingSpace> {
    DEFAULT_LAYOUT.iter().flat_map(SeedSection::spaces).collect()
}
