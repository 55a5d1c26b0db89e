//! Parking space storage and management.
//!
//! This crate provides the data-access layer of the parking service: a
//! storage trait over users, parking spaces and the history log, and its
//! SQLite implementation.

mod error;
mod password;
mod schema;
mod seed;
mod sqlite;
mod traits;

pub use error::*;
pub use password::*;
pub use seed::*;
pub use sqlite::*;
pub use traits::*;

/// Default number of history rows returned when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Upper bound on the number of history rows returned in one call.
pub const MAX_HISTORY_LIMIT: u32 = 100;
