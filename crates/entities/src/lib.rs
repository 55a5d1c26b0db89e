//! Core entity definitions for the parking service.
//!
//! This crate defines the data types shared by the store, the
//! authentication layer and the HTTP API: users, parking spaces, the
//! history log and the derived occupancy statistics.

mod history;
mod space;
mod stats;
mod user;

pub use history::*;
pub use space::*;
pub use stats::*;
pub use user::*;
