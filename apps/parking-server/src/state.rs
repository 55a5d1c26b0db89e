//! Application state.

use std::sync::Arc;

use auth::SessionStore;
use parking_store::ParkingStore;

use crate::authenticator::Authenticator;
use crate::config::Config;

/// Shared application state.
pub struct AppState<S: ParkingStore> {
    /// Server configuration.
    pub config: Config,
    /// Parking store.
    pub store: S,
    /// Session store.
    pub sessions: Arc<dyn SessionStore>,
    /// Authentication strategy.
    pub authenticator: Authenticator,
}

impl<S: ParkingStore> AppState<S> {
    /// Creates new application state.
    pub fn new(
        config: Config,
        store: S,
        sessions: Arc<dyn SessionStore>,
        authenticator: Authenticator,
    ) -> Self {
        Self {
            config,
            store,
            sessions,
            authenticator,
        }
    }
}

/// Type alias for shared state.
pub type SharedState<S> = Arc<AppState<S>>;
