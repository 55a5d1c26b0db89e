//! API endpoints.

pub mod auth;
pub mod oidc;
pub mod parking;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use parking_store::ParkingStore;

use crate::middleware::require_auth;
use crate::state::SharedState;

/// Creates the API router with all endpoints.
///
/// Everything except login, registration, logout and the health check sits
/// behind the session gate.
pub fn create_router<S: ParkingStore + 'static>(state: SharedState<S>) -> Router<SharedState<S>> {
    let protected = Router::new()
        .route("/api/auth/user", get(auth::get_current_user::<S>))
        // Parking endpoints
        .route(
            "/api/parking/spaces",
            get(parking::list_spaces::<S>).post(parking::create_space::<S>),
        )
        .route("/api/parking/spaces/{id}", patch(parking::update_space::<S>))
        .route("/api/parking/spaces/{id}/toggle", post(parking::toggle_space::<S>))
        .route("/api/parking/sections", get(parking::list_sections::<S>))
        .route("/api/parking/stats", get(parking::get_stats::<S>))
        .route("/api/parking/history", get(parking::get_history::<S>))
        .route_layer(from_fn_with_state(state, require_auth::<S>));

    Router::new()
        // Password auth endpoints
        .route("/api/auth/login", post(auth::login::<S>))
        .route("/api/auth/register", post(auth::register::<S>))
        .route("/api/auth/logout", post(auth::logout::<S>))
        // Identity provider endpoints
        .route("/api/login", get(oidc::login::<S>))
        .route("/api/callback", get(oidc::callback::<S>))
        .route("/api/logout", get(oidc::logout::<S>))
        // Health check
        .route("/health", get(health_check))
        .merge(protected)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
