//! Parking Server
//!
//! HTTP API for a parking lot operator console: session-based login
//! (local accounts or an OpenID Connect provider), the parking space grid,
//! occupancy statistics and the change history.

pub mod api;
pub mod authenticator;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
pub mod validation;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use auth::{OidcAuth, SqliteAuthStateStore, SqliteSessionStore};
use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
};
use parking_store::{ParkingStore, SqliteParkingStore};
use tower::ServiceExt;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::authenticator::{Authenticator, DelegatedAuth};
use crate::config::{AuthMode, Config, LogFormat};
use crate::state::{AppState, SharedState};

/// Creates the application router with all routes configured.
pub fn create_app<S: ParkingStore + 'static>(state: SharedState<S>) -> Router {
    let mut router = api::create_router(state.clone());

    if let Some(dir) = &state.config.static_dir {
        let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
        router = router.fallback(move |request: Request| {
            let spa = spa.clone();
            async move {
                if request.uri().path().starts_with("/api/") {
                    return StatusCode::NOT_FOUND.into_response();
                }
                spa.oneshot(request).await.into_response()
            }
        });
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    // Cookies only cross origins that are listed explicitly.
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Seeds the default lot and the bootstrap account, as configured.
pub async fn prepare_store<S: ParkingStore>(store: &S, config: &Config) -> anyhow::Result<()> {
    if config.seed_spaces {
        store.initialize_parking_spaces().await?;
    }

    if let Some(admin) = config.admin_account() {
        let username = admin.username.clone();
        if store.ensure_user(admin).await?.is_some() {
            tracing::info!(username = %username, "Created bootstrap account");
        }
    }

    Ok(())
}

/// Creates the application state, with sessions kept next to the parking
/// data.
pub async fn create_state(
    config: Config,
    store: SqliteParkingStore,
) -> anyhow::Result<SharedState<SqliteParkingStore>> {
    let sessions = SqliteSessionStore::new(store.pool().clone());
    sessions.init().await?;

    let authenticator = match (&config.auth_mode, &config.oidc) {
        (AuthMode::Oidc, Some(oidc)) => {
            let client = OidcAuth::discover(oidc.clone()).await?;
            let states = SqliteAuthStateStore::new(store.pool().clone());
            states.init().await?;
            tracing::info!(issuer = %client.metadata().issuer, "Using identity provider");
            Authenticator::Delegated(DelegatedAuth::new(client, Arc::new(states)))
        }
        (AuthMode::Oidc, None) => anyhow::bail!("OIDC mode requires provider settings"),
        (AuthMode::Local, _) => Authenticator::Local,
    };

    Ok(Arc::new(AppState::new(
        config,
        store,
        Arc::new(sessions),
        authenticator,
    )))
}

/// Initializes tracing with the given log level and output format.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}
