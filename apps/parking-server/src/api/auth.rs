//! Username/password authentication endpoints.

use auth::{SESSION_COOKIE_NAME, SessionData};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use axum_extra::extract::cookie::CookieJar;
use entities::User;
use parking_store::ParkingStore;
use serde::Serialize;

use crate::error::{ServerError, ServerResult};
use crate::middleware::{CurrentUser, removal_cookie, session_cookie};
use crate::state::{AppState, SharedState};
use crate::validation::{LoginRequest, RegisterRequest};

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            profile_image_url: user.profile_image_url,
        }
    }
}

/// Response for login and registration.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: UserProfile,
}

/// Response carrying only a message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn ensure_local<S: ParkingStore>(state: &AppState<S>) -> ServerResult<()> {
    if state.authenticator.is_local() {
        Ok(())
    } else {
        Err(ServerError::InvalidRequest(
            "Password login is disabled; use /api/login".to_string(),
        ))
    }
}

/// Replaces any session the browser already holds with a new one.
pub(crate) async fn start_session<S: ParkingStore>(
    state: &AppState<S>,
    jar: CookieJar,
    data: SessionData,
) -> ServerResult<CookieJar> {
    if let Some(previous) = jar.get(SESSION_COOKIE_NAME) {
        state.sessions.destroy(previous.value()).await?;
    }

    let session = state
        .sessions
        .create(data, state.config.session_ttl())
        .await?;

    Ok(jar.add(session_cookie(&state.config, &session)))
}

/// Logs in with username and password.
pub async fn login<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ServerResult<(CookieJar, Json<AuthResponse>)> {
    ensure_local(&state)?;
    let Json(request) = payload?;
    let credentials = request.validate()?;

    let Some(user) = state
        .store
        .login_user(&credentials.username, &credentials.password)
        .await?
    else {
        tracing::info!(username = %credentials.username, "Rejected login");
        return Err(ServerError::InvalidCredentials);
    };

    let jar = start_session(&state, jar, SessionData::local(user.id)).await?;

    tracing::info!(user_id = user.id, name = %user.display_name(), "User logged in");

    Ok((
        jar,
        Json(AuthResponse {
            message: "Login successful",
            user: user.into(),
        }),
    ))
}

/// Registers a local account and logs it in.
pub async fn register<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    jar: CookieJar,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ServerResult<(CookieJar, Json<AuthResponse>)> {
    ensure_local(&state)?;
    let Json(request) = payload?;
    let new_user = request.validate()?;

    let user = state.store.create_user(new_user).await?;
    let jar = start_session(&state, jar, SessionData::local(user.id)).await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");

    Ok((
        jar,
        Json(AuthResponse {
            message: "Registration successful",
            user: user.into(),
        }),
    ))
}

/// Gets the current authenticated user.
pub async fn get_current_user<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    Extension(current): Extension<CurrentUser>,
) -> ServerResult<Json<UserProfile>> {
    let user = state
        .store
        .get_user(current.id)
        .await?
        .ok_or_else(|| ServerError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// Logs out, destroying the session if there is one.
pub async fn logout<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    jar: CookieJar,
) -> ServerResult<(CookieJar, Json<MessageResponse>)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        state.sessions.destroy(cookie.value()).await?;
        tracing::info!("User logged out");
    }

    Ok((
        jar.remove(removal_cookie()),
        Json(MessageResponse {
            message: "Logout successful",
        }),
    ))
}
