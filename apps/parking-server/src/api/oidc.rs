//! OpenID Connect login endpoints.

use auth::{SESSION_COOKIE_NAME, SessionData};
use axum::{
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::cookie::CookieJar;
use parking_store::ParkingStore;
use serde::Deserialize;

use crate::api::auth::start_session;
use crate::authenticator::DelegatedAuth;
use crate::error::{ServerError, ServerResult};
use crate::middleware::removal_cookie;
use crate::state::{AppState, SharedState};

/// Query parameters for OIDC callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn delegated<S: ParkingStore>(state: &AppState<S>) -> ServerResult<&DelegatedAuth> {
    state
        .authenticator
        .delegated()
        .ok_or_else(|| ServerError::NotFound("OIDC login is not enabled".to_string()))
}

/// Starts the provider login.
pub async fn login<S: ParkingStore>(
    State(state): State<SharedState<S>>,
) -> ServerResult<Redirect> {
    let url = delegated(&state)?.begin_login().await?;

    tracing::debug!("Redirecting to identity provider");

    Ok(Redirect::to(&url))
}

/// Handles the provider redirect back to us.
pub async fn callback<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> ServerResult<(CookieJar, Redirect)> {
    let delegated = delegated(&state)?;

    if let Some(error) = &query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "Identity provider refused login"
        );
        return Err(ServerError::AuthenticationRequired);
    }

    let (Some(code), Some(state_token)) = (&query.code, &query.state) else {
        return Err(ServerError::InvalidRequest(
            "Missing code or state".to_string(),
        ));
    };

    let (claims, identity) = delegated.finish_login(code, state_token).await?;
    let user = state.store.upsert_user(claims.to_profile()).await?;
    let jar = start_session(&state, jar, SessionData::delegated(user.id, identity)).await?;

    tracing::info!(
        user_id = user.id,
        name = %user.display_name(),
        "User logged in through identity provider"
    );

    Ok((jar, Redirect::to("/")))
}

/// Ends the session and, in OIDC mode, the provider session too.
pub async fn logout<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    jar: CookieJar,
) -> ServerResult<(CookieJar, Redirect)> {
    let session = match jar.get(SESSION_COOKIE_NAME) {
        Some(cookie) => state.sessions.load(cookie.value()).await?,
        None => None,
    };

    if let Some(session) = &session {
        state.sessions.destroy(&session.id).await?;
        tracing::info!(user_id = session.data.user_id, "User logged out");
    }

    let target = match state.authenticator.delegated() {
        Some(delegated) => {
            let identity = session.as_ref().and_then(|s| s.data.identity.as_ref());
            delegated.logout_url(identity)
        }
        None => "/".to_string(),
    };

    Ok((jar.remove(removal_cookie()), Redirect::to(&target)))
}
