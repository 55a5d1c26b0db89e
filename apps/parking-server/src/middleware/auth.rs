//! Session gate and session cookie helpers.

use auth::{SESSION_COOKIE_NAME, Session};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use parking_store::ParkingStore;

use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::state::{AppState, SharedState};

/// The operator behind the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
}

/// Rejects requests without a live session with 401 before any handler
/// runs, and exposes the user as a `CurrentUser` extension otherwise.
pub async fn require_auth<S: ParkingStore + 'static>(
    State(state): State<SharedState<S>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve_user(&state, &jar).await {
        Ok(Some(id)) => {
            request.extensions_mut().insert(CurrentUser { id });
            next.run(request).await
        }
        Ok(None) => ServerError::AuthenticationRequired.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Looks up the user for the session cookie, if any.
pub(crate) async fn resolve_user<S: ParkingStore>(
    state: &AppState<S>,
    jar: &CookieJar,
) -> ServerResult<Option<i64>> {
    let Some(cookie) = jar.get(SESSION_COOKIE_NAME) else {
        return Ok(None);
    };
    let Some(session) = state.sessions.load(cookie.value()).await? else {
        return Ok(None);
    };

    Ok(state
        .authenticator
        .current_user_id(state.sessions.as_ref(), session)
        .await?)
}

/// Cookie carrying a freshly created session.
pub fn session_cookie(config: &Config, session: &Session) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, session.id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(time::Duration::seconds(config.session_ttl().num_seconds()))
        .build()
}

/// Cookie that makes the browser forget the session.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE_NAME).path("/").build()
}
