//! Periodic removal of expired sessions and abandoned logins.

use std::time::Duration;

use parking_store::ParkingStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::{AppState, SharedState};

/// Runs [`sweep_once`] every `session_sweep_secs` until the runtime stops.
pub fn spawn_session_sweeper<S: ParkingStore + 'static>(state: SharedState<S>) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.session_sweep_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweep_once(&state).await;
        }
    })
}

/// Deletes expired sessions and, in OIDC mode, stale authorization
/// states. Returns how many of each were removed.
pub async fn sweep_once<S: ParkingStore>(state: &AppState<S>) -> (usize, usize) {
    let sessions = match state.sessions.cleanup_expired().await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!(error = %e, "Failed to sweep sessions");
            0
        }
    };

    let states = match state.authenticator.delegated() {
        Some(delegated) => match delegated.cleanup_states().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to sweep authorization states");
                0
            }
        },
        None => 0,
    };

    if sessions > 0 || states > 0 {
        tracing::info!(sessions, states, "Swept expired sessions");
    }

    (sessions, states)
}

#[cfg(test)]
mod tests {
    use auth::{AUTH_STATE_MAX_AGE_SECS, AuthorizationState, SessionData};
    use chrono::Duration;

    use super::*;
    use crate::test_support::TestApp;

    #[tokio::test]
    async fn test_sweep_removes_only_expired_sessions() {
        let app = TestApp::local().await;
        let sessions = &app.state.sessions;

        let live = sessions
            .create(SessionData::local(1), Duration::hours(1))
            .await
            .unwrap();
        sessions
            .create(SessionData::local(2), Duration::seconds(-1))
            .await
            .unwrap();

        assert_eq!(sweep_once(&app.state).await, (1, 0));
        assert!(sessions.load(&live.id).await.unwrap().is_some());
        assert_eq!(sweep_once(&app.state).await, (0, 0));
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_authorization_states() {
        let app = TestApp::delegated().await;
        let delegated = app.state.authenticator.delegated().unwrap();

        let mut stale = AuthorizationState::new();
        stale.created_at -= AUTH_STATE_MAX_AGE_SECS + 1;
        delegated.states.store(&stale).await.unwrap();
        delegated.states.store(&AuthorizationState::new()).await.unwrap();

        assert_eq!(sweep_once(&app.state).await, (0, 1));
    }
}
