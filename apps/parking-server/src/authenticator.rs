//! Authentication strategy selected at startup.

use std::sync::Arc;

use auth::{
    AUTH_STATE_MAX_AGE_SECS, AuthError, AuthResult, AuthStateStore, AuthorizationState,
    IdentityClaims, OidcAuth, OidcIdentity, Session, SessionStore,
};

/// How requests are authenticated.
///
/// Both variants store a `SessionData` behind the session cookie and gate
/// requests the same way; they differ in how a session comes to exist.
pub enum Authenticator {
    /// Username/password accounts.
    Local,
    /// External OpenID Connect provider.
    Delegated(DelegatedAuth),
}

impl Authenticator {
    /// Whether username/password endpoints are enabled.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    /// The OIDC client, in delegated mode.
    pub fn delegated(&self) -> Option<&DelegatedAuth> {
        match self {
            Self::Local => None,
            Self::Delegated(delegated) => Some(delegated),
        }
    }

    /// Resolves the user behind a loaded session.
    ///
    /// Delegated sessions carry a provider identity; once it expires it is
    /// renewed with the refresh token and the session rewritten. Returns
    /// `None` when the session no longer authenticates anyone.
    pub async fn current_user_id(
        &self,
        sessions: &dyn SessionStore,
        mut session: Session,
    ) -> AuthResult<Option<i64>> {
        let user_id = session.data.user_id;

        let delegated = match self {
            Self::Local => return Ok(Some(user_id)),
            Self::Delegated(delegated) => delegated,
        };

        let Some(identity) = &session.data.identity else {
            return Ok(None);
        };
        if !identity.is_expired() {
            return Ok(Some(user_id));
        }

        match delegated.client.refresh_identity(identity).await {
            Ok(refreshed) => {
                session.data.identity = Some(refreshed);
                sessions.save(&session).await?;
                tracing::debug!(user_id, "Refreshed provider identity");
                Ok(Some(user_id))
            }
            Err(e) => {
                tracing::info!(user_id, error = %e, "Provider identity expired");
                sessions.destroy(&session.id).await?;
                Ok(None)
            }
        }
    }
}

/// OIDC client plus the store for in-flight logins.
pub struct DelegatedAuth {
    pub client: OidcAuth,
    pub states: Arc<dyn AuthStateStore>,
}

impl DelegatedAuth {
    pub fn new(client: OidcAuth, states: Arc<dyn AuthStateStore>) -> Self {
        Self { client, states }
    }

    /// Parks a fresh authorization state and returns the provider URL to
    /// redirect the browser to.
    pub async fn begin_login(&self) -> AuthResult<String> {
        let state = AuthorizationState::new();
        self.states.store(&state).await?;
        self.client.authorization_url(&state)
    }

    /// Consumes the authorization state named by the callback and
    /// completes the code exchange.
    pub async fn finish_login(
        &self,
        code: &str,
        state_token: &str,
    ) -> AuthResult<(IdentityClaims, OidcIdentity)> {
        let state = self
            .states
            .take(state_token)
            .await?
            .ok_or_else(|| AuthError::InvalidState("Unknown or already used state".to_string()))?;

        if state.is_expired(AUTH_STATE_MAX_AGE_SECS) {
            return Err(AuthError::InvalidState("Authorization state expired".to_string()));
        }

        self.client.complete_login(code, &state).await
    }

    /// Where to send the browser after a local logout.
    pub fn logout_url(&self, identity: Option<&OidcIdentity>) -> String {
        let hint = identity.and_then(|identity| identity.id_token.as_deref());
        self.client
            .end_session_url(hint)
            .unwrap_or_else(|| "/".to_string())
    }

    /// Drops authorization states nobody came back for.
    pub async fn cleanup_states(&self) -> AuthResult<usize> {
        self.states.cleanup_expired(AUTH_STATE_MAX_AGE_SECS).await
    }
}
