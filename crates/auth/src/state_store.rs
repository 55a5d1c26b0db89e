//! Authorization state storage
//!
//! In-flight OIDC logins park their state, nonce and PKCE verifier here
//! between `/api/login` and `/api/callback`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{AuthError, AuthResult, AuthorizationState};

/// Trait for authorization state storage
#[async_trait]
pub trait AuthStateStore: Send + Sync {
    /// Store an authorization state
    async fn store(&self, state: &AuthorizationState) -> AuthResult<()>;

    /// Retrieve and remove an authorization state by state token
    ///
    /// A state can be taken at most once.
    async fn take(&self, state_token: &str) -> AuthResult<Option<AuthorizationState>>;

    /// Remove states older than `max_age_secs`
    ///
    /// Returns the number of states removed.
    async fn cleanup_expired(&self, max_age_secs: i64) -> AuthResult<usize>;
}

/// In-memory authorization state store
#[derive(Debug, Default)]
pub struct MemoryAuthStateStore {
    states: RwLock<HashMap<String, AuthorizationState>>,
}

impl MemoryAuthStateStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStateStore for MemoryAuthStateStore {
    async fn store(&self, state: &AuthorizationState) -> AuthResult<()> {
        let mut states = self
            .states
            .write()
            .map_err(|e| AuthError::Oidc(format!("Lock poisoned: {}", e)))?;
        states.insert(state.state.clone(), state.clone());
        Ok(())
    }

    async fn take(&self, state_token: &str) -> AuthResult<Option<AuthorizationState>> {
        let mut states = self
            .states
            .write()
            .map_err(|e| AuthError::Oidc(format!("Lock poisoned: {}", e)))?;
        Ok(states.remove(state_token))
    }

    async fn cleanup_expired(&self, max_age_secs: i64) -> AuthResult<usize> {
        let mut states = self
            .states
            .write()
            .map_err(|e| AuthError::Oidc(format!("Lock poisoned: {}", e)))?;
        let before_count = states.len();
        states.retain(|_, state| !state.is_expired(max_age_secs));
        Ok(before_count - states.len())
    }
}

#[cfg(feature = "sqlx")]
pub use sqlx_store::*;

#[cfg(feature = "sqlx")]
mod sqlx_store {
    use sqlx::{Pool, Sqlite};

    use super::*;

    /// SQLite authorization state store
    #[derive(Debug, Clone)]
    pub struct SqliteAuthStateStore {
        pool: Pool<Sqlite>,
    }

    impl SqliteAuthStateStore {
        /// Create a new SQLite store
        pub fn new(pool: Pool<Sqlite>) -> Self {
            Self { pool }
        }

        /// Initialize the `auth_states` table
        pub async fn init(&self) -> AuthResult<()> {
            sqlx::raw_sql(
                r#"
                CREATE TABLE IF NOT EXISTS auth_states (
                    state_token TEXT PRIMARY KEY,
                    nonce TEXT NOT NULL,
                    code_verifier TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_auth_states_created_at ON auth_states (created_at);
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Oidc(format!("Failed to create auth_states table: {}", e)))?;

            Ok(())
        }
    }

    #[async_trait]
    impl AuthStateStore for SqliteAuthStateStore {
        async fn store(&self, state: &AuthorizationState) -> AuthResult<()> {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO auth_states (state_token, nonce, code_verifier, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&state.state)
            .bind(&state.nonce)
            .bind(&state.code_verifier)
            .bind(state.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Oidc(format!("Failed to store auth state: {}", e)))?;
            Ok(())
        }

        async fn take(&self, state_token: &str) -> AuthResult<Option<AuthorizationState>> {
            let row: Option<(String, String, String, i64)> = sqlx::query_as(
                r#"
                DELETE FROM auth_states
                WHERE state_token = ?
                RETURNING state_token, nonce, code_verifier, created_at
                "#,
            )
            .bind(state_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Oidc(format!("Failed to retrieve auth state: {}", e)))?;

            Ok(row.map(
                |(state, nonce, code_verifier, created_at)| AuthorizationState {
                    state,
                    nonce,
                    code_verifier,
                    created_at,
                },
            ))
        }

        async fn cleanup_expired(&self, max_age_secs: i64) -> AuthResult<usize> {
            let cutoff = chrono::Utc::now().timestamp() - max_age_secs;
            let result = sqlx::query("DELETE FROM auth_states WHERE created_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AuthError::Oidc(format!("Failed to cleanup expired states: {}", e))
                })?;

            Ok(result.rows_affected() as usize)
        }
    }
}


#[cfg(all(test, feature = "sqlx"))]
mod sqlite_tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn store() -> SqliteAuthStateStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteAuthStateStore::new(pool);
        store.init().await.unwrap();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_sqlite_state_is_taken_once() {
        let store = store().await;
        let state = AuthorizationState::new();

        store.store(&state).await.unwrap();

        assert_eq!(store.take(&state.state).await.unwrap(), Some(state.clone()));
        assert!(store.take(&state.state).await.unwrap().is_none());
        assert!(store.take("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_cleanup_removes_only_stale_states() {
        let store = store().await;

        let mut old_state = AuthorizationState::new();
        old_state.created_at = chrono::Utc::now().timestamp() - 1000;
        let fresh_state = AuthorizationState::new();

        store.store(&old_state).await.unwrap();
        store.store(&fresh_state).await.unwrap();

        assert_eq!(store.cleanup_expired(600).await.unwrap(), 1);
        assert!(store.take(&old_state.state).await.unwrap().is_none());
        assert_eq!(
            store.take(&fresh_state.state).await.unwrap(),
            Some(fresh_state)
        );
    }
}
