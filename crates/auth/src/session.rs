//! Server-side sessions.
//!
//! The browser only carries an opaque session id. The payload lives in a
//! store and expires after a fixed lifetime.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{random_token, AuthError, AuthResult, OidcIdentity};

/// Payload stored for a logged-in browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Local user id
    pub user_id: i64,

    /// Provider identity, for sessions created through OIDC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<OidcIdentity>,
}

impl SessionData {
    /// Session for a locally authenticated user.
    pub fn local(user_id: i64) -> Self {
        Self {
            user_id,
            identity: None,
        }
    }

    /// Session for a user authenticated by the identity provider.
    pub fn delegated(user_id: i64, identity: OidcIdentity) -> Self {
        Self {
            user_id,
            identity: Some(identity),
        }
    }
}

/// A stored session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque identifier carried by the cookie
    pub id: String,
    pub data: SessionData,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn new(data: SessionData, ttl: Duration) -> Self {
        Self {
            id: random_token(32),
            data,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Whether the session has passed its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Trait for session storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session with a fresh random id.
    async fn create(&self, data: SessionData, ttl: Duration) -> AuthResult<Session>;

    /// Loads a session. Expired sessions are treated as absent.
    async fn load(&self, id: &str) -> AuthResult<Option<Session>>;

    /// Rewrites the payload of an existing session, keeping its expiry.
    async fn save(&self, session: &Session) -> AuthResult<()>;

    /// Deletes a session. Unknown ids are ignored.
    async fn destroy(&self, id: &str) -> AuthResult<()>;

    /// Deletes every expired session, returning how many were removed.
    async fn cleanup_expired(&self) -> AuthResult<usize>;
}

/// In-memory session store (for tests and throwaway deployments)
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> AuthResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .write()
            .map_err(|e| AuthError::Session(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, data: SessionData, ttl: Duration) -> AuthResult<Session> {
        let session = Session::new(data, ttl);
        self.write()?.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn load(&self, id: &str) -> AuthResult<Option<Session>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| AuthError::Session(format!("Lock poisoned: {}", e)))?;
        Ok(sessions.get(id).filter(|s| !s.is_expired()).cloned())
    }

    async fn save(&self, session: &Session) -> AuthResult<()> {
        let mut sessions = self.write()?;
        if let Some(existing) = sessions.get_mut(&session.id) {
            existing.data = session.data.clone();
        }
        Ok(())
    }

    async fn destroy(&self, id: &str) -> AuthResult<()> {
        self.write()?.remove(id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<usize> {
        let mut sessions = self.write()?;
        let before_count = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok(before_count - sessions.len())
    }
}

#[cfg(feature = "sqlx")]
pub use sqlx_store::*;

#[cfg(feature = "sqlx")]
mod sqlx_store {
    use sqlx::{Pool, Sqlite};

    use super::*;

    /// SQLite session store sharing the application database.
    #[derive(Debug, Clone)]
    pub struct SqliteSessionStore {
        pool: Pool<Sqlite>,
    }

    impl SqliteSessionStore {
        /// Create a new SQLite store
        pub fn new(pool: Pool<Sqlite>) -> Self {
            Self { pool }
        }

        /// Initialize the `sessions` table
        pub async fn init(&self) -> AuthResult<()> {
            sqlx::raw_sql(
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    sid TEXT PRIMARY KEY,
                    sess TEXT NOT NULL,
                    expire INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS "IDX_session_expire" ON sessions (expire);
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Session(format!("Failed to create sessions table: {}", e)))?;

            Ok(())
        }
    }

    fn encode(data: &SessionData) -> AuthResult<String> {
        serde_json::to_string(data)
            .map_err(|e| AuthError::Session(format!("Failed to encode session: {}", e)))
    }

    #[async_trait]
    impl SessionStore for SqliteSessionStore {
        async fn create(&self, data: SessionData, ttl: Duration) -> AuthResult<Session> {
            let session = Session::new(data, ttl);

            sqlx::query("INSERT INTO sessions (sid, sess, expire) VALUES (?, ?, ?)")
                .bind(&session.id)
                .bind(encode(&session.data)?)
                .bind(session.expires_at.timestamp_millis())
                .execute(&self.pool)
                .await
                .map_err(|e| AuthError::Session(format!("Failed to store session: {}", e)))?;

            Ok(session)
        }

        async fn load(&self, id: &str) -> AuthResult<Option<Session>> {
            let row: Option<(String, String, i64)> = sqlx::query_as(
                "SELECT sid, sess, expire FROM sessions WHERE sid = ? AND expire > ?",
            )
            .bind(id)
            .bind(Utc::now().timestamp_millis())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Session(format!("Failed to load session: {}", e)))?;

            let Some((id, sess, expire)) = row else {
                return Ok(None);
            };

            let data: SessionData = match serde_json::from_str(&sess) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable session payload");
                    return Ok(None);
                }
            };
            let Some(expires_at) = DateTime::from_timestamp_millis(expire) else {
                return Ok(None);
            };

            Ok(Some(Session {
                id,
                data,
                expires_at,
            }))
        }

        async fn save(&self, session: &Session) -> AuthResult<()> {
            sqlx::query("UPDATE sessions SET sess = ? WHERE sid = ?")
                .bind(encode(&session.data)?)
                .bind(&session.id)
                .execute(&self.pool)
                .await
                .map_err(|e| AuthError::Session(format!("Failed to save session: {}", e)))?;
            Ok(())
        }

        async fn destroy(&self, id: &str) -> AuthResult<()> {
            sqlx::query("DELETE FROM sessions WHERE sid = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| AuthError::Session(format!("Failed to delete session: {}", e)))?;
            Ok(())
        }

        async fn cleanup_expired(&self) -> AuthResult<usize> {
            let result = sqlx::query("DELETE FROM sessions WHERE expire <= ?")
                .bind(Utc::now().timestamp_millis())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AuthError::Session(format!("Failed to cleanup expired sessions: {}", e))
                })?;

            Ok(result.rows_affected() as usize)
        }
    }
}
