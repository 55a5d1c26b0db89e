//! SQLite implementation of the parking store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use entities::{
    ExternalProfile, HistoryAction, NewParkingSpace, NewUser, ParkingHistory, ParkingSpace,
    ParkingSpaceUpdate, ParkingStats, SpaceStatus, User, sort_spaces,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::schema::{
    HISTORY_COLUMNS, ParkingHistoryRow, ParkingSpaceRow, SCHEMA_SQL, SPACE_COLUMNS, USER_COLUMNS,
    UserRow, format_timestamp,
};
use crate::{
    DEFAULT_BCRYPT_COST, ParkingStore, StoreError, StoreResult, default_layout, hash_password,
    verify_password,
};

/// Parking store backed by a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteParkingStore {
    pool: Pool<Sqlite>,
    bcrypt_cost: u32,
}

impl SqliteParkingStore {
    /// Opens (creating if needed) the database at `database_url` and
    /// applies the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds exactly one connection that never expires, since
    /// every SQLite in-memory connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and applies the schema.
    pub async fn from_pool(pool: Pool<Sqlite>) -> StoreResult<Self> {
        let store = Self {
            pool,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Sets the bcrypt cost used for new password hashes.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ParkingStore for SqliteParkingStore {
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let password_hash = hash_password(&user.password, self.bcrypt_cost)?;
        let now = format_timestamp(Utc::now());

        let sql = format!(
            "INSERT INTO users (username, password_hash, email, first_name, last_name, \
             created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {USER_COLUMNS}"
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(&user.username)
            .bind(&password_hash)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, "user", user.username.clone()))?;

        tracing::debug!(user_id = row.id, username = %row.username, "User created");

        row.try_into()
    }

    async fn upsert_user(&self, profile: ExternalProfile) -> StoreResult<User> {
        let now = format_timestamp(Utc::now());

        let sql = format!(
            "INSERT INTO users (username, external_id, email, first_name, last_name, \
             profile_image_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (external_id) DO UPDATE SET
                 email = excluded.email,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 profile_image_url = excluded.profile_image_url,
                 updated_at = excluded.updated_at
             RETURNING {USER_COLUMNS}"
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(&profile.username)
            .bind(&profile.external_id)
            .bind(&profile.email)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.profile_image_url)
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, "user", profile.username.clone()))?;

        tracing::debug!(user_id = row.id, "User upserted from identity provider");

        row.try_into()
    }

    async fn login_user(&self, username: &str, password: &str) -> StoreResult<Option<User>> {
        let Some(user) = self.get_user_by_username(username).await? else {
            return Ok(None);
        };
        // Accounts created through the identity provider have no password.
        let Some(hash) = user.password_hash.as_deref() else {
            return Ok(None);
        };

        if verify_password(password, hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn get_all_parking_spaces(&self) -> StoreResult<Vec<ParkingSpace>> {
        let sql =
            format!("SELECT {SPACE_COLUMNS} FROM parking_spaces ORDER BY section, space_number");
        let rows: Vec<ParkingSpaceRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut spaces = rows
            .into_iter()
            .map(ParkingSpace::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        // Text ordering puts A10 before A2.
        sort_spaces(&mut spaces);

        Ok(spaces)
    }

    async fn get_parking_space(&self, id: i64) -> StoreResult<Option<ParkingSpace>> {
        let sql = format!("SELECT {SPACE_COLUMNS} FROM parking_spaces WHERE id = ?");
        let row: Option<ParkingSpaceRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ParkingSpace::try_from).transpose()
    }

    async fn create_parking_space(&self, space: NewParkingSpace) -> StoreResult<ParkingSpace> {
        let now = format_timestamp(Utc::now());

        let sql = format!(
            "INSERT INTO parking_spaces (space_number, section, status, last_updated, \
             occupied_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {SPACE_COLUMNS}"
        );
        let row: ParkingSpaceRow = sqlx::query_as(&sql)
            .bind(&space.space_number)
            .bind(&space.section)
            .bind(space.status.as_str())
            .bind(&now)
            .bind(&space.occupied_by)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, "parking space", space.space_number.clone()))?;

        row.try_into()
    }

    async fn update_parking_space(
        &self,
        id: i64,
        update: ParkingSpaceUpdate,
    ) -> StoreResult<ParkingSpace> {
        let now = format_timestamp(Utc::now());
        let (set_occupied_by, occupied_by) = match update.occupied_by {
            Some(occupied_by) => (true, occupied_by),
            None => (false, None),
        };

        let sql = format!(
            "UPDATE parking_spaces SET
                 status = COALESCE(?, status),
                 occupied_by = CASE WHEN ? THEN ? ELSE occupied_by END,
                 last_updated = ?
             WHERE id = ?
             RETURNING {SPACE_COLUMNS}"
        );
        let row: Option<ParkingSpaceRow> = sqlx::query_as(&sql)
            .bind(update.status.map(|status| status.as_str()))
            .bind(set_occupied_by)
            .bind(occupied_by)
            .bind(&now)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::not_found("parking space", id.to_string()))?
            .try_into()
    }

    async fn transition_parking_space(
        &self,
        id: i64,
        from: SpaceStatus,
        to: SpaceStatus,
    ) -> StoreResult<Option<ParkingSpace>> {
        let sql = format!(
            "UPDATE parking_spaces SET status = ?, last_updated = ?
             WHERE id = ? AND status = ?
             RETURNING {SPACE_COLUMNS}"
        );
        let row: Option<ParkingSpaceRow> = sqlx::query_as(&sql)
            .bind(to.as_str())
            .bind(format_timestamp(Utc::now()))
            .bind(id)
            .bind(from.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into().map(Some),
            None if self.get_parking_space(id).await?.is_some() => Ok(None),
            None => Err(StoreError::not_found("parking space", id.to_string())),
        }
    }

    async fn get_parking_stats(&self, section: Option<&str>) -> StoreResult<ParkingStats> {
        let rows: Vec<(String, i64)> = match section {
            Some(section) => {
                sqlx::query_as(
                    "SELECT status, COUNT(*) FROM parking_spaces WHERE section = ? GROUP BY status",
                )
                .bind(section)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT status, COUNT(*) FROM parking_spaces GROUP BY status")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let counts = rows
            .into_iter()
            .map(|(status, count)| {
                let status: SpaceStatus = status
                    .parse()
                    .map_err(|e| StoreError::corrupt("parking space", e))?;
                Ok((status, u64::try_from(count).unwrap_or(0)))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(ParkingStats::from_counts(counts))
    }

    async fn add_parking_history(
        &self,
        space_id: i64,
        action: HistoryAction,
        user_id: Option<i64>,
    ) -> StoreResult<ParkingHistory> {
        let now = format_timestamp(Utc::now());

        let sql = format!(
            "INSERT INTO parking_history (space_id, action, timestamp, user_id)
             VALUES (?, ?, ?, ?)
             RETURNING {HISTORY_COLUMNS}"
        );
        let row: ParkingHistoryRow = sqlx::query_as(&sql)
            .bind(space_id)
            .bind(action.as_str())
            .bind(&now)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    StoreError::not_found("parking space", space_id.to_string())
                }
                _ => StoreError::Database(e),
            })?;

        row.try_into()
    }

    async fn get_recent_history(&self, limit: u32) -> StoreResult<Vec<ParkingHistory>> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM parking_history
             ORDER BY timestamp DESC, id DESC
             LIMIT ?"
        );
        let rows: Vec<ParkingHistoryRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ParkingHistory::try_from).collect()
    }

    async fn initialize_parking_spaces(&self) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM parking_spaces LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            tx.rollback().await?;
            return Ok(0);
        }

        let now = format_timestamp(Utc::now());
        let layout = default_layout();
        for space in &layout {
            sqlx::query(
                "INSERT INTO parking_spaces (space_number, section, status, last_updated, \
                 occupied_by, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&space.space_number)
            .bind(&space.section)
            .bind(space.status.as_str())
            .bind(&now)
            .bind(&space.occupied_by)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(count = layout.len(), "Seeded default parking spaces");

        Ok(layout.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteParkingStore {
        SqliteParkingStore::in_memory()
            .await
            .unwrap()
            .with_bcrypt_cost(4)
    }

    fn numbers(spaces: &[ParkingSpace]) -> Vec<&str> {
        spaces.iter().map(|s| s.space_number.as_str()).collect()
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let store = store().await;

        assert_eq!(store.initialize_parking_spaces().await.unwrap(), 30);
        let first = store.get_all_parking_spaces().await.unwrap();

        assert_eq!(store.initialize_parking_spaces().await.unwrap(), 0);
        let second = store.get_all_parking_spaces().await.unwrap();

        assert_eq!(first.len(), 30);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_seeded_section_c() {
        let store = store().await;
        store.initialize_parking_spaces().await.unwrap();

        let spaces = store.get_all_parking_spaces().await.unwrap();
        let status = |number: &str| {
            spaces
                .iter()
                .find(|s| s.space_number == number)
                .map(|s| s.status)
                .unwrap()
        };
        assert_eq!(status("C8"), SpaceStatus::Maintenance);
        assert_eq!(status("C5"), SpaceStatus::Occupied);
        assert_eq!(status("C10"), SpaceStatus::Occupied);
        assert_eq!(status("C1"), SpaceStatus::Available);

        let stats = store.get_parking_stats(Some("C")).await.unwrap();
        assert_eq!(stats.total, 12);
        assert_eq!(stats.occupied, 2);
        assert_eq!(stats.maintenance, 1);
        assert_eq!(stats.available, 9);
    }

    #[tokio::test]
    async fn test_seeded_overall_stats() {
        let store = store().await;
        store.initialize_parking_spaces().await.unwrap();

        let stats = store.get_parking_stats(None).await.unwrap();
        // A: 3, 6. B: 4, 8. C: 5, 10.
        assert_eq!(stats.total, 30);
        assert_eq!(stats.occupied, 6);
        assert_eq!(stats.maintenance, 1);
        assert_eq!(stats.available, 23);
        assert!((stats.occupancy_rate - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_lot_stats() {
        let store = store().await;

        let stats = store.get_parking_stats(None).await.unwrap();
        assert_eq!(stats, ParkingStats::default());
    }

    #[tokio::test]
    async fn test_spaces_sorted_regardless_of_insertion_order() {
        let store = store().await;
        let inserted = [("B2", "B"), ("A10", "A"), ("B1", "B"), ("A2", "A"), ("A1", "A")];
        for (number, section) in inserted {
            store
                .create_parking_space(NewParkingSpace::new(number, section))
                .await
                .unwrap();
        }

        let spaces = store.get_all_parking_spaces().await.unwrap();
        assert_eq!(numbers(&spaces), vec!["A1", "A2", "A10", "B1", "B2"]);
    }

    #[tokio::test]
    async fn test_create_duplicate_space_number() {
        let store = store().await;
        store
            .create_parking_space(NewParkingSpace::new("D1", "D"))
            .await
            .unwrap();

        let err = store
            .create_parking_space(NewParkingSpace::new("D1", "D"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_stamps_last_updated_and_occupant() {
        let store = store().await;
        let space = store
            .create_parking_space(NewParkingSpace::new("D1", "D"))
            .await
            .unwrap();

        let update = ParkingSpaceUpdate {
            status: Some(SpaceStatus::Occupied),
            occupied_by: Some(Some("AB-123".to_string())),
        };
        let updated = store.update_parking_space(space.id, update).await.unwrap();
        assert_eq!(updated.status, SpaceStatus::Occupied);
        assert_eq!(updated.occupied_by.as_deref(), Some("AB-123"));
        assert!(updated.last_updated >= space.last_updated);
        assert_eq!(updated.created_at, space.created_at);

        // Status-only update keeps the occupant.
        let updated = store
            .update_parking_space(space.id, ParkingSpaceUpdate::status(SpaceStatus::Maintenance))
            .await
            .unwrap();
        assert_eq!(updated.status, SpaceStatus::Maintenance);
        assert_eq!(updated.occupied_by.as_deref(), Some("AB-123"));

        // Explicit null clears it.
        let clear = ParkingSpaceUpdate {
            status: None,
            occupied_by: Some(None),
        };
        let updated = store.update_parking_space(space.id, clear).await.unwrap();
        assert_eq!(updated.status, SpaceStatus::Maintenance);
        assert_eq!(updated.occupied_by, None);
    }

    #[tokio::test]
    async fn test_update_missing_space() {
        let store = store().await;

        let err = store
            .update_parking_space(404, ParkingSpaceUpdate::status(SpaceStatus::Occupied))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_transition_requires_expected_status() {
        let store = store().await;
        let space = store
            .create_parking_space(NewParkingSpace::new("E1", "E"))
            .await
            .unwrap();

        let moved = store
            .transition_parking_space(space.id, SpaceStatus::Available, SpaceStatus::Occupied)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.status, SpaceStatus::Occupied);

        // Someone else put it into maintenance in the meantime.
        store
            .update_parking_space(space.id, ParkingSpaceUpdate::status(SpaceStatus::Maintenance))
            .await
            .unwrap();
        let stale = store
            .transition_parking_space(space.id, SpaceStatus::Occupied, SpaceStatus::Available)
            .await
            .unwrap();
        assert!(stale.is_none());
        let current = store.get_parking_space(space.id).await.unwrap().unwrap();
        assert_eq!(current.status, SpaceStatus::Maintenance);

        let err = store
            .transition_parking_space(404, SpaceStatus::Available, SpaceStatus::Occupied)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_toggle_round_trip_with_history() {
        let store = store().await;
        let user = store
            .create_user(NewUser::new("operator", "secret123"))
            .await
            .unwrap();
        let space = store
            .create_parking_space(NewParkingSpace::new("E1", "E"))
            .await
            .unwrap();

        for status in [SpaceStatus::Occupied, SpaceStatus::Available] {
            let update = ParkingSpaceUpdate::status(status);
            let action = update.history_action();
            let updated = store.update_parking_space(space.id, update).await.unwrap();
            assert_eq!(updated.status, status);
            store
                .add_parking_history(space.id, action, Some(user.id))
                .await
                .unwrap();
        }

        let history = store.get_recent_history(10).await.unwrap();
        let actions: Vec<_> = history.iter().map(|h| h.action).collect();
        assert_eq!(actions, vec![HistoryAction::Freed, HistoryAction::Occupied]);
        assert!(history.iter().all(|h| h.user_id == Some(user.id)));
        assert!(history.iter().all(|h| h.space_id == space.id));
    }

    #[tokio::test]
    async fn test_recent_history_limit_and_order() {
        let store = store().await;
        let space = store
            .create_parking_space(NewParkingSpace::new("E1", "E"))
            .await
            .unwrap();

        for _ in 0..5 {
            store
                .add_parking_history(space.id, HistoryAction::Updated, None)
                .await
                .unwrap();
        }

        let history = store.get_recent_history(3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn test_history_for_missing_space() {
        let store = store().await;

        let err = store
            .add_parking_history(99, HistoryAction::Created, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_user_and_login() {
        let store = store().await;
        let user = store
            .create_user(NewUser::new("operator", "secret123").with_email("op@parking.test"))
            .await
            .unwrap();
        assert_eq!(user.username, "operator");
        assert_ne!(user.password_hash.as_deref(), Some("secret123"));

        let logged_in = store.login_user("operator", "secret123").await.unwrap();
        assert_eq!(logged_in.map(|u| u.id), Some(user.id));

        assert!(store.login_user("operator", "wrong-pass").await.unwrap().is_none());
        assert!(store.login_user("nobody", "secret123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = store().await;
        store
            .create_user(NewUser::new("operator", "secret123"))
            .await
            .unwrap();

        let err = store
            .create_user(NewUser::new("operator", "other-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_ensure_user_only_creates_once() {
        let store = store().await;

        let created = store
            .ensure_user(NewUser::new("admin", "admin-pass"))
            .await
            .unwrap();
        assert!(created.is_some());

        let again = store
            .ensure_user(NewUser::new("admin", "changed-pass"))
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(store.login_user("admin", "admin-pass").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upsert_user_refreshes_profile() {
        let store = store().await;
        let profile = ExternalProfile {
            external_id: "sub-42".to_string(),
            username: "sub-42".to_string(),
            email: Some("old@parking.test".to_string()),
            first_name: Some("Old".to_string()),
            last_name: None,
            profile_image_url: None,
        };

        let first = store.upsert_user(profile.clone()).await.unwrap();

        let refreshed = ExternalProfile {
            email: Some("new@parking.test".to_string()),
            first_name: Some("New".to_string()),
            ..profile
        };
        let second = store.upsert_user(refreshed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email.as_deref(), Some("new@parking.test"));
        assert_eq!(second.first_name.as_deref(), Some("New"));

        let by_sub = store.get_user_by_external_id("sub-42").await.unwrap().unwrap();
        assert_eq!(by_sub.id, first.id);

        // External accounts cannot log in with a password.
        assert!(store.login_user("sub-42", "anything").await.unwrap().is_none());
    }
}
