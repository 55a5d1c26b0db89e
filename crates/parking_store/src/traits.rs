//! Parking store trait definitions.

use async_trait::async_trait;
use entities::{
    ExternalProfile, HistoryAction, NewParkingSpace, NewUser, ParkingHistory, ParkingSpace,
    ParkingSpaceUpdate, ParkingStats, SpaceStatus, User,
};

use crate::StoreResult;

/// Trait for parking storage operations.
#[async_trait]
pub trait ParkingStore: Send + Sync {
    // =========================================================================
    // User operations
    // =========================================================================

    /// Gets a user by ID.
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>>;

    /// Gets a user by username.
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Gets a user by the identity provider's subject identifier.
    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>>;

    /// Creates a local account, hashing its password.
    ///
    /// Fails with `AlreadyExists` when the username is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    /// Creates or refreshes an account from identity provider claims.
    ///
    /// On conflict of the external identifier, the mutable profile fields
    /// are overwritten and the username is left as it was.
    async fn upsert_user(&self, profile: ExternalProfile) -> StoreResult<User>;

    /// Checks local credentials, returning the user on a match.
    async fn login_user(&self, username: &str, password: &str) -> StoreResult<Option<User>>;

    /// Creates a local account unless the username already exists.
    ///
    /// Returns the new user, or `None` when it was already present.
    async fn ensure_user(&self, user: NewUser) -> StoreResult<Option<User>> {
        if self.get_user_by_username(&user.username).await?.is_some() {
            return Ok(None);
        }
        self.create_user(user).await.map(Some)
    }

    // =========================================================================
    // Parking space operations
    // =========================================================================

    /// Lists every space in grid order (section, then numeric suffix).
    async fn get_all_parking_spaces(&self) -> StoreResult<Vec<ParkingSpace>>;

    /// Gets a space by ID.
    async fn get_parking_space(&self, id: i64) -> StoreResult<Option<ParkingSpace>>;

    /// Creates a space.
    ///
    /// Fails with `AlreadyExists` when the space number is taken.
    async fn create_parking_space(&self, space: NewParkingSpace) -> StoreResult<ParkingSpace>;

    /// Applies a partial update and stamps `last_updated`.
    ///
    /// Fails with `NotFound` when the space does not exist.
    async fn update_parking_space(
        &self,
        id: i64,
        update: ParkingSpaceUpdate,
    ) -> StoreResult<ParkingSpace>;

    /// Moves a space from status `from` to `to` only if it is still in
    /// `from`, stamping `last_updated`.
    ///
    /// Returns `None` when the space has moved on to another status and
    /// fails with `NotFound` when it does not exist.
    async fn transition_parking_space(
        &self,
        id: i64,
        from: SpaceStatus,
        to: SpaceStatus,
    ) -> StoreResult<Option<ParkingSpace>>;

    /// Counts spaces per status, optionally within one section.
    async fn get_parking_stats(&self, section: Option<&str>) -> StoreResult<ParkingStats>;

    // =========================================================================
    // Parking history operations
    // =========================================================================

    /// Appends a history entry.
    async fn add_parking_history(
        &self,
        space_id: i64,
        action: HistoryAction,
        user_id: Option<i64>,
    ) -> StoreResult<ParkingHistory>;

    /// Returns the most recent history entries, newest first.
    async fn get_recent_history(&self, limit: u32) -> StoreResult<Vec<ParkingHistory>>;

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Inserts the default layout if the lot is empty.
    ///
    /// Returns the number of spaces inserted (zero when already seeded).
    async fn initialize_parking_spaces(&self) -> StoreResult<usize>;
}
