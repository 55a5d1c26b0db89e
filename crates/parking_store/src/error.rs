//! Parking store error types.

use thiserror::Error;

/// Errors that can occur during parking store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Duplicate entity.
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing error.
    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),

    /// A stored row could not be decoded into an entity.
    #[error("Corrupt {entity_type} row: {reason}")]
    CorruptRow {
        entity_type: &'static str,
        reason: String,
    },
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a corrupt row error.
    pub fn corrupt(entity_type: &'static str, reason: impl ToString) -> Self {
        Self::CorruptRow {
            entity_type,
            reason: reason.to_string(),
        }
    }

    /// Maps a unique-constraint violation to `AlreadyExists`, passing other
    /// errors through.
    pub(crate) fn from_insert(
        err: sqlx::Error,
        entity_type: &'static str,
        id: impl Into<String>,
    ) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::already_exists(entity_type, id)
            }
            _ => Self::Database(err),
        }
    }
}

/// Result type for parking store operations.
pub type StoreResult<T> = Result<T, StoreError>;
