use thiserror::Error;

/// Errors that can occur when interacting with the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compare-and-set write lost: the record was already settled or written.
    #[error("{entity} {id} is already completed")]
    AlreadyCompleted { entity: &'static str, id: String },

    /// The record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stored value could not be interpreted.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn already_completed(entity: &'static str, id: impl ToString) -> Self {
        StoreError::AlreadyCompleted {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for the benign "first writer already won" outcome.
    pub fn is_already_completed(&self) -> bool {
        matches!(self, StoreError::AlreadyCompleted { .. })
    }
}

/// Result type for durable store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
