//! Store error types.

use thiserror::Error;
use uuid::Uuid;

use crate::kind::EntityKind;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found by internal id.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind that was looked up.
        kind: EntityKind,
        /// Internal id that did not resolve.
        id: Uuid,
    },

    /// Attempt to update or delete an entity that was never persisted.
    #[error("{kind} '{origin_id}' has not been persisted")]
    NotPersisted {
        /// Kind of the entity.
        kind: EntityKind,
        /// Origin id of the entity.
        origin_id: String,
    },

    /// Stored kind discriminator did not parse.
    #[error("Unknown entity kind in store: {0}")]
    UnknownKind(String),

    /// Transaction state violation (begin inside begin, commit without begin).
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl DbError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Create a not-persisted error for an entity.
    #[must_use]
    pub fn not_persisted(kind: EntityKind, origin_id: impl Into<String>) -> Self {
        Self::NotPersisted {
            kind,
            origin_id: origin_id.into(),
        }
    }

    /// Create a transaction state error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;
