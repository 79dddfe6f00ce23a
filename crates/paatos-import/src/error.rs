//! Import error types.

use thiserror::Error;

use paatos_db::{DbError, EntityKind};

/// Errors raised during reconciliation and import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Incoming text exceeds the target field's declared maximum length.
    /// Raised before any mutation of the entity.
    #[error("field '{field}' too long (max. {max}): got {len} characters")]
    FieldTooLong {
        /// Field that was rejected.
        field: String,
        /// Declared maximum length.
        max: usize,
        /// Length of the incoming value.
        len: usize,
    },

    /// Incoming record carries field names not declared on the target
    /// schema. All offending names are collected before failing.
    #[error("{kind} doesn't support fields {}", .fields.join(", "))]
    UnsupportedFields {
        /// Kind whose schema was violated.
        kind: EntityKind,
        /// Every undeclared field name in the record.
        fields: Vec<String>,
    },

    /// Fraction of previously known, now-unmarked entities exceeds the
    /// configured deletion cap; no deletions were applied.
    #[error(
        "refusing to delete {unseen} of {known} {kind} entities (limit {limit})"
    )]
    TooManyDeletions {
        /// Kind being synchronized.
        kind: EntityKind,
        /// Entities that would have been deleted.
        unseen: usize,
        /// Entities known to the session.
        known: usize,
        /// Configured cap as a fraction.
        limit: f64,
    },

    /// A referenced classification code has no stored classification entity.
    #[error("classification '{origin_id}' not found")]
    ClassificationNotFound {
        /// The unresolved classification code.
        origin_id: String,
    },

    /// The source feed violates an assumed parentage invariant. Fatal for
    /// the whole batch.
    #[error("inconsistent parentage for '{origin_id}': {message}")]
    InconsistentParentage {
        /// Record whose parentage is inconsistent.
        origin_id: String,
        /// What was violated.
        message: String,
    },

    /// Incoming value could not be coerced to the field's declared type.
    #[error("invalid value for field '{field}': {message}")]
    InvalidValue {
        /// Field that rejected the value.
        field: String,
        /// Why coercion failed.
        message: String,
    },

    /// A required field is missing from an incoming record.
    #[error("record is missing required field '{0}'")]
    MissingField(String),

    /// An organization type code outside the known taxonomy.
    #[error("unknown organization type code: {0}")]
    UnknownOrgType(u32),

    /// Store error.
    #[error(transparent)]
    Store(#[from] DbError),
}

impl ImportError {
    /// Create a field-too-long error.
    #[must_use]
    pub fn field_too_long(field: impl Into<String>, max: usize, len: usize) -> Self {
        Self::FieldTooLong {
            field: field.into(),
            max,
            len,
        }
    }

    /// Create an inconsistent-parentage error.
    pub fn inconsistent_parentage(
        origin_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InconsistentParentage {
            origin_id: origin_id.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors that must abort the whole batch rather than a single
    /// record.
    #[must_use]
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(
            self,
            ImportError::TooManyDeletions { .. }
                | ImportError::InconsistentParentage { .. }
                | ImportError::Store(_)
        )
    }
}

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;
