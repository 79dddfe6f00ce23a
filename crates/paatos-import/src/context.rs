//! Per-batch import context.
//!
//! Carries the skip-set and classification caches through one import run.
//! Scoped to a single batch and discarded afterwards; nothing here survives
//! between runs.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Mutable state shared by the importer stages of one batch.
#[derive(Debug, Default)]
pub struct ImportContext {
    /// Import organization memberships (people) as well.
    pub include_people: bool,
    /// Organization classification code → stored classification id.
    pub org_class_by_id: HashMap<String, Uuid>,
    /// Post classification code → stored classification id.
    pub post_class_by_id: HashMap<String, Uuid>,
    /// Origin ids excluded from import; records referencing them as parents
    /// are rejected.
    pub skip_orgs: HashSet<String>,
}

impl ImportContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that also imports people.
    #[must_use]
    pub fn with_people() -> Self {
        Self {
            include_people: true,
            ..Self::default()
        }
    }
}
