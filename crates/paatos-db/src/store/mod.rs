//! Store boundary.
//!
//! The reconciliation engine consumes the [`Store`] trait and never talks to
//! a database directly. Two implementations ship with the crate:
//! [`MemoryStore`] for tests and [`PgStore`] for Postgres.

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::{DataSource, Entity};
use crate::error::DbResult;
use crate::kind::EntityKind;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistent store for entities, scoped by data source.
///
/// Implementations must provide transactional isolation: writes made between
/// [`Store::begin`] and [`Store::commit`] are invisible to concurrent readers
/// until commit, and [`Store::rollback`] discards them. The reconciliation
/// engine wraps each top-level import call in one transaction.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a data source by identifier, creating it if absent.
    async fn get_or_create_data_source(
        &mut self,
        identifier: &str,
        name: &str,
    ) -> DbResult<DataSource>;

    /// All entities of a kind within a data source.
    async fn find_all(&mut self, data_source: Uuid, kind: EntityKind) -> DbResult<Vec<Entity>>;

    /// Entity by its source-assigned identifier.
    async fn find_by_origin_id(
        &mut self,
        data_source: Uuid,
        kind: EntityKind,
        origin_id: &str,
    ) -> DbResult<Option<Entity>>;

    /// Entities of a kind whose relation `field` points at `target`.
    async fn find_related(
        &mut self,
        data_source: Uuid,
        kind: EntityKind,
        field: &str,
        target: Uuid,
    ) -> DbResult<Vec<Entity>>;

    /// Insert or update an entity. Assigns [`Entity::id`] on first save.
    async fn save(&mut self, entity: &mut Entity) -> DbResult<()>;

    /// Delete a persisted entity.
    async fn delete(&mut self, entity: &Entity) -> DbResult<()>;

    /// Open a transaction.
    async fn begin(&mut self) -> DbResult<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> DbResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> DbResult<()>;
}
