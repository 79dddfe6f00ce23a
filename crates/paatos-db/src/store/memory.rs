//! In-memory store.
//!
//! Backs the engine's test suites. Transactions are implemented by
//! snapshotting the whole state on `begin` and restoring it on `rollback`,
//! which is exact for the single-session access pattern the engine assumes.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::entity::{DataSource, Entity};
use crate::error::{DbError, DbResult};
use crate::kind::EntityKind;
use crate::store::Store;
use crate::value::FieldValue;

#[derive(Debug, Clone, Default)]
struct State {
    data_sources: Vec<DataSource>,
    entities: HashMap<Uuid, Entity>,
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: State,
    snapshot: Option<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities of a kind, across all data sources.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state
            .entities
            .values()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Fetch an entity by internal id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Entity> {
        self.state.entities.get(&id)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_or_create_data_source(
        &mut self,
        identifier: &str,
        name: &str,
    ) -> DbResult<DataSource> {
        if let Some(existing) = self
            .state
            .data_sources
            .iter()
            .find(|ds| ds.identifier == identifier)
        {
            return Ok(existing.clone());
        }
        let created = DataSource::new(identifier, name);
        self.state.data_sources.push(created.clone());
        Ok(created)
    }

    async fn find_all(&mut self, data_source: Uuid, kind: EntityKind) -> DbResult<Vec<Entity>> {
        let mut found: Vec<Entity> = self
            .state
            .entities
            .values()
            .filter(|e| e.data_source_id == data_source && e.kind == kind)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.origin_id.cmp(&b.origin_id));
        Ok(found)
    }

    async fn find_by_origin_id(
        &mut self,
        data_source: Uuid,
        kind: EntityKind,
        origin_id: &str,
    ) -> DbResult<Option<Entity>> {
        Ok(self
            .state
            .entities
            .values()
            .find(|e| {
                e.data_source_id == data_source && e.kind == kind && e.origin_id == origin_id
            })
            .cloned())
    }

    async fn find_related(
        &mut self,
        data_source: Uuid,
        kind: EntityKind,
        field: &str,
        target: Uuid,
    ) -> DbResult<Vec<Entity>> {
        let mut found: Vec<Entity> = self
            .state
            .entities
            .values()
            .filter(|e| {
                e.data_source_id == data_source
                    && e.kind == kind
                    && e.get(field) == FieldValue::Relation(target)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.origin_id.cmp(&b.origin_id));
        Ok(found)
    }

    async fn save(&mut self, entity: &mut Entity) -> DbResult<()> {
        let id = entity.id.unwrap_or_else(Uuid::new_v4);
        entity.id = Some(id);
        let mut stored = entity.clone();
        stored.changes.clear();
        self.state.entities.insert(id, stored);
        Ok(())
    }

    async fn delete(&mut self, entity: &Entity) -> DbResult<()> {
        let id = entity
            .id
            .ok_or_else(|| DbError::not_persisted(entity.kind, entity.origin_id.clone()))?;
        self.state.entities.remove(&id);
        Ok(())
    }

    async fn begin(&mut self) -> DbResult<()> {
        if self.snapshot.is_some() {
            return Err(DbError::transaction("transaction already open"));
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.snapshot
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction to commit"))?;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction to roll back"))?;
        self.state = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_data_source_get_or_create() {
        let mut store = MemoryStore::new();
        let first = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();
        let second = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_save_assigns_id_once() {
        let mut store = MemoryStore::new();
        let ds = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();

        let mut org = Entity::new(EntityKind::Organization, ds.id, "123");
        org.set_raw("name", FieldValue::Text("Kaupunginhallitus".into()));
        store.save(&mut org).await.unwrap();
        let id = org.id.unwrap();

        org.set_raw("name", FieldValue::Text("Kaupunginvaltuusto".into()));
        store.save(&mut org).await.unwrap();
        assert_eq!(org.id, Some(id));
        assert_eq!(store.count(EntityKind::Organization), 1);
    }

    #[tokio::test]
    async fn test_find_by_origin_id() {
        let mut store = MemoryStore::new();
        let ds = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();

        let mut org = Entity::new(EntityKind::Organization, ds.id, "123");
        store.save(&mut org).await.unwrap();

        let found = store
            .find_by_origin_id(ds.id, EntityKind::Organization, "123")
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .find_by_origin_id(ds.id, EntityKind::Post, "123")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_related() {
        let mut store = MemoryStore::new();
        let ds = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();

        let mut event = Entity::new(EntityKind::Event, ds.id, "ev-1");
        store.save(&mut event).await.unwrap();
        let event_id = event.id.unwrap();

        let mut attendee = Entity::new(EntityKind::EventAttendee, ds.id, "ev-1:p-1");
        attendee.set_raw("event", FieldValue::Relation(event_id));
        store.save(&mut attendee).await.unwrap();

        let related = store
            .find_related(ds.id, EntityKind::EventAttendee, "event", event_id)
            .await
            .unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].origin_id, "ev-1:p-1");
    }

    #[tokio::test]
    async fn test_rollback_restores_state() {
        let mut store = MemoryStore::new();
        let ds = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();

        let mut kept = Entity::new(EntityKind::Organization, ds.id, "1");
        store.save(&mut kept).await.unwrap();

        store.begin().await.unwrap();
        let mut discarded = Entity::new(EntityKind::Organization, ds.id, "2");
        store.save(&mut discarded).await.unwrap();
        store.delete(&kept).await.unwrap();
        store.rollback().await.unwrap();

        assert_eq!(store.count(EntityKind::Organization), 1);
        assert!(store.get(kept.id.unwrap()).is_some());
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let mut store = MemoryStore::new();
        let ds = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();

        store.begin().await.unwrap();
        let mut org = Entity::new(EntityKind::Organization, ds.id, "1");
        store.save(&mut org).await.unwrap();
        store.commit().await.unwrap();

        assert_eq!(store.count(EntityKind::Organization), 1);
        assert!(store.commit().await.is_err());
    }
}
