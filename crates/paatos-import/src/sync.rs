//! Entity synchronization sessions.
//!
//! A [`SyncSession`] owns the origin-id → entity map for one entity kind
//! within one data source for the duration of one import batch. Callers mark
//! every entity present in the incoming batch; [`SyncSession::finish`]
//! deletes the unmarked remainder, bounded by a deletion cap that protects
//! the store against partial or corrupted source feeds.

use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use paatos_db::{Entity, EntityKind, Store};

use crate::error::{ImportError, ImportResult};

/// Default deletion cap: at most 10% of known entities may disappear in one
/// pass.
pub const DEFAULT_DELETE_LIMIT: f64 = 0.1;

/// One reconciliation pass over a single entity kind.
pub struct SyncSession {
    kind: EntityKind,
    entities: HashMap<String, Entity>,
    marked: HashSet<String>,
}

impl SyncSession {
    /// Open a session over the currently stored entities of one kind.
    ///
    /// `identifier_of` projects each entity to its stable origin id.
    pub fn open<F>(kind: EntityKind, existing: Vec<Entity>, identifier_of: F) -> Self
    where
        F: Fn(&Entity) -> String,
    {
        let entities = existing
            .into_iter()
            .map(|e| (identifier_of(&e), e))
            .collect();
        Self {
            kind,
            entities,
            marked: HashSet::new(),
        }
    }

    /// The kind this session reconciles.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Look up a known entity without marking it.
    #[must_use]
    pub fn get(&self, origin_id: &str) -> Option<&Entity> {
        self.entities.get(origin_id)
    }

    /// Mark an entity as present in the incoming batch. Idempotent.
    ///
    /// The entity is (re-)admitted to the session map, so records processed
    /// later in the same batch can resolve it: a child's parent reference
    /// resolves to the id assigned when the parent was saved moments before.
    pub fn mark(&mut self, entity: Entity) {
        debug_assert_eq!(entity.kind, self.kind);
        self.marked.insert(entity.origin_id.clone());
        self.entities.insert(entity.origin_id.clone(), entity);
    }

    /// Number of entities known to the session.
    #[must_use]
    pub fn known(&self) -> usize {
        self.entities.len()
    }

    /// Delete every known entity that was not marked during the batch.
    ///
    /// If the unmarked fraction exceeds `delete_limit`, the whole call fails
    /// with [`ImportError::TooManyDeletions`] and nothing is deleted; a
    /// malformed or partial feed must not be allowed to wipe the store.
    /// A session with no known entities always passes.
    ///
    /// Returns the number of deleted entities and consumes the session.
    pub async fn finish<S: Store + ?Sized>(
        self,
        store: &mut S,
        delete_limit: f64,
    ) -> ImportResult<usize> {
        let Self {
            kind,
            entities,
            marked,
        } = self;

        let known = entities.len();
        let unseen: Vec<Entity> = entities
            .into_values()
            .filter(|e| !marked.contains(&e.origin_id))
            .collect();

        if known > 0 {
            let fraction = unseen.len() as f64 / known as f64;
            if fraction > delete_limit {
                warn!(
                    kind = %kind,
                    unseen = unseen.len(),
                    known,
                    limit = delete_limit,
                    "Deletion cap exceeded, aborting"
                );
                return Err(ImportError::TooManyDeletions {
                    kind,
                    unseen: unseen.len(),
                    known,
                    limit: delete_limit,
                });
            }
        }

        let mut deleted = 0;
        for entity in unseen {
            info!(
                kind = %kind,
                origin_id = %entity.origin_id,
                name = %entity.display_name(),
                "Deleting entity absent from source"
            );
            store.delete(&entity).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paatos_db::{EntityKind, MemoryStore, Store};
    use uuid::Uuid;

    async fn seeded_store(count: usize) -> (MemoryStore, Uuid, Vec<Entity>) {
        let mut store = MemoryStore::new();
        let ds = store
            .get_or_create_data_source("helsinki", "Helsinki")
            .await
            .unwrap();
        let mut entities = Vec::new();
        for i in 0..count {
            let mut e = Entity::new(EntityKind::Organization, ds.id, format!("{i}"));
            store.save(&mut e).await.unwrap();
            entities.push(e);
        }
        (store, ds.id, entities)
    }

    #[tokio::test]
    async fn test_mark_is_idempotent() {
        let (_, ds, _) = seeded_store(0).await;
        let mut session = SyncSession::open(EntityKind::Organization, vec![], |e| {
            e.origin_id.clone()
        });
        let entity = Entity::new(EntityKind::Organization, ds, "1");
        session.mark(entity.clone());
        session.mark(entity);
        assert_eq!(session.known(), 1);
    }

    #[tokio::test]
    async fn test_finish_deletes_within_cap() {
        let (mut store, ds, entities) = seeded_store(100).await;
        let existing = store.find_all(ds, EntityKind::Organization).await.unwrap();
        let mut session =
            SyncSession::open(EntityKind::Organization, existing, |e| e.origin_id.clone());

        // Mark 95 of 100: five deletions, within the 10% cap.
        for entity in entities.iter().take(95) {
            let known = session.get(&entity.origin_id).unwrap().clone();
            session.mark(known);
        }
        let deleted = session.finish(&mut store, 0.1).await.unwrap();
        assert_eq!(deleted, 5);
        assert_eq!(store.count(EntityKind::Organization), 95);
    }

    #[tokio::test]
    async fn test_finish_aborts_over_cap_without_deleting() {
        let (mut store, ds, entities) = seeded_store(100).await;
        let existing = store.find_all(ds, EntityKind::Organization).await.unwrap();
        let mut session =
            SyncSession::open(EntityKind::Organization, existing, |e| e.origin_id.clone());

        // Mark only 85 of 100: 15% unmarked, over the cap.
        for entity in entities.iter().take(85) {
            let known = session.get(&entity.origin_id).unwrap().clone();
            session.mark(known);
        }
        let err = session.finish(&mut store, 0.1).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::TooManyDeletions {
                unseen: 15,
                known: 100,
                ..
            }
        ));
        assert_eq!(store.count(EntityKind::Organization), 100);
    }

    #[tokio::test]
    async fn test_empty_session_always_passes() {
        let (mut store, _, _) = seeded_store(0).await;
        let session = SyncSession::open(EntityKind::Organization, vec![], |e| {
            e.origin_id.clone()
        });
        let deleted = session.finish(&mut store, 0.1).await.unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_new_entities_resolvable_after_mark() {
        let (_, ds, _) = seeded_store(0).await;
        let mut session = SyncSession::open(EntityKind::Organization, vec![], |e| {
            e.origin_id.clone()
        });

        let mut parent = Entity::new(EntityKind::Organization, ds, "parent");
        parent.id = Some(Uuid::new_v4());
        session.mark(parent.clone());

        let resolved = session.get("parent").unwrap();
        assert_eq!(resolved.id, parent.id);
    }
}
