//! Data source importer.
//!
//! The orchestrator that owns one data source scope and drives
//! reconciliation batches through the store. Each top-level update call runs
//! inside one atomic transaction: either every create, update and deletion
//! of the call commits, or none does.

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use paatos_db::{DataSource, Entity, EntityKind, FieldValue, Store};

use crate::context::ImportContext;
use crate::error::{ImportError, ImportResult};
use crate::reconcile;
use crate::record::ExternalRecord;
use crate::sync::{SyncSession, DEFAULT_DELETE_LIMIT};

/// Counts from one reconciliation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Entities created.
    pub created: usize,
    /// Entities updated.
    pub updated: usize,
    /// Entities seen but left untouched.
    pub unchanged: usize,
    /// Entities deleted because they vanished from the source.
    pub deleted: usize,
}

impl SyncOutcome {
    /// Fold another outcome into this one.
    pub fn merge(&mut self, other: SyncOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
    }

    /// Whether the call wrote anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.updated > 0 || self.deleted > 0
    }
}

/// A person referenced by a nested sub-import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonSpec {
    /// Source-assigned person identifier.
    pub origin_id: String,
    /// Full name.
    pub name: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
}

/// A membership nested under an organization record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSpec {
    /// The member.
    pub person: PersonSpec,
    /// Role within the organization.
    pub role: Option<String>,
    /// Membership start date.
    pub start_date: Option<NaiveDate>,
    /// Membership end date.
    pub end_date: Option<NaiveDate>,
}

/// A contact detail nested under an organization record.
///
/// The store schema has no contact fields yet, so these are consumed and
/// dropped with a debug log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactDetail {
    /// Detail type, e.g. `address`.
    pub detail_type: String,
    /// The detail value.
    pub value: String,
    /// Postcode, for address details.
    pub postcode: Option<String>,
}

/// One organization in an incoming batch, in reconciliation-ready form.
#[derive(Debug, Clone, Default)]
pub struct OrganizationUpdate {
    /// Source-assigned identifier.
    pub origin_id: String,
    /// Scalar fields to reconcile.
    pub record: ExternalRecord,
    /// Classification code, resolved against stored organization classes.
    pub classification: Option<String>,
    /// Parent organization's origin id, if any. Parents precede children in
    /// a well-formed batch.
    pub parent: Option<String>,
    /// Nested membership sub-imports.
    pub memberships: Vec<MembershipSpec>,
    /// Nested contact details.
    pub contact_details: Vec<ContactDetail>,
}

/// One post in an incoming batch, in reconciliation-ready form.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    /// Source-assigned identifier.
    pub origin_id: String,
    /// Scalar fields to reconcile.
    pub record: ExternalRecord,
    /// Classification code, resolved against stored post classes.
    pub classification: Option<String>,
    /// Origin id of the organization holding the post.
    pub organization: Option<String>,
    /// Nested membership sub-imports.
    pub memberships: Vec<MembershipSpec>,
    /// Nested contact details.
    pub contact_details: Vec<ContactDetail>,
}

/// Importer for one data source.
pub struct Importer<S: Store> {
    store: S,
    data_source: DataSource,
}

impl<S: Store> Importer<S> {
    /// Open an importer, creating the data source record if needed.
    pub async fn open(mut store: S, identifier: &str, name: &str) -> ImportResult<Self> {
        let data_source = store.get_or_create_data_source(identifier, name).await?;
        Ok(Self { store, data_source })
    }

    /// The data source this importer is scoped to.
    #[must_use]
    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    /// Borrow the underlying store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the importer, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Look up a person by origin id, creating them if absent.
    pub async fn get_or_create_person(&mut self, spec: &PersonSpec) -> ImportResult<Entity> {
        if let Some(person) = self
            .store
            .find_by_origin_id(self.data_source.id, EntityKind::Person, &spec.origin_id)
            .await?
        {
            return Ok(person);
        }

        let mut person = Entity::new(EntityKind::Person, self.data_source.id, &spec.origin_id);
        let mut record = ExternalRecord::new();
        record.set("name", spec.name.as_str());
        record.set("given_name", spec.given_name.as_str());
        record.set("family_name", spec.family_name.as_str());
        reconcile::apply(&mut person, record, &[])?;
        self.store.save(&mut person).await?;
        info!(origin_id = %spec.origin_id, name = %spec.name, "Created person");
        Ok(person)
    }

    /// Upsert a membership of a person in an organization.
    pub async fn save_membership(
        &mut self,
        spec: &MembershipSpec,
        organization_id: Uuid,
        organization_origin: &str,
    ) -> ImportResult<Entity> {
        let person = self.get_or_create_person(&spec.person).await?;
        let person_id = person.id.ok_or_else(|| {
            paatos_db::DbError::not_persisted(EntityKind::Person, spec.person.origin_id.clone())
        })?;

        let origin_id = format!("{}:{}", organization_origin, spec.person.origin_id);
        let mut membership = match self
            .store
            .find_by_origin_id(self.data_source.id, EntityKind::Membership, &origin_id)
            .await?
        {
            Some(existing) => existing,
            None => Entity::new(EntityKind::Membership, self.data_source.id, &origin_id),
        };

        let mut record = ExternalRecord::new();
        record.set("person_id", person_id);
        record.set("organization_id", organization_id);
        record.set("role", spec.role.clone());
        record.set("start_date", spec.start_date);
        record.set("end_date", spec.end_date);
        reconcile::apply(&mut membership, record, &[])?;

        if membership.changes.is_changed() || !membership.is_persisted() {
            let created = !membership.is_persisted();
            self.store.save(&mut membership).await?;
            if created {
                info!(origin_id = %origin_id, "Created membership");
            }
        }
        Ok(membership)
    }

    /// Resolve a classification code to its stored classification entity id,
    /// preferring the per-run cache.
    async fn resolve_classification(
        &mut self,
        cache: &std::collections::HashMap<String, Uuid>,
        kind: EntityKind,
        code: &str,
    ) -> ImportResult<Uuid> {
        if let Some(id) = cache.get(code) {
            return Ok(*id);
        }
        let stored = self
            .store
            .find_by_origin_id(self.data_source.id, kind, code)
            .await?;
        match stored.and_then(|e| e.id) {
            Some(id) => Ok(id),
            None => Err(ImportError::ClassificationNotFound {
                origin_id: code.to_string(),
            }),
        }
    }

    /// Reconcile one organization entity against its incoming record and
    /// persist it when anything changed.
    async fn save_organization(
        &mut self,
        entity: &mut Entity,
        update: OrganizationUpdate,
        ctx: &ImportContext,
    ) -> ImportResult<()> {
        let OrganizationUpdate {
            mut record,
            classification,
            contact_details,
            ..
        } = update;

        if let Some(code) = classification {
            let id = self
                .resolve_classification(&ctx.org_class_by_id, EntityKind::OrganizationClass, &code)
                .await?;
            record.set("classification_id", id);
        }
        if !contact_details.is_empty() {
            debug!(
                origin_id = %entity.origin_id,
                count = contact_details.len(),
                "Dropping contact details: no contact fields in schema"
            );
        }

        reconcile::apply(entity, record, &[])?;

        if entity.changes.is_changed() || !entity.is_persisted() {
            info!(
                origin_id = %entity.origin_id,
                name = %entity.display_name(),
                changed = %entity.changes.summary(),
                "Saving organization"
            );
            self.store.save(entity).await?;
        }
        Ok(())
    }

    /// Reconcile one post entity against its incoming record and persist it
    /// when anything changed.
    async fn save_post(
        &mut self,
        entity: &mut Entity,
        update: PostUpdate,
        ctx: &ImportContext,
    ) -> ImportResult<()> {
        let PostUpdate {
            mut record,
            classification,
            contact_details,
            ..
        } = update;

        if let Some(code) = classification {
            let id = self
                .resolve_classification(&ctx.post_class_by_id, EntityKind::PostClass, &code)
                .await?;
            record.set("classification_id", id);
        }
        if !contact_details.is_empty() {
            debug!(
                origin_id = %entity.origin_id,
                count = contact_details.len(),
                "Dropping contact details: no contact fields in schema"
            );
        }

        reconcile::apply(entity, record, &[])?;

        if entity.changes.is_changed() || !entity.is_persisted() {
            info!(
                origin_id = %entity.origin_id,
                label = %entity.display_name(),
                changed = %entity.changes.summary(),
                "Saving post"
            );
            self.store.save(entity).await?;
        }
        Ok(())
    }

    /// Reconcile a batch of organizations, in parent-before-child order,
    /// inside one transaction.
    pub async fn update_organizations(
        &mut self,
        batch: Vec<OrganizationUpdate>,
        ctx: &ImportContext,
    ) -> ImportResult<SyncOutcome> {
        self.store.begin().await?;
        match self.update_organizations_inner(batch, ctx).await {
            Ok(outcome) => {
                self.store.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn update_organizations_inner(
        &mut self,
        batch: Vec<OrganizationUpdate>,
        ctx: &ImportContext,
    ) -> ImportResult<SyncOutcome> {
        let existing = self
            .store
            .find_all(self.data_source.id, EntityKind::Organization)
            .await?;
        let mut session = SyncSession::open(EntityKind::Organization, existing, |e| {
            e.origin_id.clone()
        });

        let mut outcome = SyncOutcome::default();
        for update in batch {
            let mut entity = match session.get(&update.origin_id) {
                Some(known) => known.clone(),
                None => Entity::new(
                    EntityKind::Organization,
                    self.data_source.id,
                    &update.origin_id,
                ),
            };
            let creating = !entity.is_persisted();

            let mut update = update;
            if let Some(parent_origin) = update.parent.take() {
                let parent_id = session
                    .get(&parent_origin)
                    .and_then(|p| p.id)
                    .ok_or_else(|| {
                        ImportError::inconsistent_parentage(
                            &update.origin_id,
                            format!("parent '{parent_origin}' precedes no stored organization"),
                        )
                    })?;
                update.record.set("parent_id", parent_id);
            }

            let memberships = std::mem::take(&mut update.memberships);
            self.save_organization(&mut entity, update, ctx).await?;

            if creating {
                outcome.created += 1;
            } else if entity.changes.is_changed() {
                outcome.updated += 1;
            } else {
                outcome.unchanged += 1;
            }

            if ctx.include_people {
                let organization_id = entity.id.ok_or_else(|| {
                    paatos_db::DbError::not_persisted(
                        EntityKind::Organization,
                        entity.origin_id.clone(),
                    )
                })?;
                for spec in &memberships {
                    self.save_membership(spec, organization_id, &entity.origin_id)
                        .await?;
                }
            }

            entity.changes.clear();
            session.mark(entity);
        }

        outcome.deleted = session.finish(&mut self.store, DEFAULT_DELETE_LIMIT).await?;
        Ok(outcome)
    }

    /// Reconcile a batch of posts inside one transaction. Organizations must
    /// have been reconciled first; post records reference them by origin id.
    pub async fn update_posts(
        &mut self,
        batch: Vec<PostUpdate>,
        ctx: &ImportContext,
    ) -> ImportResult<SyncOutcome> {
        self.store.begin().await?;
        match self.update_posts_inner(batch, ctx).await {
            Ok(outcome) => {
                self.store.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn update_posts_inner(
        &mut self,
        batch: Vec<PostUpdate>,
        ctx: &ImportContext,
    ) -> ImportResult<SyncOutcome> {
        let existing = self
            .store
            .find_all(self.data_source.id, EntityKind::Post)
            .await?;
        let mut session =
            SyncSession::open(EntityKind::Post, existing, |e| e.origin_id.clone());

        let organizations = self
            .store
            .find_all(self.data_source.id, EntityKind::Organization)
            .await?;
        let orgs_by_origin: std::collections::HashMap<String, Uuid> = organizations
            .into_iter()
            .filter_map(|o| o.id.map(|id| (o.origin_id, id)))
            .collect();

        let mut outcome = SyncOutcome::default();
        for update in batch {
            let mut entity = match session.get(&update.origin_id) {
                Some(known) => known.clone(),
                None => Entity::new(EntityKind::Post, self.data_source.id, &update.origin_id),
            };
            let creating = !entity.is_persisted();

            let mut update = update;
            if let Some(org_origin) = update.organization.take() {
                let organization_id =
                    orgs_by_origin.get(&org_origin).copied().ok_or_else(|| {
                        ImportError::inconsistent_parentage(
                            &update.origin_id,
                            format!("post references unknown organization '{org_origin}'"),
                        )
                    })?;
                update.record.set("organization_id", organization_id);
            }

            let memberships = std::mem::take(&mut update.memberships);
            self.save_post(&mut entity, update, ctx).await?;

            if creating {
                outcome.created += 1;
            } else if entity.changes.is_changed() {
                outcome.updated += 1;
            } else {
                outcome.unchanged += 1;
            }

            if ctx.include_people {
                if let Some(FieldValue::Relation(organization_id)) =
                    entity.fields.get("organization").cloned()
                {
                    for spec in &memberships {
                        self.save_membership(spec, organization_id, &entity.origin_id)
                            .await?;
                    }
                }
            }

            entity.changes.clear();
            session.mark(entity);
        }

        outcome.deleted = session.finish(&mut self.store, DEFAULT_DELETE_LIMIT).await?;
        Ok(outcome)
    }
}
