//! Decision-document importer.
//!
//! Consumes already-parsed decision documents (meeting minutes) and
//! reconciles their events, attendees, actions, cases, contents and
//! attachments into the store. Document parsing itself happens upstream;
//! this module only sees the typed result.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use paatos_db::{DbError, Entity, EntityKind, Store};

use crate::error::ImportResult;
use crate::importer::{Importer, PersonSpec};
use crate::reconcile;
use crate::record::ExternalRecord;

/// Only this document type carries decisions; agendas are skipped.
const IMPORTED_DOC_TYPE: &str = "minutes";

/// Source metadata of one document.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInfo {
    /// Source-assigned document id.
    pub origin_id: String,
    /// Document type, e.g. `minutes` or `agenda`.
    pub doc_type: String,
    /// Id of the organization or post the document belongs to.
    pub policymaker_id: String,
    /// Source path of the document file.
    pub path: String,
    /// Monotonically increasing source version.
    pub version: i64,
}

/// A parsed decision document.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// The meeting the document records.
    pub event: EventDoc,
}

/// The meeting described by a document.
#[derive(Debug, Clone, Deserialize)]
pub struct EventDoc {
    /// Meeting name.
    pub name: String,
    /// Meeting start.
    #[serde(default)]
    pub start_date: Option<DateTime<FixedOffset>>,
    /// Meeting end.
    #[serde(default)]
    pub end_date: Option<DateTime<FixedOffset>>,
    /// Attendees.
    #[serde(default)]
    pub attendees: Vec<AttendeeData>,
    /// Decisions taken.
    #[serde(default)]
    pub actions: Vec<ActionData>,
}

/// One attendee of a meeting.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendeeData {
    /// Full name.
    pub name: String,
    /// Title, if stated.
    #[serde(default)]
    pub title: Option<String>,
    /// Role at the meeting.
    #[serde(default)]
    pub role: Option<String>,
}

/// One decision within a document.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionData {
    /// Case register id, when the action belongs to a tracked case.
    #[serde(default)]
    pub register_id: Option<String>,
    /// Function id in the municipal classification of duties.
    #[serde(default)]
    pub function_id: Option<String>,
    /// Function display name.
    #[serde(default)]
    pub function_name: Option<String>,
    /// Action title.
    pub title: String,
    /// Resolution text.
    #[serde(default)]
    pub resolution: Option<String>,
    /// Article number within the minutes.
    #[serde(default)]
    pub article_number: Option<String>,
    /// Decision content as hypertext.
    #[serde(default)]
    pub content: Option<String>,
    /// Attachments of the action.
    #[serde(default)]
    pub attachments: Vec<AttachmentData>,
}

/// One attachment of an action.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentData {
    /// Source-assigned attachment id; absent for removed attachments.
    #[serde(default)]
    pub id: Option<String>,
    /// Attachment name.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the attachment is public.
    pub public: bool,
    /// Position within the action's attachment list.
    pub ordering: i64,
    /// Reason for confidentiality, if not public.
    #[serde(default)]
    pub confidentiality_reason: Option<String>,
}

/// What happened to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Document type is not imported.
    SkippedDocType,
    /// The stored version is already current.
    AlreadyImported,
    /// Document data was reconciled into the store.
    Imported,
}

/// Importer for parsed decision documents.
pub struct DocumentImporter<S: Store> {
    base: Importer<S>,
    orgs_by_origin: HashMap<String, Entity>,
    posts_by_origin: HashMap<String, Entity>,
}

impl<S: Store> DocumentImporter<S> {
    /// Open the importer and prime the policymaker caches.
    pub async fn open(store: S) -> ImportResult<Self> {
        let mut base = Importer::open(store, "helsinki", "Helsinki").await?;
        let data_source = base.data_source().id;

        let orgs = base
            .store_mut()
            .find_all(data_source, EntityKind::Organization)
            .await?;
        let posts = base
            .store_mut()
            .find_all(data_source, EntityKind::Post)
            .await?;
        Ok(Self {
            base,
            orgs_by_origin: orgs.into_iter().map(|o| (o.origin_id.clone(), o)).collect(),
            posts_by_origin: posts.into_iter().map(|p| (p.origin_id.clone(), p)).collect(),
        })
    }

    /// Consume the importer, returning the store.
    pub fn into_store(self) -> S {
        self.base.into_store()
    }

    /// Whether a document should be imported at all.
    #[must_use]
    pub fn should_import(&self, info: &DocumentInfo) -> bool {
        let should = info.doc_type == IMPORTED_DOC_TYPE;
        if !should {
            debug!(doc_type = %info.doc_type, origin_id = %info.origin_id, "Skipping document");
        }
        should
    }

    /// Import one document inside its own transaction.
    pub async fn import_document(
        &mut self,
        info: &DocumentInfo,
        doc: &Document,
    ) -> ImportResult<DocumentStatus> {
        if !self.should_import(info) {
            return Ok(DocumentStatus::SkippedDocType);
        }
        if self.imported_version(&info.path).await? == Some(info.version) {
            debug!(origin_id = %info.origin_id, version = info.version, "Document already imported");
            return Ok(DocumentStatus::AlreadyImported);
        }

        info!(origin_id = %info.origin_id, "Updating data from document");
        self.base.store_mut().begin().await?;
        match self.import_document_inner(info, doc).await {
            Ok(()) => {
                self.base.store_mut().commit().await?;
                Ok(DocumentStatus::Imported)
            }
            Err(err) => {
                if let Err(rollback_err) = self.base.store_mut().rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn import_document_inner(
        &mut self,
        info: &DocumentInfo,
        doc: &Document,
    ) -> ImportResult<()> {
        let event = self.import_event(info, doc).await?;
        self.import_attendees(doc, &event).await?;
        self.import_actions(doc, &event).await?;
        self.set_imported_version(&info.path, info.version).await?;
        Ok(())
    }

    /// Stored version of a source file, if any.
    pub async fn imported_version(&mut self, path: &str) -> ImportResult<Option<i64>> {
        let data_source = self.base.data_source().id;
        let stored = self
            .base
            .store_mut()
            .find_by_origin_id(data_source, EntityKind::ImportedFile, path)
            .await?;
        Ok(stored.and_then(|f| f.get("imported_version").as_integer()))
    }

    /// Record the imported version of a source file.
    pub async fn set_imported_version(&mut self, path: &str, version: i64) -> ImportResult<()> {
        let mut record = ExternalRecord::new();
        record.set("path", path);
        record.set("imported_version", version);
        self.update_or_create(EntityKind::ImportedFile, path, record)
            .await?;
        Ok(())
    }

    async fn import_event(&mut self, info: &DocumentInfo, doc: &Document) -> ImportResult<Entity> {
        let mut organization_id = self
            .orgs_by_origin
            .get(&info.policymaker_id)
            .and_then(|o| o.id);
        let mut post_id = None;
        if organization_id.is_none() {
            // The policymaker is most likely a post instead; the event's
            // organization is then the post's organization.
            match self.posts_by_origin.get(&info.policymaker_id) {
                Some(post) => {
                    post_id = post.id;
                    organization_id = post.get("organization").as_relation();
                }
                None => {
                    warn!(
                        policymaker_id = %info.policymaker_id,
                        "Unknown post or organization"
                    );
                }
            }
        }

        let mut record = ExternalRecord::new();
        record.set("name", doc.event.name.as_str());
        record.set("start_date", doc.event.start_date);
        record.set("end_date", doc.event.end_date);
        record.set("organization_id", organization_id);
        record.set("post_id", post_id);
        let (event, _) = self
            .update_or_create(EntityKind::Event, &info.origin_id, record)
            .await?;
        Ok(event)
    }

    async fn import_attendees(&mut self, doc: &Document, event: &Entity) -> ImportResult<()> {
        let event_id = event
            .id
            .ok_or_else(|| DbError::not_persisted(EntityKind::Event, event.origin_id.clone()))?;

        let mut imported: HashSet<Uuid> = HashSet::new();
        for attendee in &doc.event.attendees {
            let person = self
                .base
                .get_or_create_person(&person_spec(attendee))
                .await?;
            let person_id = person.id.ok_or_else(|| {
                DbError::not_persisted(EntityKind::Person, person.origin_id.clone())
            })?;

            let origin_id = format!("{}:{}", event.origin_id, person.origin_id);
            let mut record = ExternalRecord::new();
            record.set("event_id", event_id);
            record.set("person_id", person_id);
            record.set("role", attendee.role.clone());
            let (stored, _) = self
                .update_or_create(EntityKind::EventAttendee, &origin_id, record)
                .await?;
            if let Some(id) = stored.id {
                imported.insert(id);
            }
        }

        // Delete attendees of this event that the document no longer lists.
        let data_source = self.base.data_source().id;
        let known = self
            .base
            .store_mut()
            .find_related(data_source, EntityKind::EventAttendee, "event", event_id)
            .await?;
        for attendee in known {
            if attendee.id.is_some_and(|id| !imported.contains(&id)) {
                debug!(origin_id = %attendee.origin_id, "Deleting stale attendee");
                self.base.store_mut().delete(&attendee).await?;
            }
        }
        Ok(())
    }

    async fn import_actions(&mut self, doc: &Document, event: &Entity) -> ImportResult<()> {
        let event_id = event
            .id
            .ok_or_else(|| DbError::not_persisted(EntityKind::Event, event.origin_id.clone()))?;

        let mut imported: HashSet<Uuid> = HashSet::new();
        for (num, action_data) in doc.event.actions.iter().enumerate() {
            let case_id = self.import_case(action_data).await?;

            let origin_id = format!("{}:{}", event.origin_id, num);
            let mut record = ExternalRecord::new();
            record.set("case_id", case_id);
            record.set("title", action_data.title.as_str());
            record.set("ordering", num as i64);
            record.set(
                "resolution",
                action_data.resolution.clone().unwrap_or_default(),
            );
            record.set("event_id", event_id);
            record.set(
                "article_number",
                action_data.article_number.clone().unwrap_or_default(),
            );
            record.set("post_id", event.get("post").as_relation());
            let (action, _) = self
                .update_or_create(EntityKind::Action, &origin_id, record)
                .await?;
            if let Some(id) = action.id {
                imported.insert(id);
            }

            self.import_contents(action_data, &action).await?;
            self.import_attachments(action_data, &action).await?;
        }

        // Delete actions of this event that the document no longer lists.
        let data_source = self.base.data_source().id;
        let known = self
            .base
            .store_mut()
            .find_related(data_source, EntityKind::Action, "event", event_id)
            .await?;
        for action in known {
            if action.id.is_some_and(|id| !imported.contains(&id)) {
                debug!(origin_id = %action.origin_id, "Deleting stale action");
                self.delete_action_dependents(&action).await?;
                self.base.store_mut().delete(&action).await?;
            }
        }
        Ok(())
    }

    /// Contents and attachments follow their action out of the store.
    async fn delete_action_dependents(&mut self, action: &Entity) -> ImportResult<()> {
        let Some(action_id) = action.id else {
            return Ok(());
        };
        let data_source = self.base.data_source().id;
        for kind in [EntityKind::Content, EntityKind::Attachment] {
            let dependents = self
                .base
                .store_mut()
                .find_related(data_source, kind, "action", action_id)
                .await?;
            for dependent in dependents {
                self.base.store_mut().delete(&dependent).await?;
            }
        }
        Ok(())
    }

    /// Upsert the case an action belongs to, if it has a register id.
    async fn import_case(&mut self, action_data: &ActionData) -> ImportResult<Option<Uuid>> {
        let Some(register_id) = action_data
            .register_id
            .as_deref()
            .filter(|s| !s.is_empty())
        else {
            return Ok(None);
        };

        let function_id = self.get_or_create_function(action_data).await?;
        let mut record = ExternalRecord::new();
        record.set("title", action_data.title.as_str());
        record.set("function_id", function_id);
        let (case, _) = self
            .update_or_create(EntityKind::Case, register_id, record)
            .await?;
        Ok(case.id)
    }

    async fn get_or_create_function(
        &mut self,
        action_data: &ActionData,
    ) -> ImportResult<Option<Uuid>> {
        let Some(function_id) = action_data
            .function_id
            .as_deref()
            .filter(|s| !s.is_empty())
        else {
            return Ok(None);
        };

        let data_source = self.base.data_source().id;
        if let Some(existing) = self
            .base
            .store_mut()
            .find_by_origin_id(data_source, EntityKind::Function, function_id)
            .await?
        {
            return Ok(existing.id);
        }

        let mut function = Entity::new(EntityKind::Function, data_source, function_id);
        let mut record = ExternalRecord::new();
        record.set(
            "name",
            action_data.function_name.clone().unwrap_or_default(),
        );
        reconcile::apply(&mut function, record, &[])?;
        self.base.store_mut().save(&mut function).await?;
        debug!(function_id = %function_id, "Created function");
        Ok(function.id)
    }

    async fn import_contents(
        &mut self,
        action_data: &ActionData,
        action: &Entity,
    ) -> ImportResult<()> {
        let action_id = action
            .id
            .ok_or_else(|| DbError::not_persisted(EntityKind::Action, action.origin_id.clone()))?;

        let mut record = ExternalRecord::new();
        record.set("action_id", action_id);
        record.set("hypertext", action_data.content.clone().unwrap_or_default());
        record.set("type", "decision");
        record.set("ordering", 1i64);
        self.update_or_create(EntityKind::Content, &action.origin_id, record)
            .await?;
        Ok(())
    }

    async fn import_attachments(
        &mut self,
        action_data: &ActionData,
        action: &Entity,
    ) -> ImportResult<()> {
        let action_id = action
            .id
            .ok_or_else(|| DbError::not_persisted(EntityKind::Action, action.origin_id.clone()))?;

        for attachment in &action_data.attachments {
            let suffix = attachment
                .id
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| attachment.ordering.to_string());
            let origin_id = format!("{}:{}", action.origin_id, suffix);

            let mut record = ExternalRecord::new();
            record.set("action_id", action_id);
            record.set("name", attachment.name.clone().unwrap_or_default());
            record.set("public", attachment.public);
            record.set("number", attachment.ordering);
            record.set(
                "confidentiality_reason",
                attachment.confidentiality_reason.clone(),
            );
            self.update_or_create(EntityKind::Attachment, &origin_id, record)
                .await?;
        }
        Ok(())
    }

    /// Find an entity by origin id and reconcile the record into it,
    /// creating it first when absent. Persists only when something changed.
    async fn update_or_create(
        &mut self,
        kind: EntityKind,
        origin_id: &str,
        record: ExternalRecord,
    ) -> ImportResult<(Entity, bool)> {
        let data_source = self.base.data_source().id;
        let mut entity = match self
            .base
            .store_mut()
            .find_by_origin_id(data_source, kind, origin_id)
            .await?
        {
            Some(existing) => existing,
            None => Entity::new(kind, data_source, origin_id),
        };
        let created = !entity.is_persisted();

        reconcile::apply(&mut entity, record, &[])?;
        if entity.changes.is_changed() || created {
            self.base.store_mut().save(&mut entity).await?;
            if created {
                info!(kind = %kind, origin_id = %origin_id, "Created entity");
            } else {
                debug!(
                    kind = %kind,
                    origin_id = %origin_id,
                    changed = %entity.changes.summary(),
                    "Updated entity"
                );
            }
        }
        Ok((entity, created))
    }
}

/// Build a person spec from attendee data. The source has no person ids
/// here, so `name/title` acts as the origin id.
fn person_spec(attendee: &AttendeeData) -> PersonSpec {
    let names: Vec<&str> = attendee.name.split_whitespace().collect();
    let given_name = if names.len() >= 2 { names[0] } else { "" };
    let family_name = names.last().copied().unwrap_or("");
    PersonSpec {
        origin_id: format!(
            "{}/{}",
            attendee.name,
            attendee.title.as_deref().unwrap_or("")
        ),
        name: attendee.name.clone(),
        given_name: given_name.to_string(),
        family_name: family_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_spec_name_split() {
        let spec = person_spec(&AttendeeData {
            name: "Maija Meikäläinen".to_string(),
            title: Some("puheenjohtaja".to_string()),
            role: None,
        });
        assert_eq!(spec.origin_id, "Maija Meikäläinen/puheenjohtaja");
        assert_eq!(spec.given_name, "Maija");
        assert_eq!(spec.family_name, "Meikäläinen");
    }

    #[test]
    fn test_person_spec_single_name() {
        let spec = person_spec(&AttendeeData {
            name: "Meikäläinen".to_string(),
            title: None,
            role: None,
        });
        assert_eq!(spec.origin_id, "Meikäläinen/");
        assert_eq!(spec.given_name, "");
        assert_eq!(spec.family_name, "Meikäläinen");
    }
}
