//! Stored entities and data sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::kind::EntityKind;
use crate::schema::{descriptor, EntityDescriptor};
use crate::value::FieldValue;

/// A logical origin of external records, e.g. one municipality's document
/// system. Used as a partition key for origin identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// Internal id.
    pub id: Uuid,
    /// Stable identifier, e.g. `"helsinki"`.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// When the data source record was created.
    pub created_at: DateTime<Utc>,
}

impl DataSource {
    /// Create a new data source record.
    #[must_use]
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Fields modified on an entity during the current reconciliation pass.
///
/// Transient: lives only between the start of reconciliation and the
/// persistence of the entity. Field names are kept in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    fields: Vec<String>,
}

impl ChangeSet {
    /// Record a modified field.
    pub fn record(&mut self, field: &str) {
        self.fields.push(field.to_string());
    }

    /// Whether anything changed.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Changed field names, in processing order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Comma-separated field list for log lines.
    #[must_use]
    pub fn summary(&self) -> String {
        self.fields.join(", ")
    }

    /// Drop all recorded changes.
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

/// A persisted record of one entity kind.
///
/// The store-assigned internal [`Entity::id`] must never be used for
/// cross-batch correlation; the `(data_source_id, kind, origin_id)` triple is
/// the stable external identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Internal id; `None` until the entity has been persisted.
    pub id: Option<Uuid>,
    /// Owning data source.
    pub data_source_id: Uuid,
    /// Entity kind.
    pub kind: EntityKind,
    /// Source-assigned identifier, unique per kind within the data source.
    pub origin_id: String,
    /// Declared field values.
    pub fields: BTreeMap<String, FieldValue>,
    /// Changes recorded in the current reconciliation pass.
    #[serde(skip)]
    pub changes: ChangeSet,
}

impl Entity {
    /// Create a new, unpersisted entity shell.
    #[must_use]
    pub fn new(kind: EntityKind, data_source_id: Uuid, origin_id: impl Into<String>) -> Self {
        Self {
            id: None,
            data_source_id,
            kind,
            origin_id: origin_id.into(),
            fields: BTreeMap::new(),
            changes: ChangeSet::default(),
        }
    }

    /// Schema descriptor for this entity's kind.
    #[must_use]
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        descriptor(self.kind)
    }

    /// Whether the entity has been persisted.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Current value of a field; [`FieldValue::Null`] if unset.
    #[must_use]
    pub fn get(&self, field: &str) -> FieldValue {
        self.fields.get(field).cloned().unwrap_or(FieldValue::Null)
    }

    /// Set a field without recording a change. Used when loading from the
    /// store or seeding a shell; reconciliation goes through the field
    /// reconciler instead.
    pub fn set_raw(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    /// Set a field and record it in the change set.
    pub fn set_changed(&mut self, field: &str, value: FieldValue) {
        self.fields.insert(field.to_string(), value);
        self.changes.record(field);
    }

    /// Display name for log lines: the `name` or `label` field when present,
    /// the origin id otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        for candidate in ["name", "label", "title"] {
            if let FieldValue::Text(s) = self.get(candidate) {
                return s;
            }
        }
        self.origin_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_has_no_id() {
        let ds = Uuid::new_v4();
        let entity = Entity::new(EntityKind::Organization, ds, "123");
        assert!(!entity.is_persisted());
        assert!(entity.get("name").is_null());
        assert!(!entity.changes.is_changed());
    }

    #[test]
    fn test_set_changed_records_order() {
        let ds = Uuid::new_v4();
        let mut entity = Entity::new(EntityKind::Organization, ds, "123");
        entity.set_changed("slug", FieldValue::Text("kvsto".into()));
        entity.set_changed("name", FieldValue::Text("Kaupunginvaltuusto".into()));
        assert_eq!(entity.changes.fields(), ["slug", "name"]);
        assert_eq!(entity.changes.summary(), "slug, name");
    }

    #[test]
    fn test_set_raw_is_silent() {
        let ds = Uuid::new_v4();
        let mut entity = Entity::new(EntityKind::Person, ds, "77");
        entity.set_raw("name", FieldValue::Text("Maija Meikäläinen".into()));
        assert!(!entity.changes.is_changed());
        assert_eq!(entity.display_name(), "Maija Meikäläinen");
    }

    #[test]
    fn test_display_name_falls_back_to_origin_id() {
        let ds = Uuid::new_v4();
        let entity = Entity::new(EntityKind::Post, ds, "9000");
        assert_eq!(entity.display_name(), "9000");
    }
}
