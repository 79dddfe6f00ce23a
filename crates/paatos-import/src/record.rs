//! External records.

use std::collections::BTreeMap;

use paatos_db::FieldValue;

/// An untyped field map produced by a source-specific parser.
///
/// Ephemeral: one per batch item, consumed during reconciliation. Relation
/// fields appear under identifier-suffixed keys (`organization_id`), holding
/// either an origin id (before resolution) or a stored id (after).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl ExternalRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Remove a field, returning its value.
    pub fn take(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Whether a field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Remaining field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Whether the record has no fields left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Rename a field if present, keeping its value.
    pub fn rename(&mut self, from: &str, to: impl Into<String>) {
        if let Some(value) = self.fields.remove(from) {
            self.fields.insert(to.into(), value);
        }
    }
}

impl FromIterator<(String, FieldValue)> for ExternalRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
