//! Field-level reconciliation.
//!
//! Compares a stored entity's fields against incoming values using
//! type-aware equality, applies the incoming value when different, and
//! records the changed field names on the entity. Equality deliberately
//! absorbs representation noise from the source system: timestamps are
//! compared through a canonical string or in the stored value's offset,
//! dates through `YYYY-MM-DD`, and floats within a relative tolerance.

use chrono::{DateTime, FixedOffset, NaiveDate};

use paatos_db::{Entity, FieldDescriptor, FieldType, FieldValue};

use crate::error::{ImportError, ImportResult};
use crate::record::ExternalRecord;

/// Relative tolerance for float comparison; absorbs source rounding noise.
const FLOAT_REL_TOLERANCE: f64 = 1e-9;

/// Compare two floats within relative tolerance 1e-9 (absolute 0).
#[must_use]
pub fn isclose(a: f64, b: f64) -> bool {
    (a - b).abs() <= FLOAT_REL_TOLERANCE * a.abs().max(b.abs())
}

/// Canonical string form of a stored timestamp: seconds precision, `Z`
/// suffix when the offset is UTC.
fn canonical_timestamp(ts: &DateTime<FixedOffset>) -> String {
    let formatted = ts.format("%Y-%m-%dT%H:%M:%S%:z").to_string();
    match formatted.strip_suffix("+00:00") {
        Some(prefix) => format!("{prefix}Z"),
        None => formatted,
    }
}

fn parse_timestamp(field: &str, text: &str) -> ImportResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text)
        .map_err(|e| ImportError::invalid_value(field, format!("not a timestamp: {e}")))
}

fn parse_date(field: &str, text: &str) -> ImportResult<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| ImportError::invalid_value(field, format!("not a date: {e}")))
}

/// Coerce an incoming value to the field's declared type.
fn coerce(field: &FieldDescriptor, value: FieldValue) -> ImportResult<FieldValue> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    match (&field.field_type, value) {
        (FieldType::Text { .. }, FieldValue::Text(s)) => Ok(FieldValue::Text(s)),
        (FieldType::Integer, FieldValue::Integer(i)) => Ok(FieldValue::Integer(i)),
        (FieldType::Float, FieldValue::Float(v)) => Ok(FieldValue::Float(v)),
        (FieldType::Float, FieldValue::Integer(i)) => Ok(FieldValue::Float(i as f64)),
        (FieldType::Bool, FieldValue::Bool(b)) => Ok(FieldValue::Bool(b)),
        (FieldType::Date, FieldValue::Date(d)) => Ok(FieldValue::Date(d)),
        (FieldType::Date, FieldValue::Text(s)) => {
            Ok(FieldValue::Date(parse_date(field.name, &s)?))
        }
        (FieldType::Timestamp, FieldValue::Timestamp(t)) => Ok(FieldValue::Timestamp(t)),
        (FieldType::Timestamp, FieldValue::Text(s)) => {
            Ok(FieldValue::Timestamp(parse_timestamp(field.name, &s)?))
        }
        (FieldType::Relation { .. }, FieldValue::Relation(id)) => Ok(FieldValue::Relation(id)),
        (_, other) => Err(ImportError::invalid_value(
            field.name,
            format!("expected {:?}, got {}", field.field_type, other.type_name()),
        )),
    }
}

/// Reconcile one field of an entity against an incoming value.
///
/// Returns whether the field changed. On change the incoming value is
/// coerced to the declared type, written to the entity, and the field's
/// record key is appended to the entity's change set. The max-length
/// constraint is checked before any mutation.
pub fn set_field(
    entity: &mut Entity,
    field: &FieldDescriptor,
    incoming: FieldValue,
) -> ImportResult<bool> {
    let stored = entity.get(field.name);

    let equal = match (&stored, &incoming) {
        (FieldValue::Timestamp(s), FieldValue::Text(t)) => canonical_timestamp(s) == *t,
        (FieldValue::Timestamp(s), FieldValue::Timestamp(i)) => {
            *s == i.with_timezone(s.offset())
        }
        (FieldValue::Date(s), FieldValue::Text(t)) => s.format("%Y-%m-%d").to_string() == *t,
        (FieldValue::Float(a), FieldValue::Float(b)) => isclose(*a, *b),
        (s, i) => s == i,
    };
    if equal {
        return Ok(false);
    }

    if let (Some(max), FieldValue::Text(text)) = (field.max_length(), &incoming) {
        let len = text.chars().count();
        if len > max {
            return Err(ImportError::field_too_long(field.record_key(), max, len));
        }
    }

    let value = match (&stored, incoming) {
        // Keep the comparison offset: an equal-instant timestamp in another
        // zone was already caught above, so this is a real change.
        (FieldValue::Timestamp(s), FieldValue::Timestamp(i)) => {
            FieldValue::Timestamp(i.with_timezone(s.offset()))
        }
        (_, incoming) => coerce(field, incoming)?,
    };

    entity.fields.insert(field.name.to_string(), value);
    entity.changes.record(&field.record_key());
    Ok(true)
}

/// Reconcile every declared field of an entity against an incoming record.
///
/// Relation fields are matched by their `<name>_id` record key. Fields named
/// in `skip_fields` are left untouched even when present in the record.
/// Record keys that match no declared field fail the whole update with
/// [`ImportError::UnsupportedFields`], after the declared fields have been
/// processed, so every offending name is reported at once.
pub fn apply(
    entity: &mut Entity,
    mut record: ExternalRecord,
    skip_fields: &[&str],
) -> ImportResult<()> {
    for field in entity.descriptor().fields {
        if skip_fields.contains(&field.name) {
            record.take(&field.record_key());
            continue;
        }
        if let Some(incoming) = record.take(&field.record_key()) {
            set_field(entity, field, incoming)?;
        }
    }

    if !record.is_empty() {
        return Err(ImportError::UnsupportedFields {
            kind: entity.kind,
            fields: record.keys().map(str::to_string).collect(),
        });
    }
    Ok(())
}
