//! # paatos data model
//!
//! Data model and store boundary for the paatos decision-data platform.
//!
//! Stored entities are dynamic records validated against static per-kind
//! schema descriptors:
//!
//! - [`EntityKind`] - the fixed set of persisted kinds
//! - [`FieldValue`] - dynamic typed field values (JSONB-serializable)
//! - [`schema::descriptor`] - compile-time schema tables consumed by the
//!   reconciliation engine
//! - [`Entity`] / [`DataSource`] - stored records and their partition key
//! - [`Store`] - the async store trait, with [`MemoryStore`] (tests) and
//!   [`PgStore`] (Postgres) implementations
//!
//! The internal [`Entity::id`] is store-assigned and never used for
//! cross-batch correlation; the `(data_source, kind, origin_id)` triple is
//! the stable external identity.

pub mod entity;
pub mod error;
pub mod kind;
pub mod migrations;
pub mod schema;
pub mod store;
pub mod value;

pub use entity::{ChangeSet, DataSource, Entity};
pub use error::{DbError, DbResult};
pub use kind::EntityKind;
pub use schema::{descriptor, EntityDescriptor, FieldDescriptor, FieldType};
pub use store::{MemoryStore, PgStore, Store};
pub use value::FieldValue;
