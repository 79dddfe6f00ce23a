//! # paatos import engine
//!
//! Reconciles periodic snapshots of external decision-system data into the
//! paatos store: the minimal set of creates, updates and deletes that brings
//! the store in sync with the source, without corrupting unrelated fields
//! and without letting a partial feed wipe the store.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌───────────────┐
//! │  Raw batch   │────►│ Helsinki importer │────►│  SyncSession  │
//! │ (flat dump)  │     │ tree + reclassify │     │  mark/finish  │
//! └──────────────┘     └─────────┬─────────┘     └───────┬───────┘
//!                                │                       │
//!                        ┌───────▼────────┐      ┌───────▼───────┐
//!                        │   reconcile    │      │     Store     │
//!                        │  field diffing │─────►│  (txn scope)  │
//!                        └────────────────┘      └───────────────┘
//! ```
//!
//! ## Key components
//!
//! - [`reconcile`] - type-aware field diffing with change tracking
//! - [`SyncSession`] - the mark/finish protocol with a bounded deletion cap
//! - [`Importer`] - transactional per-data-source orchestration
//! - [`helsinki`] - the Helsinki registry and document importers

pub mod context;
pub mod error;
pub mod helsinki;
pub mod importer;
pub mod reconcile;
pub mod record;
pub mod sync;
pub mod text;

pub use context::ImportContext;
pub use error::{ImportError, ImportResult};
pub use importer::{
    ContactDetail, Importer, MembershipSpec, OrganizationUpdate, PersonSpec, PostUpdate,
    SyncOutcome,
};
pub use record::ExternalRecord;
pub use sync::{SyncSession, DEFAULT_DELETE_LIMIT};
