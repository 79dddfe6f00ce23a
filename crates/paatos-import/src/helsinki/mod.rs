//! Helsinki source importers.
//!
//! Source-specific front ends for the reconciliation engine: the
//! organization registry importer (tree build, reclassification,
//! parent-before-child flattening) and the decision-document importer.

pub mod documents;
pub mod organizations;

pub use documents::{
    ActionData, AttachmentData, AttendeeData, Document, DocumentImporter, DocumentInfo,
    DocumentStatus, EventDoc,
};
pub use organizations::{
    build_forest, resolve_parent, HelsinkiImporter, OrgType, RawOrganization, RawParentLink,
    RawPerson,
};
