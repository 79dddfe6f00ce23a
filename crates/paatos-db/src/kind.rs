//! Entity kinds persisted by the store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of persisted entity kinds.
///
/// Every stored record belongs to exactly one kind; the
/// `(data_source, kind, origin_id)` triple is the stable external identity
/// used to correlate records across import batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An organization, e.g. a council or committee.
    Organization,
    /// A classification label for organizations.
    OrganizationClass,
    /// A role or office held within an organization.
    Post,
    /// A classification label for posts.
    PostClass,
    /// A natural person.
    Person,
    /// A person's membership in an organization.
    Membership,
    /// A meeting or other occurrence people may attend.
    Event,
    /// A person's attendance at an event.
    EventAttendee,
    /// A decision taken during an event.
    Action,
    /// A case an action belongs to, tracked across events.
    Case,
    /// Textual content attached to an action.
    Content,
    /// A document attached to an action.
    Attachment,
    /// A function in the municipal classification of duties.
    Function,
    /// Bookkeeping record of an imported source file and its version.
    ImportedFile,
}

impl EntityKind {
    /// String representation, also used as the storage discriminator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::OrganizationClass => "organization_class",
            EntityKind::Post => "post",
            EntityKind::PostClass => "post_class",
            EntityKind::Person => "person",
            EntityKind::Membership => "membership",
            EntityKind::Event => "event",
            EntityKind::EventAttendee => "event_attendee",
            EntityKind::Action => "action",
            EntityKind::Case => "case",
            EntityKind::Content => "content",
            EntityKind::Attachment => "attachment",
            EntityKind::Function => "function",
            EntityKind::ImportedFile => "imported_file",
        }
    }

    /// All kinds, in reconciliation order (referenced kinds first).
    #[must_use]
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::OrganizationClass,
            EntityKind::PostClass,
            EntityKind::Organization,
            EntityKind::Post,
            EntityKind::Person,
            EntityKind::Membership,
            EntityKind::Event,
            EntityKind::EventAttendee,
            EntityKind::Function,
            EntityKind::Case,
            EntityKind::Action,
            EntityKind::Content,
            EntityKind::Attachment,
            EntityKind::ImportedFile,
        ]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization" => Ok(EntityKind::Organization),
            "organization_class" => Ok(EntityKind::OrganizationClass),
            "post" => Ok(EntityKind::Post),
            "post_class" => Ok(EntityKind::PostClass),
            "person" => Ok(EntityKind::Person),
            "membership" => Ok(EntityKind::Membership),
            "event" => Ok(EntityKind::Event),
            "event_attendee" => Ok(EntityKind::EventAttendee),
            "action" => Ok(EntityKind::Action),
            "case" => Ok(EntityKind::Case),
            "content" => Ok(EntityKind::Content),
            "attachment" => Ok(EntityKind::Attachment),
            "function" => Ok(EntityKind::Function),
            "imported_file" => Ok(EntityKind::ImportedFile),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}
