//! Entity schema descriptors.
//!
//! Each entity kind has a static descriptor table listing its declared
//! fields, their semantic types, relation targets and text length limits.
//! The reconciliation engine consumes these tables generically instead of
//! relying on runtime reflection; everything here is known at compile time.

use crate::kind::EntityKind;

/// Semantic type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Text, optionally with a fixed maximum length.
    Text {
        /// Maximum length in characters; `None` for unbounded text.
        max_length: Option<usize>,
    },
    /// Integer.
    Integer,
    /// Floating point.
    Float,
    /// Boolean.
    Bool,
    /// Calendar date.
    Date,
    /// Timestamp with offset.
    Timestamp,
    /// Reference to another entity kind.
    Relation {
        /// The kind the relation points at.
        target: EntityKind,
    },
}

/// One declared field of an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Declared field name. Relation fields are matched against
    /// `<name>_id` keys in incoming records.
    pub name: &'static str,
    /// Semantic type of the field.
    pub field_type: FieldType,
}

impl FieldDescriptor {
    const fn text(name: &'static str, max_length: usize) -> Self {
        Self {
            name,
            field_type: FieldType::Text {
                max_length: Some(max_length),
            },
        }
    }

    const fn long_text(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Text { max_length: None },
        }
    }

    const fn integer(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Integer,
        }
    }

    const fn boolean(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Bool,
        }
    }

    const fn date(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Date,
        }
    }

    const fn timestamp(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Timestamp,
        }
    }

    const fn relation(name: &'static str, target: EntityKind) -> Self {
        Self {
            name,
            field_type: FieldType::Relation { target },
        }
    }

    /// True if this field references another entity.
    #[must_use]
    pub fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::Relation { .. })
    }

    /// Key under which this field appears in an incoming record:
    /// the field name itself, or `<name>_id` for relations.
    #[must_use]
    pub fn record_key(&self) -> String {
        if self.is_relation() {
            format!("{}_id", self.name)
        } else {
            self.name.to_string()
        }
    }

    /// Maximum text length, if this is a fixed-length text field.
    #[must_use]
    pub fn max_length(&self) -> Option<usize> {
        match self.field_type {
            FieldType::Text { max_length } => max_length,
            _ => None,
        }
    }
}

/// The declared schema of one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// The kind this descriptor describes.
    pub kind: EntityKind,
    /// Declared fields, in schema order.
    pub fields: &'static [FieldDescriptor],
}

impl EntityDescriptor {
    /// Find a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether a field is declared.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

static ORGANIZATION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Organization,
    fields: &[
        FieldDescriptor::relation("classification", EntityKind::OrganizationClass),
        FieldDescriptor::text("name", 255),
        FieldDescriptor::text("slug", 255),
        FieldDescriptor::text("abbreviation", 50),
        FieldDescriptor::date("founding_date"),
        FieldDescriptor::date("dissolution_date"),
        FieldDescriptor::relation("parent", EntityKind::Organization),
        FieldDescriptor::timestamp("modified_at"),
    ],
};

static ORGANIZATION_CLASS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::OrganizationClass,
    fields: &[FieldDescriptor::text("name", 255)],
};

static POST: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Post,
    fields: &[
        FieldDescriptor::relation("classification", EntityKind::PostClass),
        FieldDescriptor::text("label", 255),
        FieldDescriptor::text("slug", 255),
        FieldDescriptor::text("abbreviation", 50),
        FieldDescriptor::relation("organization", EntityKind::Organization),
        FieldDescriptor::date("start_date"),
        FieldDescriptor::date("end_date"),
        FieldDescriptor::timestamp("modified_at"),
    ],
};

static POST_CLASS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::PostClass,
    fields: &[FieldDescriptor::text("name", 255)],
};

static PERSON: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Person,
    fields: &[
        FieldDescriptor::text("name", 255),
        FieldDescriptor::text("given_name", 100),
        FieldDescriptor::text("family_name", 100),
    ],
};

static MEMBERSHIP: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Membership,
    fields: &[
        FieldDescriptor::relation("person", EntityKind::Person),
        FieldDescriptor::relation("organization", EntityKind::Organization),
        FieldDescriptor::text("role", 255),
        FieldDescriptor::date("start_date"),
        FieldDescriptor::date("end_date"),
    ],
};

static EVENT: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Event,
    fields: &[
        FieldDescriptor::text("name", 255),
        FieldDescriptor::relation("organization", EntityKind::Organization),
        FieldDescriptor::relation("post", EntityKind::Post),
        FieldDescriptor::timestamp("start_date"),
        FieldDescriptor::timestamp("end_date"),
    ],
};

static EVENT_ATTENDEE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::EventAttendee,
    fields: &[
        FieldDescriptor::relation("event", EntityKind::Event),
        FieldDescriptor::relation("person", EntityKind::Person),
        FieldDescriptor::text("role", 255),
    ],
};

static ACTION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Action,
    fields: &[
        FieldDescriptor::relation("case", EntityKind::Case),
        FieldDescriptor::text("title", 500),
        FieldDescriptor::integer("ordering"),
        FieldDescriptor::long_text("resolution"),
        FieldDescriptor::relation("event", EntityKind::Event),
        FieldDescriptor::text("article_number", 50),
        FieldDescriptor::relation("post", EntityKind::Post),
    ],
};

static CASE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Case,
    fields: &[
        FieldDescriptor::text("title", 500),
        FieldDescriptor::relation("function", EntityKind::Function),
    ],
};

static CONTENT: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Content,
    fields: &[
        FieldDescriptor::relation("action", EntityKind::Action),
        FieldDescriptor::long_text("hypertext"),
        FieldDescriptor::text("type", 50),
        FieldDescriptor::integer("ordering"),
    ],
};

static ATTACHMENT: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Attachment,
    fields: &[
        FieldDescriptor::relation("action", EntityKind::Action),
        FieldDescriptor::text("name", 400),
        FieldDescriptor::boolean("public"),
        FieldDescriptor::integer("number"),
        FieldDescriptor::text("confidentiality_reason", 255),
    ],
};

static FUNCTION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Function,
    fields: &[FieldDescriptor::text("name", 255)],
};

static IMPORTED_FILE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::ImportedFile,
    fields: &[
        FieldDescriptor::text("path", 400),
        FieldDescriptor::integer("imported_version"),
    ],
};

/// Descriptor table for a kind.
#[must_use]
pub fn descriptor(kind: EntityKind) -> &'static EntityDescriptor {
    match kind {
        EntityKind::Organization => &ORGANIZATION,
        EntityKind::OrganizationClass => &ORGANIZATION_CLASS,
        EntityKind::Post => &POST,
        EntityKind::PostClass => &POST_CLASS,
        EntityKind::Person => &PERSON,
        EntityKind::Membership => &MEMBERSHIP,
        EntityKind::Event => &EVENT,
        EntityKind::EventAttendee => &EVENT_ATTENDEE,
        EntityKind::Action => &ACTION,
        EntityKind::Case => &CASE,
        EntityKind::Content => &CONTENT,
        EntityKind::Attachment => &ATTACHMENT,
        EntityKind::Function => &FUNCTION,
        EntityKind::ImportedFile => &IMPORTED_FILE,
    }
}
