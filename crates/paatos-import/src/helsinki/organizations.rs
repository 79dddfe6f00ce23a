//! Helsinki organization registry importer.
//!
//! Consumes the flat organization dump of the city's document system, builds
//! the organization forest from the parent pointers, reclassifies
//! office-holder and trustee records into posts, and hands the flattened
//! parent-before-child lists to the reconciliation engine.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use paatos_db::{Entity, EntityKind, Store};

use crate::context::ImportContext;
use crate::error::{ImportError, ImportResult};
use crate::importer::{
    ContactDetail, Importer, MembershipSpec, OrganizationUpdate, PersonSpec, PostUpdate,
    SyncOutcome,
};
use crate::reconcile;
use crate::record::ExternalRecord;
use crate::text::{clean_text, slugify};

/// A placeholder organization in the source registry with no real meaning.
const LEGACY_PLACEHOLDER_ID: &str = "500";

/// Date the source registry uses to mean "no data" for founding dates.
const NO_DATA_FOUNDING_DATE: (i32, u32, u32) = (2009, 1, 1);

/// Organization type taxonomy of the source registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrgType {
    Council,
    Board,
    ExecutiveBoard,
    BoardDivision,
    Committee,
    Common,
    Field,
    Department,
    Division,
    Introducer,
    IntroducerField,
    OfficeHolder,
    City,
    Unit,
    WorkingGroup,
    SchoolBoards,
    PackagedService,
    PackagedIntroducerService,
    Trustee,
}

/// Taxonomy table: type, code, Finnish name, English name.
const TAXONOMY: &[(OrgType, u32, &str, &str)] = &[
    (OrgType::Council, 1, "Valtuusto", "Council"),
    (OrgType::Board, 2, "Hallitus", "Board"),
    (OrgType::ExecutiveBoard, 3, "Johtajisto", "Executive board"),
    (OrgType::BoardDivision, 4, "Jaosto", "Board division"),
    (OrgType::Committee, 5, "Lautakunta", "Committee"),
    (OrgType::Common, 6, "Yleinen", "Common"),
    (OrgType::Field, 7, "Toimiala", "Field"),
    (OrgType::Department, 8, "Virasto", "Department"),
    (OrgType::Division, 9, "Osasto", "Division"),
    (OrgType::Introducer, 10, "Esittelijä", "Introducer"),
    (OrgType::IntroducerField, 11, "Esittelijä (toimiala)", "Introducer field"),
    (OrgType::OfficeHolder, 12, "Viranhaltija", "Office holder"),
    (OrgType::City, 13, "Kaupunki", "City"),
    (OrgType::Unit, 14, "Yksikkö", "Unit"),
    (OrgType::WorkingGroup, 15, "Toimikunta", "Working group"),
    (OrgType::SchoolBoards, 16, "Koulujen johtokunnat", "School boards"),
    (OrgType::PackagedService, 17, "Palvelukokonaisuus", "Packaged service"),
    (
        OrgType::PackagedIntroducerService,
        18,
        "Esittelijäpalvelukokonaisuus",
        "Packaged introducer service",
    ),
    (OrgType::Trustee, 19, "Luottamushenkilö", "Trustee"),
];

impl OrgType {
    /// Resolve a numeric type code from the source feed.
    pub fn from_code(code: u32) -> ImportResult<Self> {
        TAXONOMY
            .iter()
            .find(|(_, c, _, _)| *c == code)
            .map(|(t, _, _, _)| *t)
            .ok_or(ImportError::UnknownOrgType(code))
    }

    /// Numeric code of this type.
    #[must_use]
    pub fn code(&self) -> u32 {
        TAXONOMY
            .iter()
            .find(|(t, _, _, _)| t == self)
            .map(|(_, c, _, _)| *c)
            .unwrap_or(0)
    }

    /// Classification code used for stored classification entities.
    #[must_use]
    pub fn classification_code(&self) -> String {
        self.code().to_string()
    }

    /// Finnish display name.
    #[must_use]
    pub fn name_fi(&self) -> &'static str {
        TAXONOMY
            .iter()
            .find(|(t, _, _, _)| t == self)
            .map(|(_, _, fi, _)| *fi)
            .unwrap_or("")
    }

    /// Records of this type are excluded from import entirely.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            OrgType::Introducer | OrgType::IntroducerField | OrgType::PackagedIntroducerService
        )
    }

    /// Records of this type are really posts and get reclassified.
    #[must_use]
    pub fn is_post(&self) -> bool {
        matches!(self, OrgType::OfficeHolder | OrgType::Trustee)
    }

    /// This type's classification entity is a post class rather than an
    /// organization class.
    #[must_use]
    pub fn is_post_class(&self) -> bool {
        matches!(
            self,
            OrgType::Introducer | OrgType::IntroducerField | OrgType::OfficeHolder | OrgType::Trustee
        )
    }

    /// Decision-making bodies get their slug from the abbreviation.
    #[must_use]
    fn slug_from_abbreviation(&self) -> bool {
        matches!(
            self,
            OrgType::Council | OrgType::Committee | OrgType::BoardDivision | OrgType::Board
        )
    }
}

/// A candidate parent link of a raw organization record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawParentLink {
    /// Parent organization id.
    pub id: String,
    /// Whether this is a primary link.
    pub primary: bool,
    /// When the link ended; open-ended if absent.
    #[serde(default)]
    pub end_time: Option<String>,
}

/// A person attached to a raw organization record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPerson {
    /// Person id in the source registry.
    pub id: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Role in the organization.
    #[serde(default)]
    pub role: Option<String>,
    /// Membership start.
    #[serde(default)]
    pub start_time: Option<String>,
    /// Membership end.
    #[serde(default)]
    pub end_time: Option<String>,
}

/// One organization record as delivered by the source registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrganization {
    /// Source-assigned id.
    pub id: String,
    /// Numeric taxonomy code.
    #[serde(rename = "type")]
    pub type_code: u32,
    /// Finnish name.
    pub name_fin: String,
    /// Swedish name.
    #[serde(default)]
    pub name_swe: Option<String>,
    /// Abbreviation.
    #[serde(default)]
    pub shortname: Option<String>,
    /// Founding time.
    #[serde(default)]
    pub start_time: Option<String>,
    /// Dissolution time.
    #[serde(default)]
    pub end_time: Option<String>,
    /// Visiting address street.
    #[serde(default)]
    pub visitaddress_street: Option<String>,
    /// Visiting address postcode.
    #[serde(default)]
    pub visitaddress_zip: Option<String>,
    /// Last modification time in the source registry.
    pub modified_time: String,
    /// Candidate parent links.
    #[serde(default)]
    pub parents: Vec<RawParentLink>,
    /// People attached to the organization.
    #[serde(default)]
    pub people: Vec<RawPerson>,
}

/// Parse a date from a source time string (date or full timestamp).
fn parse_source_date(origin_id: &str, text: &str) -> ImportResult<NaiveDate> {
    let prefix = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").map_err(|e| {
        ImportError::invalid_value(
            origin_id.to_string(),
            format!("unparseable source date '{text}': {e}"),
        )
    })
}

/// Parse a source timestamp, localizing naive values to the given offset.
fn parse_source_timestamp(
    origin_id: &str,
    text: &str,
    local_offset: FixedOffset,
) -> ImportResult<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        if let Some(local) = local_offset.from_local_datetime(&naive).single() {
            return Ok(local);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text.get(..10).unwrap_or(text), "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            if let Some(local) = local_offset.from_local_datetime(&midnight).single() {
                return Ok(local);
            }
        }
    }
    Err(ImportError::invalid_value(
        origin_id.to_string(),
        format!("unparseable source timestamp '{text}'"),
    ))
}

/// Resolve the effective parent of a raw record from its candidate links.
///
/// Among the primary links, the active parent is the one with no end date or
/// an end date in the future; the last parent is the one with the latest end
/// date (open-ended links count as latest). If an active parent exists it
/// must be the last parent, otherwise the feed is inconsistent.
pub fn resolve_parent(record: &RawOrganization, today: NaiveDate) -> ImportResult<Option<String>> {
    let primaries: Vec<&RawParentLink> = record.parents.iter().filter(|p| p.primary).collect();
    let Some(first) = primaries.first() else {
        return Ok(None);
    };

    let end_date = |link: &RawParentLink| -> ImportResult<Option<NaiveDate>> {
        link.end_time
            .as_deref()
            .map(|t| parse_source_date(&record.id, t))
            .transpose()
    };

    let mut active: Option<&RawParentLink> = None;
    let mut last: &RawParentLink = first;
    let mut last_end = end_date(first)?;
    for link in &primaries {
        let end = end_date(link)?;
        if end.map_or(true, |d| d > today) {
            active = Some(link);
        }
        if last_end.is_some() && (end.is_none() || end > last_end) {
            last = link;
            last_end = end;
        }
    }

    if let Some(active) = active {
        if active.id != last.id {
            return Err(ImportError::inconsistent_parentage(
                &record.id,
                format!(
                    "active parent '{}' differs from last parent '{}'",
                    active.id, last.id
                ),
            ));
        }
    }
    Ok(Some(last.id.clone()))
}

/// Output category of one transformed node.
enum NodeOutput {
    Organization(OrganizationUpdate),
    Post(PostUpdate),
}

struct Node {
    record: RawOrganization,
    org_type: OrgType,
    parent: Option<String>,
    children: Vec<usize>,
}

/// Build the organization forest and flatten it back into parent-before-child
/// organization and post batches.
///
/// Introducer-type records and the legacy placeholder are dropped to the
/// context's skip-set first; any surviving record whose parent sits in the
/// skip-set fails the batch. Office-holder and trustee nodes are emitted as
/// posts and their children re-parented to the removed node's own parent.
pub fn build_forest(
    records: Vec<RawOrganization>,
    ctx: &mut ImportContext,
    local_offset: FixedOffset,
    today: NaiveDate,
) -> ImportResult<(Vec<OrganizationUpdate>, Vec<PostUpdate>)> {
    let mut nodes: Vec<Node> = Vec::with_capacity(records.len());
    for record in records {
        let org_type = OrgType::from_code(record.type_code)?;
        let parent = resolve_parent(&record, today)?;
        if org_type.is_skipped() || record.id == LEGACY_PLACEHOLDER_ID {
            debug!(origin_id = %record.id, org_type = ?org_type, "Skipping organization record");
            ctx.skip_orgs.insert(record.id.clone());
        }
        nodes.push(Node {
            record,
            org_type,
            parent,
            children: Vec::new(),
        });
    }

    let index_by_id: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.record.id.clone(), i))
        .collect();

    let mut roots: Vec<usize> = Vec::new();
    for index in 0..nodes.len() {
        if ctx.skip_orgs.contains(&nodes[index].record.id) {
            continue;
        }
        match nodes[index].parent.clone() {
            None => roots.push(index),
            Some(parent_id) => {
                if ctx.skip_orgs.contains(&parent_id) {
                    return Err(ImportError::inconsistent_parentage(
                        &nodes[index].record.id,
                        format!("references skipped parent '{parent_id}'"),
                    ));
                }
                let parent_index = *index_by_id.get(&parent_id).ok_or_else(|| {
                    ImportError::inconsistent_parentage(
                        &nodes[index].record.id,
                        format!("parent '{parent_id}' is not part of the batch"),
                    )
                })?;
                nodes[parent_index].children.push(index);
            }
        }
    }

    let mut organizations = Vec::new();
    let mut posts = Vec::new();
    let mut stack: Vec<(usize, Option<String>)> = Vec::new();
    // Reverse so the explicit stack pops roots, then children, in input order.
    for root in roots.into_iter().rev() {
        stack.push((root, None));
    }
    while let Some((index, effective_parent)) = stack.pop() {
        let node = &nodes[index];
        if node.org_type.is_post() {
            if let Some(parent_id) = &node.parent {
                if let Some(&parent_index) = index_by_id.get(parent_id) {
                    if nodes[parent_index].org_type.is_post() {
                        return Err(ImportError::inconsistent_parentage(
                            &node.record.id,
                            format!(
                                "office-holder parent '{parent_id}' is itself an office-holder"
                            ),
                        ));
                    }
                }
            }
        }
        let next_parent = if node.org_type.is_post() {
            // Children of reclassified nodes move up to the removed node's
            // own parent.
            effective_parent.clone()
        } else {
            Some(node.record.id.clone())
        };
        for child in node.children.iter().rev() {
            stack.push((*child, next_parent.clone()));
        }
        match transform(&nodes[index], effective_parent, ctx, local_offset)? {
            NodeOutput::Organization(update) => organizations.push(update),
            NodeOutput::Post(update) => posts.push(update),
        }
    }

    Ok((organizations, posts))
}

/// Transform one raw node into a reconciliation-ready update.
fn transform(
    node: &Node,
    parent: Option<String>,
    ctx: &ImportContext,
    local_offset: FixedOffset,
) -> ImportResult<NodeOutput> {
    let raw = &node.record;
    let org_type = node.org_type;

    let name = clean_text(&raw.name_fin);
    let abbreviation = raw
        .shortname
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let slug = if org_type.slug_from_abbreviation() {
        slugify(abbreviation.as_deref().unwrap_or(&raw.id))
    } else {
        slugify(&raw.id)
    };

    let founding_date = match raw.start_time.as_deref().filter(|s| !s.is_empty()) {
        Some(text) => {
            let date = parse_source_date(&raw.id, text)?;
            let (y, m, d) = NO_DATA_FOUNDING_DATE;
            if NaiveDate::from_ymd_opt(y, m, d) == Some(date) {
                None
            } else {
                Some(date)
            }
        }
        None => None,
    };
    let dissolution_date = raw
        .end_time
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|text| parse_source_date(&raw.id, text))
        .transpose()?;

    let modified_at = parse_source_timestamp(&raw.id, &raw.modified_time, local_offset)?;

    let mut contact_details = Vec::new();
    let street = raw.visitaddress_street.as_deref().unwrap_or("");
    let zip = raw.visitaddress_zip.as_deref().unwrap_or("");
    if !street.is_empty() || !zip.is_empty() {
        let postcode = if zip.len() == 2 {
            format!("00{zip}0")
        } else {
            zip.to_string()
        };
        contact_details.push(ContactDetail {
            detail_type: "address".to_string(),
            value: street.to_string(),
            postcode: Some(postcode).filter(|p| !p.is_empty()),
        });
    }

    let mut memberships = Vec::new();
    if ctx.include_people {
        for person in &raw.people {
            memberships.push(MembershipSpec {
                person: PersonSpec {
                    origin_id: person.id.clone(),
                    name: format!("{} {}", person.first_name, person.last_name),
                    given_name: person.first_name.clone(),
                    family_name: person.last_name.clone(),
                },
                role: person.role.clone(),
                start_date: person
                    .start_time
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(|t| parse_source_date(&person.id, t))
                    .transpose()?,
                end_date: person
                    .end_time
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(|t| parse_source_date(&person.id, t))
                    .transpose()?,
            });
        }
    }

    let classification = Some(org_type.classification_code());

    if org_type.is_post() {
        let mut record = ExternalRecord::new();
        record.set("label", name);
        record.set("slug", slug);
        record.set("abbreviation", abbreviation);
        record.set("start_date", founding_date);
        record.set("end_date", dissolution_date);
        record.set("modified_at", modified_at);
        Ok(NodeOutput::Post(PostUpdate {
            origin_id: raw.id.clone(),
            record,
            classification,
            organization: parent,
            memberships,
            contact_details,
        }))
    } else {
        let mut record = ExternalRecord::new();
        record.set("name", name);
        record.set("slug", slug);
        record.set("abbreviation", abbreviation);
        record.set("founding_date", founding_date);
        record.set("dissolution_date", dissolution_date);
        record.set("modified_at", modified_at);
        Ok(NodeOutput::Organization(OrganizationUpdate {
            origin_id: raw.id.clone(),
            record,
            classification,
            parent,
            memberships,
            contact_details,
        }))
    }
}

/// Importer for the Helsinki organization registry.
pub struct HelsinkiImporter<S: Store> {
    base: Importer<S>,
    local_offset: FixedOffset,
    include_people: bool,
}

impl<S: Store> HelsinkiImporter<S> {
    /// Open the importer against the `helsinki` data source.
    pub async fn open(store: S) -> ImportResult<Self> {
        let base = Importer::open(store, "helsinki", "Helsinki").await?;
        Ok(Self {
            base,
            local_offset: FixedOffset::east_opt(2 * 3600)
                .expect("two hours is a valid offset"),
            include_people: false,
        })
    }

    /// Override the local offset naive source times are interpreted in.
    #[must_use]
    pub fn with_local_offset(mut self, offset: FixedOffset) -> Self {
        self.local_offset = offset;
        self
    }

    /// Also import people attached to organizations.
    #[must_use]
    pub fn with_people(mut self, include: bool) -> Self {
        self.include_people = include;
        self
    }

    /// Borrow the underlying importer.
    pub fn base_mut(&mut self) -> &mut Importer<S> {
        &mut self.base
    }

    /// Consume the importer, returning the store.
    pub fn into_store(self) -> S {
        self.base.into_store()
    }

    /// Upsert the classification entities for the whole taxonomy and fill
    /// the context caches.
    pub async fn import_organization_classes(
        &mut self,
        ctx: &mut ImportContext,
    ) -> ImportResult<()> {
        info!("Updating organization class definitions");
        for (org_type, code, name_fi, _) in TAXONOMY {
            let kind = if org_type.is_post_class() {
                EntityKind::PostClass
            } else {
                EntityKind::OrganizationClass
            };
            let origin_id = code.to_string();

            let data_source = self.base.data_source().id;
            let store = self.base.store_mut();
            let mut class = match store.find_by_origin_id(data_source, kind, &origin_id).await? {
                Some(existing) => existing,
                None => Entity::new(kind, data_source, &origin_id),
            };
            let mut record = ExternalRecord::new();
            record.set("name", *name_fi);
            reconcile::apply(&mut class, record, &[])?;
            if class.changes.is_changed() || !class.is_persisted() {
                store.save(&mut class).await?;
            }

            let id = class.id.ok_or_else(|| {
                paatos_db::DbError::not_persisted(kind, origin_id.clone())
            })?;
            if org_type.is_post_class() {
                ctx.post_class_by_id.insert(origin_id, id);
            } else {
                ctx.org_class_by_id.insert(origin_id, id);
            }
        }
        Ok(())
    }

    /// Import a full organization registry snapshot.
    pub async fn import_organizations(
        &mut self,
        records: Vec<RawOrganization>,
    ) -> ImportResult<SyncOutcome> {
        let mut ctx = ImportContext {
            include_people: self.include_people,
            ..ImportContext::new()
        };
        self.import_organization_classes(&mut ctx).await?;

        info!(records = records.len(), "Importing organizations");
        let today = Utc::now().date_naive();
        let (organizations, posts) =
            build_forest(records, &mut ctx, self.local_offset, today)?;

        let mut outcome = self.base.update_organizations(organizations, &ctx).await?;
        outcome.merge(self.base.update_posts(posts, &ctx).await?);
        info!(
            created = outcome.created,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "Organization import done"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, type_code: u32, parents: Vec<RawParentLink>) -> RawOrganization {
        RawOrganization {
            id: id.to_string(),
            type_code,
            name_fin: format!("Org {id}"),
            name_swe: None,
            shortname: None,
            start_time: None,
            end_time: None,
            visitaddress_street: None,
            visitaddress_zip: None,
            modified_time: "2020-01-01T00:00:00".to_string(),
            parents,
            people: vec![],
        }
    }

    fn link(id: &str, primary: bool, end_time: Option<&str>) -> RawParentLink {
        RawParentLink {
            id: id.to_string(),
            primary,
            end_time: end_time.map(str::to_string),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    #[test]
    fn test_taxonomy_codes() {
        assert_eq!(OrgType::from_code(1).unwrap(), OrgType::Council);
        assert_eq!(OrgType::from_code(19).unwrap(), OrgType::Trustee);
        assert!(matches!(
            OrgType::from_code(42),
            Err(ImportError::UnknownOrgType(42))
        ));
        assert_eq!(OrgType::Committee.name_fi(), "Lautakunta");
        assert_eq!(OrgType::OfficeHolder.classification_code(), "12");
    }

    #[test]
    fn test_taxonomy_categories() {
        assert!(OrgType::Introducer.is_skipped());
        assert!(OrgType::PackagedIntroducerService.is_skipped());
        assert!(!OrgType::Council.is_skipped());

        assert!(OrgType::OfficeHolder.is_post());
        assert!(OrgType::Trustee.is_post());
        assert!(!OrgType::Department.is_post());

        assert!(OrgType::Introducer.is_post_class());
        assert!(!OrgType::Board.is_post_class());
    }

    #[test]
    fn test_resolve_parent_no_links() {
        let record = raw("1", 1, vec![]);
        assert_eq!(resolve_parent(&record, today()).unwrap(), None);
    }

    #[test]
    fn test_resolve_parent_only_primary_links_count() {
        let record = raw("1", 5, vec![link("9", false, None)]);
        assert_eq!(resolve_parent(&record, today()).unwrap(), None);
    }

    #[test]
    fn test_resolve_parent_prefers_open_ended_link() {
        let record = raw(
            "1",
            5,
            vec![
                link("old", true, Some("2015-12-31")),
                link("current", true, None),
            ],
        );
        assert_eq!(
            resolve_parent(&record, today()).unwrap(),
            Some("current".to_string())
        );
    }

    #[test]
    fn test_resolve_parent_latest_end_date_wins_when_all_ended() {
        let record = raw(
            "1",
            5,
            vec![
                link("older", true, Some("2012-01-01")),
                link("newer", true, Some("2018-01-01")),
            ],
        );
        assert_eq!(
            resolve_parent(&record, today()).unwrap(),
            Some("newer".to_string())
        );
    }

    #[test]
    fn test_resolve_parent_inconsistent_active_vs_last() {
        // One link ends in the future (active), another is open-ended and
        // therefore "last": the feed contradicts itself.
        let record = raw(
            "1",
            5,
            vec![
                link("a", true, None),
                link("b", true, Some("2099-01-01")),
            ],
        );
        let err = resolve_parent(&record, today()).unwrap_err();
        assert!(matches!(err, ImportError::InconsistentParentage { .. }));
    }

    #[test]
    fn test_build_forest_orders_parent_before_child() {
        // Supplied child-first: C (parent B), A (root), B (parent A).
        let records = vec![
            raw("C", 9, vec![link("B", true, None)]),
            raw("A", 13, vec![]),
            raw("B", 7, vec![link("A", true, None)]),
        ];
        let mut ctx = ImportContext::new();
        let (orgs, posts) = build_forest(records, &mut ctx, offset(), today()).unwrap();
        let order: Vec<&str> = orgs.iter().map(|o| o.origin_id.as_str()).collect();
        assert_eq!(order, ["A", "B", "C"]);
        assert!(posts.is_empty());
        assert_eq!(orgs[1].parent.as_deref(), Some("A"));
        assert_eq!(orgs[2].parent.as_deref(), Some("B"));
    }

    #[test]
    fn test_build_forest_reclassifies_office_holder() {
        let records = vec![
            raw("A", 13, vec![]),
            raw("OH", 12, vec![link("A", true, None)]),
            raw("child", 9, vec![link("OH", true, None)]),
        ];
        let mut ctx = ImportContext::new();
        let (orgs, posts) = build_forest(records, &mut ctx, offset(), today()).unwrap();

        let post = &posts[0];
        assert_eq!(post.origin_id, "OH");
        assert_eq!(post.organization.as_deref(), Some("A"));
        assert!(post.record.contains("label"));
        assert!(!post.record.contains("name"));

        // The office-holder's child survives, re-parented to "A".
        let child = orgs.iter().find(|o| o.origin_id == "child").unwrap();
        assert_eq!(child.parent.as_deref(), Some("A"));
    }

    #[test]
    fn test_build_forest_rejects_office_holder_under_office_holder() {
        let records = vec![
            raw("A", 13, vec![]),
            raw("OH", 12, vec![link("A", true, None)]),
            raw("OH2", 19, vec![link("OH", true, None)]),
        ];
        let mut ctx = ImportContext::new();
        let err = build_forest(records, &mut ctx, offset(), today()).unwrap_err();
        assert!(matches!(err, ImportError::InconsistentParentage { .. }));
    }

    #[test]
    fn test_build_forest_rejects_reference_to_skipped_parent() {
        let records = vec![
            raw("A", 13, vec![]),
            raw("intro", 10, vec![link("A", true, None)]),
            raw("child", 9, vec![link("intro", true, None)]),
        ];
        let mut ctx = ImportContext::new();
        let err = build_forest(records, &mut ctx, offset(), today()).unwrap_err();
        assert!(matches!(err, ImportError::InconsistentParentage { .. }));
        assert!(ctx.skip_orgs.contains("intro"));
    }

    #[test]
    fn test_build_forest_skips_legacy_placeholder() {
        let records = vec![raw("A", 13, vec![]), raw("500", 6, vec![link("A", true, None)])];
        let mut ctx = ImportContext::new();
        let (orgs, _) = build_forest(records, &mut ctx, offset(), today()).unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].origin_id, "A");
    }

    #[test]
    fn test_transform_founding_date_sentinel() {
        let mut record = raw("1", 8, vec![]);
        record.start_time = Some("2009-01-01T00:00:00".to_string());
        let records = vec![record];
        let mut ctx = ImportContext::new();
        let (orgs, _) = build_forest(records, &mut ctx, offset(), today()).unwrap();
        assert!(orgs[0].record.get("founding_date").unwrap().is_null());
    }

    #[test]
    fn test_transform_slug_rules() {
        let mut council = raw("100", 1, vec![]);
        council.shortname = Some("Kvsto".to_string());
        let mut unit = raw("200", 14, vec![]);
        unit.shortname = Some("Yks".to_string());
        let mut ctx = ImportContext::new();
        let (orgs, _) = build_forest(vec![council, unit], &mut ctx, offset(), today()).unwrap();

        let council = orgs.iter().find(|o| o.origin_id == "100").unwrap();
        assert_eq!(council.record.get("slug").unwrap().as_text(), Some("kvsto"));
        let unit = orgs.iter().find(|o| o.origin_id == "200").unwrap();
        assert_eq!(unit.record.get("slug").unwrap().as_text(), Some("200"));
    }

    #[test]
    fn test_transform_zip_normalization() {
        let mut record = raw("1", 8, vec![]);
        record.visitaddress_street = Some("Pohjoisesplanadi 11".to_string());
        record.visitaddress_zip = Some("17".to_string());
        let mut ctx = ImportContext::new();
        let (orgs, _) = build_forest(vec![record], &mut ctx, offset(), today()).unwrap();
        let detail = &orgs[0].contact_details[0];
        assert_eq!(detail.detail_type, "address");
        assert_eq!(detail.postcode.as_deref(), Some("0170"));
    }

    #[test]
    fn test_transform_people_become_memberships() {
        let mut record = raw("1", 5, vec![]);
        record.people = vec![RawPerson {
            id: "p1".to_string(),
            first_name: "Maija".to_string(),
            last_name: "Meikäläinen".to_string(),
            role: Some("puheenjohtaja".to_string()),
            start_time: Some("2017-06-01".to_string()),
            end_time: None,
        }];
        let mut ctx = ImportContext::with_people();
        let (orgs, _) = build_forest(vec![record], &mut ctx, offset(), today()).unwrap();
        let membership = &orgs[0].memberships[0];
        assert_eq!(membership.person.name, "Maija Meikäläinen");
        assert_eq!(
            membership.start_date,
            NaiveDate::from_ymd_opt(2017, 6, 1)
        );
    }

    #[test]
    fn test_naive_modified_time_is_localized() {
        let ts = parse_source_timestamp("1", "2020-01-01T00:00:00", offset()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2020-01-01T00:00:00+02:00");
    }
}
