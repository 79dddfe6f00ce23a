//! End-to-end decision-document import tests over the in-memory store.

use chrono::DateTime;

use paatos_db::{Entity, EntityKind, FieldValue, MemoryStore, Store};
use paatos_import::helsinki::{
    ActionData, AttachmentData, AttendeeData, Document, DocumentImporter, DocumentInfo,
    DocumentStatus, EventDoc,
};

async fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    let ds = store
        .get_or_create_data_source("helsinki", "Helsinki")
        .await
        .unwrap();

    let mut org = Entity::new(EntityKind::Organization, ds.id, "policymaker-1");
    org.set_raw("name", FieldValue::Text("Kaupunginhallitus".into()));
    store.save(&mut org).await.unwrap();

    let mut post = Entity::new(EntityKind::Post, ds.id, "post-1");
    post.set_raw("label", FieldValue::Text("Pormestari".into()));
    post.set_raw("organization", FieldValue::Relation(org.id.unwrap()));
    store.save(&mut post).await.unwrap();

    store
}

fn minutes(origin_id: &str, policymaker_id: &str, version: i64) -> DocumentInfo {
    DocumentInfo {
        origin_id: origin_id.to_string(),
        doc_type: "minutes".to_string(),
        policymaker_id: policymaker_id.to_string(),
        path: format!("/docs/{origin_id}.zip"),
        version,
    }
}

fn attendee(name: &str, role: &str) -> AttendeeData {
    AttendeeData {
        name: name.to_string(),
        title: None,
        role: Some(role.to_string()),
    }
}

fn sample_document(attendees: Vec<AttendeeData>) -> Document {
    Document {
        event: EventDoc {
            name: "Kaupunginhallituksen kokous".to_string(),
            start_date: Some(DateTime::parse_from_rfc3339("2020-03-02T16:00:00+02:00").unwrap()),
            end_date: Some(DateTime::parse_from_rfc3339("2020-03-02T18:30:00+02:00").unwrap()),
            attendees,
            actions: vec![ActionData {
                register_id: Some("HEL 2020-001234".to_string()),
                function_id: Some("02 05".to_string()),
                function_name: Some("Aluesuunnittelu".to_string()),
                title: "Asemakaavan muutos".to_string(),
                resolution: Some("Hyväksyttiin".to_string()),
                article_number: Some("45".to_string()),
                content: Some("<p>Päätös</p>".to_string()),
                attachments: vec![
                    AttachmentData {
                        id: Some("att-1".to_string()),
                        name: Some("Kaavakartta".to_string()),
                        public: true,
                        ordering: 1,
                        confidentiality_reason: None,
                    },
                    AttachmentData {
                        id: Some("att-2".to_string()),
                        name: Some("Vuorovaikutusraportti".to_string()),
                        public: false,
                        ordering: 2,
                        confidentiality_reason: Some("JulkL 24 §".to_string()),
                    },
                ],
            }],
        },
    }
}

#[tokio::test]
async fn test_document_import_creates_full_graph() {
    let store = seeded_store().await;
    let mut importer = DocumentImporter::open(store).await.unwrap();

    let info = minutes("doc-1", "policymaker-1", 1);
    let doc = sample_document(vec![
        attendee("Maija Meikäläinen", "puheenjohtaja"),
        attendee("Matti Virtanen", "jäsen"),
    ]);
    let status = importer.import_document(&info, &doc).await.unwrap();
    assert_eq!(status, DocumentStatus::Imported);

    let mut store = importer.into_store();
    let ds = store
        .get_or_create_data_source("helsinki", "Helsinki")
        .await
        .unwrap();

    let event = store
        .find_by_origin_id(ds.id, EntityKind::Event, "doc-1")
        .await
        .unwrap()
        .unwrap();
    let org = store
        .find_by_origin_id(ds.id, EntityKind::Organization, "policymaker-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.get("organization"), FieldValue::Relation(org.id.unwrap()));
    assert!(event.get("post").is_null());

    assert_eq!(store.count(EntityKind::Person), 2);
    assert_eq!(store.count(EntityKind::EventAttendee), 2);

    let action = store
        .find_by_origin_id(ds.id, EntityKind::Action, "doc-1:0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(action.get("title"), FieldValue::Text("Asemakaavan muutos".into()));
    assert_eq!(action.get("ordering"), FieldValue::Integer(0));

    let case = store
        .find_by_origin_id(ds.id, EntityKind::Case, "HEL 2020-001234")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(action.get("case"), FieldValue::Relation(case.id.unwrap()));

    let function = store
        .find_by_origin_id(ds.id, EntityKind::Function, "02 05")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(case.get("function"), FieldValue::Relation(function.id.unwrap()));

    let content = store
        .find_by_origin_id(ds.id, EntityKind::Content, "doc-1:0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.get("type"), FieldValue::Text("decision".into()));

    // Every attachment is imported, not just the first.
    assert_eq!(store.count(EntityKind::Attachment), 2);

    let imported_file = store
        .find_by_origin_id(ds.id, EntityKind::ImportedFile, "/docs/doc-1.zip")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(imported_file.get("imported_version"), FieldValue::Integer(1));
}

#[tokio::test]
async fn test_same_version_is_not_reimported() {
    let store = seeded_store().await;
    let mut importer = DocumentImporter::open(store).await.unwrap();

    let info = minutes("doc-1", "policymaker-1", 3);
    let doc = sample_document(vec![attendee("Maija Meikäläinen", "puheenjohtaja")]);

    let first = importer.import_document(&info, &doc).await.unwrap();
    assert_eq!(first, DocumentStatus::Imported);
    let second = importer.import_document(&info, &doc).await.unwrap();
    assert_eq!(second, DocumentStatus::AlreadyImported);
}

#[tokio::test]
async fn test_new_version_drops_stale_attendees() {
    let store = seeded_store().await;
    let mut importer = DocumentImporter::open(store).await.unwrap();

    let doc = sample_document(vec![
        attendee("Maija Meikäläinen", "puheenjohtaja"),
        attendee("Matti Virtanen", "jäsen"),
    ]);
    importer
        .import_document(&minutes("doc-1", "policymaker-1", 1), &doc)
        .await
        .unwrap();

    let revised = sample_document(vec![attendee("Maija Meikäläinen", "puheenjohtaja")]);
    importer
        .import_document(&minutes("doc-1", "policymaker-1", 2), &revised)
        .await
        .unwrap();

    let store = importer.into_store();
    assert_eq!(store.count(EntityKind::EventAttendee), 1);
    // Persons are never garbage-collected by the document importer.
    assert_eq!(store.count(EntityKind::Person), 2);
}

#[tokio::test]
async fn test_agenda_documents_are_skipped() {
    let store = seeded_store().await;
    let mut importer = DocumentImporter::open(store).await.unwrap();

    let mut info = minutes("doc-1", "policymaker-1", 1);
    info.doc_type = "agenda".to_string();
    let doc = sample_document(vec![]);

    let status = importer.import_document(&info, &doc).await.unwrap();
    assert_eq!(status, DocumentStatus::SkippedDocType);

    let store = importer.into_store();
    assert_eq!(store.count(EntityKind::Event), 0);
}

#[tokio::test]
async fn test_post_policymaker_resolves_to_owning_organization() {
    let store = seeded_store().await;
    let mut importer = DocumentImporter::open(store).await.unwrap();

    let info = minutes("doc-2", "post-1", 1);
    let doc = sample_document(vec![]);
    importer.import_document(&info, &doc).await.unwrap();

    let mut store = importer.into_store();
    let ds = store
        .get_or_create_data_source("helsinki", "Helsinki")
        .await
        .unwrap();

    let event = store
        .find_by_origin_id(ds.id, EntityKind::Event, "doc-2")
        .await
        .unwrap()
        .unwrap();
    let org = store
        .find_by_origin_id(ds.id, EntityKind::Organization, "policymaker-1")
        .await
        .unwrap()
        .unwrap();
    let post = store
        .find_by_origin_id(ds.id, EntityKind::Post, "post-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.get("post"), FieldValue::Relation(post.id.unwrap()));
    assert_eq!(event.get("organization"), FieldValue::Relation(org.id.unwrap()));

    // The action inherits the event's post.
    let action = store
        .find_by_origin_id(ds.id, EntityKind::Action, "doc-2:0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(action.get("post"), FieldValue::Relation(post.id.unwrap()));
}

#[tokio::test]
async fn test_unknown_policymaker_imports_with_warning() {
    let store = seeded_store().await;
    let mut importer = DocumentImporter::open(store).await.unwrap();

    let info = minutes("doc-3", "nobody", 1);
    let doc = sample_document(vec![]);
    let status = importer.import_document(&info, &doc).await.unwrap();
    assert_eq!(status, DocumentStatus::Imported);

    let mut store = importer.into_store();
    let ds = store
        .get_or_create_data_source("helsinki", "Helsinki")
        .await
        .unwrap();
    let event = store
        .find_by_origin_id(ds.id, EntityKind::Event, "doc-3")
        .await
        .unwrap()
        .unwrap();
    assert!(event.get("organization").is_null());
    assert!(event.get("post").is_null());
}

#[tokio::test]
async fn test_reimport_with_fewer_actions_deletes_stale_ones() {
    let store = seeded_store().await;
    let mut importer = DocumentImporter::open(store).await.unwrap();

    let mut doc = sample_document(vec![]);
    let mut second_action = doc.event.actions[0].clone();
    second_action.register_id = None;
    second_action.title = "Ilmoitusasiat".to_string();
    second_action.attachments.clear();
    doc.event.actions.push(second_action);

    importer
        .import_document(&minutes("doc-1", "policymaker-1", 1), &doc)
        .await
        .unwrap();
    let count_before = {
        let store = importer.into_store();
        let count = store.count(EntityKind::Action);
        importer = DocumentImporter::open(store).await.unwrap();
        count
    };
    assert_eq!(count_before, 2);

    doc.event.actions.truncate(1);
    importer
        .import_document(&minutes("doc-1", "policymaker-1", 2), &doc)
        .await
        .unwrap();

    let store = importer.into_store();
    assert_eq!(store.count(EntityKind::Action), 1);
    // The stale action's content went with it.
    assert_eq!(store.count(EntityKind::Content), 1);
}
