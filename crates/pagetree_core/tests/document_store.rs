use pagetree_core::db::open_db_in_memory;
use pagetree_core::{
    DocumentError, DocumentPatch, DocumentService, OwnerId, SqliteDocumentRepository,
    DEFAULT_TITLE,
};
use uuid::Uuid;

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

fn alice() -> OwnerId {
    OwnerId::from("alice")
}

fn bob() -> OwnerId {
    OwnerId::from("bob")
}

#[test]
fn create_root_document_uses_defaults() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());

    let document = service.create(&alice(), None).unwrap();
    assert_eq!(document.title, DEFAULT_TITLE);
    assert_eq!(document.owner_id, alice());
    assert_eq!(document.parent_id, None);
    assert!(!document.is_archived);
    assert!(!document.is_published);
    assert!(document.content.is_none());
    assert_eq!(document.created_at, document.updated_at);

    let loaded = service.get(document.id, &alice()).unwrap();
    assert_eq!(loaded, document);
}

#[test]
fn create_rejects_blank_caller() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());

    let err = service.create(&OwnerId::from("   "), None).unwrap_err();
    assert!(matches!(err, DocumentError::InvalidCaller));
}

#[test]
fn create_rejects_missing_or_foreign_parent() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let foreign = service.create(&bob(), None).unwrap();

    let missing = Uuid::new_v4();
    let err = service.create(&alice(), Some(missing)).unwrap_err();
    assert!(matches!(err, DocumentError::InvalidParent(id) if id == missing));

    let err = service.create(&alice(), Some(foreign.id)).unwrap_err();
    assert!(matches!(err, DocumentError::InvalidParent(id) if id == foreign.id));
}

#[test]
fn update_applies_partial_patch_and_bumps_updated_at() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let document = service.create(&alice(), None).unwrap();

    let titled = service
        .update(document.id, &alice(), &DocumentPatch::title("Plans"))
        .unwrap();
    assert_eq!(titled.title, "Plans");
    assert!(titled.updated_at > document.updated_at);

    let patch = DocumentPatch::content(Some("# Plans".to_string())).with_icon(Some("📝".into()));
    let edited = service.update(document.id, &alice(), &patch).unwrap();
    assert_eq!(edited.title, "Plans");
    assert_eq!(edited.content.as_deref(), Some("# Plans"));
    assert_eq!(edited.icon.as_deref(), Some("📝"));

    let cleared = service
        .update(
            document.id,
            &alice(),
            &DocumentPatch::default().with_icon(None),
        )
        .unwrap();
    assert!(cleared.icon.is_none());
    assert_eq!(cleared.content.as_deref(), Some("# Plans"));

    assert_eq!(service.get(document.id, &alice()).unwrap(), cleared);
}

#[test]
fn strangers_cannot_read_private_or_mutate_any_document() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let document = service.create(&alice(), None).unwrap();

    let err = service.get(document.id, &bob()).unwrap_err();
    assert!(matches!(err, DocumentError::NotFound(_)));

    let err = service
        .update(document.id, &bob(), &DocumentPatch::title("mine"))
        .unwrap_err();
    assert!(matches!(err, DocumentError::Forbidden(_)));

    service.publish(document.id, &alice(), true).unwrap();
    let visible = service.get(document.id, &bob()).unwrap();
    assert!(visible.is_published);

    let err = service.publish(document.id, &bob(), false).unwrap_err();
    assert!(matches!(err, DocumentError::Forbidden(_)));
}

#[test]
fn publish_does_not_cascade_to_children() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let parent = service.create(&alice(), None).unwrap();
    let child = service.create(&alice(), Some(parent.id)).unwrap();

    service.publish(parent.id, &alice(), true).unwrap();

    assert!(service.get(parent.id, &bob()).is_ok());
    assert!(matches!(
        service.get(child.id, &bob()).unwrap_err(),
        DocumentError::NotFound(_)
    ));
}

#[test]
fn move_reparents_and_reports_previous_parent() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let first = service.create(&alice(), None).unwrap();
    let second = service.create(&alice(), None).unwrap();
    let child = service.create(&alice(), Some(first.id)).unwrap();

    let outcome = service
        .move_document(child.id, &alice(), Some(second.id))
        .unwrap();
    assert_eq!(outcome.previous_parent, Some(first.id));
    assert_eq!(outcome.document.parent_id, Some(second.id));

    let outcome = service.move_document(child.id, &alice(), None).unwrap();
    assert_eq!(outcome.previous_parent, Some(second.id));
    assert_eq!(service.get(child.id, &alice()).unwrap().parent_id, None);
}

#[test]
fn move_rejects_cycles() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let root = service.create(&alice(), None).unwrap();
    let child = service.create(&alice(), Some(root.id)).unwrap();
    let grandchild = service.create(&alice(), Some(child.id)).unwrap();

    let err = service
        .move_document(root.id, &alice(), Some(grandchild.id))
        .unwrap_err();
    assert!(matches!(
        err,
        DocumentError::CycleDetected { document, parent }
            if document == root.id && parent == grandchild.id
    ));

    let err = service
        .move_document(root.id, &alice(), Some(root.id))
        .unwrap_err();
    assert!(matches!(err, DocumentError::CycleDetected { .. }));

    assert_eq!(service.get(root.id, &alice()).unwrap().parent_id, None);
}

#[test]
fn move_rejects_foreign_parent() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let document = service.create(&alice(), None).unwrap();
    let foreign = service.create(&bob(), None).unwrap();

    let err = service
        .move_document(document.id, &alice(), Some(foreign.id))
        .unwrap_err();
    assert!(matches!(err, DocumentError::InvalidParent(id) if id == foreign.id));
}

#[test]
fn unknown_document_is_not_found() {
    let conn = setup();
    let service = DocumentService::new(SqliteDocumentRepository::try_new(&conn).unwrap());
    let missing = Uuid::new_v4();

    assert!(matches!(
        service.get(missing, &alice()).unwrap_err(),
        DocumentError::NotFound(id) if id == missing
    ));
    assert!(matches!(
        service
            .update(missing, &alice(), &DocumentPatch::title("x"))
            .unwrap_err(),
        DocumentError::NotFound(_)
    ));
}
