use bookcase::construct::{
    EntityKind, ObjectRelation, ObjectRelationPatch, Person, PersonPatch, Resource, ResourcePatch,
};
use bookcase::criteria::Criterion;
use bookcase::datatype::{ObjectRole, PersonRelation, PublishDate, Timestamp};
use bookcase::error::CatalogError;
use bookcase::library::LibraryDatabase;
use bookcase::persist::PersistenceMode;
use bookcase::sort::QueryOptions;

fn library() -> LibraryDatabase {
    LibraryDatabase::new(PersistenceMode::InMemory).expect("db")
}

#[test]
fn rating_is_validated_before_writing() {
    let db = library();
    match db.add_resource(Resource::new("Too Good").with_rating(530)) {
        Err(CatalogError::Validation { kind, property, .. }) => {
            assert_eq!(kind, EntityKind::Resource);
            assert_eq!(property, "rating");
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert_eq!(db.count_resources(None).unwrap(), 0);

    let added = db.add_resource(Resource::new("Good Enough").with_rating(300)).unwrap();
    assert_eq!(db.get_resource(&added).unwrap().rating, Some(300));
}

#[test]
fn resources_round_trip() {
    let db = library();
    let resource = Resource::new("Carrie")
        .with_title_sort("Carrie")
        .with_publisher("Doubleday")
        .with_publish_date(PublishDate::Timestamp(Timestamp::from_seconds(102_384_000)));
    let added = db.add_resource(resource).unwrap();
    assert!(!added.uuid.is_empty());
    assert_eq!(db.get_resource(&added.uuid).unwrap(), added);

    // free-form publish dates survive too
    let fuzzy = db
        .add_resource(Resource::new("Rage").with_publish_date(PublishDate::Text("circa 1977".into())))
        .unwrap();
    assert_eq!(
        db.get_resource(&fuzzy).unwrap().publish_date,
        Some(PublishDate::Text("circa 1977".into()))
    );
}

#[test]
fn supplied_uuids_are_normalized() {
    let db = library();
    let added = db.add_resource(Resource::new("Cujo").with_uuid(" CUJO ")).unwrap();
    assert_eq!(added.uuid, "cujo");
    assert_eq!(db.get_resource("CUJO").unwrap().title, "Cujo");
    assert!(matches!(
        db.add_resource(Resource::new("Cujo again").with_uuid("cujo")),
        Err(CatalogError::Duplicate { kind: EntityKind::Resource, .. })
    ));
}

#[test]
fn updates_patch_only_supplied_fields() {
    let db = library();
    let added = db.add_resource(Resource::new("Christine").with_rating(200)).unwrap();
    let patch = ResourcePatch {
        title_sort: Some("Christine (novel)".into()),
        rating: Some(None),
        ..Default::default()
    };
    let updated = db.update_resource(&added, &patch).unwrap();
    assert_eq!(updated.title, "Christine");
    assert_eq!(updated.title_sort, "Christine (novel)");
    assert_eq!(updated.rating, None);
    assert_eq!(updated.add_date, added.add_date);
    assert!(updated.last_modify_date > added.last_modify_date);

    let again = db.update_resource(&added, &ResourcePatch::default()).unwrap();
    assert!(again.last_modify_date > updated.last_modify_date);
}

#[test]
fn missing_rows_are_not_found() {
    let db = library();
    assert!(matches!(
        db.get_resource("nowhere"),
        Err(CatalogError::NotFound { kind: EntityKind::Resource, .. })
    ));
    assert!(matches!(
        db.update_person("nobody", &PersonPatch::default()),
        Err(CatalogError::NotFound { kind: EntityKind::Person, .. })
    ));
    assert!(db.remove_resource("nowhere").is_err());
    assert!(db.get_object_relation(42).is_err());
}

#[test]
fn persons_and_their_relations() {
    let db = library();
    let book = db.add_resource(Resource::new("The Talisman")).unwrap();
    let king = db.add_person(Person::new("Stephen King", "King, Stephen")).unwrap();
    let straub = db.add_person(Person::new("Peter Straub", "Straub, Peter")).unwrap();
    db.add_person_relation(&book, &king, PersonRelation::Author).unwrap();
    db.add_person_relation(&book, &straub, PersonRelation::Author).unwrap();
    db.add_person_relation(&book, &straub, PersonRelation::Editor).unwrap();
    assert!(matches!(
        db.add_person_relation(&book, &king, PersonRelation::Author),
        Err(CatalogError::Duplicate { kind: EntityKind::PersonRelation, .. })
    ));
    assert!(matches!(
        db.add_person_relation(&book, "ghost", PersonRelation::Author),
        Err(CatalogError::NotFound { kind: EntityKind::Person, .. })
    ));

    let related = db.related_persons(&book, None, &QueryOptions::default()).unwrap();
    let names: Vec<_> = related.iter().map(|r| r.person.name.as_str()).collect();
    assert_eq!(names, ["Stephen King", "Peter Straub", "Peter Straub"]);

    let editors = db
        .related_persons(&book, Some(&Criterion::equal("relation", "editor")), &QueryOptions::default())
        .unwrap();
    assert_eq!(editors.len(), 1);
    assert_eq!(editors[0].relation, PersonRelation::Editor);

    let removed = db
        .remove_person_relations(&book, Some(straub.uuid.as_str()), None)
        .unwrap();
    assert_eq!(removed, 2);

    // relations cascade with their endpoints
    db.remove_person(&king).unwrap();
    assert!(db.related_persons(&book, None, &QueryOptions::default()).unwrap().is_empty());
}

#[test]
fn object_relations_are_addressed_by_id() {
    let db = library();
    let book = db.add_resource(Resource::new("Misery")).unwrap();
    let epub = db
        .add_object_relation(&book, ObjectRelation::new("", ObjectRole::Format, "epub"))
        .unwrap();
    let cover = db
        .add_object_relation(&book, ObjectRelation::new("", ObjectRole::Cover, "front"))
        .unwrap();
    assert_ne!(epub.id, cover.id);
    assert_eq!(epub.resource_uuid, book.uuid);

    let patch = ObjectRelationPatch {
        tag: Some("pdf".into()),
        ..Default::default()
    };
    assert_eq!(db.update_object_relation(epub.id, &patch).unwrap().tag, "pdf");

    let formats = db
        .related_objects(&book, Some(&Criterion::equal("role", "format")), &QueryOptions::default())
        .unwrap();
    assert_eq!(formats.len(), 1);
    assert_eq!(db.count_object_relations(Some(&Criterion::equal("resource", book.uuid.as_str()))).unwrap(), 2);

    assert_eq!(db.remove_object_relations(&book, None, Some(ObjectRole::Cover), None).unwrap(), 1);
    db.remove_resource(&book).unwrap();
    assert!(db.get_object_relation(epub.id).is_err());
}
