use bookcase::construct::{
    EntityKind, Group, GroupPatch, GroupType, GroupTypePatch, Resource, SERIES_TYPE_UUID, TAG_TYPE_UUID,
};
use bookcase::error::CatalogError;
use bookcase::library::LibraryDatabase;
use bookcase::persist::PersistenceMode;
use bookcase::sort::QueryOptions;
use rusqlite::types::Value as SqlValue;

fn library() -> LibraryDatabase {
    LibraryDatabase::new(PersistenceMode::InMemory).expect("db")
}

#[test]
fn well_known_group_types_are_seeded() {
    let db = library();
    let names: Vec<_> = db.group_types().unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(names, ["Category", "Language", "Series", "Tag"]);
    let series = db.get_group_type_by_name("series").unwrap();
    assert_eq!(series.uuid, SERIES_TYPE_UUID);
    assert!(series.exclusive && series.ordered);
}

#[test]
fn exclusive_types_allow_one_group_per_resource() {
    let db = library();
    let series = db.get_group_type(SERIES_TYPE_UUID).unwrap();
    let book = db.add_resource(Resource::new("The Drawing of the Three")).unwrap();
    let dark_tower = db.add_group(Group::new("The Dark Tower", &series)).unwrap();
    let other = db.add_group(Group::new("Bachman Books", &series)).unwrap();

    db.add_group_relation(&book, &dark_tower, Some(2), None).unwrap();
    match db.add_group_relation(&book, &other, Some(1), None) {
        Err(CatalogError::Integrity { kind, .. }) => assert_eq!(kind, EntityKind::GroupRelation),
        other => panic!("expected an integrity error, got {:?}", other),
    }
    let related = db.related_groups(&book, None, &QueryOptions::default()).unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].group.uuid, dark_tower.uuid);
    assert_eq!(related[0].group_index, Some(2));
}

#[test]
fn indexes_need_an_ordered_type() {
    let db = library();
    let tag = db.get_group_type(TAG_TYPE_UUID).unwrap();
    let book = db.add_resource(Resource::new("Cycle of the Werewolf")).unwrap();
    let horror = db.add_group(Group::new("horror", &tag)).unwrap();
    for index in [0, 1, 99] {
        assert!(matches!(
            db.add_group_relation(&book, &horror, Some(index), None),
            Err(CatalogError::Validation { kind: EntityKind::GroupRelation, .. })
        ));
    }
    db.add_group_relation(&book, &horror, None, None).unwrap();
    assert!(matches!(
        db.add_group_relation(&book, &horror, None, None),
        Err(CatalogError::Duplicate { .. })
    ));
    // a different relation tag is a different relation
    db.add_group_relation(&book, &horror, None, Some("primary")).unwrap();
    assert_eq!(db.related_groups(&book, None, &QueryOptions::default()).unwrap().len(), 2);
}

#[test]
fn negative_indexes_are_rejected() {
    let db = library();
    let series = db.get_group_type(SERIES_TYPE_UUID).unwrap();
    let book = db.add_resource(Resource::new("The Gunslinger")).unwrap();
    let group = db.add_group(Group::new("The Dark Tower", &series)).unwrap();
    assert!(matches!(
        db.add_group_relation(&book, &group, Some(-1), None),
        Err(CatalogError::Validation { .. })
    ));
    assert!(db.related_groups(&book, None, &QueryOptions::default()).unwrap().is_empty());
}

#[test]
fn group_type_rules() {
    let db = library();
    let shelf = db.add_group_type(GroupType::new("Shelf", false, false)).unwrap();
    assert!(matches!(
        db.add_group_type(GroupType::new("shelf", true, true)),
        Err(CatalogError::Duplicate { kind: EntityKind::GroupType, .. })
    ));
    assert!(matches!(
        db.remove_group_type(TAG_TYPE_UUID),
        Err(CatalogError::Integrity { kind: EntityKind::GroupType, .. })
    ));

    let book = db.add_resource(Resource::new("Night Shift")).unwrap();
    let top = db.add_group(Group::new("Top", &shelf)).unwrap();
    let bottom = db.add_group(Group::new("Bottom", &shelf)).unwrap();
    db.add_group_relation(&book, &top, None, None).unwrap();
    db.add_group_relation(&book, &bottom, None, None).unwrap();

    let exclusive = GroupTypePatch {
        exclusive: Some(true),
        ..Default::default()
    };
    assert!(matches!(
        db.update_group_type(&shelf, &exclusive),
        Err(CatalogError::Integrity { .. })
    ));
    assert!(matches!(db.remove_group_type(&shelf), Err(CatalogError::Integrity { .. })));

    db.remove_group(&top).unwrap();
    let updated = db.update_group_type(&shelf, &exclusive).unwrap();
    assert!(updated.exclusive);
    assert!(db.get_group(&bottom).unwrap().group_type.exclusive);

    // moving the last group away frees the type
    let tag = db.get_group_type(TAG_TYPE_UUID).unwrap();
    let moved = db.update_group(&bottom, &GroupPatch::default().group_type(&tag)).unwrap();
    assert_eq!(moved.group_type.uuid, TAG_TYPE_UUID);
    db.remove_group_type(&shelf).unwrap();
    assert!(db.get_group_type_by_name("Shelf").is_err());
}

#[test]
fn unordering_a_type_with_indexes_is_refused() {
    let db = library();
    let volumes = db.add_group_type(GroupType::new("Volumes", false, true)).unwrap();
    let book = db.add_resource(Resource::new("The Stand")).unwrap();
    let set = db.add_group(Group::new("Collected", &volumes)).unwrap();
    db.add_group_relation(&book, &set, Some(3), None).unwrap();
    let unordered = GroupTypePatch {
        ordered: Some(false),
        ..Default::default()
    };
    assert!(matches!(
        db.update_group_type(&volumes, &unordered),
        Err(CatalogError::Integrity { .. })
    ));
    assert_eq!(db.remove_group_relations(&book, None, Some(volumes.uuid.as_str()), None).unwrap(), 1);
    assert!(!db.update_group_type(&volumes, &unordered).unwrap().ordered);
}

#[test]
fn moving_a_group_keeps_type_rules() {
    let db = library();
    let series = db.get_group_type(SERIES_TYPE_UUID).unwrap();
    let tag = db.get_group_type(TAG_TYPE_UUID).unwrap();
    let book = db.add_resource(Resource::new("Song of Susannah")).unwrap();
    let dark_tower = db.add_group(Group::new("The Dark Tower", &series)).unwrap();
    let fantasy = db.add_group(Group::new("fantasy", &tag)).unwrap();
    db.add_group_relation(&book, &dark_tower, Some(6), None).unwrap();
    db.add_group_relation(&book, &fantasy, None, None).unwrap();

    // the book would end up in two series
    assert!(matches!(
        db.update_group(&fantasy, &GroupPatch::default().group_type(&series)),
        Err(CatalogError::Integrity { kind: EntityKind::Group, .. })
    ));
    // index 6 has no meaning for tags
    assert!(matches!(
        db.update_group(&dark_tower, &GroupPatch::default().group_type(&tag)),
        Err(CatalogError::Integrity { kind: EntityKind::Group, .. })
    ));
    let series_relations = db
        .related_groups(&book, None, &QueryOptions::default())
        .unwrap()
        .into_iter()
        .filter(|g| g.group.group_type.uuid == SERIES_TYPE_UUID)
        .count();
    assert_eq!(series_relations, 1);
    assert_eq!(db.get_group(&fantasy).unwrap().group_type.uuid, TAG_TYPE_UUID);

    // the table refuses the same move when the checks are bypassed
    {
        let persistor = db.persistor();
        let store = persistor.lock().unwrap();
        let moved = store.execute(
            EntityKind::Group,
            "update groups set type_uuid = ? where uuid = ?",
            &[SqlValue::Text(SERIES_TYPE_UUID.into()), SqlValue::Text(fantasy.uuid.clone())],
        );
        assert!(matches!(moved, Err(CatalogError::Integrity { kind: EntityKind::Group, .. })));
    }

    db.remove_group_relations(&book, Some(fantasy.uuid.as_str()), None, None).unwrap();
    let moved = db.update_group(&fantasy, &GroupPatch::default().group_type(&series)).unwrap();
    assert!(moved.group_type.exclusive);
}

#[test]
fn exclusive_types_hold_without_the_fast_path() {
    let db = library();
    let series = db.get_group_type(SERIES_TYPE_UUID).unwrap();
    let book = db.add_resource(Resource::new("The Waste Lands")).unwrap();
    let dark_tower = db.add_group(Group::new("The Dark Tower", &series)).unwrap();
    let other = db.add_group(Group::new("Mid-World", &series)).unwrap();
    db.add_group_relation(&book, &dark_tower, Some(3), None).unwrap();

    let persistor = db.persistor();
    let store = persistor.lock().unwrap();
    let inserted = store.execute(
        EntityKind::GroupRelation,
        "insert into res_groups (resource_uuid, group_uuid, group_index) values (?, ?, ?)",
        &[
            SqlValue::Text(book.uuid.clone()),
            SqlValue::Text(other.uuid.clone()),
            SqlValue::Integer(1),
        ],
    );
    assert!(matches!(
        inserted,
        Err(CatalogError::Integrity { kind: EntityKind::GroupRelation, .. })
    ));
    assert_eq!(
        store
            .count("select count(*) from res_groups where resource_uuid = ?", &[SqlValue::Text(book.uuid.clone())])
            .unwrap(),
        1
    );
}
