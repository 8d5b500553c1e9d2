use bookcase::config::TemplateSettings;
use bookcase::construct::{Group, ObjectRelation, Person, Resource, SERIES_TYPE_UUID};
use bookcase::datatype::{ObjectRole, PersonRelation, PublishDate, Timestamp};
use bookcase::formatter::{Evaluator, FunctionResult, Value};
use bookcase::library::LibraryDatabase;
use bookcase::persist::PersistenceMode;
use bookcase::resolver::ResourceResolver;

#[test]
fn builds_paths_from_stored_metadata() {
    let db = LibraryDatabase::new(PersistenceMode::InMemory).expect("db");
    let series = db.get_group_type(SERIES_TYPE_UUID).unwrap();
    let book = db
        .add_resource(
            Resource::new("Wizard and Glass")
                .with_rating(500)
                .with_publish_date(PublishDate::Timestamp(Timestamp::from_seconds(878_428_800))),
        )
        .unwrap();
    let king = db.add_person(Person::new("Stephen King", "King, Stephen")).unwrap();
    let tower = db.add_group(Group::new("The Dark Tower", &series)).unwrap();
    db.add_person_relation(&book, &king, PersonRelation::Author).unwrap();
    db.add_group_relation(&book, &tower, Some(4), None).unwrap();
    db.add_object_relation(&book, ObjectRelation::new("", ObjectRole::Format, "epub"))
        .unwrap();

    let amalgamated = db.get_amalgamated_resource(&book).unwrap();
    let evaluator = Evaluator::new(ResourceResolver::new(&amalgamated), true);
    assert_eq!(
        evaluator
            .process("{authors#0}/{?series}/{?series_index|pad_left(2, '0')} - {title}.{formats#0}")
            .unwrap(),
        "Stephen King/The Dark Tower/04 - Wizard and Glass.epub"
    );
    assert_eq!(
        evaluator.process("{publish_date|format_date('YYYY')} {rating} stars").unwrap(),
        "1997 5 stars"
    );
    assert_eq!(evaluator.process("{?translators|wrap(' (tr. @)')}").unwrap(), "");
}

#[test]
fn registered_functions_and_settings_apply() {
    let db = LibraryDatabase::new(PersistenceMode::InMemory).expect("db");
    let book = db.add_resource(Resource::new("Four Past Midnight")).unwrap();
    for (name, sort) in [("Stephen King", "King, Stephen"), ("Richard Bachman", "Bachman, Richard")] {
        let person = db.add_person(Person::new(name, sort)).unwrap();
        db.add_person_relation(&book, &person, PersonRelation::Author).unwrap();
    }
    let amalgamated = db.get_amalgamated_resource(&book).unwrap();

    let settings = TemplateSettings {
        list_separator: " and ".into(),
        ..Default::default()
    };
    let mut evaluator = Evaluator::with_settings(ResourceResolver::new(&amalgamated), &settings);
    evaluator.add_func_resolver("initials", |head: Option<&Value>, _: &[Value]| -> FunctionResult {
        let text = head.map(|v| v.to_string()).unwrap_or_default();
        Ok(text.split_whitespace().filter_map(|w| w.chars().next()).collect::<String>().into())
    });
    evaluator.add_var_resolver(|name: &str, _: Option<&str>| (name == "shelf").then(|| Value::from("B2")));

    assert_eq!(
        evaluator.process("{authors} [{author|initials}] {shelf}").unwrap(),
        "Stephen King and Richard Bachman [SK] B2"
    );
    // unknown names render empty unless strict
    assert_eq!(evaluator.process("{isbn}").unwrap(), "");
}
