//! Exposes an amalgamated resource to templates.
//!
//! List variables (`authors`, `tags`, ...) take an index specifier, so
//! `{authors#1}` is the second author. `{rating}` is in stars; `{rating#raw}`
//! is the stored value.

use crate::construct::{
    AmalgamatedResource, CATEGORY_TYPE_UUID, LANGUAGE_TYPE_UUID, SERIES_TYPE_UUID, TAG_TYPE_UUID,
};
use crate::datatype::{ObjectRole, PersonRelation};
use crate::formatter::{Value, VarResolver};

pub struct ResourceResolver<'a> {
    amalgamated: &'a AmalgamatedResource,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(amalgamated: &'a AmalgamatedResource) -> Self {
        Self { amalgamated }
    }

    fn persons(&self, relation: PersonRelation) -> Vec<String> {
        self.amalgamated.persons_with(relation).map(|p| p.name.clone()).collect()
    }

    fn groups(&self, type_uuid: &str) -> Vec<String> {
        self.amalgamated.groups_of(type_uuid).map(|g| g.group.title.clone()).collect()
    }

    fn formats(&self) -> Vec<String> {
        self.amalgamated
            .objects
            .iter()
            .filter(|o| o.role == ObjectRole::Format)
            .map(|o| o.tag.clone())
            .collect()
    }
}

/// Known variables without a value resolve to empty text, not null.
fn known<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or_else(|| Value::from(""))
}

fn list(items: Vec<String>, specifier: Option<&str>) -> Option<Value> {
    match specifier {
        None => Some(Value::from(items)),
        Some(index) => {
            let index = index.parse::<usize>().ok()?;
            Some(known(items.into_iter().nth(index)))
        }
    }
}

impl VarResolver for ResourceResolver<'_> {
    fn resolve(&self, name: &str, specifier: Option<&str>) -> Option<Value> {
        let resource = &self.amalgamated.resource;
        let value: Value = match name {
            "title" => resource.title.as_str().into(),
            "titlesort" => resource.title_sort.as_str().into(),
            "uuid" => resource.uuid.as_str().into(),
            "publisher" => resource.publisher.as_str().into(),
            "desc" => resource.desc.as_str().into(),
            "rating" => match (resource.rating, specifier) {
                (Some(raw), Some("raw")) => Value::from(raw),
                (Some(raw), _) => Value::Number(raw as f64 / 100.0),
                (None, _) => known(None::<i64>),
            },
            "publish_date" => known(resource.publish_date.clone()),
            "add_date" => resource.add_date.into(),
            "last_modify_date" => resource.last_modify_date.into(),
            "authors" => return list(self.persons(PersonRelation::Author), specifier),
            "editors" => return list(self.persons(PersonRelation::Editor), specifier),
            "translators" => return list(self.persons(PersonRelation::Translator), specifier),
            "author" => known(self.persons(PersonRelation::Author).into_iter().next()),
            "tags" => return list(self.groups(TAG_TYPE_UUID), specifier),
            "categories" => return list(self.groups(CATEGORY_TYPE_UUID), specifier),
            "languages" => return list(self.groups(LANGUAGE_TYPE_UUID), specifier),
            "series" => known(self.groups(SERIES_TYPE_UUID).into_iter().next()),
            "series_index" => known(
                self.amalgamated
                    .groups_of(SERIES_TYPE_UUID)
                    .next()
                    .and_then(|g| g.group_index),
            ),
            "formats" => return list(self.formats(), specifier),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{known_group_types, Group, Person, RelatedGroup, RelatedPerson, Resource};
    use crate::formatter::Evaluator;

    fn sample() -> AmalgamatedResource {
        let series = known_group_types().remove(1);
        AmalgamatedResource {
            resource: Resource::new("The Talisman").with_rating(450),
            persons: vec![
                RelatedPerson {
                    person: Person::new("Stephen King", "King, Stephen"),
                    relation: PersonRelation::Author,
                },
                RelatedPerson {
                    person: Person::new("Peter Straub", "Straub, Peter"),
                    relation: PersonRelation::Author,
                },
            ],
            groups: vec![RelatedGroup {
                group: Group::new("The Talisman", &series),
                group_index: Some(1),
                relation_tag: String::new(),
            }],
            objects: vec![],
        }
    }

    #[test]
    fn resolves_resource_variables() {
        let amalgamated = sample();
        let evaluator = Evaluator::new(ResourceResolver::new(&amalgamated), true);
        assert_eq!(
            evaluator.process("{author}/{?series}{?series_index|pad_left(2, '0')} {title}").unwrap(),
            "Stephen King/The Talisman01 The Talisman"
        );
        assert_eq!(evaluator.process("{authors#1}|{rating}|{rating#raw}").unwrap(), "Peter Straub|4.5|450");
        assert_eq!(evaluator.process("{?tags|wrap('[@]')}{formats#0}").unwrap(), "");
    }

    #[test]
    fn absent_values_are_empty_in_strict_mode() {
        let mut amalgamated = sample();
        amalgamated.resource.rating = None;
        amalgamated.groups.clear();
        amalgamated.persons.clear();
        let evaluator = Evaluator::new(ResourceResolver::new(&amalgamated), true);
        assert_eq!(
            evaluator.process("[{author}|{series}|{?series_index|wrap('#@')}|{rating}|{authors#3}]").unwrap(),
            "[||||]"
        );
    }

    #[test]
    fn unknown_names_fall_through() {
        let amalgamated = sample();
        let resolver = ResourceResolver::new(&amalgamated);
        assert_eq!(resolver.resolve("isbn", None), None);
        assert_eq!(resolver.resolve("authors", Some("x")), None);
    }
}
