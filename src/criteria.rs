//! Composable predicates over entity and relation properties, compiled to SQL
//! filter expressions with positional parameters.
//!
//! A property is either a local one (`title`), a link-row one when querying
//! related entities (`relation`, `groupIndex`), or a foreign one reached through
//! an alias: `authors#nameSort` reads "among the authors of this resource, at
//! least one has this `nameSort`". A bare alias (`authors`) stands for the
//! alias' default property. A bare name that is both local and an alias is
//! local.

use rusqlite::types::Value as SqlValue;
use tracing::debug;

use crate::construct::{
    EntityKind, CATEGORY_TYPE_UUID, LANGUAGE_TYPE_UUID, SERIES_TYPE_UUID, TAG_TYPE_UUID,
};
use crate::datatype::FieldValue;
use crate::entry::{FieldKind, FieldSpec};
use crate::error::{CatalogError, Result};

// ------------- Criterion -------------
#[derive(Clone, Debug, PartialEq)]
pub enum Criterion {
    Equal(String, FieldValue),
    OneOf(String, Vec<FieldValue>),
    And(Box<Criterion>, Box<Criterion>),
    Or(Vec<Criterion>),
    /// At least one related entity of the given kind matches the inner criterion.
    HasRelationWith(EntityKind, Box<Criterion>),
}

impl Criterion {
    pub fn equal(property: &str, value: impl Into<FieldValue>) -> Self {
        Criterion::Equal(property.to_string(), value.into())
    }
    pub fn one_of<V: Into<FieldValue>>(property: &str, values: impl IntoIterator<Item = V>) -> Self {
        Criterion::OneOf(property.to_string(), values.into_iter().map(Into::into).collect())
    }
    pub fn and(self, other: Criterion) -> Self {
        Criterion::And(Box::new(self), Box::new(other))
    }
    pub fn or(terms: impl IntoIterator<Item = Criterion>) -> Self {
        Criterion::Or(terms.into_iter().collect())
    }
    pub fn has_relation_with(kind: EntityKind, inner: Criterion) -> Self {
        Criterion::HasRelationWith(kind, Box::new(inner))
    }
}

// ------------- Amalgamated view -------------
/// Columns of the `resource_summaries` view, reachable as `summary#<prop>`.
pub const SUMMARY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("uuid", "uuid", FieldKind::Uuid),
    FieldSpec::new("authors", "authors", FieldKind::Text).nullable().nocase(),
    FieldSpec::new("tags", "tags", FieldKind::Text).nullable().nocase(),
    FieldSpec::new("series", "series", FieldKind::Text).nullable().nocase(),
    // the view already turns the absent-index sentinel into null
    FieldSpec::new("seriesIndex", "series_index", FieldKind::Integer { min: 0, max: i64::MAX }).nullable(),
];

// ------------- Aliases -------------
/// How one entity reaches a set of related rows. Templates use `{o}` for the
/// outer row, `{t}` for the target row and `{x}` for the link row.
#[derive(Clone, Debug)]
pub(crate) struct AliasDef {
    pub name: &'static str,
    /// `None` for the amalgamated view.
    pub target: Option<EntityKind>,
    pub fields: &'static [FieldSpec],
    pub link: Option<EntityKind>,
    from: &'static str,
    condition: String,
    order: &'static str,
    filter_prop: &'static str,
    sort_prop: &'static str,
}

const PERSONS_OF_RESOURCE: &str = "res_persons {x} join persons {t} on {t}.uuid = {x}.person_uuid";
const GROUPS_OF_RESOURCE: &str = "res_groups {x} join groups {t} on {t}.uuid = {x}.group_uuid";
const RESOURCES_OF_PERSON: &str = "res_persons {x} join resources {t} on {t}.uuid = {x}.resource_uuid";
const RESOURCES_OF_GROUP: &str = "res_groups {x} join resources {t} on {t}.uuid = {x}.resource_uuid";

fn persons_alias(name: &'static str, relation: Option<&str>) -> AliasDef {
    let mut condition = "{x}.resource_uuid = {o}.uuid".to_string();
    if let Some(relation) = relation {
        condition.push_str(&format!(" and {{x}}.relation = '{}'", relation));
    }
    AliasDef {
        name,
        target: Some(EntityKind::Person),
        fields: EntityKind::Person.fields(),
        link: Some(EntityKind::PersonRelation),
        from: PERSONS_OF_RESOURCE,
        condition,
        order: "{x}.rowid",
        filter_prop: "name",
        sort_prop: "nameSort",
    }
}

fn groups_alias(name: &'static str, type_uuid: Option<&str>) -> AliasDef {
    let mut condition = "{x}.resource_uuid = {o}.uuid".to_string();
    if let Some(type_uuid) = type_uuid {
        condition.push_str(&format!(" and {{t}}.type_uuid = '{}'", type_uuid));
    }
    AliasDef {
        name,
        target: Some(EntityKind::Group),
        fields: EntityKind::Group.fields(),
        link: Some(EntityKind::GroupRelation),
        from: GROUPS_OF_RESOURCE,
        condition,
        order: "{x}.rowid",
        filter_prop: "title",
        sort_prop: "titleSort",
    }
}

fn objects_alias(name: &'static str, role: Option<&str>) -> AliasDef {
    let mut condition = "{t}.resource_uuid = {o}.uuid".to_string();
    if let Some(role) = role {
        condition.push_str(&format!(" and {{t}}.role = '{}'", role));
    }
    AliasDef {
        name,
        target: Some(EntityKind::ObjectRelation),
        fields: EntityKind::ObjectRelation.fields(),
        link: None,
        from: "res_objects {t}",
        condition,
        order: "{t}.id",
        filter_prop: "tag",
        sort_prop: "tag",
    }
}

fn resources_alias(from: &'static str, link: EntityKind, condition: &str) -> AliasDef {
    AliasDef {
        name: "resources",
        target: Some(EntityKind::Resource),
        fields: EntityKind::Resource.fields(),
        link: Some(link),
        from,
        condition: condition.to_string(),
        order: "{x}.rowid",
        filter_prop: "title",
        sort_prop: "titleSort",
    }
}

pub(crate) fn alias(kind: EntityKind, name: &str) -> Option<AliasDef> {
    let found = match (kind, name) {
        (EntityKind::Resource, "persons") => persons_alias("persons", None),
        (EntityKind::Resource, "authors") => persons_alias("authors", Some("author")),
        (EntityKind::Resource, "editors") => persons_alias("editors", Some("editor")),
        (EntityKind::Resource, "translators") => persons_alias("translators", Some("translator")),
        (EntityKind::Resource, "groups") => groups_alias("groups", None),
        (EntityKind::Resource, "tags") => groups_alias("tags", Some(TAG_TYPE_UUID)),
        (EntityKind::Resource, "series") => groups_alias("series", Some(SERIES_TYPE_UUID)),
        (EntityKind::Resource, "categories") => groups_alias("categories", Some(CATEGORY_TYPE_UUID)),
        (EntityKind::Resource, "languages") => groups_alias("languages", Some(LANGUAGE_TYPE_UUID)),
        (EntityKind::Resource, "objects") => objects_alias("objects", None),
        (EntityKind::Resource, "formats") => objects_alias("formats", Some("format")),
        (EntityKind::Resource, "covers") => objects_alias("covers", Some("cover")),
        (EntityKind::Resource, "summary") => AliasDef {
            name: "summary",
            target: None,
            fields: SUMMARY_FIELDS,
            link: None,
            from: "resource_summaries {t}",
            condition: "{t}.uuid = {o}.uuid".to_string(),
            order: "{t}.uuid",
            filter_prop: "authors",
            sort_prop: "authors",
        },
        (EntityKind::Person, "resources") => resources_alias(
            RESOURCES_OF_PERSON,
            EntityKind::PersonRelation,
            "{x}.person_uuid = {o}.uuid",
        ),
        (EntityKind::Group, "resources") => resources_alias(
            RESOURCES_OF_GROUP,
            EntityKind::GroupRelation,
            "{x}.group_uuid = {o}.uuid",
        ),
        (EntityKind::Group, "groupType") => AliasDef {
            name: "groupType",
            target: Some(EntityKind::GroupType),
            fields: EntityKind::GroupType.fields(),
            link: None,
            from: "group_types {t}",
            condition: "{t}.uuid = {o}.type_uuid".to_string(),
            order: "{t}.uuid",
            filter_prop: "name",
            sort_prop: "name",
        },
        (EntityKind::GroupType, "groups") => AliasDef {
            name: "groups",
            target: Some(EntityKind::Group),
            fields: EntityKind::Group.fields(),
            link: None,
            from: "groups {t}",
            condition: "{t}.type_uuid = {o}.uuid".to_string(),
            order: "{t}.uuid",
            filter_prop: "title",
            sort_prop: "titleSort",
        },
        (EntityKind::ObjectRelation, "resource") => AliasDef {
            name: "resource",
            target: Some(EntityKind::Resource),
            fields: EntityKind::Resource.fields(),
            link: None,
            from: "resources {t}",
            condition: "{t}.uuid = {o}.resource_uuid".to_string(),
            order: "{t}.uuid",
            filter_prop: "title",
            sort_prop: "titleSort",
        },
        _ => return None,
    };
    Some(found)
}

/// The alias `HasRelationWith` uses to get from `from` to `to`.
fn relation_alias(from: EntityKind, to: EntityKind) -> Result<AliasDef> {
    let name = match (from, to) {
        (EntityKind::Resource, EntityKind::Person) => "persons",
        (EntityKind::Resource, EntityKind::Group) => "groups",
        (EntityKind::Resource, EntityKind::ObjectRelation) => "objects",
        (EntityKind::Person, EntityKind::Resource) => "resources",
        (EntityKind::Group, EntityKind::Resource) => "resources",
        (EntityKind::Group, EntityKind::GroupType) => "groupType",
        (EntityKind::GroupType, EntityKind::Group) => "groups",
        (EntityKind::ObjectRelation, EntityKind::Resource) => "resource",
        _ => "",
    };
    alias(from, name).ok_or_else(|| CatalogError::Criteria(format!("no relation from {} to {}", from, to)))
}

// ------------- Scope -------------
/// The rows a criterion is evaluated against: an entity table under `alias`,
/// optionally joined with the link table that related it.
#[derive(Clone, Debug)]
pub struct Scope {
    pub kind: EntityKind,
    pub alias: String,
    pub link: Option<(EntityKind, String)>,
}

impl Scope {
    pub fn entity(kind: EntityKind) -> Self {
        Self {
            kind,
            alias: "o".into(),
            link: None,
        }
    }
    pub fn related(kind: EntityKind, link: EntityKind) -> Self {
        Self {
            kind,
            alias: "o".into(),
            link: Some((link, "l".into())),
        }
    }
}

/// Where a property name leads.
#[derive(Clone, Debug)]
pub(crate) enum Path {
    /// A column of a row in scope.
    Column {
        column: String,
        spec: &'static FieldSpec,
        kind: EntityKind,
    },
    /// A column of related rows.
    Foreign {
        from: String,
        condition: String,
        order: String,
        column: String,
        spec: &'static FieldSpec,
        kind: EntityKind,
        alias: &'static str,
    },
}

impl Path {
    pub fn spec(&self) -> &'static FieldSpec {
        match self {
            Path::Column { spec, .. } | Path::Foreign { spec, .. } => spec,
        }
    }
    /// Two paths are the same property when their keys are equal.
    pub fn key(&self) -> String {
        match self {
            Path::Column { column, .. } => column.clone(),
            Path::Foreign { alias, spec, .. } => format!("{}#{}", alias, spec.name),
        }
    }
}

struct Expanded {
    from: String,
    condition: String,
    order: String,
    target: String,
    link: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Purpose {
    Filter,
    Sort,
}

// ------------- Compiler -------------
/// Accumulates positional parameters while criteria and sort keys compile.
#[derive(Debug, Default)]
pub struct Compiler {
    params: Vec<SqlValue>,
    aliases: usize,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
    pub fn into_params(self) -> Vec<SqlValue> {
        self.params
    }

    fn unknown(kind: EntityKind, property: &str) -> CatalogError {
        CatalogError::UnknownProperty {
            kind,
            property: property.to_string(),
        }
    }

    fn expand(&mut self, def: &AliasDef, outer: &str) -> Expanded {
        self.aliases += 1;
        let target = format!("t{}", self.aliases);
        let link = format!("x{}", self.aliases);
        let fill = |s: &str| s.replace("{o}", outer).replace("{t}", &target).replace("{x}", &link);
        Expanded {
            from: fill(def.from),
            condition: fill(&def.condition),
            order: fill(def.order),
            target: target.clone(),
            link: link.clone(),
        }
    }

    pub(crate) fn resolve(&mut self, scope: &Scope, property: &str, purpose: Purpose) -> Result<Path> {
        let (alias_name, foreign_prop) = match property.split_once('#') {
            Some((a, p)) => (a, Some(p)),
            None => {
                if let Some(spec) = scope.kind.field(property) {
                    return Ok(Path::Column {
                        column: format!("{}.{}", scope.alias, spec.column),
                        spec,
                        kind: scope.kind,
                    });
                }
                if let Some((link_kind, link_alias)) = &scope.link {
                    if let Some(spec) = link_kind.field(property) {
                        return Ok(Path::Column {
                            column: format!("{}.{}", link_alias, spec.column),
                            spec,
                            kind: *link_kind,
                        });
                    }
                }
                (property, None)
            }
        };
        let def = alias(scope.kind, alias_name).ok_or_else(|| Self::unknown(scope.kind, property))?;
        let prop = foreign_prop.unwrap_or(match purpose {
            Purpose::Filter => def.filter_prop,
            Purpose::Sort => def.sort_prop,
        });
        let expanded = self.expand(&def, &scope.alias);
        let kind = def.target.unwrap_or(scope.kind);
        let (column, spec, kind) = if let Some(spec) = def.fields.iter().find(|f| f.name == prop) {
            (format!("{}.{}", expanded.target, spec.column), spec, kind)
        } else if let Some(spec) = def.link.and_then(|l| l.field(prop)) {
            (format!("{}.{}", expanded.link, spec.column), spec, def.link.unwrap_or(kind))
        } else {
            return Err(Self::unknown(scope.kind, property));
        };
        Ok(Path::Foreign {
            from: expanded.from,
            condition: expanded.condition,
            order: expanded.order,
            column,
            spec,
            kind,
            alias: def.name,
        })
    }

    fn bind(&mut self, spec: &FieldSpec, kind: EntityKind, value: &FieldValue) -> Result<Option<()>> {
        match spec.to_storage(kind, value)? {
            SqlValue::Null => Ok(None),
            stored => {
                self.params.push(stored);
                Ok(Some(()))
            }
        }
    }

    fn comparison(&mut self, column: &str, spec: &FieldSpec, kind: EntityKind, values: &[FieldValue]) -> Result<String> {
        let mut bound = 0;
        let mut nullable = false;
        for value in values {
            match self.bind(spec, kind, value)? {
                Some(()) => bound += 1,
                None => nullable = true,
            }
        }
        let mut terms = Vec::new();
        match bound {
            0 => {}
            1 => terms.push(format!("{} = ?", column)),
            n => terms.push(format!("{} in ({})", column, vec!["?"; n].join(", "))),
        }
        if nullable {
            terms.push(format!("{} is null", column));
        }
        Ok(match terms.len() {
            0 => "0".to_string(),
            1 => terms.remove(0),
            _ => format!("({})", terms.join(" or ")),
        })
    }

    fn property_test(&mut self, scope: &Scope, property: &str, values: &[FieldValue]) -> Result<String> {
        match self.resolve(scope, property, Purpose::Filter)? {
            Path::Column { column, spec, kind } => self.comparison(&column, spec, kind, values),
            Path::Foreign {
                from,
                condition,
                column,
                spec,
                kind,
                ..
            } => {
                let test = self.comparison(&column, spec, kind, values)?;
                Ok(format!("exists (select 1 from {} where {} and {})", from, condition, test))
            }
        }
    }

    /// Compile `criterion` to a boolean SQL expression over `scope`.
    pub fn filter(&mut self, scope: &Scope, criterion: &Criterion) -> Result<String> {
        match criterion {
            Criterion::Equal(property, value) => self.property_test(scope, property, std::slice::from_ref(value)),
            Criterion::OneOf(property, values) => self.property_test(scope, property, values),
            Criterion::And(left, right) => {
                let left = self.filter(scope, left)?;
                let right = self.filter(scope, right)?;
                Ok(format!("({} and {})", left, right))
            }
            Criterion::Or(terms) => {
                if terms.is_empty() {
                    return Ok("0".to_string());
                }
                let compiled = terms
                    .iter()
                    .map(|term| self.filter(scope, term))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", compiled.join(" or ")))
            }
            Criterion::HasRelationWith(kind, inner) => {
                let def = relation_alias(scope.kind, *kind)?;
                let expanded = self.expand(&def, &scope.alias);
                let inner_scope = Scope {
                    kind: *kind,
                    alias: expanded.target,
                    link: def.link.map(|l| (l, expanded.link)),
                };
                let test = self.filter(&inner_scope, inner)?;
                Ok(format!(
                    "exists (select 1 from {} where {} and {})",
                    expanded.from, expanded.condition, test
                ))
            }
        }
    }
}

/// Compile a criterion for a finder over `kind`, returning the expression and
/// its parameters.
pub fn compile_filter(kind: EntityKind, criterion: &Criterion) -> Result<(String, Vec<SqlValue>)> {
    let mut compiler = Compiler::new();
    let sql = compiler.filter(&Scope::entity(kind), criterion)?;
    debug!(%kind, sql = %sql, "compiled criterion");
    Ok((sql, compiler.into_params()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_equality_binds_converted_values() {
        let (sql, params) = compile_filter(EntityKind::Resource, &Criterion::equal("uuid", " MIST ")).unwrap();
        assert_eq!(sql, "o.uuid = ?");
        assert_eq!(params, vec![SqlValue::Text("mist".into())]);
    }

    #[test]
    fn one_of_with_null_tests_both() {
        let criterion = Criterion::one_of("rating", [Some(100i64), None, Some(200)]);
        let (sql, params) = compile_filter(EntityKind::Resource, &criterion).unwrap();
        assert_eq!(sql, "(o.rating in (?, ?) or o.rating is null)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn foreign_alias_becomes_exists() {
        let (sql, _) = compile_filter(EntityKind::Resource, &Criterion::equal("authors#nameSort", "King, Stephen")).unwrap();
        assert!(sql.starts_with("exists (select 1 from res_persons x1 join persons t1"));
        assert!(sql.contains("x1.relation = 'author'"));
        assert!(sql.ends_with("t1.name_sort = ?)"));
        let (bare, _) = compile_filter(EntityKind::Resource, &Criterion::equal("tags", "horror")).unwrap();
        assert!(bare.contains(TAG_TYPE_UUID));
        assert!(bare.ends_with("t1.title = ?)"));
    }

    #[test]
    fn local_name_wins_over_alias() {
        let (sql, _) = compile_filter(EntityKind::Group, &Criterion::equal("groupType", TAG_TYPE_UUID)).unwrap();
        assert_eq!(sql, "o.type_uuid = ?");
        let (sql, _) = compile_filter(EntityKind::Group, &Criterion::equal("groupType#name", "Tag")).unwrap();
        assert!(sql.starts_with("exists (select 1 from group_types t1"));
    }

    #[test]
    fn unknown_properties_are_errors() {
        let error = compile_filter(EntityKind::Resource, &Criterion::equal("colour", "red")).unwrap_err();
        assert!(matches!(error, CatalogError::UnknownProperty { kind: EntityKind::Resource, .. }));
        assert!(compile_filter(EntityKind::Resource, &Criterion::equal("authors#shoeSize", "9")).is_err());
    }

    #[test]
    fn relations_nest_with_fresh_aliases() {
        let criterion = Criterion::has_relation_with(
            EntityKind::Group,
            Criterion::equal("groupType#name", "Series").and(Criterion::equal("groupIndex", 3i64)),
        );
        let (sql, params) = compile_filter(EntityKind::Resource, &criterion).unwrap();
        assert!(sql.contains("res_groups x1 join groups t1"));
        assert!(sql.contains("group_types t2 where t2.uuid = t1.type_uuid"));
        assert!(sql.contains("x1.group_index = ?"));
        assert_eq!(params.len(), 2);
        assert!(compile_filter(EntityKind::Person, &Criterion::has_relation_with(EntityKind::Group, Criterion::equal("title", "x"))).is_err());
    }
}
