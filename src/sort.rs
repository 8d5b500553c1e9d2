//! Sort specifications and pagination, compiled to `order by` / `limit` clauses.
//!
//! Missing values (including foreign keys with no related row) are the lowest
//! value: first ascending, last descending. Every order ends with the key
//! column of the scope so pages never shuffle between calls.

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::construct::EntityKind;
use crate::criteria::{Compiler, Path, Purpose, Scope};
use crate::entry::FieldKind;
use crate::error::{CatalogError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "asc nulls first",
            Direction::Desc => "desc nulls last",
        }
    }
}
impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "asc"),
            Direction::Desc => write!(f, "desc"),
        }
    }
}
impl FromStr for Direction {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Asc),
            "desc" | "descending" => Ok(Direction::Desc),
            other => Err(CatalogError::Criteria(format!("'{}' is not a sort direction", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortSpec {
    /// The natural default order of the entity (or of the relation, for
    /// related finders) in the given direction.
    Preferred(Direction),
    Props(Vec<(String, Direction)>),
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec::Preferred(Direction::Asc)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub offset: usize,
    pub max_count: Option<usize>,
    pub sort: SortSpec,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
    pub fn max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }
    pub fn preferred(mut self, direction: Direction) -> Self {
        self.sort = SortSpec::Preferred(direction);
        self
    }
    /// Appends a sort key; replaces a preferred order.
    pub fn sort_by(mut self, property: &str, direction: Direction) -> Self {
        match &mut self.sort {
            SortSpec::Props(props) => props.push((property.to_string(), direction)),
            SortSpec::Preferred(_) => self.sort = SortSpec::Props(vec![(property.to_string(), direction)]),
        }
        self
    }

    /// `limit ? offset ?` with its two parameters; no maximum is `-1`.
    pub(crate) fn limit_clause(&self) -> (&'static str, Vec<SqlValue>) {
        let limit = self.max_count.map(|n| n as i64).unwrap_or(-1);
        (
            "limit ? offset ?",
            vec![SqlValue::Integer(limit), SqlValue::Integer(self.offset as i64)],
        )
    }
}

pub fn default_sort_property(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Resource | EntityKind::Group => Some("titleSort"),
        EntityKind::Person => Some("nameSort"),
        EntityKind::GroupType => Some("name"),
        EntityKind::ObjectRelation => Some("tag"),
        EntityKind::PersonRelation | EntityKind::GroupRelation => None,
    }
}

fn key_expression(path: &Path) -> String {
    let spec = path.spec();
    let mut expression = match path {
        Path::Column { column, .. } => column.clone(),
        Path::Foreign {
            from,
            condition,
            order,
            column,
            ..
        } => format!(
            "(select {} from {} where {} order by {} limit 1)",
            column, from, condition, order
        ),
    };
    if spec.kind == FieldKind::Index {
        expression = format!("nullif({}, -1)", expression);
    }
    if spec.nocase {
        expression.push_str(" collate nocase");
    }
    expression
}

/// Compile `sort` to an `order by` clause over `scope`. `declared` is the
/// relation's own order, used for a preferred sort of related finders.
pub(crate) fn order_by(
    compiler: &mut Compiler,
    scope: &Scope,
    sort: &SortSpec,
    declared: Option<&str>,
) -> Result<String> {
    let mut keys = Vec::new();
    let props = match sort {
        SortSpec::Preferred(direction) => match declared {
            Some(declared) => {
                keys.push(format!("{} {}", declared, direction.sql()));
                Vec::new()
            }
            None => default_sort_property(scope.kind)
                .map(|p| vec![(p.to_string(), *direction)])
                .unwrap_or_default(),
        },
        SortSpec::Props(props) => props.clone(),
    };
    let mut seen: Vec<String> = Vec::new();
    for (property, direction) in &props {
        let path = compiler.resolve(scope, property, Purpose::Sort)?;
        let key = path.key();
        if seen.contains(&key) {
            return Err(CatalogError::Criteria(format!(
                "property '{}' is sorted more than once",
                property
            )));
        }
        seen.push(key);
        keys.push(format!("{} {}", key_expression(&path), direction.sql()));
    }
    keys.push(format!("{}.{}", scope.alias, scope.kind.key_column()));
    if let Some((_, link)) = &scope.link {
        keys.push(format!("{}.rowid", link));
    }
    Ok(format!("order by {}", keys.join(", ")))
}

/// Compile a sort for a finder over `kind`.
pub fn compile_sort(kind: EntityKind, sort: &SortSpec) -> Result<String> {
    let mut compiler = Compiler::new();
    let sql = order_by(&mut compiler, &Scope::entity(kind), sort, None)?;
    debug!(%kind, sql = %sql, "compiled sort");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_uses_the_natural_property() {
        let sql = compile_sort(EntityKind::Resource, &SortSpec::default()).unwrap();
        assert_eq!(sql, "order by o.title_sort collate nocase asc nulls first, o.uuid");
        let sql = compile_sort(EntityKind::ObjectRelation, &SortSpec::Preferred(Direction::Desc)).unwrap();
        assert_eq!(sql, "order by o.tag collate nocase desc nulls last, o.id");
    }

    #[test]
    fn foreign_keys_take_the_first_related_row() {
        let spec = SortSpec::Props(vec![("authors".into(), Direction::Asc)]);
        let sql = compile_sort(EntityKind::Resource, &spec).unwrap();
        assert!(sql.starts_with("order by (select t1.name_sort from res_persons x1"));
        assert!(sql.contains("order by x1.rowid limit 1) collate nocase asc nulls first"));
        let spec = SortSpec::Props(vec![("series#groupIndex".into(), Direction::Desc)]);
        let sql = compile_sort(EntityKind::Resource, &spec).unwrap();
        assert!(sql.starts_with("order by nullif((select x1.group_index"));
    }

    #[test]
    fn same_property_twice_is_rejected() {
        let spec = SortSpec::Props(vec![
            ("authors".into(), Direction::Asc),
            ("authors#nameSort".into(), Direction::Desc),
        ]);
        assert!(matches!(
            compile_sort(EntityKind::Resource, &spec),
            Err(CatalogError::Criteria(_))
        ));
        let spec = SortSpec::Props(vec![("rating".into(), Direction::Asc), ("rating".into(), Direction::Asc)]);
        assert!(compile_sort(EntityKind::Resource, &spec).is_err());
    }

    #[test]
    fn options_build_limits() {
        let options = QueryOptions::new().offset(20).max_count(10).sort_by("title", Direction::Desc);
        let (clause, params) = options.limit_clause();
        assert_eq!(clause, "limit ? offset ?");
        assert_eq!(params, vec![SqlValue::Integer(10), SqlValue::Integer(20)]);
        assert_eq!(options.sort, SortSpec::Props(vec![("title".into(), Direction::Desc)]));
        assert_eq!(QueryOptions::new().limit_clause().1[0], SqlValue::Integer(-1));
        assert_eq!("DESC".parse::<Direction>().unwrap(), Direction::Desc);
    }
}
