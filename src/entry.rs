//! Field/entry mapping between in-memory entities and storage rows.
//!
//! Every storable entity declares an ordered table of [`FieldSpec`]s, one per
//! property, generated together with a property enum by [`field_table!`]. A
//! spec maps the property name used by callers (`titleSort`) to its column
//! (`title_sort`) and carries the [`FieldKind`] that validates and converts the
//! value in both directions. Statements are composed from these tables, so the
//! column list of an insert, the `SET` clause of an update and the projection
//! of a select always agree with each other.

use rusqlite::types::{Value as SqlValue, ValueRef};
use tracing::warn;
use uuid::Uuid;

use crate::construct::{EntityKind, GroupType};
use crate::datatype::{FieldValue, PublishDate, Timestamp};
use crate::error::{CatalogError, Result};

// ------------- FieldKind -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Pass-through text.
    Text,
    /// Non-empty, trimmed, lower-cased identifier.
    Uuid,
    /// Synthetic integer row identifier assigned by the store.
    RowId,
    /// Whole seconds since the epoch.
    Timestamp,
    /// Free text or `ts:<seconds>`.
    PublishDate,
    Integer { min: i64, max: i64 },
    /// Non-negative position; absent is stored as `-1`.
    Index,
    Boolean,
    Enumeration(&'static [&'static str]),
    /// A uuid referencing another entity, resolved to the full object on read.
    Foreign(EntityKind),
}

// ------------- FieldSpec -------------
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub nocase: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            nullable: false,
            nocase: false,
        }
    }
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
    pub const fn nocase(mut self) -> Self {
        self.nocase = true;
        self
    }

    fn invalid(&self, entity: EntityKind, message: impl Into<String>) -> CatalogError {
        let message = format!("{} (table {})", message.into(), entity.table());
        warn!(%entity, property = self.name, %message, "field validation failed");
        CatalogError::validation(entity, self.name, message)
    }

    /// Validate an in-memory value and convert it to its storage form.
    pub fn to_storage(&self, entity: EntityKind, value: &FieldValue) -> Result<SqlValue> {
        if let FieldValue::Null = value {
            return match self.kind {
                FieldKind::Index => Ok(SqlValue::Integer(-1)),
                _ if self.nullable => Ok(SqlValue::Null),
                _ => Err(self.invalid(entity, "value is required")),
            };
        }
        match (self.kind, value) {
            (FieldKind::Text, FieldValue::Text(s)) => Ok(SqlValue::Text(s.clone())),
            (FieldKind::Uuid, FieldValue::Text(s)) | (FieldKind::Foreign(_), FieldValue::Text(s)) => {
                let normalized = s.trim().to_lowercase();
                if normalized.is_empty() {
                    Err(self.invalid(entity, "identifier must not be empty"))
                } else {
                    Ok(SqlValue::Text(normalized))
                }
            }
            (FieldKind::RowId, FieldValue::Integer(i)) => Ok(SqlValue::Integer(*i)),
            (FieldKind::Timestamp, FieldValue::Timestamp(ts)) => Ok(SqlValue::Integer(ts.seconds())),
            (FieldKind::PublishDate, FieldValue::PublishDate(pd)) => match pd {
                PublishDate::Text(text) if text.starts_with(PublishDate::TIMESTAMP_PREFIX) => Err(self.invalid(
                    entity,
                    format!("text must not start with '{}'", PublishDate::TIMESTAMP_PREFIX),
                )),
                _ => Ok(SqlValue::Text(pd.encode())),
            },
            (FieldKind::Integer { min, max }, FieldValue::Integer(i)) => {
                if (min..=max).contains(i) {
                    Ok(SqlValue::Integer(*i))
                } else {
                    Err(self.invalid(entity, format!("{} is outside {}..={}", i, min, max)))
                }
            }
            (FieldKind::Index, FieldValue::Integer(i)) => {
                if *i >= 0 {
                    Ok(SqlValue::Integer(*i))
                } else {
                    Err(self.invalid(entity, format!("index {} must not be negative", i)))
                }
            }
            (FieldKind::Boolean, FieldValue::Boolean(b)) => Ok(SqlValue::Integer(*b as i64)),
            (FieldKind::Enumeration(options), FieldValue::Text(s)) => {
                let lowered = s.trim().to_lowercase();
                if options.contains(&lowered.as_str()) {
                    Ok(SqlValue::Text(lowered))
                } else {
                    Err(self.invalid(entity, format!("'{}' is not one of {}", s, options.join(", "))))
                }
            }
            (kind, other) => Err(self.invalid(
                entity,
                format!("expected {:?}, got {}", kind, other.type_name()),
            )),
        }
    }

    /// Validate a stored value and convert it to its in-memory form.
    pub fn from_storage(&self, entity: EntityKind, value: ValueRef<'_>) -> Result<FieldValue> {
        let corrupt = |message: &str| self.invalid(entity, format!("stored {}", message));
        match (self.kind, value) {
            (FieldKind::Index, ValueRef::Integer(i)) if i < 0 => Ok(FieldValue::Null),
            (_, ValueRef::Null) if self.nullable => Ok(FieldValue::Null),
            (_, ValueRef::Null) => Err(corrupt("value is unexpectedly null")),
            (FieldKind::Text, ValueRef::Text(t))
            | (FieldKind::Uuid, ValueRef::Text(t))
            | (FieldKind::Foreign(_), ValueRef::Text(t))
            | (FieldKind::Enumeration(_), ValueRef::Text(t)) => Ok(FieldValue::Text(
                String::from_utf8_lossy(t).into_owned(),
            )),
            (FieldKind::PublishDate, ValueRef::Text(t)) => Ok(FieldValue::PublishDate(PublishDate::decode(
                &String::from_utf8_lossy(t),
            ))),
            (FieldKind::Timestamp, ValueRef::Integer(i)) => Ok(FieldValue::Timestamp(Timestamp::from_seconds(i))),
            (FieldKind::Boolean, ValueRef::Integer(i)) => Ok(FieldValue::Boolean(i != 0)),
            (FieldKind::RowId, ValueRef::Integer(i))
            | (FieldKind::Index, ValueRef::Integer(i))
            | (FieldKind::Integer { .. }, ValueRef::Integer(i)) => Ok(FieldValue::Integer(i)),
            (kind, _) => Err(corrupt(&format!("value does not fit {:?}", kind))),
        }
    }
}

// ------------- Property tables -------------
/// A property enum whose variants index a static [`FieldSpec`] table.
pub trait Property: Copy + Eq + std::fmt::Debug + 'static {
    const ALL: &'static [Self];
    fn index(self) -> usize;
    fn spec(self) -> &'static FieldSpec;
    fn name(self) -> &'static str {
        self.spec().name
    }
}

/// Declares a property enum together with its field table, in one order.
macro_rules! field_table {
    ($(#[$meta:meta])* $prop:ident, $fields:ident {
        $($variant:ident => $name:literal @ $column:literal : $kind:expr $(, $flag:ident)*;)+
    }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum $prop {
            $($variant),+
        }
        pub const $fields: &[FieldSpec] = &[
            $(FieldSpec::new($name, $column, $kind)$(.$flag())*),+
        ];
        impl Property for $prop {
            const ALL: &'static [$prop] = &[$($prop::$variant),+];
            fn index(self) -> usize {
                self as usize
            }
            fn spec(self) -> &'static FieldSpec {
                &$fields[self as usize]
            }
        }
    };
}

field_table!(
    /// Properties of a [`crate::construct::Resource`].
    ResourceProp, RESOURCE_FIELDS {
        Uuid => "uuid" @ "uuid" : FieldKind::Uuid;
        Title => "title" @ "title" : FieldKind::Text, nocase;
        TitleSort => "titleSort" @ "title_sort" : FieldKind::Text, nocase;
        Rating => "rating" @ "rating" : FieldKind::Integer { min: 0, max: 500 }, nullable;
        AddDate => "addDate" @ "add_date" : FieldKind::Timestamp;
        LastModifyDate => "lastModifyDate" @ "last_modify_date" : FieldKind::Timestamp;
        PublishDate => "publishDate" @ "publish_date" : FieldKind::PublishDate, nullable;
        Publisher => "publisher" @ "publisher" : FieldKind::Text, nocase;
        Desc => "desc" @ "description" : FieldKind::Text;
    }
);

field_table!(
    /// Properties of a [`crate::construct::Person`].
    PersonProp, PERSON_FIELDS {
        Uuid => "uuid" @ "uuid" : FieldKind::Uuid;
        Name => "name" @ "name" : FieldKind::Text, nocase;
        NameSort => "nameSort" @ "name_sort" : FieldKind::Text, nocase;
    }
);

field_table!(
    /// Properties of a [`crate::construct::GroupType`].
    GroupTypeProp, GROUP_TYPE_FIELDS {
        Uuid => "uuid" @ "uuid" : FieldKind::Uuid;
        Name => "name" @ "name" : FieldKind::Text, nocase;
        Exclusive => "exclusive" @ "is_exclusive" : FieldKind::Boolean;
        Ordered => "ordered" @ "is_ordered" : FieldKind::Boolean;
    }
);

field_table!(
    /// Properties of a [`crate::construct::Group`].
    GroupProp, GROUP_FIELDS {
        Uuid => "uuid" @ "uuid" : FieldKind::Uuid;
        Title => "title" @ "title" : FieldKind::Text, nocase;
        TitleSort => "titleSort" @ "title_sort" : FieldKind::Text, nocase;
        GroupType => "groupType" @ "type_uuid" : FieldKind::Foreign(EntityKind::GroupType);
    }
);

field_table!(
    /// Properties of a [`crate::construct::ObjectRelation`].
    ObjectProp, OBJECT_FIELDS {
        Id => "id" @ "id" : FieldKind::RowId;
        Resource => "resource" @ "resource_uuid" : FieldKind::Foreign(EntityKind::Resource);
        Uuid => "uuid" @ "object_uuid" : FieldKind::Uuid;
        Role => "role" @ "role" : FieldKind::Enumeration(&["format", "cover"]);
        Tag => "tag" @ "tag" : FieldKind::Text, nocase;
    }
);

field_table!(
    /// Columns of a resource-person link row.
    PersonLinkProp, PERSON_LINK_FIELDS {
        Resource => "resource" @ "resource_uuid" : FieldKind::Foreign(EntityKind::Resource);
        Person => "person" @ "person_uuid" : FieldKind::Foreign(EntityKind::Person);
        Relation => "relation" @ "relation" : FieldKind::Enumeration(&["author", "editor", "translator"]);
    }
);

field_table!(
    /// Columns of a resource-group link row.
    GroupLinkProp, GROUP_LINK_FIELDS {
        Resource => "resource" @ "resource_uuid" : FieldKind::Foreign(EntityKind::Resource);
        Group => "group" @ "group_uuid" : FieldKind::Foreign(EntityKind::Group);
        GroupIndex => "groupIndex" @ "group_index" : FieldKind::Index;
        RelationTag => "relationTag" @ "relation_tag" : FieldKind::Text;
    }
);

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Resource => "resources",
            EntityKind::Person => "persons",
            EntityKind::Group => "groups",
            EntityKind::GroupType => "group_types",
            EntityKind::ObjectRelation => "res_objects",
            EntityKind::PersonRelation => "res_persons",
            EntityKind::GroupRelation => "res_groups",
        }
    }
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Resource => RESOURCE_FIELDS,
            EntityKind::Person => PERSON_FIELDS,
            EntityKind::Group => GROUP_FIELDS,
            EntityKind::GroupType => GROUP_TYPE_FIELDS,
            EntityKind::ObjectRelation => OBJECT_FIELDS,
            EntityKind::PersonRelation => PERSON_LINK_FIELDS,
            EntityKind::GroupRelation => GROUP_LINK_FIELDS,
        }
    }
    /// The column identifying a row; also the final sort tie-break.
    pub fn key_column(&self) -> &'static str {
        match self {
            EntityKind::ObjectRelation => "id",
            EntityKind::PersonRelation | EntityKind::GroupRelation => "rowid",
            _ => "uuid",
        }
    }
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }
}

// ------------- Entry -------------
/// Resolves foreign-type fields to full objects while reading rows.
pub trait ForeignLookup {
    fn group_type(&self, uuid: &str) -> Option<GroupType>;
}

/// An entity that can be written to and read from its table.
pub trait Entry: Sized {
    type Prop: Property;
    const KIND: EntityKind;

    fn get(&self, prop: Self::Prop) -> FieldValue;
    fn from_values(values: FieldRow<Self::Prop>, foreign: &dyn ForeignLookup) -> Result<Self>;
}

/// A partial update: only the properties present are written.
pub trait Patch {
    type Target: Entry;
    fn assignments(&self) -> Vec<(<Self::Target as Entry>::Prop, FieldValue)>;
}

/// Converted values of one row, indexed by property.
pub struct FieldRow<P: Property> {
    values: Vec<Option<FieldValue>>,
    _prop: std::marker::PhantomData<P>,
}

impl<P: Property> FieldRow<P> {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
            _prop: std::marker::PhantomData,
        }
    }
    pub fn take(&mut self, prop: P) -> FieldValue {
        self.values
            .get_mut(prop.index())
            .and_then(Option::take)
            .unwrap_or(FieldValue::Null)
    }
    pub fn text(&mut self, prop: P) -> String {
        match self.take(prop) {
            FieldValue::Text(s) => s,
            _ => String::new(),
        }
    }
    pub fn integer(&mut self, prop: P) -> Option<i64> {
        match self.take(prop) {
            FieldValue::Integer(i) => Some(i),
            _ => None,
        }
    }
    pub fn boolean(&mut self, prop: P) -> bool {
        matches!(self.take(prop), FieldValue::Boolean(true))
    }
    pub fn timestamp(&mut self, prop: P) -> Timestamp {
        match self.take(prop) {
            FieldValue::Timestamp(ts) => ts,
            _ => Timestamp::from_seconds(0),
        }
    }
    pub fn publish_date(&mut self, prop: P) -> Option<PublishDate> {
        match self.take(prop) {
            FieldValue::PublishDate(pd) => Some(pd),
            _ => None,
        }
    }
}

/// Fresh identifier for entries inserted without one.
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// `INSERT` over every field except store-assigned row ids, plus the converted values.
pub fn insert_statement<E: Entry>(entry: &E) -> Result<(String, Vec<SqlValue>)> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for prop in E::Prop::ALL {
        let spec = prop.spec();
        if spec.kind == FieldKind::RowId {
            continue;
        }
        values.push(spec.to_storage(E::KIND, &entry.get(*prop))?);
        columns.push(spec.column);
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        E::KIND.table(),
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok((sql, values))
}

/// `UPDATE ... SET` for the present properties only; `None` when nothing is set.
pub fn update_statement<P: Patch>(patch: &P, key: &FieldValue) -> Result<Option<(String, Vec<SqlValue>)>> {
    let kind = <P::Target as Entry>::KIND;
    let assignments = patch.assignments();
    if assignments.is_empty() {
        return Ok(None);
    }
    let mut sets = Vec::new();
    let mut values = Vec::new();
    for (prop, value) in &assignments {
        let spec = prop.spec();
        values.push(spec.to_storage(kind, value)?);
        sets.push(format!("{} = ?{}", spec.column, values.len()));
    }
    values.push(match key {
        FieldValue::Integer(i) => SqlValue::Integer(*i),
        FieldValue::Text(s) => SqlValue::Text(s.trim().to_lowercase()),
        other => SqlValue::Text(format!("{:?}", other)),
    });
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        kind.table(),
        sets.join(", "),
        kind.key_column(),
        values.len()
    );
    Ok(Some((sql, values)))
}

/// Projection of every field of `E` from the table aliased `alias`, in table order.
pub fn select_columns<E: Entry>(alias: &str) -> String {
    E::Prop::ALL
        .iter()
        .map(|p| format!("{}.{}", alias, p.spec().column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read `E` from a row whose first columns are [`select_columns`] starting at `offset`.
pub fn read_entry<E: Entry>(row: &rusqlite::Row<'_>, offset: usize, foreign: &dyn ForeignLookup) -> Result<E> {
    let mut values = Vec::with_capacity(E::Prop::ALL.len());
    for (i, prop) in E::Prop::ALL.iter().enumerate() {
        values.push(prop.spec().from_storage(E::KIND, row.get_ref(offset + i)?)?);
    }
    E::from_values(FieldRow::new(values), foreign)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(spec: &FieldSpec, value: FieldValue) -> FieldValue {
        let stored = spec.to_storage(EntityKind::Resource, &value).expect("valid");
        spec.from_storage(EntityKind::Resource, ValueRef::from(&stored)).expect("readable")
    }

    #[test]
    fn tables_are_in_property_order() {
        for (i, prop) in ResourceProp::ALL.iter().enumerate() {
            assert_eq!(prop.index(), i);
            assert_eq!(prop.spec().name, RESOURCE_FIELDS[i].name);
        }
        assert_eq!(GroupProp::GroupType.spec().column, "type_uuid");
        assert_eq!(ResourceProp::Desc.spec().column, "description");
    }

    #[test]
    fn conversions_round_trip() {
        let ts = FieldValue::Timestamp(Timestamp::from_seconds(1_700_000_000));
        assert_eq!(round_trip(ResourceProp::AddDate.spec(), ts.clone()), ts);
        for pd in [
            PublishDate::Text("circa 1850".into()),
            PublishDate::Timestamp(Timestamp::from_seconds(-86_400)),
        ] {
            let value = FieldValue::PublishDate(pd);
            assert_eq!(round_trip(ResourceProp::PublishDate.spec(), value.clone()), value);
        }
        let uuid = FieldValue::Text("0f8b6a3e-3d2c-4f7a-9d1e-2b4c6e8a0f13".into());
        assert_eq!(round_trip(ResourceProp::Uuid.spec(), uuid.clone()), uuid);
        assert_eq!(
            round_trip(GroupLinkProp::GroupIndex.spec(), FieldValue::Null),
            FieldValue::Null
        );
    }

    #[test]
    fn validators_reject_before_conversion() {
        let rating = ResourceProp::Rating.spec();
        assert!(rating.to_storage(EntityKind::Resource, &FieldValue::Integer(530)).is_err());
        assert!(rating.to_storage(EntityKind::Resource, &FieldValue::Integer(300)).is_ok());
        let uuid = ResourceProp::Uuid.spec();
        assert!(uuid.to_storage(EntityKind::Resource, &FieldValue::Text("   ".into())).is_err());
        let publish = ResourceProp::PublishDate.spec();
        let ambiguous = FieldValue::PublishDate(PublishDate::Text("ts:12".into()));
        assert!(publish.to_storage(EntityKind::Resource, &ambiguous).is_err());
        let index = GroupLinkProp::GroupIndex.spec();
        assert!(index.to_storage(EntityKind::GroupRelation, &FieldValue::Integer(-1)).is_err());
    }

    #[test]
    fn uuids_are_normalized() {
        let stored = ResourceProp::Uuid
            .spec()
            .to_storage(EntityKind::Resource, &FieldValue::Text("  ABC-Def ".into()))
            .unwrap();
        assert_eq!(stored, SqlValue::Text("abc-def".into()));
    }
}
