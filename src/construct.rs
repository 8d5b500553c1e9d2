//! The entities kept by a library: resources, the persons and groups related
//! to them, the group types classifying the groups, and the objects (files,
//! covers) attached to resources.
//!
//! Each entity is a plain record plus a patch record of optional fields used
//! for partial updates. Their mapping to storage lives in [`crate::entry`].

use seahash::SeaHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::BuildHasherDefault;

use crate::datatype::{FieldValue, ObjectRole, PersonRelation, PublishDate, Timestamp};
use crate::entry::{
    Entry, FieldRow, ForeignLookup, GroupLinkProp, GroupProp, GroupTypeProp, ObjectProp, Patch,
    PersonLinkProp, PersonProp, ResourceProp,
};
use crate::error::{CatalogError, Result};

// The hasher used by the in-memory keepers and registries.
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

// ------------- EntityKind -------------
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum EntityKind {
    Resource,
    Person,
    Group,
    GroupType,
    ObjectRelation,
    PersonRelation,
    GroupRelation,
}
impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EntityKind::Resource => "resource",
            EntityKind::Person => "person",
            EntityKind::Group => "group",
            EntityKind::GroupType => "group type",
            EntityKind::ObjectRelation => "object relation",
            EntityKind::PersonRelation => "person relation",
            EntityKind::GroupRelation => "group relation",
        };
        write!(f, "{}", name)
    }
}

// ------------- Well-known group types -------------
// These identifiers are referenced by stored data and must never change.
pub const TAG_TYPE_UUID: &str = "ff9a5d5f-9b5c-4d3e-8a1a-6c0b1e7f2a01";
pub const SERIES_TYPE_UUID: &str = "ff9a5d5f-9b5c-4d3e-8a1a-6c0b1e7f2a02";
pub const CATEGORY_TYPE_UUID: &str = "ff9a5d5f-9b5c-4d3e-8a1a-6c0b1e7f2a03";
pub const LANGUAGE_TYPE_UUID: &str = "ff9a5d5f-9b5c-4d3e-8a1a-6c0b1e7f2a04";

/// The group types every library is seeded with.
pub fn known_group_types() -> Vec<GroupType> {
    vec![
        GroupType::new("Tag", false, false).with_uuid(TAG_TYPE_UUID),
        GroupType::new("Series", true, true).with_uuid(SERIES_TYPE_UUID),
        GroupType::new("Category", false, false).with_uuid(CATEGORY_TYPE_UUID),
        GroupType::new("Language", false, false).with_uuid(LANGUAGE_TYPE_UUID),
    ]
}

pub fn is_known_group_type(uuid: &str) -> bool {
    [TAG_TYPE_UUID, SERIES_TYPE_UUID, CATEGORY_TYPE_UUID, LANGUAGE_TYPE_UUID].contains(&uuid)
}

/// Anything that names an entity by uuid: a bare string or the entity itself.
pub trait AsUuid {
    fn as_uuid(&self) -> &str;
}
impl AsUuid for str {
    fn as_uuid(&self) -> &str {
        self
    }
}
impl AsUuid for String {
    fn as_uuid(&self) -> &str {
        self
    }
}
impl<T: AsUuid + ?Sized> AsUuid for &T {
    fn as_uuid(&self) -> &str {
        (**self).as_uuid()
    }
}

// ------------- Resource -------------
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uuid: String,
    pub title: String,
    pub title_sort: String,
    /// 0..=500, hundredths of a star.
    pub rating: Option<i64>,
    pub add_date: Timestamp,
    pub last_modify_date: Timestamp,
    pub publish_date: Option<PublishDate>,
    pub publisher: String,
    pub desc: String,
}

impl Resource {
    pub fn new(title: &str) -> Self {
        let now = Timestamp::now();
        Self {
            uuid: String::new(),
            title: title.to_string(),
            title_sort: title.to_string(),
            rating: None,
            add_date: now,
            last_modify_date: now,
            publish_date: None,
            publisher: String::new(),
            desc: String::new(),
        }
    }
    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = uuid.to_string();
        self
    }
    pub fn with_title_sort(mut self, title_sort: &str) -> Self {
        self.title_sort = title_sort.to_string();
        self
    }
    pub fn with_rating(mut self, rating: i64) -> Self {
        self.rating = Some(rating);
        self
    }
    pub fn with_publish_date(mut self, publish_date: PublishDate) -> Self {
        self.publish_date = Some(publish_date);
        self
    }
    pub fn with_publisher(mut self, publisher: &str) -> Self {
        self.publisher = publisher.to_string();
        self
    }
}
impl AsUuid for Resource {
    fn as_uuid(&self) -> &str {
        &self.uuid
    }
}

impl Entry for Resource {
    type Prop = ResourceProp;
    const KIND: EntityKind = EntityKind::Resource;

    fn get(&self, prop: ResourceProp) -> FieldValue {
        match prop {
            ResourceProp::Uuid => self.uuid.as_str().into(),
            ResourceProp::Title => self.title.as_str().into(),
            ResourceProp::TitleSort => self.title_sort.as_str().into(),
            ResourceProp::Rating => self.rating.into(),
            ResourceProp::AddDate => self.add_date.into(),
            ResourceProp::LastModifyDate => self.last_modify_date.into(),
            ResourceProp::PublishDate => self.publish_date.clone().into(),
            ResourceProp::Publisher => self.publisher.as_str().into(),
            ResourceProp::Desc => self.desc.as_str().into(),
        }
    }
    fn from_values(mut row: FieldRow<ResourceProp>, _: &dyn ForeignLookup) -> Result<Self> {
        Ok(Self {
            uuid: row.text(ResourceProp::Uuid),
            title: row.text(ResourceProp::Title),
            title_sort: row.text(ResourceProp::TitleSort),
            rating: row.integer(ResourceProp::Rating),
            add_date: row.timestamp(ResourceProp::AddDate),
            last_modify_date: row.timestamp(ResourceProp::LastModifyDate),
            publish_date: row.publish_date(ResourceProp::PublishDate),
            publisher: row.text(ResourceProp::Publisher),
            desc: row.text(ResourceProp::Desc),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub title_sort: Option<String>,
    pub rating: Option<Option<i64>>,
    pub publish_date: Option<Option<PublishDate>>,
    pub publisher: Option<String>,
    pub desc: Option<String>,
}

impl Patch for ResourcePatch {
    type Target = Resource;
    fn assignments(&self) -> Vec<(ResourceProp, FieldValue)> {
        let mut set = Vec::new();
        if let Some(v) = &self.title {
            set.push((ResourceProp::Title, v.as_str().into()));
        }
        if let Some(v) = &self.title_sort {
            set.push((ResourceProp::TitleSort, v.as_str().into()));
        }
        if let Some(v) = self.rating {
            set.push((ResourceProp::Rating, v.into()));
        }
        if let Some(v) = &self.publish_date {
            set.push((ResourceProp::PublishDate, v.clone().into()));
        }
        if let Some(v) = &self.publisher {
            set.push((ResourceProp::Publisher, v.as_str().into()));
        }
        if let Some(v) = &self.desc {
            set.push((ResourceProp::Desc, v.as_str().into()));
        }
        set
    }
}

// ------------- Person -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub uuid: String,
    pub name: String,
    pub name_sort: String,
}

impl Person {
    pub fn new(name: &str, name_sort: &str) -> Self {
        Self {
            uuid: String::new(),
            name: name.to_string(),
            name_sort: name_sort.to_string(),
        }
    }
    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = uuid.to_string();
        self
    }
}
impl AsUuid for Person {
    fn as_uuid(&self) -> &str {
        &self.uuid
    }
}

impl Entry for Person {
    type Prop = PersonProp;
    const KIND: EntityKind = EntityKind::Person;

    fn get(&self, prop: PersonProp) -> FieldValue {
        match prop {
            PersonProp::Uuid => self.uuid.as_str().into(),
            PersonProp::Name => self.name.as_str().into(),
            PersonProp::NameSort => self.name_sort.as_str().into(),
        }
    }
    fn from_values(mut row: FieldRow<PersonProp>, _: &dyn ForeignLookup) -> Result<Self> {
        Ok(Self {
            uuid: row.text(PersonProp::Uuid),
            name: row.text(PersonProp::Name),
            name_sort: row.text(PersonProp::NameSort),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersonPatch {
    pub name: Option<String>,
    pub name_sort: Option<String>,
}

impl Patch for PersonPatch {
    type Target = Person;
    fn assignments(&self) -> Vec<(PersonProp, FieldValue)> {
        let mut set = Vec::new();
        if let Some(v) = &self.name {
            set.push((PersonProp::Name, v.as_str().into()));
        }
        if let Some(v) = &self.name_sort {
            set.push((PersonProp::NameSort, v.as_str().into()));
        }
        set
    }
}

// ------------- GroupType -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupType {
    pub uuid: String,
    pub name: String,
    /// A resource may relate to at most one group of an exclusive type.
    pub exclusive: bool,
    /// Relations to groups of an ordered type may carry an index.
    pub ordered: bool,
}

impl GroupType {
    pub fn new(name: &str, exclusive: bool, ordered: bool) -> Self {
        Self {
            uuid: String::new(),
            name: name.to_string(),
            exclusive,
            ordered,
        }
    }
    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = uuid.to_string();
        self
    }
}
impl AsUuid for GroupType {
    fn as_uuid(&self) -> &str {
        &self.uuid
    }
}

impl Entry for GroupType {
    type Prop = GroupTypeProp;
    const KIND: EntityKind = EntityKind::GroupType;

    fn get(&self, prop: GroupTypeProp) -> FieldValue {
        match prop {
            GroupTypeProp::Uuid => self.uuid.as_str().into(),
            GroupTypeProp::Name => self.name.as_str().into(),
            GroupTypeProp::Exclusive => self.exclusive.into(),
            GroupTypeProp::Ordered => self.ordered.into(),
        }
    }
    fn from_values(mut row: FieldRow<GroupTypeProp>, _: &dyn ForeignLookup) -> Result<Self> {
        Ok(Self {
            uuid: row.text(GroupTypeProp::Uuid),
            name: row.text(GroupTypeProp::Name),
            exclusive: row.boolean(GroupTypeProp::Exclusive),
            ordered: row.boolean(GroupTypeProp::Ordered),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupTypePatch {
    pub name: Option<String>,
    pub exclusive: Option<bool>,
    pub ordered: Option<bool>,
}

impl GroupTypePatch {
    pub(crate) fn apply(&self, group_type: &mut GroupType) {
        if let Some(v) = &self.name {
            group_type.name = v.clone();
        }
        if let Some(v) = self.exclusive {
            group_type.exclusive = v;
        }
        if let Some(v) = self.ordered {
            group_type.ordered = v;
        }
    }
}

impl Patch for GroupTypePatch {
    type Target = GroupType;
    fn assignments(&self) -> Vec<(GroupTypeProp, FieldValue)> {
        let mut set = Vec::new();
        if let Some(v) = &self.name {
            set.push((GroupTypeProp::Name, v.as_str().into()));
        }
        if let Some(v) = self.exclusive {
            set.push((GroupTypeProp::Exclusive, v.into()));
        }
        if let Some(v) = self.ordered {
            set.push((GroupTypeProp::Ordered, v.into()));
        }
        set
    }
}

// ------------- Group -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub uuid: String,
    pub title: String,
    pub title_sort: String,
    pub group_type: GroupType,
}

impl Group {
    pub fn new(title: &str, group_type: &GroupType) -> Self {
        Self {
            uuid: String::new(),
            title: title.to_string(),
            title_sort: title.to_string(),
            group_type: group_type.clone(),
        }
    }
    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = uuid.to_string();
        self
    }
    pub fn with_title_sort(mut self, title_sort: &str) -> Self {
        self.title_sort = title_sort.to_string();
        self
    }
}
impl AsUuid for Group {
    fn as_uuid(&self) -> &str {
        &self.uuid
    }
}

impl Entry for Group {
    type Prop = GroupProp;
    const KIND: EntityKind = EntityKind::Group;

    fn get(&self, prop: GroupProp) -> FieldValue {
        match prop {
            GroupProp::Uuid => self.uuid.as_str().into(),
            GroupProp::Title => self.title.as_str().into(),
            GroupProp::TitleSort => self.title_sort.as_str().into(),
            GroupProp::GroupType => self.group_type.uuid.as_str().into(),
        }
    }
    fn from_values(mut row: FieldRow<GroupProp>, foreign: &dyn ForeignLookup) -> Result<Self> {
        let uuid = row.text(GroupProp::Uuid);
        let type_uuid = row.text(GroupProp::GroupType);
        let group_type = foreign.group_type(&type_uuid).ok_or_else(|| {
            CatalogError::integrity(
                EntityKind::Group,
                format!("group '{}' refers to unknown group type '{}'", uuid, type_uuid),
            )
        })?;
        Ok(Self {
            uuid,
            title: row.text(GroupProp::Title),
            title_sort: row.text(GroupProp::TitleSort),
            group_type,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupPatch {
    pub title: Option<String>,
    pub title_sort: Option<String>,
    pub group_type: Option<String>,
}

impl GroupPatch {
    pub fn group_type(mut self, group_type: impl AsUuid) -> Self {
        self.group_type = Some(group_type.as_uuid().to_string());
        self
    }
}

impl Patch for GroupPatch {
    type Target = Group;
    fn assignments(&self) -> Vec<(GroupProp, FieldValue)> {
        let mut set = Vec::new();
        if let Some(v) = &self.title {
            set.push((GroupProp::Title, v.as_str().into()));
        }
        if let Some(v) = &self.title_sort {
            set.push((GroupProp::TitleSort, v.as_str().into()));
        }
        if let Some(v) = &self.group_type {
            set.push((GroupProp::GroupType, v.as_str().into()));
        }
        set
    }
}

// ------------- ObjectRelation -------------
/// An externally stored artifact attached to a resource. Rows are addressed
/// by their synthetic `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRelation {
    pub id: i64,
    pub resource_uuid: String,
    pub uuid: String,
    pub role: ObjectRole,
    pub tag: String,
}

impl ObjectRelation {
    pub fn new(uuid: &str, role: ObjectRole, tag: &str) -> Self {
        Self {
            id: 0,
            resource_uuid: String::new(),
            uuid: uuid.to_string(),
            role,
            tag: tag.to_string(),
        }
    }
}

impl Entry for ObjectRelation {
    type Prop = ObjectProp;
    const KIND: EntityKind = EntityKind::ObjectRelation;

    fn get(&self, prop: ObjectProp) -> FieldValue {
        match prop {
            ObjectProp::Id => self.id.into(),
            ObjectProp::Resource => self.resource_uuid.as_str().into(),
            ObjectProp::Uuid => self.uuid.as_str().into(),
            ObjectProp::Role => self.role.into(),
            ObjectProp::Tag => self.tag.as_str().into(),
        }
    }
    fn from_values(mut row: FieldRow<ObjectProp>, _: &dyn ForeignLookup) -> Result<Self> {
        let role = row.text(ObjectProp::Role);
        Ok(Self {
            id: row.integer(ObjectProp::Id).unwrap_or_default(),
            resource_uuid: row.text(ObjectProp::Resource),
            uuid: row.text(ObjectProp::Uuid),
            role: role
                .parse()
                .map_err(|e: String| CatalogError::validation(EntityKind::ObjectRelation, "role", e))?,
            tag: row.text(ObjectProp::Tag),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectRelationPatch {
    pub uuid: Option<String>,
    pub role: Option<ObjectRole>,
    pub tag: Option<String>,
}

impl Patch for ObjectRelationPatch {
    type Target = ObjectRelation;
    fn assignments(&self) -> Vec<(ObjectProp, FieldValue)> {
        let mut set = Vec::new();
        if let Some(v) = &self.uuid {
            set.push((ObjectProp::Uuid, v.as_str().into()));
        }
        if let Some(v) = self.role {
            set.push((ObjectProp::Role, v.into()));
        }
        if let Some(v) = &self.tag {
            set.push((ObjectProp::Tag, v.as_str().into()));
        }
        set
    }
}

// ------------- Relation rows -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PersonLink {
    pub resource_uuid: String,
    pub person_uuid: String,
    pub relation: PersonRelation,
}

impl Entry for PersonLink {
    type Prop = PersonLinkProp;
    const KIND: EntityKind = EntityKind::PersonRelation;

    fn get(&self, prop: PersonLinkProp) -> FieldValue {
        match prop {
            PersonLinkProp::Resource => self.resource_uuid.as_str().into(),
            PersonLinkProp::Person => self.person_uuid.as_str().into(),
            PersonLinkProp::Relation => self.relation.into(),
        }
    }
    fn from_values(mut row: FieldRow<PersonLinkProp>, _: &dyn ForeignLookup) -> Result<Self> {
        let relation = row.text(PersonLinkProp::Relation);
        Ok(Self {
            resource_uuid: row.text(PersonLinkProp::Resource),
            person_uuid: row.text(PersonLinkProp::Person),
            relation: relation
                .parse()
                .map_err(|e: String| CatalogError::validation(EntityKind::PersonRelation, "relation", e))?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct GroupLink {
    pub resource_uuid: String,
    pub group_uuid: String,
    pub group_index: Option<i64>,
    pub relation_tag: String,
}

impl Entry for GroupLink {
    type Prop = GroupLinkProp;
    const KIND: EntityKind = EntityKind::GroupRelation;

    fn get(&self, prop: GroupLinkProp) -> FieldValue {
        match prop {
            GroupLinkProp::Resource => self.resource_uuid.as_str().into(),
            GroupLinkProp::Group => self.group_uuid.as_str().into(),
            GroupLinkProp::GroupIndex => self.group_index.into(),
            GroupLinkProp::RelationTag => self.relation_tag.as_str().into(),
        }
    }
    fn from_values(mut row: FieldRow<GroupLinkProp>, _: &dyn ForeignLookup) -> Result<Self> {
        Ok(Self {
            resource_uuid: row.text(GroupLinkProp::Resource),
            group_uuid: row.text(GroupLinkProp::Group),
            group_index: row.integer(GroupLinkProp::GroupIndex),
            relation_tag: row.text(GroupLinkProp::RelationTag),
        })
    }
}

/// A person as related to one resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedPerson {
    pub person: Person,
    pub relation: PersonRelation,
}

/// A group as related to one resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedGroup {
    pub group: Group,
    pub group_index: Option<i64>,
    pub relation_tag: String,
}

/// A resource together with everything related to it, in declared order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmalgamatedResource {
    pub resource: Resource,
    pub persons: Vec<RelatedPerson>,
    pub groups: Vec<RelatedGroup>,
    pub objects: Vec<ObjectRelation>,
}

impl AmalgamatedResource {
    pub fn persons_with(&self, relation: PersonRelation) -> impl Iterator<Item = &Person> + '_ {
        self.persons
            .iter()
            .filter(move |p| p.relation == relation)
            .map(|p| &p.person)
    }
    pub fn groups_of(&self, type_uuid: &str) -> impl Iterator<Item = &RelatedGroup> + '_ {
        let type_uuid = type_uuid.to_string();
        self.groups
            .iter()
            .filter(move |g| g.group.group_type.uuid == type_uuid)
    }
}
