//! The relational entity store.
//!
//! [`LibraryDatabase`] wires a [`Persistor`] together with the in-memory
//! [`GroupTypeKeeper`] and offers typed CRUD, relation management and
//! criteria-based finders. Every relation-bearing write runs the same steps:
//! referenced entities exist, type-level constraints hold, the row is not a
//! duplicate, then the row is persisted and caches are updated. A failed step
//! leaves the store untouched.
//!
//! The store locks the persistor before the keeper whenever it needs both.

use bimap::BiMap;
use rusqlite::Row;
use rusqlite::types::Value as SqlValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::construct::{
    is_known_group_type, known_group_types, AmalgamatedResource, AsUuid, EntityKind, Group,
    GroupLink, GroupPatch, GroupType, GroupTypePatch, ObjectRelation, ObjectRelationPatch,
    OtherHasher, Person, PersonLink, PersonPatch, RelatedGroup, RelatedPerson, Resource,
    ResourcePatch,
};
use crate::criteria::{Compiler, Criterion, Scope};
use crate::datatype::{FieldValue, ObjectRole, PersonRelation, Timestamp};
use crate::entry::{
    generate_uuid, insert_statement, read_entry, select_columns, update_statement, Entry, ForeignLookup,
    GroupLinkProp, GroupProp, Patch, PersonProp, Property, ResourceProp,
};
use crate::error::{CatalogError, Result};
use crate::persist::{PersistenceMode, Persistor};
use crate::sort::{order_by, QueryOptions};

// ------------- GroupTypeKeeper -------------
/// Group types are few and read on every group row, so all of them are kept
/// in memory, indexed both by uuid and by (case-insensitive) name.
#[derive(Debug, Default)]
pub struct GroupTypeKeeper {
    kept: HashMap<String, GroupType, OtherHasher>,
    names: BiMap<String, String>,
}
impl GroupTypeKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn keep(&mut self, group_type: GroupType) {
        self.names
            .insert(group_type.name.to_lowercase(), group_type.uuid.clone());
        self.kept.insert(group_type.uuid.clone(), group_type);
    }
    pub fn forget(&mut self, uuid: &str) -> Option<GroupType> {
        self.names.remove_by_right(uuid);
        self.kept.remove(uuid)
    }
    pub fn get(&self, uuid: &str) -> Option<&GroupType> {
        self.kept.get(uuid)
    }
    pub fn by_name(&self, name: &str) -> Option<&GroupType> {
        self.names
            .get_by_left(name.trim().to_lowercase().as_str())
            .and_then(|uuid| self.kept.get(uuid))
    }
    /// Every kept group type, ordered by name.
    pub fn all(&self) -> Vec<GroupType> {
        let mut all: Vec<GroupType> = self.kept.values().cloned().collect();
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    fn clear(&mut self) {
        self.kept.clear();
        self.names.clear();
    }
}
impl ForeignLookup for GroupTypeKeeper {
    fn group_type(&self, uuid: &str) -> Option<GroupType> {
        self.get(uuid).cloned()
    }
}

/// Resource patches always move `lastModifyDate` forward.
struct Stamped<'a> {
    patch: &'a ResourcePatch,
    modified: Timestamp,
}
impl Patch for Stamped<'_> {
    type Target = Resource;
    fn assignments(&self) -> Vec<(ResourceProp, FieldValue)> {
        let mut set = self.patch.assignments();
        set.push((ResourceProp::LastModifyDate, self.modified.into()));
        set
    }
}

/// How the rows related to one resource are reached.
struct RelatedQuery<'a> {
    scope: Scope,
    from: &'a str,
    anchor: &'a str,
    declared: &'a str,
    columns: String,
}

fn key(uuid: &impl AsUuid) -> String {
    uuid.as_uuid().trim().to_lowercase()
}

fn poisoned(what: &str) -> CatalogError {
    CatalogError::Persistence(format!("the {} lock is poisoned", what))
}

// ------------- LibraryDatabase -------------
pub struct LibraryDatabase {
    persistor: Arc<Mutex<Persistor>>,
    group_types: Arc<Mutex<GroupTypeKeeper>>,
    uuid: String,
}

impl LibraryDatabase {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let persistor = Persistor::open(&mode)?;
        let uuid = persistor.get_option("uuid")?.unwrap_or_default();
        let database = Self {
            persistor: Arc::new(Mutex::new(persistor)),
            group_types: Arc::new(Mutex::new(GroupTypeKeeper::new())),
            uuid,
        };
        database.reload_group_types()?;
        database.seed_known_group_types()?;
        Ok(database)
    }
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.database.mode())
    }
    /// Identity of the store, generated when it was created.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
    pub fn persistor(&self) -> Arc<Mutex<Persistor>> {
        Arc::clone(&self.persistor)
    }
    pub fn group_type_keeper(&self) -> Arc<Mutex<GroupTypeKeeper>> {
        Arc::clone(&self.group_types)
    }

    fn store(&self) -> Result<MutexGuard<'_, Persistor>> {
        self.persistor.lock().map_err(|_| poisoned("persistor"))
    }
    fn keeper(&self) -> Result<MutexGuard<'_, GroupTypeKeeper>> {
        self.group_types.lock().map_err(|_| poisoned("group type"))
    }

    fn reload_group_types(&self) -> Result<()> {
        let sql = format!("select {} from group_types o", select_columns::<GroupType>("o"));
        let store = self.store()?;
        let mut keeper = self.keeper()?;
        let loaded = store.query(&sql, &[], |row| read_entry::<GroupType>(row, 0, &*keeper))?;
        keeper.clear();
        for group_type in loaded {
            keeper.keep(group_type);
        }
        debug!(count = keeper.len(), "loaded group types");
        Ok(())
    }

    fn seed_known_group_types(&self) -> Result<()> {
        for group_type in known_group_types() {
            if self.keeper()?.get(&group_type.uuid).is_some() {
                continue;
            }
            self.insert_entry(&group_type)?;
            info!(uuid = %group_type.uuid, name = %group_type.name, "seeded group type");
            self.keeper()?.keep(group_type);
        }
        Ok(())
    }

    // ------------- Generic entry access -------------
    fn insert_entry<E: Entry>(&self, entry: &E) -> Result<i64> {
        let (sql, values) = insert_statement(entry)?;
        self.store()?.insert(E::KIND, &sql, &values)
    }

    fn get_entry<E: Entry>(&self, key: SqlValue) -> Result<Option<E>> {
        let sql = format!(
            "select {} from {} o where o.{} = ?",
            select_columns::<E>("o"),
            E::KIND.table(),
            E::KIND.key_column()
        );
        let store = self.store()?;
        let keeper = self.keeper()?;
        let mut found = store.query(&sql, &[key], |row| read_entry::<E>(row, 0, &*keeper))?;
        Ok(found.pop())
    }

    fn update_entry<P: Patch>(&self, patch: &P, key: &FieldValue, shown: &str) -> Result<()> {
        let kind = <P::Target as Entry>::KIND;
        if let Some((sql, values)) = update_statement(patch, key)? {
            if self.store()?.execute(kind, &sql, &values)? == 0 {
                return Err(CatalogError::not_found(kind, shown));
            }
        }
        Ok(())
    }

    fn remove_entry(&self, kind: EntityKind, key: SqlValue, shown: &str) -> Result<()> {
        let sql = format!("delete from {} where {} = ?", kind.table(), kind.key_column());
        if self.store()?.execute(kind, &sql, &[key])? == 0 {
            warn!(%kind, key = %shown, "nothing to remove");
            return Err(CatalogError::not_found(kind, shown));
        }
        info!(%kind, key = %shown, "removed");
        Ok(())
    }

    fn find_entries<E: Entry>(&self, criterion: Option<&Criterion>, options: &QueryOptions) -> Result<Vec<E>> {
        let scope = Scope::entity(E::KIND);
        let mut compiler = Compiler::new();
        let filter = match criterion {
            Some(criterion) => format!(" where {}", compiler.filter(&scope, criterion)?),
            None => String::new(),
        };
        let order = order_by(&mut compiler, &scope, &options.sort, None)?;
        let (limit, limit_params) = options.limit_clause();
        let sql = format!(
            "select {} from {} o{} {} {}",
            select_columns::<E>("o"),
            E::KIND.table(),
            filter,
            order,
            limit
        );
        let mut params = compiler.into_params();
        params.extend(limit_params);
        let store = self.store()?;
        let keeper = self.keeper()?;
        store.query(&sql, &params, |row| read_entry::<E>(row, 0, &*keeper))
    }

    fn count_entries(&self, kind: EntityKind, criterion: Option<&Criterion>) -> Result<usize> {
        let scope = Scope::entity(kind);
        let mut compiler = Compiler::new();
        let filter = match criterion {
            Some(criterion) => format!(" where {}", compiler.filter(&scope, criterion)?),
            None => String::new(),
        };
        let sql = format!("select count(*) from {} o{}", kind.table(), filter);
        self.store()?.count(&sql, compiler.params())
    }

    fn related<T>(
        &self,
        resource: &str,
        query: RelatedQuery<'_>,
        criterion: Option<&Criterion>,
        options: &QueryOptions,
        mut read: impl FnMut(&Row<'_>, &dyn ForeignLookup) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.get_resource(resource)?;
        let mut compiler = Compiler::new();
        let filter = match criterion {
            Some(criterion) => format!(" and {}", compiler.filter(&query.scope, criterion)?),
            None => String::new(),
        };
        let order = order_by(&mut compiler, &query.scope, &options.sort, Some(query.declared))?;
        let (limit, limit_params) = options.limit_clause();
        let sql = format!(
            "select {} from {} where {} = ?{} {} {}",
            query.columns, query.from, query.anchor, filter, order, limit
        );
        let mut params = vec![SqlValue::Text(resource.to_string())];
        params.extend(compiler.into_params());
        params.extend(limit_params);
        let store = self.store()?;
        let keeper = self.keeper()?;
        store.query(&sql, &params, |row| read(row, &*keeper))
    }

    // ------------- Resources -------------
    pub fn add_resource(&self, mut resource: Resource) -> Result<Resource> {
        resource.uuid = match key(&resource.uuid) {
            empty if empty.is_empty() => generate_uuid(),
            given => given,
        };
        self.insert_entry(&resource)?;
        info!(uuid = %resource.uuid, title = %resource.title, "added resource");
        Ok(resource)
    }
    pub fn get_resource(&self, uuid: impl AsUuid) -> Result<Resource> {
        let uuid = key(&uuid);
        self.get_entry(SqlValue::Text(uuid.clone()))?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Resource, uuid))
    }
    pub fn update_resource(&self, uuid: impl AsUuid, patch: &ResourcePatch) -> Result<Resource> {
        let uuid = key(&uuid);
        let current = self.get_resource(&uuid)?;
        let stamped = Stamped {
            patch,
            modified: Timestamp::after(current.last_modify_date),
        };
        self.update_entry(&stamped, &FieldValue::Text(uuid.clone()), &uuid)?;
        debug!(%uuid, "updated resource");
        self.get_resource(&uuid)
    }
    pub fn remove_resource(&self, uuid: impl AsUuid) -> Result<()> {
        let uuid = key(&uuid);
        self.remove_entry(EntityKind::Resource, SqlValue::Text(uuid.clone()), &uuid)
    }
    pub fn find_resources(&self, criterion: Option<&Criterion>, options: &QueryOptions) -> Result<Vec<Resource>> {
        self.find_entries(criterion, options)
    }
    pub fn count_resources(&self, criterion: Option<&Criterion>) -> Result<usize> {
        self.count_entries(EntityKind::Resource, criterion)
    }

    // ------------- Persons -------------
    pub fn add_person(&self, mut person: Person) -> Result<Person> {
        person.uuid = match key(&person.uuid) {
            empty if empty.is_empty() => generate_uuid(),
            given => given,
        };
        self.insert_entry(&person)?;
        info!(uuid = %person.uuid, name = %person.name, "added person");
        Ok(person)
    }
    pub fn get_person(&self, uuid: impl AsUuid) -> Result<Person> {
        let uuid = key(&uuid);
        self.get_entry(SqlValue::Text(uuid.clone()))?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Person, uuid))
    }
    pub fn update_person(&self, uuid: impl AsUuid, patch: &PersonPatch) -> Result<Person> {
        let uuid = key(&uuid);
        self.update_entry(patch, &FieldValue::Text(uuid.clone()), &uuid)?;
        self.get_person(&uuid)
    }
    pub fn remove_person(&self, uuid: impl AsUuid) -> Result<()> {
        let uuid = key(&uuid);
        self.remove_entry(EntityKind::Person, SqlValue::Text(uuid.clone()), &uuid)
    }
    pub fn find_persons(&self, criterion: Option<&Criterion>, options: &QueryOptions) -> Result<Vec<Person>> {
        self.find_entries(criterion, options)
    }
    pub fn count_persons(&self, criterion: Option<&Criterion>) -> Result<usize> {
        self.count_entries(EntityKind::Person, criterion)
    }

    // ------------- Group types -------------
    pub fn add_group_type(&self, mut group_type: GroupType) -> Result<GroupType> {
        group_type.uuid = match key(&group_type.uuid) {
            empty if empty.is_empty() => generate_uuid(),
            given => given,
        };
        if let Some(existing) = self.keeper()?.by_name(&group_type.name) {
            warn!(name = %group_type.name, existing = %existing.uuid, "group type name taken");
            return Err(CatalogError::duplicate(
                EntityKind::GroupType,
                format!("a group type named '{}' already exists", group_type.name),
            ));
        }
        self.insert_entry(&group_type)?;
        info!(uuid = %group_type.uuid, name = %group_type.name, "added group type");
        self.keeper()?.keep(group_type.clone());
        Ok(group_type)
    }
    pub fn get_group_type(&self, uuid: impl AsUuid) -> Result<GroupType> {
        let uuid = key(&uuid);
        self.keeper()?
            .group_type(&uuid)
            .ok_or_else(|| CatalogError::not_found(EntityKind::GroupType, uuid))
    }
    pub fn get_group_type_by_name(&self, name: &str) -> Result<GroupType> {
        self.keeper()?
            .by_name(name)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(EntityKind::GroupType, name))
    }
    pub fn group_types(&self) -> Result<Vec<GroupType>> {
        Ok(self.keeper()?.all())
    }
    pub fn update_group_type(&self, uuid: impl AsUuid, patch: &GroupTypePatch) -> Result<GroupType> {
        let uuid = key(&uuid);
        let mut group_type = self.get_group_type(&uuid)?;
        let type_key = [SqlValue::Text(uuid.clone())];
        if patch.exclusive == Some(true) && !group_type.exclusive {
            let crowded = self.store()?.count(
                "select count(*) from (
                    select rg.resource_uuid
                      from res_groups rg
                      join groups g on g.uuid = rg.group_uuid
                     where g.type_uuid = ?
                     group by rg.resource_uuid
                    having count(*) > 1)",
                &type_key,
            )?;
            if crowded > 0 {
                return Err(CatalogError::integrity(
                    EntityKind::GroupType,
                    format!("{} resources relate to several groups of '{}'", crowded, group_type.name),
                ));
            }
        }
        if patch.ordered == Some(false) && group_type.ordered {
            let indexed = self.store()?.count(
                "select count(*)
                   from res_groups rg
                   join groups g on g.uuid = rg.group_uuid
                  where g.type_uuid = ?
                    and rg.group_index >= 0",
                &type_key,
            )?;
            if indexed > 0 {
                return Err(CatalogError::integrity(
                    EntityKind::GroupType,
                    format!("{} relations to groups of '{}' carry an index", indexed, group_type.name),
                ));
            }
        }
        if let Some(name) = &patch.name {
            if let Some(other) = self.keeper()?.by_name(name) {
                if other.uuid != uuid {
                    return Err(CatalogError::duplicate(
                        EntityKind::GroupType,
                        format!("a group type named '{}' already exists", name),
                    ));
                }
            }
        }
        self.update_entry(patch, &FieldValue::Text(uuid.clone()), &uuid)?;
        patch.apply(&mut group_type);
        self.keeper()?.keep(group_type.clone());
        info!(%uuid, name = %group_type.name, "updated group type");
        Ok(group_type)
    }
    pub fn remove_group_type(&self, uuid: impl AsUuid) -> Result<()> {
        let uuid = key(&uuid);
        let group_type = self.get_group_type(&uuid)?;
        if is_known_group_type(&uuid) {
            warn!(%uuid, "refusing to remove a well-known group type");
            return Err(CatalogError::integrity(
                EntityKind::GroupType,
                format!("'{}' is a well-known group type", group_type.name),
            ));
        }
        let groups = self.count_groups(Some(&Criterion::equal("groupType", uuid.as_str())))?;
        if groups > 0 {
            return Err(CatalogError::integrity(
                EntityKind::GroupType,
                format!("{} groups are of type '{}'", groups, group_type.name),
            ));
        }
        self.remove_entry(EntityKind::GroupType, SqlValue::Text(uuid.clone()), &uuid)?;
        self.keeper()?.forget(&uuid);
        Ok(())
    }
    pub fn find_group_types(&self, criterion: Option<&Criterion>, options: &QueryOptions) -> Result<Vec<GroupType>> {
        self.find_entries(criterion, options)
    }

    // ------------- Groups -------------
    pub fn add_group(&self, mut group: Group) -> Result<Group> {
        group.uuid = match key(&group.uuid) {
            empty if empty.is_empty() => generate_uuid(),
            given => given,
        };
        group.group_type = self.get_group_type(&group.group_type.uuid)?;
        self.insert_entry(&group)?;
        info!(uuid = %group.uuid, title = %group.title, group_type = %group.group_type.name, "added group");
        Ok(group)
    }
    pub fn get_group(&self, uuid: impl AsUuid) -> Result<Group> {
        let uuid = key(&uuid);
        self.get_entry(SqlValue::Text(uuid.clone()))?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Group, uuid))
    }
    pub fn update_group(&self, uuid: impl AsUuid, patch: &GroupPatch) -> Result<Group> {
        let uuid = key(&uuid);
        if let Some(type_uuid) = &patch.group_type {
            let target = self.get_group_type(type_uuid)?;
            let group_key = SqlValue::Text(uuid.clone());
            if target.exclusive {
                let crowded = self.store()?.count(
                    "select count(distinct rg.resource_uuid)
                       from res_groups rg
                      where rg.group_uuid = ?1
                        and (select count(*)
                               from res_groups other
                               join groups g on g.uuid = other.group_uuid
                              where other.resource_uuid = rg.resource_uuid
                                and (other.group_uuid = ?1 or g.type_uuid = ?2)) > 1",
                    &[group_key.clone(), SqlValue::Text(target.uuid.clone())],
                )?;
                if crowded > 0 {
                    return Err(CatalogError::integrity(
                        EntityKind::Group,
                        format!("{} resources would relate to several groups of '{}'", crowded, target.name),
                    ));
                }
            }
            if !target.ordered {
                let indexed = self.store()?.count(
                    "select count(*) from res_groups where group_uuid = ? and group_index >= 0",
                    &[group_key],
                )?;
                if indexed > 0 {
                    return Err(CatalogError::integrity(
                        EntityKind::Group,
                        format!("{} relations carry an index but '{}' is unordered", indexed, target.name),
                    ));
                }
            }
        }
        self.update_entry(patch, &FieldValue::Text(uuid.clone()), &uuid)?;
        self.get_group(&uuid)
    }
    pub fn remove_group(&self, uuid: impl AsUuid) -> Result<()> {
        let uuid = key(&uuid);
        self.remove_entry(EntityKind::Group, SqlValue::Text(uuid.clone()), &uuid)
    }
    pub fn find_groups(&self, criterion: Option<&Criterion>, options: &QueryOptions) -> Result<Vec<Group>> {
        self.find_entries(criterion, options)
    }
    pub fn count_groups(&self, criterion: Option<&Criterion>) -> Result<usize> {
        self.count_entries(EntityKind::Group, criterion)
    }

    // ------------- Object relations -------------
    pub fn add_object_relation(&self, resource: impl AsUuid, mut object: ObjectRelation) -> Result<ObjectRelation> {
        object.resource_uuid = self.get_resource(resource)?.uuid;
        object.uuid = match key(&object.uuid) {
            empty if empty.is_empty() => generate_uuid(),
            given => given,
        };
        object.id = self.insert_entry(&object)?;
        info!(id = object.id, resource = %object.resource_uuid, role = %object.role, tag = %object.tag, "added object relation");
        Ok(object)
    }
    pub fn get_object_relation(&self, id: i64) -> Result<ObjectRelation> {
        self.get_entry(SqlValue::Integer(id))?
            .ok_or_else(|| CatalogError::not_found(EntityKind::ObjectRelation, id.to_string()))
    }
    pub fn update_object_relation(&self, id: i64, patch: &ObjectRelationPatch) -> Result<ObjectRelation> {
        self.update_entry(patch, &FieldValue::Integer(id), &id.to_string())?;
        self.get_object_relation(id)
    }
    pub fn remove_object_relation(&self, id: i64) -> Result<()> {
        self.remove_entry(EntityKind::ObjectRelation, SqlValue::Integer(id), &id.to_string())
    }
    /// Each omitted argument widens the deletion; returns the number removed.
    pub fn remove_object_relations(
        &self,
        resource: impl AsUuid,
        uuid: Option<&str>,
        role: Option<ObjectRole>,
        tag: Option<&str>,
    ) -> Result<usize> {
        let resource = key(&resource);
        let mut sql = "delete from res_objects where resource_uuid = ?".to_string();
        let mut values = vec![SqlValue::Text(resource.clone())];
        if let Some(uuid) = uuid {
            sql.push_str(" and object_uuid = ?");
            values.push(SqlValue::Text(key(&uuid)));
        }
        if let Some(role) = role {
            sql.push_str(" and role = ?");
            values.push(SqlValue::Text(role.as_str().to_string()));
        }
        if let Some(tag) = tag {
            sql.push_str(" and tag = ?");
            values.push(SqlValue::Text(tag.to_string()));
        }
        let removed = self.store()?.execute(EntityKind::ObjectRelation, &sql, &values)?;
        info!(%resource, removed, "removed object relations");
        Ok(removed)
    }
    pub fn related_objects(
        &self,
        resource: impl AsUuid,
        criterion: Option<&Criterion>,
        options: &QueryOptions,
    ) -> Result<Vec<ObjectRelation>> {
        let query = RelatedQuery {
            scope: Scope::entity(EntityKind::ObjectRelation),
            from: "res_objects o",
            anchor: "o.resource_uuid",
            declared: "o.id",
            columns: select_columns::<ObjectRelation>("o"),
        };
        self.related(&key(&resource), query, criterion, options, |row, foreign| {
            read_entry::<ObjectRelation>(row, 0, foreign)
        })
    }
    pub fn find_object_relations(
        &self,
        criterion: Option<&Criterion>,
        options: &QueryOptions,
    ) -> Result<Vec<ObjectRelation>> {
        self.find_entries(criterion, options)
    }
    pub fn count_object_relations(&self, criterion: Option<&Criterion>) -> Result<usize> {
        self.count_entries(EntityKind::ObjectRelation, criterion)
    }

    // ------------- Person relations -------------
    pub fn add_person_relation(
        &self,
        resource: impl AsUuid,
        person: impl AsUuid,
        relation: PersonRelation,
    ) -> Result<()> {
        let resource = self.get_resource(resource)?.uuid;
        let person = self.get_person(person)?.uuid;
        let existing = self.store()?.count(
            "select count(*) from res_persons where resource_uuid = ? and person_uuid = ? and relation = ?",
            &[
                SqlValue::Text(resource.clone()),
                SqlValue::Text(person.clone()),
                SqlValue::Text(relation.as_str().to_string()),
            ],
        )?;
        if existing > 0 {
            warn!(%resource, %person, %relation, "duplicate person relation");
            return Err(CatalogError::duplicate(
                EntityKind::PersonRelation,
                format!("person '{}' is already {} of '{}'", person, relation, resource),
            ));
        }
        self.insert_entry(&PersonLink {
            resource_uuid: resource.clone(),
            person_uuid: person.clone(),
            relation,
        })?;
        info!(%resource, %person, %relation, "added person relation");
        Ok(())
    }
    /// Each omitted argument widens the deletion; returns the number removed.
    pub fn remove_person_relations(
        &self,
        resource: impl AsUuid,
        person: Option<&str>,
        relation: Option<PersonRelation>,
    ) -> Result<usize> {
        let resource = key(&resource);
        let mut sql = "delete from res_persons where resource_uuid = ?".to_string();
        let mut values = vec![SqlValue::Text(resource.clone())];
        if let Some(person) = person {
            sql.push_str(" and person_uuid = ?");
            values.push(SqlValue::Text(key(&person)));
        }
        if let Some(relation) = relation {
            sql.push_str(" and relation = ?");
            values.push(SqlValue::Text(relation.as_str().to_string()));
        }
        let removed = self.store()?.execute(EntityKind::PersonRelation, &sql, &values)?;
        info!(%resource, removed, "removed person relations");
        Ok(removed)
    }
    /// Persons related to `resource`, in declared order unless sorted otherwise.
    pub fn related_persons(
        &self,
        resource: impl AsUuid,
        criterion: Option<&Criterion>,
        options: &QueryOptions,
    ) -> Result<Vec<RelatedPerson>> {
        let query = RelatedQuery {
            scope: Scope::related(EntityKind::Person, EntityKind::PersonRelation),
            from: "res_persons l join persons o on o.uuid = l.person_uuid",
            anchor: "l.resource_uuid",
            declared: "l.rowid",
            columns: format!(
                "{}, {}",
                select_columns::<Person>("o"),
                select_columns::<PersonLink>("l")
            ),
        };
        self.related(&key(&resource), query, criterion, options, |row, foreign| {
            let person = read_entry::<Person>(row, 0, foreign)?;
            let link = read_entry::<PersonLink>(row, PersonProp::ALL.len(), foreign)?;
            Ok(RelatedPerson {
                person,
                relation: link.relation,
            })
        })
    }

    // ------------- Group relations -------------
    pub fn add_group_relation(
        &self,
        resource: impl AsUuid,
        group: impl AsUuid,
        group_index: Option<i64>,
        relation_tag: Option<&str>,
    ) -> Result<()> {
        let resource = self.get_resource(resource)?.uuid;
        let group = self.get_group(group)?;
        let group_type = &group.group_type;
        if group_index.is_some() && !group_type.ordered {
            warn!(%resource, group = %group.uuid, "index on an unordered group type");
            return Err(CatalogError::validation(
                EntityKind::GroupRelation,
                GroupLinkProp::GroupIndex.name(),
                format!("group type '{}' is not ordered", group_type.name),
            ));
        }
        GroupLinkProp::GroupIndex
            .spec()
            .to_storage(EntityKind::GroupRelation, &group_index.into())?;
        if group_type.exclusive {
            let held = self.store()?.count(
                "select count(*)
                   from res_groups rg
                   join groups g on g.uuid = rg.group_uuid
                  where rg.resource_uuid = ?
                    and g.type_uuid = ?",
                &[
                    SqlValue::Text(resource.clone()),
                    SqlValue::Text(group_type.uuid.clone()),
                ],
            )?;
            if held > 0 {
                warn!(%resource, group = %group.uuid, group_type = %group_type.name, "exclusive group type already held");
                return Err(CatalogError::integrity(
                    EntityKind::GroupRelation,
                    format!(
                        "resource '{}' already relates to a group of the exclusive type '{}'",
                        resource, group_type.name
                    ),
                ));
            }
        }
        let link = GroupLink {
            resource_uuid: resource.clone(),
            group_uuid: group.uuid.clone(),
            group_index,
            relation_tag: relation_tag.unwrap_or_default().to_string(),
        };
        let existing = self.store()?.count(
            "select count(*) from res_groups
              where resource_uuid = ? and group_uuid = ? and group_index = ? and relation_tag = ?",
            &[
                SqlValue::Text(link.resource_uuid.clone()),
                SqlValue::Text(link.group_uuid.clone()),
                SqlValue::Integer(group_index.unwrap_or(-1)),
                SqlValue::Text(link.relation_tag.clone()),
            ],
        )?;
        if existing > 0 {
            return Err(CatalogError::duplicate(
                EntityKind::GroupRelation,
                format!("resource '{}' already relates to group '{}' this way", resource, group.uuid),
            ));
        }
        self.insert_entry(&link)?;
        info!(%resource, group = %group.uuid, index = ?group_index, "added group relation");
        Ok(())
    }
    /// Each omitted argument widens the deletion; returns the number removed.
    pub fn remove_group_relations(
        &self,
        resource: impl AsUuid,
        group: Option<&str>,
        group_type: Option<&str>,
        relation_tag: Option<&str>,
    ) -> Result<usize> {
        let resource = key(&resource);
        let mut sql = "delete from res_groups where resource_uuid = ?".to_string();
        let mut values = vec![SqlValue::Text(resource.clone())];
        if let Some(group) = group {
            sql.push_str(" and group_uuid = ?");
            values.push(SqlValue::Text(key(&group)));
        }
        if let Some(group_type) = group_type {
            sql.push_str(" and group_uuid in (select uuid from groups where type_uuid = ?)");
            values.push(SqlValue::Text(key(&group_type)));
        }
        if let Some(tag) = relation_tag {
            sql.push_str(" and relation_tag = ?");
            values.push(SqlValue::Text(tag.to_string()));
        }
        let removed = self.store()?.execute(EntityKind::GroupRelation, &sql, &values)?;
        info!(%resource, removed, "removed group relations");
        Ok(removed)
    }
    /// Groups related to `resource`, in declared order unless sorted otherwise.
    pub fn related_groups(
        &self,
        resource: impl AsUuid,
        criterion: Option<&Criterion>,
        options: &QueryOptions,
    ) -> Result<Vec<RelatedGroup>> {
        let query = RelatedQuery {
            scope: Scope::related(EntityKind::Group, EntityKind::GroupRelation),
            from: "res_groups l join groups o on o.uuid = l.group_uuid",
            anchor: "l.resource_uuid",
            declared: "l.rowid",
            columns: format!(
                "{}, {}",
                select_columns::<Group>("o"),
                select_columns::<GroupLink>("l")
            ),
        };
        self.related(&key(&resource), query, criterion, options, |row, foreign| {
            let group = read_entry::<Group>(row, 0, foreign)?;
            let link = read_entry::<GroupLink>(row, GroupProp::ALL.len(), foreign)?;
            Ok(RelatedGroup {
                group,
                group_index: link.group_index,
                relation_tag: link.relation_tag,
            })
        })
    }

    // ------------- Amalgamation -------------
    pub fn get_amalgamated_resource(&self, uuid: impl AsUuid) -> Result<AmalgamatedResource> {
        let resource = self.get_resource(uuid)?;
        self.amalgamate(resource)
    }
    /// Resources with everything related to them, in one call.
    pub fn find_amalgamated_resources(
        &self,
        criterion: Option<&Criterion>,
        options: &QueryOptions,
    ) -> Result<Vec<AmalgamatedResource>> {
        self.find_resources(criterion, options)?
            .into_iter()
            .map(|resource| self.amalgamate(resource))
            .collect()
    }
    fn amalgamate(&self, resource: Resource) -> Result<AmalgamatedResource> {
        let all = QueryOptions::default();
        Ok(AmalgamatedResource {
            persons: self.related_persons(&resource, None, &all)?,
            groups: self.related_groups(&resource, None, &all)?,
            objects: self.related_objects(&resource, None, &all)?,
            resource,
        })
    }

    // ------------- Transactions -------------
    pub fn begin(&self) -> Result<()> {
        self.store()?.begin()
    }
    pub fn commit(&self) -> Result<()> {
        self.store()?.commit()
    }
    /// Undoes everything since the matching [`begin`](Self::begin); the group
    /// type cache is reloaded so it never runs ahead of the table.
    pub fn rollback(&self) -> Result<()> {
        self.store()?.rollback()?;
        self.reload_group_types()
    }
    /// Runs `work` inside a savepoint, committing on success and rolling back
    /// on any error.
    pub fn transaction<T>(&self, work: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.begin()?;
        match work(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                warn!(%error, "rolling back transaction");
                self.rollback()?;
                Err(error)
            }
        }
    }
}
