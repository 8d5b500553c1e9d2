// used for persistence
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::construct::{EntityKind, SERIES_TYPE_UUID, TAG_TYPE_UUID};
use crate::entry::generate_uuid;
use crate::error::{CatalogError, Result};

/// The highest store version this code can read and write.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

/// Owns the connection and speaks the backing-store contract: parameterized
/// statements and queries, named savepoints, and string-valued options.
pub struct Persistor {
    connection: Connection,
    savepoints: Vec<String>,
    opened: u64,
    created: bool,
}

impl Persistor {
    pub fn open(mode: &PersistenceMode) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        connection.pragma_update(None, "foreign_keys", true)?;
        let fresh = !table_exists(&connection, "options")?;
        connection.execute_batch(&schema())?;
        let mut persistor = Persistor {
            connection,
            savepoints: Vec::new(),
            opened: 0,
            created: fresh,
        };
        persistor.check_version()?;
        info!(?mode, created = fresh, "opened library store");
        Ok(persistor)
    }

    /// True when this open created the schema.
    pub fn created(&self) -> bool {
        self.created
    }

    fn check_version(&mut self) -> Result<()> {
        match self.get_option("version")? {
            None => {
                self.set_option("version", &CURRENT_VERSION.to_string())?;
                self.set_option("uuid", &generate_uuid())?;
                info!(version = CURRENT_VERSION, "initialized store options");
                Ok(())
            }
            Some(text) => {
                let found: u32 = text
                    .trim()
                    .parse()
                    .map_err(|_| CatalogError::Persistence(format!("unreadable store version '{}'", text)))?;
                if found > CURRENT_VERSION {
                    warn!(found, supported = CURRENT_VERSION, "refusing to open a newer store");
                    return Err(CatalogError::SchemaVersion {
                        found,
                        supported: CURRENT_VERSION,
                    });
                }
                Ok(())
            }
        }
    }

    // ------------- Options -------------
    pub fn get_option(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .connection
            .prepare_cached("select value from options where name = ?")?
            .query_row(params![name], |r| r.get(0))
            .optional()?)
    }
    pub fn set_option(&self, name: &str, value: &str) -> Result<()> {
        self.connection
            .prepare_cached(
                "insert into options (name, value) values (?1, ?2)
                 on conflict(name) do update set value = excluded.value",
            )?
            .execute(params![name, value])?;
        Ok(())
    }

    // ------------- Statements -------------
    /// Runs a write and returns the number of affected rows. Constraint
    /// violations are reported against `kind`.
    pub fn execute(&self, kind: EntityKind, sql: &str, values: &[SqlValue]) -> Result<usize> {
        debug!(%kind, sql, params = values.len(), "execute");
        let mut statement = self.connection.prepare_cached(sql)?;
        statement
            .execute(params_from_iter(values.iter()))
            .map_err(|e| constraint_error(kind, e))
    }

    /// Runs a write and returns the row id it generated.
    pub fn insert(&self, kind: EntityKind, sql: &str, values: &[SqlValue]) -> Result<i64> {
        self.execute(kind, sql, values)?;
        Ok(self.connection.last_insert_rowid())
    }

    pub fn query<T>(
        &self,
        sql: &str,
        values: &[SqlValue],
        mut map: impl FnMut(&Row<'_>) -> Result<T>,
    ) -> Result<Vec<T>> {
        debug!(sql, params = values.len(), "query");
        let mut statement = self.connection.prepare_cached(sql)?;
        let mut rows = statement.query(params_from_iter(values.iter()))?;
        let mut found = Vec::new();
        while let Some(row) = rows.next()? {
            found.push(map(row)?);
        }
        Ok(found)
    }

    pub fn count(&self, sql: &str, values: &[SqlValue]) -> Result<usize> {
        let counts = self.query(sql, values, |r| Ok(r.get::<_, i64>(0)?))?;
        Ok(counts.first().copied().unwrap_or(0).max(0) as usize)
    }

    // ------------- Savepoints -------------
    pub fn begin(&mut self) -> Result<()> {
        self.opened += 1;
        let name = format!("bookcase_{}", self.opened);
        self.connection.execute_batch(&format!("savepoint {}", name))?;
        debug!(savepoint = %name, depth = self.savepoints.len() + 1, "begin");
        self.savepoints.push(name);
        Ok(())
    }
    pub fn commit(&mut self) -> Result<()> {
        let name = self.innermost()?;
        self.connection.execute_batch(&format!("release {}", name))?;
        debug!(savepoint = %name, "commit");
        self.savepoints.pop();
        Ok(())
    }
    pub fn rollback(&mut self) -> Result<()> {
        let name = self.innermost()?;
        self.connection
            .execute_batch(&format!("rollback to {0}; release {0}", name))?;
        debug!(savepoint = %name, "rollback");
        self.savepoints.pop();
        Ok(())
    }
    pub fn depth(&self) -> usize {
        self.savepoints.len()
    }
    fn innermost(&self) -> Result<String> {
        self.savepoints
            .last()
            .cloned()
            .ok_or_else(|| CatalogError::Persistence("no open transaction".into()))
    }
}

fn table_exists(connection: &Connection, table: &str) -> Result<bool> {
    Ok(connection
        .prepare_cached("select 1 from sqlite_master where type = 'table' and name = ?")?
        .exists(params![table])?)
}

/// Uniqueness indexes report duplicates; triggers and foreign keys report
/// integrity violations. Everything else is a plain persistence error.
fn constraint_error(kind: EntityKind, error: rusqlite::Error) -> CatalogError {
    use rusqlite::ffi;
    if let rusqlite::Error::SqliteFailure(failure, message) = &error {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            let message = message.clone().unwrap_or_else(|| failure.to_string());
            warn!(%kind, %message, "constraint violated");
            return match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    CatalogError::duplicate(kind, message)
                }
                _ => CatalogError::integrity(kind, message),
            };
        }
    }
    error.into()
}

// The "STRICT" keyword is left out so the file stays readable by older tools.
fn schema() -> String {
    format!(
        "
        create table if not exists options (
            name text not null,
            value text not null,
            constraint unique_option primary key (name)
        );
        create table if not exists resources (
            uuid text not null,
            title text not null,
            title_sort text not null,
            rating integer null check (rating between 0 and 500),
            add_date integer not null,
            last_modify_date integer not null,
            publish_date text null,
            publisher text not null,
            description text not null,
            constraint referenceable_resource primary key (uuid)
        );
        create table if not exists persons (
            uuid text not null,
            name text not null,
            name_sort text not null,
            constraint referenceable_person primary key (uuid)
        );
        create table if not exists group_types (
            uuid text not null,
            name text not null collate nocase,
            is_exclusive integer not null,
            is_ordered integer not null,
            constraint referenceable_group_type primary key (uuid),
            constraint unique_group_type_name unique (name)
        );
        create table if not exists groups (
            uuid text not null,
            title text not null,
            title_sort text not null,
            type_uuid text not null,
            constraint referenceable_group primary key (uuid),
            constraint group_has_type foreign key (type_uuid) references group_types(uuid)
        );
        create index if not exists groups_by_type on groups (type_uuid);
        create table if not exists res_objects (
            id integer primary key autoincrement,
            resource_uuid text not null,
            object_uuid text not null,
            role text not null,
            tag text not null,
            constraint object_of_resource foreign key (resource_uuid)
                references resources(uuid) on delete cascade,
            constraint unique_object unique (resource_uuid, object_uuid, role, tag)
        );
        create table if not exists res_persons (
            resource_uuid text not null,
            person_uuid text not null,
            relation text not null,
            constraint person_of_resource foreign key (resource_uuid)
                references resources(uuid) on delete cascade,
            constraint resource_of_person foreign key (person_uuid)
                references persons(uuid) on delete cascade,
            constraint unique_person_relation unique (resource_uuid, person_uuid, relation)
        );
        create index if not exists res_persons_by_person on res_persons (person_uuid);
        create table if not exists res_groups (
            resource_uuid text not null,
            group_uuid text not null,
            group_index integer not null default -1,
            relation_tag text not null default '',
            constraint group_of_resource foreign key (resource_uuid)
                references resources(uuid) on delete cascade,
            constraint resource_of_group foreign key (group_uuid)
                references groups(uuid) on delete cascade,
            constraint unique_group_relation unique (resource_uuid, group_uuid, group_index, relation_tag)
        );
        create index if not exists res_groups_by_group on res_groups (group_uuid);
        create trigger if not exists res_groups_exclusive
        before insert on res_groups
        when exists (
            select 1
              from groups g
              join group_types t
                on t.uuid = g.type_uuid
             where g.uuid = new.group_uuid
               and t.is_exclusive = 1
        ) and exists (
            select 1
              from res_groups rg
              join groups g
                on g.uuid = rg.group_uuid
             where rg.resource_uuid = new.resource_uuid
               and g.type_uuid = (select type_uuid from groups where uuid = new.group_uuid)
        )
        begin
            select raise(abort, 'resource already relates to a group of this exclusive type');
        end;
        create trigger if not exists groups_type_change
        before update of type_uuid on groups
        when new.type_uuid <> old.type_uuid and ((
            exists (
                select 1
                  from group_types t
                 where t.uuid = new.type_uuid
                   and t.is_exclusive = 1
            ) and exists (
                select 1
                  from res_groups rg
                 where rg.group_uuid = new.uuid
                   and (select count(*)
                          from res_groups other
                          join groups g
                            on g.uuid = other.group_uuid
                         where other.resource_uuid = rg.resource_uuid
                           and (other.group_uuid = new.uuid or g.type_uuid = new.type_uuid)) > 1
            )
        ) or (
            exists (
                select 1
                  from group_types t
                 where t.uuid = new.type_uuid
                   and t.is_ordered = 0
            ) and exists (
                select 1
                  from res_groups rg
                 where rg.group_uuid = new.uuid
                   and rg.group_index >= 0
            )
        ))
        begin
            select raise(abort, 'existing relations break the rules of the new group type');
        end;
        create view if not exists resource_summaries as
        select r.uuid as uuid,
               (select group_concat(p.name, ' & ' order by rp.rowid)
                  from res_persons rp
                  join persons p on p.uuid = rp.person_uuid
                 where rp.resource_uuid = r.uuid
                   and rp.relation = 'author') as authors,
               (select group_concat(g.title, ', ' order by rg.rowid)
                  from res_groups rg
                  join groups g on g.uuid = rg.group_uuid
                 where rg.resource_uuid = r.uuid
                   and g.type_uuid = '{tag}') as tags,
               (select g.title
                  from res_groups rg
                  join groups g on g.uuid = rg.group_uuid
                 where rg.resource_uuid = r.uuid
                   and g.type_uuid = '{series}'
                 order by rg.rowid
                 limit 1) as series,
               (select case when rg.group_index >= 0 then rg.group_index end
                  from res_groups rg
                  join groups g on g.uuid = rg.group_uuid
                 where rg.resource_uuid = r.uuid
                   and g.type_uuid = '{series}'
                 order by rg.rowid
                 limit 1) as series_index
          from resources r;
        ",
        tag = TAG_TYPE_UUID,
        series = SERIES_TYPE_UUID,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_round_trip_and_version_is_recorded() {
        let persistor = Persistor::open(&PersistenceMode::InMemory).unwrap();
        assert!(persistor.created());
        assert_eq!(persistor.get_option("version").unwrap(), Some("1".into()));
        assert!(persistor.get_option("uuid").unwrap().is_some());
        persistor.set_option("theme", "dark").unwrap();
        persistor.set_option("theme", "light").unwrap();
        assert_eq!(persistor.get_option("theme").unwrap(), Some("light".into()));
        assert_eq!(persistor.get_option("missing").unwrap(), None);
    }

    #[test]
    fn savepoints_nest() {
        let mut persistor = Persistor::open(&PersistenceMode::InMemory).unwrap();
        persistor.begin().unwrap();
        persistor.set_option("outer", "1").unwrap();
        persistor.begin().unwrap();
        persistor.set_option("inner", "1").unwrap();
        persistor.rollback().unwrap();
        persistor.commit().unwrap();
        assert_eq!(persistor.depth(), 0);
        assert_eq!(persistor.get_option("outer").unwrap(), Some("1".into()));
        assert_eq!(persistor.get_option("inner").unwrap(), None);
        assert!(persistor.commit().is_err());
    }

    #[test]
    fn unique_violations_are_duplicates() {
        let persistor = Persistor::open(&PersistenceMode::InMemory).unwrap();
        let sql = "insert into persons (uuid, name, name_sort) values (?1, ?2, ?3)";
        let values = vec![
            SqlValue::Text("p".into()),
            SqlValue::Text("Ann".into()),
            SqlValue::Text("Ann".into()),
        ];
        persistor.execute(EntityKind::Person, sql, &values).unwrap();
        let error = persistor.execute(EntityKind::Person, sql, &values).unwrap_err();
        assert!(matches!(error, CatalogError::Duplicate { kind: EntityKind::Person, .. }));
    }
}
