//! `EntityRepository` over a borrowed SQLite connection.

use holocron_core::{
    EntityId, EntityRepository, EntityType, JoinTable, NewEntity, StoreError, StoredEntity,
    foreign_key_columns,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::{Map, Value};

use super::schema::NOW;

/// Repository for one entity table.
///
/// The repository borrows its connection, which is normally the open
/// transaction of an import phase, so every write shares that transaction.
#[derive(Debug, Clone, Copy)]
pub struct SqliteRepository<'c> {
    connection: &'c Connection,
    entity_type: EntityType,
}

struct RawRow {
    id: i64,
    natural_key: String,
    url: Option<String>,
    attributes: String,
    created: String,
    edited: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            natural_key: row.get(1)?,
            url: row.get(2)?,
            attributes: row.get(3)?,
            created: row.get(4)?,
            edited: row.get(5)?,
        })
    }

    fn decode(self) -> Result<StoredEntity, StoreError> {
        let attributes: Map<String, Value> = serde_json::from_str(&self.attributes)
            .map_err(|err| StoreError::backend("decode attributes", err))?;
        Ok(StoredEntity {
            id: EntityId::new(self.id),
            natural_key: self.natural_key,
            reference_url: self.url,
            attributes,
            created: self.created,
            edited: self.edited,
        })
    }
}

impl<'c> SqliteRepository<'c> {
    /// Repository for `entity_type` writing through `connection`.
    #[must_use]
    pub const fn new(connection: &'c Connection, entity_type: EntityType) -> Self {
        Self {
            connection,
            entity_type,
        }
    }

    fn table(&self) -> &'static str {
        self.entity_type.table_name()
    }

    fn select_one(
        &self,
        operation: &'static str,
        column: &str,
        value: &dyn rusqlite::ToSql,
    ) -> Result<Option<StoredEntity>, StoreError> {
        let sql = format!(
            "SELECT id, {key}, url, attributes, created, edited FROM {table} WHERE {column} = ?1",
            key = self.entity_type.natural_key_field(),
            table = self.table(),
        );
        self.connection
            .prepare_cached(&sql)
            .and_then(|mut statement| {
                statement
                    .query_row([value], RawRow::from_row)
                    .optional()
            })
            .map_err(|err| StoreError::backend(operation, err))?
            .map(RawRow::decode)
            .transpose()
    }

    fn find_by_id(&self, id: EntityId) -> Result<StoredEntity, StoreError> {
        self.select_one("select entity by id", "id", &id.get())?
            .ok_or(StoreError::NotFound {
                entity_type: self.entity_type,
                id,
            })
    }

    fn expect_updated(&self, changed: usize, id: EntityId) -> Result<(), StoreError> {
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity_type: self.entity_type,
                id,
            });
        }
        Ok(())
    }
}

impl EntityRepository for SqliteRepository<'_> {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn find_by_reference_url(&self, url: &str) -> Result<Option<StoredEntity>, StoreError> {
        self.select_one("select entity by url", "url", &url)
    }

    fn find_by_natural_key(&self, key: &str) -> Result<Option<StoredEntity>, StoreError> {
        self.select_one(
            "select entity by natural key",
            self.entity_type.natural_key_field(),
            &key,
        )
    }

    fn predict_next_id(&self) -> Result<EntityId, StoreError> {
        let sql = format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {}", self.table());
        self.connection
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(EntityId::new)
            .map_err(|err| StoreError::backend("predict next id", err))
    }

    fn save(&self, entity: NewEntity) -> Result<StoredEntity, StoreError> {
        let attributes = serde_json::to_string(&entity.attributes)
            .map_err(|err| StoreError::backend("encode attributes", err))?;
        let sql = format!(
            "INSERT INTO {table} ({key}, url, attributes) VALUES (?1, ?2, ?3)",
            table = self.table(),
            key = self.entity_type.natural_key_field(),
        );
        self.connection
            .prepare_cached(&sql)
            .and_then(|mut statement| {
                statement.execute(params![entity.natural_key, entity.reference_url, attributes])
            })
            .map_err(|err| StoreError::backend("insert entity", err))?;
        self.find_by_id(EntityId::new(self.connection.last_insert_rowid()))
    }

    fn update_reference_url(&self, id: EntityId, url: &str) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET url = ?1, edited = {NOW} WHERE id = ?2",
            self.table()
        );
        let changed = self
            .connection
            .execute(&sql, params![url, id.get()])
            .map_err(|err| StoreError::backend("update reference url", err))?;
        self.expect_updated(changed, id)
    }

    fn set_foreign_key(
        &self,
        id: EntityId,
        column: &'static str,
        value: Option<EntityId>,
    ) -> Result<(), StoreError> {
        if !foreign_key_columns(self.entity_type)
            .iter()
            .any(|(declared, _)| *declared == column)
        {
            return Err(StoreError::UnknownColumn {
                entity_type: self.entity_type,
                column,
            });
        }
        let sql = format!(
            "UPDATE {} SET {column} = ?1, edited = {NOW} WHERE id = ?2",
            self.table()
        );
        let changed = self
            .connection
            .prepare_cached(&sql)
            .and_then(|mut statement| {
                statement.execute(params![value.map(EntityId::get), id.get()])
            })
            .map_err(|err| StoreError::backend("set foreign key", err))?;
        self.expect_updated(changed, id)
    }

    fn bulk_insert_relations(
        &self,
        table: &JoinTable,
        pairs: &[(EntityId, EntityId)],
    ) -> Result<usize, StoreError> {
        let counterpart =
            table
                .counterpart(self.entity_type)
                .ok_or_else(|| StoreError::ForeignJoinTable {
                    entity_type: self.entity_type,
                    table: table.name(),
                })?;
        let sql = format!(
            "INSERT INTO {name} ({owner}, {related}) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            name = table.name(),
            owner = self.entity_type.key_column(),
            related = counterpart.key_column(),
        );
        let mut statement = self
            .connection
            .prepare_cached(&sql)
            .map_err(|err| StoreError::backend("prepare relation insert", err))?;
        let mut inserted = 0;
        for (owner, related) in pairs {
            inserted += statement
                .execute(params![owner.get(), related.get()])
                .map_err(|err| StoreError::backend("insert relation", err))?;
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::schema::apply_migrations;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn connection() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory database");
        apply_migrations(&mut conn).expect("apply migrations");
        conn
    }

    fn entity(key: &str, url: Option<&str>) -> NewEntity {
        let mut attributes = Map::new();
        attributes.insert("height".to_owned(), json!("172"));
        NewEntity {
            natural_key: key.to_owned(),
            reference_url: url.map(str::to_owned),
            attributes,
        }
    }

    #[rstest]
    fn saves_and_reads_back_rows(connection: Connection) {
        let people = SqliteRepository::new(&connection, EntityType::People);
        assert_eq!(people.predict_next_id().expect("predict"), EntityId::new(1));
        let saved = people
            .save(entity("Luke Skywalker", Some("http://local/api/people/1/")))
            .expect("save");
        assert_eq!(saved.id, EntityId::new(1));
        assert_eq!(saved.attributes.get("height"), Some(&json!("172")));
        assert!(!saved.created.is_empty());

        let by_url = people
            .find_by_reference_url("http://local/api/people/1/")
            .expect("lookup by url");
        assert_eq!(by_url, Some(saved.clone()));
        let by_key = people
            .find_by_natural_key("Luke Skywalker")
            .expect("lookup by key");
        assert_eq!(by_key, Some(saved));
        assert_eq!(people.predict_next_id().expect("predict"), EntityId::new(2));
    }

    #[rstest]
    fn autoincrement_gaps_break_prediction(connection: Connection) {
        let planets = SqliteRepository::new(&connection, EntityType::Planets);
        let first = planets.save(entity("Tatooine", None)).expect("save");
        connection
            .execute("DELETE FROM planets WHERE id = ?1", [first.id.get()])
            .expect("delete planet");
        assert_eq!(planets.predict_next_id().expect("predict"), EntityId::new(1));
        let second = planets.save(entity("Alderaan", None)).expect("save");
        assert_eq!(second.id, EntityId::new(2));
    }

    #[rstest]
    fn duplicate_natural_keys_are_rejected(connection: Connection) {
        let films = SqliteRepository::new(&connection, EntityType::Films);
        films.save(entity("A New Hope", None)).expect("first save");
        let err = films
            .save(entity("A New Hope", None))
            .expect_err("unique title");
        assert!(matches!(err, StoreError::Backend { operation: "insert entity", .. }));
    }

    #[rstest]
    fn sets_and_clears_foreign_keys(connection: Connection) {
        let people = SqliteRepository::new(&connection, EntityType::People);
        let planets = SqliteRepository::new(&connection, EntityType::Planets);
        let luke = people.save(entity("Luke Skywalker", None)).expect("save person");
        let tatooine = planets.save(entity("Tatooine", None)).expect("save planet");

        people
            .set_foreign_key(luke.id, "homeworld_id", Some(tatooine.id))
            .expect("set homeworld");
        let homeworld: Option<i64> = connection
            .query_row("SELECT homeworld_id FROM people WHERE id = ?1", [luke.id.get()], |row| {
                row.get(0)
            })
            .expect("read homeworld");
        assert_eq!(homeworld, Some(tatooine.id.get()));

        people
            .set_foreign_key(luke.id, "homeworld_id", None)
            .expect("clear homeworld");
        let cleared: Option<i64> = connection
            .query_row("SELECT homeworld_id FROM people WHERE id = ?1", [luke.id.get()], |row| {
                row.get(0)
            })
            .expect("read homeworld");
        assert_eq!(cleared, None);
    }

    #[rstest]
    fn rejects_undeclared_columns_and_missing_rows(connection: Connection) {
        let planets = SqliteRepository::new(&connection, EntityType::Planets);
        let err = planets
            .set_foreign_key(EntityId::new(1), "homeworld_id", None)
            .expect_err("planets have no homeworld");
        assert!(matches!(err, StoreError::UnknownColumn { .. }));

        let people = SqliteRepository::new(&connection, EntityType::People);
        let err = people
            .update_reference_url(EntityId::new(99), "http://local/api/people/99/")
            .expect_err("no such row");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[rstest]
    fn relation_inserts_skip_existing_pairs(connection: Connection) {
        let people = SqliteRepository::new(&connection, EntityType::People);
        let films = SqliteRepository::new(&connection, EntityType::Films);
        let luke = people.save(entity("Luke Skywalker", None)).expect("save person");
        let hope = films.save(entity("A New Hope", None)).expect("save film");
        let empire = films.save(entity("The Empire Strikes Back", None)).expect("save film");
        let table = JoinTable::between(EntityType::People, EntityType::Films);

        let first = people
            .bulk_insert_relations(&table, &[(luke.id, hope.id), (luke.id, empire.id)])
            .expect("insert pairs");
        let again = films
            .bulk_insert_relations(&table, &[(hope.id, luke.id)])
            .expect("insert reverse pair");
        assert_eq!((first, again), (2, 0));

        let rows: i64 = connection
            .query_row("SELECT COUNT(*) FROM films_people", [], |row| row.get(0))
            .expect("count rows");
        assert_eq!(rows, 2);
    }

    #[rstest]
    fn relation_inserts_reject_unrelated_tables(connection: Connection) {
        let planets = SqliteRepository::new(&connection, EntityType::Planets);
        let table = JoinTable::between(EntityType::People, EntityType::Films);
        let err = planets
            .bulk_insert_relations(&table, &[])
            .expect_err("planets are not an endpoint");
        assert!(matches!(err, StoreError::ForeignJoinTable { .. }));
    }
}
