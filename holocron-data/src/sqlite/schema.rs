//! Schema migrations for the local catalogue database.
//!
//! Table definitions are generated from the relation declarations in
//! `holocron-core`, so the schema always carries exactly the foreign-key
//! columns and join tables the importer writes.

use holocron_core::{EntityType, JoinTable, StoreError, foreign_key_columns};
use rusqlite::{Connection, Error as SqliteError, OptionalExtension, Transaction};
use thiserror::Error;

/// Version recorded in `holocron_schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// SQL expression producing the current UTC time as ISO-8601 text.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

/// Errors raised when creating or checking the schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Foreign-key enforcement could not be switched on.
    #[error("failed to enable SQLite foreign keys")]
    ForeignKeys {
        /// Underlying SQLite error.
        #[source]
        source: SqliteError,
    },
    /// A migration statement failed.
    #[error("failed to execute migration step '{step}'")]
    Migration {
        /// Step that failed.
        step: &'static str,
        /// Underlying SQLite error.
        #[source]
        source: SqliteError,
    },
    /// The database was created by a different schema version.
    #[error(
        "expected catalogue schema version {expected} but found {found}; \
         migrate the database explicitly"
    )]
    VersionMismatch {
        /// Version this build writes.
        expected: i64,
        /// Version found in the database.
        found: i64,
    },
}

impl From<SchemaError> for StoreError {
    fn from(error: SchemaError) -> Self {
        match error {
            SchemaError::ForeignKeys { source } => Self::Migration {
                step: "enable foreign keys",
                source: Box::new(source),
            },
            SchemaError::Migration { step, source } => Self::Migration {
                step,
                source: Box::new(source),
            },
            SchemaError::VersionMismatch { expected, found } => {
                Self::VersionMismatch { expected, found }
            }
        }
    }
}

/// Switch on foreign-key enforcement for `connection`.
pub fn enable_foreign_keys(connection: &Connection) -> Result<(), SchemaError> {
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|source| SchemaError::ForeignKeys { source })
}

/// Create every catalogue table inside one transaction and record the schema
/// version. Running it again against an up-to-date database is a no-op.
///
/// # Examples
/// ```
/// use holocron_data::sqlite::schema::{SCHEMA_VERSION, apply_migrations};
/// use rusqlite::Connection;
///
/// let mut conn = Connection::open_in_memory().expect("create in-memory database");
/// apply_migrations(&mut conn).expect("create catalogue schema");
///
/// let version: i64 = conn
///     .query_row("SELECT version FROM holocron_schema_version", [], |row| row.get(0))
///     .expect("read schema version");
/// assert_eq!(version, SCHEMA_VERSION);
/// ```
pub fn apply_migrations(connection: &mut Connection) -> Result<(), SchemaError> {
    enable_foreign_keys(connection)?;

    let transaction = connection
        .transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    ensure_schema_version(&transaction)?;
    create_entity_tables(&transaction)?;
    create_join_tables(&transaction)?;

    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit schema transaction",
            source,
        })?;

    log::debug!("catalogue schema at version {SCHEMA_VERSION}");
    Ok(())
}

/// `CREATE TABLE` statement for `entity_type`.
#[must_use]
pub fn entity_table_ddl(entity_type: EntityType) -> String {
    let mut columns = vec![
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_owned(),
        format!("{} TEXT NOT NULL UNIQUE", entity_type.natural_key_field()),
        "url TEXT UNIQUE".to_owned(),
        "attributes TEXT NOT NULL DEFAULT '{}'".to_owned(),
        format!("created TEXT NOT NULL DEFAULT ({NOW})"),
        format!("edited TEXT NOT NULL DEFAULT ({NOW})"),
    ];
    columns.extend(
        foreign_key_columns(entity_type)
            .into_iter()
            .map(|(column, target)| {
                format!(
                    "{column} INTEGER REFERENCES {}(id) ON DELETE SET NULL",
                    target.table_name()
                )
            }),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        entity_type.table_name(),
        columns.join(",\n    ")
    )
}

/// `CREATE TABLE` statement for `table`.
#[must_use]
pub fn join_table_ddl(table: &JoinTable) -> String {
    let first = table.first();
    let second = table.second();
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (
    {first_column} INTEGER NOT NULL REFERENCES {first_table}(id) ON DELETE CASCADE,
    {second_column} INTEGER NOT NULL REFERENCES {second_table}(id) ON DELETE CASCADE,
    PRIMARY KEY ({first_column}, {second_column})
) WITHOUT ROWID",
        name = table.name(),
        first_column = first.key_column(),
        first_table = first.table_name(),
        second_column = second.key_column(),
        second_table = second.table_name(),
    )
}

fn create_entity_tables(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    for entity_type in EntityType::ALL {
        run_migration_step(
            transaction,
            "create entity table",
            &entity_table_ddl(entity_type),
        )?;
        for (column, _) in foreign_key_columns(entity_type) {
            let table = entity_type.table_name();
            run_migration_step(
                transaction,
                "index foreign-key column",
                &format!("CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})"),
            )?;
        }
    }
    Ok(())
}

fn create_join_tables(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    for table in JoinTable::all() {
        run_migration_step(transaction, "create join table", &join_table_ddl(&table))?;
        let name = table.name();
        let column = table.second().key_column();
        run_migration_step(
            transaction,
            "index join table",
            &format!("CREATE INDEX IF NOT EXISTS idx_{name}_{column} ON {name}({column})"),
        )?;
    }
    Ok(())
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create schema version table",
        &format!(
            "CREATE TABLE IF NOT EXISTS holocron_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT ({NOW})
        ) WITHOUT ROWID"
        ),
    )?;

    let existing_version: Option<i64> = transaction
        .query_row(
            "SELECT version FROM holocron_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| SchemaError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => {}
        Some(found) => {
            return Err(SchemaError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        None => {
            transaction
                .execute(
                    "INSERT INTO holocron_schema_version (version) VALUES (?1)",
                    [SCHEMA_VERSION],
                )
                .map_err(|source| SchemaError::Migration {
                    step: "record schema version",
                    source,
                })?;
        }
    }

    Ok(())
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), SchemaError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| SchemaError::Migration { step, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory database");
        apply_migrations(&mut conn).expect("apply migrations");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut statement = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .expect("prepare table listing");
        statement
            .query_map([], |row| row.get(0))
            .expect("list tables")
            .collect::<Result<_, _>>()
            .expect("read table names")
    }

    #[rstest]
    fn creates_entity_and_join_tables(migrated: Connection) {
        let names = table_names(&migrated);
        for entity_type in EntityType::ALL {
            assert!(names.contains(&entity_type.table_name().to_owned()));
        }
        for table in JoinTable::all() {
            assert!(names.contains(&table.name()), "missing {}", table.name());
        }
        assert!(names.contains(&"holocron_schema_version".to_owned()));
    }

    #[rstest]
    fn people_carry_a_homeworld_column() {
        let ddl = entity_table_ddl(EntityType::People);
        assert!(ddl.contains("name TEXT NOT NULL UNIQUE"));
        assert!(ddl.contains("homeworld_id INTEGER REFERENCES planets(id) ON DELETE SET NULL"));
        assert!(entity_table_ddl(EntityType::Films).contains("title TEXT NOT NULL UNIQUE"));
    }

    #[rstest]
    fn migrations_are_idempotent(mut migrated: Connection) {
        apply_migrations(&mut migrated).expect("second run is a no-op");
        let versions: i64 = migrated
            .query_row("SELECT COUNT(*) FROM holocron_schema_version", [], |row| {
                row.get(0)
            })
            .expect("count versions");
        assert_eq!(versions, 1);
    }

    #[rstest]
    fn rejects_other_schema_versions(mut migrated: Connection) {
        migrated
            .execute("UPDATE holocron_schema_version SET version = 7", [])
            .expect("tamper with version");
        let err = apply_migrations(&mut migrated).expect_err("version mismatch");
        assert!(matches!(
            err,
            SchemaError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: 7
            }
        ));
    }

    #[rstest]
    fn join_rows_cascade_when_an_endpoint_is_deleted(migrated: Connection) {
        migrated
            .execute_batch(
                "INSERT INTO people (id, name) VALUES (1, 'Luke Skywalker');
                 INSERT INTO films (id, title) VALUES (1, 'A New Hope');
                 INSERT INTO films_people (films_id, people_id) VALUES (1, 1);
                 DELETE FROM people WHERE id = 1;",
            )
            .expect("seed and delete");
        let remaining: i64 = migrated
            .query_row("SELECT COUNT(*) FROM films_people", [], |row| row.get(0))
            .expect("count join rows");
        assert_eq!(remaining, 0);
    }
}
