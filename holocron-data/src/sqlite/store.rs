//! `CatalogStore` backed by a SQLite database file.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use holocron_core::{CatalogStore, PhaseTransaction, RepositorySet, StoreError};
use rusqlite::{Connection, Error as SqliteError, Transaction, TransactionBehavior};
use thiserror::Error;

use super::repository::SqliteRepository;
use super::schema::{apply_migrations, enable_foreign_keys};

/// Errors raised while opening a catalogue database.
#[derive(Debug, Error)]
pub enum OpenStoreError {
    /// Failed to create the parent directory for the database file.
    #[error("failed to create parent directory {path:?}")]
    CreateDirectory {
        /// Path of the directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(Utf8PathBuf),
    Memory,
}

/// SQLite catalogue store.
///
/// Each import phase runs inside one `IMMEDIATE` transaction. Releasing the
/// connection closes a file-backed database; the next phase reopens it. An
/// in-memory database keeps its connection, since closing it would discard
/// the data.
#[derive(Debug)]
pub struct SqliteCatalogStore {
    location: Location,
    connection: Option<Connection>,
}

impl SqliteCatalogStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, OpenStoreError> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let connection = Connection::open(path.as_std_path()).map_err(|source| {
            OpenStoreError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            location: Location::File(path.to_path_buf()),
            connection: Some(connection),
        })
    }

    /// Private in-memory database, mostly useful in tests.
    ///
    /// # Errors
    ///
    /// Returns an error when SQLite cannot allocate the database.
    pub fn in_memory() -> Result<Self, OpenStoreError> {
        let connection = Connection::open_in_memory().map_err(|source| OpenStoreError::Open {
            path: Utf8PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self {
            location: Location::Memory,
            connection: Some(connection),
        })
    }

    /// Database file path, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    /// Whether a connection is currently open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Borrow the open connection, for inspection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionReleased`] after
    /// [`release_connection`](CatalogStore::release_connection).
    pub fn connection(&self) -> Result<&Connection, StoreError> {
        self.connection.as_ref().ok_or(StoreError::ConnectionReleased)
    }

    fn connection_mut(&mut self) -> Result<&mut Connection, StoreError> {
        if self.connection.is_none() {
            let Location::File(path) = &self.location else {
                return Err(StoreError::ConnectionReleased);
            };
            log::debug!("reopening catalogue database {path}");
            let connection = Connection::open(path.as_std_path())
                .map_err(|err| StoreError::backend("reopen database", err))?;
            self.connection = Some(connection);
        }
        self.connection.as_mut().ok_or(StoreError::ConnectionReleased)
    }
}

impl CatalogStore for SqliteCatalogStore {
    type Phase<'s> = SqlitePhase<'s>;

    fn apply_migrations(&mut self) -> Result<(), StoreError> {
        apply_migrations(self.connection_mut()?)?;
        Ok(())
    }

    fn begin_phase(&mut self) -> Result<Self::Phase<'_>, StoreError> {
        let connection = self.connection_mut()?;
        enable_foreign_keys(connection)?;
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| StoreError::backend("begin phase transaction", err))?;
        Ok(SqlitePhase { transaction })
    }

    fn release_connection(&mut self) -> Result<(), StoreError> {
        if self.location == Location::Memory {
            return Ok(());
        }
        if let Some(connection) = self.connection.take() {
            connection
                .close()
                .map_err(|(_, err)| StoreError::backend("close database", err))?;
        }
        Ok(())
    }
}

/// One import phase running inside a SQLite transaction.
///
/// Dropping the phase without committing rolls it back.
#[derive(Debug)]
pub struct SqlitePhase<'s> {
    transaction: Transaction<'s>,
}

impl PhaseTransaction for SqlitePhase<'_> {
    fn repositories(&self) -> RepositorySet<'_> {
        RepositorySet::build(|entity_type| {
            Box::new(SqliteRepository::new(&self.transaction, entity_type))
        })
    }

    fn commit(self) -> Result<(), StoreError> {
        self.transaction
            .commit()
            .map_err(|err| StoreError::backend("commit phase transaction", err))
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.transaction
            .rollback()
            .map_err(|err| StoreError::backend("roll back phase transaction", err))
    }
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), OpenStoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base, relative) = if parent.is_absolute() {
        ("/", parent.strip_prefix("/").unwrap_or(parent))
    } else {
        (".", parent)
    };
    let create_failed = |source: std::io::Error| OpenStoreError::CreateDirectory {
        path: parent.to_path_buf(),
        source,
    };
    let dir = fs_utf8::Dir::open_ambient_dir(base, ambient_authority()).map_err(create_failed)?;
    dir.create_dir_all(relative).map_err(create_failed)
}
