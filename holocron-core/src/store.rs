//! Storage seams used by the importer.
//!
//! The importer never touches SQL. It talks to one [`EntityRepository`] per
//! entity type, grouped in a [`RepositorySet`], and to a [`CatalogStore`] for
//! migrations and phase-level transactions.

use std::error::Error as StdError;

use thiserror::Error;

use crate::entity::{EntityId, EntityType, NewEntity, StoredEntity};
use crate::relation::JoinTable;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing store rejected an operation.
    #[error("store operation '{operation}' failed: {source}")]
    Backend {
        /// Short description of the operation that failed.
        operation: &'static str,
        /// Underlying backend error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The addressed row does not exist.
    #[error("{entity_type} row {id} does not exist")]
    NotFound {
        /// Table addressed.
        entity_type: EntityType,
        /// Missing identifier.
        id: EntityId,
    },
    /// A foreign-key column is not declared for the entity type.
    #[error("{entity_type} has no foreign-key column '{column}'")]
    UnknownColumn {
        /// Table addressed.
        entity_type: EntityType,
        /// Rejected column name.
        column: &'static str,
    },
    /// A join table does not involve the repository's entity type.
    #[error("join table {table} does not involve {entity_type}")]
    ForeignJoinTable {
        /// Repository entity type.
        entity_type: EntityType,
        /// Rejected join table name.
        table: String,
    },
    /// Applying schema migrations failed.
    #[error("schema migration '{step}' failed: {source}")]
    Migration {
        /// Migration step that failed.
        step: &'static str,
        /// Underlying backend error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The store was created by an incompatible schema version.
    #[error("schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this build understands.
        expected: i64,
        /// Version recorded in the store.
        found: i64,
    },
    /// The store has no open connection.
    #[error("store connection has been released")]
    ConnectionReleased,
}

impl StoreError {
    /// Wrap a backend error with the operation that produced it.
    pub fn backend(
        operation: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

/// Persistence primitives for one entity type.
pub trait EntityRepository {
    /// Entity type this repository serves.
    fn entity_type(&self) -> EntityType;

    /// Row whose stored reference URL equals `url`.
    fn find_by_reference_url(&self, url: &str) -> Result<Option<StoredEntity>, StoreError>;

    /// Row whose natural key equals `key`.
    fn find_by_natural_key(&self, key: &str) -> Result<Option<StoredEntity>, StoreError>;

    /// Best-effort guess at the identifier the next [`save`](Self::save)
    /// will receive: `MAX(id) + 1`, or `1` for an empty table.
    ///
    /// Stores with autoincrement gaps may assign a different identifier, so
    /// callers must compare against the returned row.
    fn predict_next_id(&self) -> Result<EntityId, StoreError>;

    /// Insert a new row and return it with its assigned identifier.
    fn save(&self, entity: NewEntity) -> Result<StoredEntity, StoreError>;

    /// Overwrite the stored reference URL of row `id`.
    fn update_reference_url(&self, id: EntityId, url: &str) -> Result<(), StoreError>;

    /// Set or clear a foreign-key column on row `id`.
    fn set_foreign_key(
        &self,
        id: EntityId,
        column: &'static str,
        value: Option<EntityId>,
    ) -> Result<(), StoreError>;

    /// Insert `(owner, related)` pairs into `table`, where `owner` is a row
    /// of this repository's entity type.
    ///
    /// Pairs that already exist are skipped. Returns the number of new rows.
    fn bulk_insert_relations(
        &self,
        table: &JoinTable,
        pairs: &[(EntityId, EntityId)],
    ) -> Result<usize, StoreError>;
}

/// One repository per entity type, borrowed from a phase transaction.
pub struct RepositorySet<'a> {
    people: Box<dyn EntityRepository + 'a>,
    planets: Box<dyn EntityRepository + 'a>,
    films: Box<dyn EntityRepository + 'a>,
    species: Box<dyn EntityRepository + 'a>,
    starships: Box<dyn EntityRepository + 'a>,
    vehicles: Box<dyn EntityRepository + 'a>,
}

impl<'a> RepositorySet<'a> {
    /// Build a set by calling `make` once per entity type.
    pub fn build<F>(mut make: F) -> Self
    where
        F: FnMut(EntityType) -> Box<dyn EntityRepository + 'a>,
    {
        Self {
            people: make(EntityType::People),
            planets: make(EntityType::Planets),
            films: make(EntityType::Films),
            species: make(EntityType::Species),
            starships: make(EntityType::Starships),
            vehicles: make(EntityType::Vehicles),
        }
    }

    /// Repository for `entity_type`.
    #[must_use]
    pub fn get(&self, entity_type: EntityType) -> &dyn EntityRepository {
        match entity_type {
            EntityType::People => self.people.as_ref(),
            EntityType::Planets => self.planets.as_ref(),
            EntityType::Films => self.films.as_ref(),
            EntityType::Species => self.species.as_ref(),
            EntityType::Starships => self.starships.as_ref(),
            EntityType::Vehicles => self.vehicles.as_ref(),
        }
    }
}

/// A unit of work spanning one import phase.
///
/// Dropping a phase without committing discards its writes.
pub trait PhaseTransaction {
    /// Repositories operating inside this transaction.
    fn repositories(&self) -> RepositorySet<'_>;

    /// Make every write of the phase durable.
    fn commit(self) -> Result<(), StoreError>;

    /// Discard every write of the phase.
    fn rollback(self) -> Result<(), StoreError>;
}

/// Store-level operations driven by the pipeline.
pub trait CatalogStore {
    /// Transaction type handed out for each phase.
    type Phase<'s>: PhaseTransaction
    where
        Self: 's;

    /// Create or upgrade the schema.
    fn apply_migrations(&mut self) -> Result<(), StoreError>;

    /// Start a phase transaction, reconnecting if the connection was released.
    fn begin_phase(&mut self) -> Result<Self::Phase<'_>, StoreError>;

    /// Close the current connection. The next [`begin_phase`](Self::begin_phase)
    /// reopens it.
    fn release_connection(&mut self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryCatalogStore;
    use rstest::rstest;

    #[rstest]
    fn repository_set_routes_each_type_to_its_repository() {
        let mut store = MemoryCatalogStore::new();
        let phase = store.begin_phase().expect("memory phase");
        let repositories = phase.repositories();
        for entity_type in EntityType::ALL {
            assert_eq!(repositories.get(entity_type).entity_type(), entity_type);
        }
    }

    #[rstest]
    fn backend_errors_keep_their_source() {
        let err = StoreError::backend("insert person", "disk full");
        assert_eq!(err.to_string(), "store operation 'insert person' failed: disk full");
        assert!(StdError::source(&err).is_some());
    }
}
