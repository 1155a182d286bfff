//! In-memory doubles for the page source and catalogue store.
//!
//! Used by unit and behaviour tests across the workspace. The memory store
//! mimics the constraints of the SQLite schema closely enough for importer
//! tests: unique natural keys and URLs, autoincrement identifiers that never
//! reuse values, foreign-key checks and join-table uniqueness.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use serde_json::Value;

use crate::entity::{EntityId, EntityType, NewEntity, RawRecord, StoredEntity};
use crate::reference::BaseUrl;
use crate::relation::{JoinTable, foreign_key_columns};
use crate::source::{FetchError, Page, PageSource};
use crate::store::{
    CatalogStore, EntityRepository, PhaseTransaction, RepositorySet, StoreError,
};

/// Timestamp stamped on every row created by [`MemoryCatalogStore`].
pub const MEMORY_TIMESTAMP: &str = "1977-05-25T00:00:00Z";

/// Stub [`PageSource`] serving pre-built pages keyed by URL.
#[derive(Debug, Default)]
pub struct StubPageSource {
    base: BaseUrl,
    pages: HashMap<String, Page>,
    failures: HashMap<String, (usize, FetchError)>,
    requests: RefCell<Vec<String>>,
}

impl StubPageSource {
    /// Stub source rooted at `base`.
    pub fn new(base: impl Into<BaseUrl>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    /// Serve `records` for `entity_type`, `page_size` per page.
    ///
    /// The first page lives at the collection URL and later pages at
    /// `?page=N`, mirroring the remote API. An empty collection still yields
    /// one empty page. Values that are not JSON objects become empty records.
    #[must_use]
    pub fn with_records(
        mut self,
        entity_type: EntityType,
        page_size: usize,
        records: impl IntoIterator<Item = Value>,
    ) -> Self {
        let records: Vec<RawRecord> = records
            .into_iter()
            .map(|value| RawRecord::try_from(value).unwrap_or_default())
            .collect();
        let count = u64::try_from(records.len()).unwrap_or(u64::MAX);
        let chunks: Vec<Vec<RawRecord>> = if records.is_empty() {
            vec![Vec::new()]
        } else {
            records
                .chunks(page_size.max(1))
                .map(<[RawRecord]>::to_vec)
                .collect()
        };
        let total_pages = chunks.len();
        for (index, results) in chunks.into_iter().enumerate() {
            let number = index + 1;
            let page = Page {
                count,
                results,
                next: (number < total_pages).then(|| self.page_url(entity_type, number + 1)),
                previous: (number > 1).then(|| self.page_url(entity_type, number - 1)),
            };
            let url = self.page_url(entity_type, number);
            self.pages.insert(url, page);
        }
        self
    }

    /// Serve `page` verbatim at `url`.
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, page: Page) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    /// Fail every request to `url` with `error`.
    #[must_use]
    pub fn with_failure(self, url: impl Into<String>, error: FetchError) -> Self {
        self.with_failure_after(url, 0, error)
    }

    /// Serve `url` normally `successes` times, then fail with `error`.
    #[must_use]
    pub fn with_failure_after(
        mut self,
        url: impl Into<String>,
        successes: usize,
        error: FetchError,
    ) -> Self {
        self.failures.insert(url.into(), (successes, error));
        self
    }

    /// URL of page `number` (1-based) of `entity_type`'s collection.
    #[must_use]
    pub fn page_url(&self, entity_type: EntityType, number: usize) -> String {
        let first = self.base.collection_url(entity_type);
        if number <= 1 {
            first
        } else {
            format!("{first}?page={number}")
        }
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

#[async_trait(?Send)]
impl PageSource for StubPageSource {
    fn collection_url(&self, entity_type: EntityType) -> String {
        self.base.collection_url(entity_type)
    }

    async fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let previous = {
            let mut requests = self.requests.borrow_mut();
            let previous = requests.iter().filter(|seen| seen.as_str() == url).count();
            requests.push(url.to_owned());
            previous
        };
        if let Some((successes, error)) = self.failures.get(url) {
            if previous >= *successes {
                return Err(error.clone());
            }
        }
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Http {
            url: url.to_owned(),
            status: 404,
            message: "no stub page registered".to_owned(),
        })
    }
}

/// Store lifecycle events recorded by [`MemoryCatalogStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// Migrations ran.
    Migrated,
    /// A connection was opened.
    Connected,
    /// A phase transaction started.
    Began,
    /// A phase transaction committed.
    Committed,
    /// A phase transaction rolled back, explicitly or by drop.
    RolledBack,
    /// The connection was released.
    Released,
}

#[derive(Debug, Clone, PartialEq)]
struct MemoryRow {
    entity: StoredEntity,
    foreign_keys: BTreeMap<&'static str, EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct MemoryTable {
    rows: BTreeMap<EntityId, MemoryRow>,
    sequence: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct MemoryState {
    tables: BTreeMap<EntityType, MemoryTable>,
    join_rows: BTreeSet<(JoinTable, EntityId, EntityId)>,
}

impl MemoryState {
    fn table(&self, entity_type: EntityType) -> Option<&MemoryTable> {
        self.tables.get(&entity_type)
    }

    fn table_mut(&mut self, entity_type: EntityType) -> &mut MemoryTable {
        self.tables.entry(entity_type).or_default()
    }

    fn contains(&self, entity_type: EntityType, id: EntityId) -> bool {
        self.table(entity_type)
            .is_some_and(|table| table.rows.contains_key(&id))
    }
}

/// In-memory [`CatalogStore`] with snapshot transactions.
///
/// Each phase works on a copy of the committed state; committing swaps the
/// copy in and rolling back (or dropping the phase) discards it.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    state: MemoryState,
    failing_keys: BTreeSet<String>,
    connected: bool,
    events: Vec<StoreEvent>,
}

impl MemoryCatalogStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `entity_type`'s autoincrement counter by `gap`, as if rows
    /// had been inserted and deleted before the run.
    #[must_use]
    pub fn with_sequence_gap(mut self, entity_type: EntityType, gap: i64) -> Self {
        self.state.table_mut(entity_type).sequence += gap;
        self
    }

    /// Make every `save` of a row with natural key `key` fail.
    #[must_use]
    pub fn fail_on_save(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    /// Seed a committed row, bypassing the importer.
    pub fn seed(&mut self, entity_type: EntityType, entity: NewEntity) -> StoredEntity {
        insert_row(&mut self.state, entity_type, entity)
    }

    /// Committed rows of `entity_type`, ordered by identifier.
    #[must_use]
    pub fn entities(&self, entity_type: EntityType) -> Vec<StoredEntity> {
        self.state
            .table(entity_type)
            .map(|table| table.rows.values().map(|row| row.entity.clone()).collect())
            .unwrap_or_default()
    }

    /// Committed row of `entity_type` with natural key `key`.
    #[must_use]
    pub fn entity_by_key(&self, entity_type: EntityType, key: &str) -> Option<StoredEntity> {
        self.entities(entity_type)
            .into_iter()
            .find(|entity| entity.natural_key == key)
    }

    /// Committed value of a foreign-key column.
    #[must_use]
    pub fn foreign_key(
        &self,
        entity_type: EntityType,
        id: EntityId,
        column: &str,
    ) -> Option<EntityId> {
        self.state
            .table(entity_type)?
            .rows
            .get(&id)?
            .foreign_keys
            .get(column)
            .copied()
    }

    /// Committed rows of `table` as `(first, second)` pairs in the table's
    /// alphabetical orientation.
    #[must_use]
    pub fn join_rows(&self, table: JoinTable) -> Vec<(EntityId, EntityId)> {
        self.state
            .join_rows
            .iter()
            .filter(|(candidate, _, _)| *candidate == table)
            .map(|(_, first, second)| (*first, *second))
            .collect()
    }

    /// Total committed join rows across every table.
    #[must_use]
    pub fn join_row_count(&self) -> usize {
        self.state.join_rows.len()
    }

    /// Lifecycle events recorded so far.
    #[must_use]
    pub fn events(&self) -> &[StoreEvent] {
        &self.events
    }
}

fn insert_row(state: &mut MemoryState, entity_type: EntityType, entity: NewEntity) -> StoredEntity {
    let table = state.table_mut(entity_type);
    let highest = table.rows.keys().next_back().map_or(0, |id| id.get());
    let id = EntityId::new(table.sequence.max(highest) + 1);
    table.sequence = id.get();
    let stored = StoredEntity {
        id,
        natural_key: entity.natural_key,
        reference_url: entity.reference_url,
        attributes: entity.attributes,
        created: MEMORY_TIMESTAMP.to_owned(),
        edited: MEMORY_TIMESTAMP.to_owned(),
    };
    table.rows.insert(
        id,
        MemoryRow {
            entity: stored.clone(),
            foreign_keys: BTreeMap::new(),
        },
    );
    stored
}

impl CatalogStore for MemoryCatalogStore {
    type Phase<'s> = MemoryPhase<'s>;

    fn apply_migrations(&mut self) -> Result<(), StoreError> {
        for entity_type in EntityType::ALL {
            self.state.table_mut(entity_type);
        }
        self.events.push(StoreEvent::Migrated);
        Ok(())
    }

    fn begin_phase(&mut self) -> Result<Self::Phase<'_>, StoreError> {
        if !self.connected {
            self.connected = true;
            self.events.push(StoreEvent::Connected);
        }
        self.events.push(StoreEvent::Began);
        Ok(MemoryPhase {
            working: RefCell::new(self.state.clone()),
            store: self,
            finished: false,
        })
    }

    fn release_connection(&mut self) -> Result<(), StoreError> {
        if self.connected {
            self.connected = false;
            self.events.push(StoreEvent::Released);
        }
        Ok(())
    }
}

/// Snapshot transaction handed out by [`MemoryCatalogStore`].
#[derive(Debug)]
pub struct MemoryPhase<'s> {
    store: &'s mut MemoryCatalogStore,
    working: RefCell<MemoryState>,
    finished: bool,
}

impl PhaseTransaction for MemoryPhase<'_> {
    fn repositories(&self) -> RepositorySet<'_> {
        RepositorySet::build(|entity_type| {
            Box::new(MemoryRepository {
                entity_type,
                state: &self.working,
                failing_keys: &self.store.failing_keys,
            })
        })
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.store.state = self.working.take();
        self.store.events.push(StoreEvent::Committed);
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        self.store.events.push(StoreEvent::RolledBack);
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryPhase<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.events.push(StoreEvent::RolledBack);
        }
    }
}

struct MemoryRepository<'p> {
    entity_type: EntityType,
    state: &'p RefCell<MemoryState>,
    failing_keys: &'p BTreeSet<String>,
}

impl MemoryRepository<'_> {
    fn find(&self, predicate: impl Fn(&StoredEntity) -> bool) -> Option<StoredEntity> {
        self.state
            .borrow()
            .table(self.entity_type)?
            .rows
            .values()
            .map(|row| &row.entity)
            .find(|entity| predicate(entity))
            .cloned()
    }

    fn constraint(operation: &'static str, message: &str) -> StoreError {
        StoreError::backend(operation, message.to_owned())
    }
}

impl EntityRepository for MemoryRepository<'_> {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn find_by_reference_url(&self, url: &str) -> Result<Option<StoredEntity>, StoreError> {
        Ok(self.find(|entity| entity.reference_url.as_deref() == Some(url)))
    }

    fn find_by_natural_key(&self, key: &str) -> Result<Option<StoredEntity>, StoreError> {
        Ok(self.find(|entity| entity.natural_key == key))
    }

    fn predict_next_id(&self) -> Result<EntityId, StoreError> {
        let state = self.state.borrow();
        let highest = state
            .table(self.entity_type)
            .and_then(|table| table.rows.keys().next_back())
            .map_or(0, |id| id.get());
        Ok(EntityId::new(highest + 1))
    }

    fn save(&self, entity: NewEntity) -> Result<StoredEntity, StoreError> {
        if self.failing_keys.contains(&entity.natural_key) {
            return Err(Self::constraint("insert entity", "injected failure"));
        }
        if self.find(|stored| stored.natural_key == entity.natural_key).is_some() {
            return Err(Self::constraint(
                "insert entity",
                "UNIQUE constraint failed: natural key",
            ));
        }
        if let Some(url) = entity.reference_url.as_deref() {
            if self.find(|stored| stored.reference_url.as_deref() == Some(url)).is_some() {
                return Err(Self::constraint("insert entity", "UNIQUE constraint failed: url"));
            }
        }
        Ok(insert_row(&mut self.state.borrow_mut(), self.entity_type, entity))
    }

    fn update_reference_url(&self, id: EntityId, url: &str) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        let row = state
            .table_mut(self.entity_type)
            .rows
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                entity_type: self.entity_type,
                id,
            })?;
        row.entity.reference_url = Some(url.to_owned());
        row.entity.edited = MEMORY_TIMESTAMP.to_owned();
        Ok(())
    }

    fn set_foreign_key(
        &self,
        id: EntityId,
        column: &'static str,
        value: Option<EntityId>,
    ) -> Result<(), StoreError> {
        let target = foreign_key_columns(self.entity_type)
            .into_iter()
            .find_map(|(name, target)| (name == column).then_some(target))
            .ok_or(StoreError::UnknownColumn {
                entity_type: self.entity_type,
                column,
            })?;
        let mut state = self.state.borrow_mut();
        if let Some(related) = value {
            if !state.contains(target, related) {
                return Err(Self::constraint(
                    "set foreign key",
                    "FOREIGN KEY constraint failed",
                ));
            }
        }
        let row = state
            .table_mut(self.entity_type)
            .rows
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                entity_type: self.entity_type,
                id,
            })?;
        match value {
            Some(related) => row.foreign_keys.insert(column, related),
            None => row.foreign_keys.remove(column),
        };
        Ok(())
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
        let mut state = self.state.borrow_mut();
        let mut inserted = 0;
        for &(owner, related) in pairs {
            if !state.contains(self.entity_type, owner) || !state.contains(counterpart, related) {
                return Err(Self::constraint(
                    "insert relation",
                    "FOREIGN KEY constraint failed",
                ));
            }
            let row = if table.first() == self.entity_type {
                (*table, owner, related)
            } else {
                (*table, related, owner)
            };
            if state.join_rows.insert(row) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::Map;

    fn new_entity(key: &str) -> NewEntity {
        NewEntity {
            natural_key: key.to_owned(),
            reference_url: None,
            attributes: Map::new(),
        }
    }

    #[fixture]
    fn store() -> MemoryCatalogStore {
        let mut store = MemoryCatalogStore::new();
        store.apply_migrations().expect("memory migrations");
        store
    }

    #[rstest]
    fn sequence_gap_makes_prediction_diverge(store: MemoryCatalogStore) {
        let mut store = store.with_sequence_gap(EntityType::People, 3);
        let phase = store.begin_phase().expect("phase");
        let repositories = phase.repositories();
        let people = repositories.get(EntityType::People);
        assert_eq!(people.predict_next_id().expect("predict"), EntityId::new(1));
        let saved = people.save(new_entity("Luke")).expect("save");
        assert_eq!(saved.id, EntityId::new(4));
    }

    #[rstest]
    fn dropped_phase_discards_writes(mut store: MemoryCatalogStore) {
        {
            let phase = store.begin_phase().expect("phase");
            phase
                .repositories()
                .get(EntityType::Films)
                .save(new_entity("A New Hope"))
                .expect("save");
        }
        assert!(store.entities(EntityType::Films).is_empty());
        assert_eq!(store.events().last(), Some(&StoreEvent::RolledBack));
    }

    #[rstest]
    fn join_rows_are_oriented_and_unique(mut store: MemoryCatalogStore) {
        let luke = store.seed(EntityType::People, new_entity("Luke"));
        let film = store.seed(EntityType::Films, new_entity("A New Hope"));
        let table = JoinTable::between(EntityType::People, EntityType::Films);
        let phase = store.begin_phase().expect("phase");
        {
            let repositories = phase.repositories();
            let people = repositories.get(EntityType::People);
            let films = repositories.get(EntityType::Films);
            assert_eq!(people.bulk_insert_relations(&table, &[(luke.id, film.id)]).ok(), Some(1));
            assert_eq!(films.bulk_insert_relations(&table, &[(film.id, luke.id)]).ok(), Some(0));
        }
        phase.commit().expect("commit");
        assert_eq!(store.join_rows(table), vec![(film.id, luke.id)]);
    }

    #[rstest]
    fn rejects_unknown_foreign_key_columns(mut store: MemoryCatalogStore) {
        let film = store.seed(EntityType::Films, new_entity("A New Hope"));
        let phase = store.begin_phase().expect("phase");
        let err = phase
            .repositories()
            .get(EntityType::Films)
            .set_foreign_key(film.id, "homeworld_id", None)
            .expect_err("films carry no foreign keys");
        assert!(matches!(err, StoreError::UnknownColumn { column: "homeworld_id", .. }));
    }
}
