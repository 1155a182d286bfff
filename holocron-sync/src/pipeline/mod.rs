//! Transaction coordinator driving both import phases.
//!
//! A run applies migrations, imports base rows for every entity type inside
//! one transaction, releases the connection, then resolves relations inside
//! a second transaction. A failure rolls back only the phase it happened in:
//! base rows committed by phase 1 survive a failed phase 2.

use std::collections::HashMap;
use std::fmt;

use futures_util::stream;
use holocron_core::{
    CatalogStore, EntityType, FetchError, PageSource, PhaseTransaction, RawRecord,
    ReferenceTranslator, fetch_all,
};

use crate::base::{BaseImportCounts, BaseImporter, IdAssignment};
use crate::error::{ImportError, Phase, PipelineError};
use crate::relations::{RelationCounts, RelationResolver};

/// Where the coordinator is in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// The schema is in place.
    MigrationsApplied,
    /// Phase 1 is writing base rows.
    BasePhaseRunning,
    /// Phase 1 committed.
    BasePhaseCommitted,
    /// Phase 1 failed and its writes were discarded. Terminal.
    BasePhaseRolledBack,
    /// Phase 2 is wiring relations.
    RelationPhaseRunning,
    /// Phase 2 committed. Terminal.
    RelationPhaseCommitted,
    /// Phase 2 failed and its writes were discarded. Terminal.
    RelationPhaseRolledBack,
}

impl PipelineState {
    /// Whether the run has ended in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::BasePhaseRolledBack | Self::RelationPhaseCommitted | Self::RelationPhaseRolledBack
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::MigrationsApplied => "migrations applied",
            Self::BasePhaseRunning => "base phase running",
            Self::BasePhaseCommitted => "base phase committed",
            Self::BasePhaseRolledBack => "base phase rolled back",
            Self::RelationPhaseRunning => "relation phase running",
            Self::RelationPhaseCommitted => "relation phase committed",
            Self::RelationPhaseRolledBack => "relation phase rolled back",
        };
        f.write_str(label)
    }
}

/// Where phase 2 gets its records from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RelationRecords {
    /// Fetch every collection again from the remote API.
    #[default]
    Refetch,
    /// Replay the records fetched during phase 1 from memory.
    Reuse,
}

/// Settings for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Rewrites remote reference URLs to the local scheme.
    pub translator: ReferenceTranslator,
    /// How phase 1 learns row identifiers.
    pub id_assignment: IdAssignment,
    /// Record source for phase 2.
    pub relation_records: RelationRecords,
}

impl PipelineConfig {
    /// Default settings around `translator`.
    #[must_use]
    pub const fn new(translator: ReferenceTranslator) -> Self {
        Self {
            translator,
            id_assignment: IdAssignment::Predicted,
            relation_records: RelationRecords::Refetch,
        }
    }

    /// Override the identifier strategy.
    #[must_use]
    pub const fn with_id_assignment(mut self, id_assignment: IdAssignment) -> Self {
        self.id_assignment = id_assignment;
        self
    }

    /// Override the phase-2 record source.
    #[must_use]
    pub const fn with_relation_records(mut self, relation_records: RelationRecords) -> Self {
        self.relation_records = relation_records;
        self
    }
}

/// Tallies for one entity type across both phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityReport {
    /// Collection the tallies belong to.
    pub entity_type: EntityType,
    /// Phase 1 tallies.
    pub base: BaseImportCounts,
    /// Phase 2 tallies.
    pub relations: RelationCounts,
}

impl EntityReport {
    const fn empty(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            base: BaseImportCounts {
                created: 0,
                skipped_duplicates: 0,
                reconciled: 0,
            },
            relations: RelationCounts {
                links_created: 0,
                foreign_keys_set: 0,
                unresolved: 0,
                missing_owners: 0,
            },
        }
    }
}

impl fmt::Display for EntityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}; {}", self.entity_type, self.base, self.relations)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    entries: Vec<EntityReport>,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            entries: EntityType::ALL.into_iter().map(EntityReport::empty).collect(),
        }
    }

    /// Tallies for `entity_type`.
    #[must_use]
    pub fn entity(&self, entity_type: EntityType) -> EntityReport {
        self.entries
            .iter()
            .find(|entry| entry.entity_type == entity_type)
            .copied()
            .unwrap_or_else(|| EntityReport::empty(entity_type))
    }

    /// Every entity type's tallies, in import order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityReport> {
        self.entries.iter()
    }

    /// Phase 1 tallies summed over every entity type.
    #[must_use]
    pub fn base_totals(&self) -> BaseImportCounts {
        self.entries
            .iter()
            .fold(BaseImportCounts::default(), |mut total, entry| {
                total.absorb(entry.base);
                total
            })
    }

    /// Phase 2 tallies summed over every entity type.
    #[must_use]
    pub fn relation_totals(&self) -> RelationCounts {
        self.entries
            .iter()
            .fold(RelationCounts::default(), |mut total, entry| {
                total.absorb(entry.relations);
                total
            })
    }

    fn entry_mut(&mut self, entity_type: EntityType) -> Option<&mut EntityReport> {
        self.entries
            .iter_mut()
            .find(|entry| entry.entity_type == entity_type)
    }

    fn record_base(&mut self, entity_type: EntityType, counts: BaseImportCounts) {
        if let Some(entry) = self.entry_mut(entity_type) {
            entry.base = counts;
        }
    }

    fn record_relations(&mut self, entity_type: EntityType, counts: RelationCounts) {
        if let Some(entry) = self.entry_mut(entity_type) {
            entry.relations = counts;
        }
    }
}

#[derive(Debug, Default)]
struct RetainedRecords(HashMap<EntityType, Vec<RawRecord>>);

impl RetainedRecords {
    fn push(&mut self, entity_type: EntityType, record: RawRecord) {
        self.0.entry(entity_type).or_default().push(record);
    }

    fn take(&mut self, entity_type: EntityType) -> Vec<RawRecord> {
        self.0.remove(&entity_type).unwrap_or_default()
    }
}

/// Mirrors the remote catalogue into a local store.
///
/// # Examples
/// ```
/// use holocron_core::test_support::{MemoryCatalogStore, StubPageSource};
/// use holocron_core::{EntityType, ReferenceTranslator};
/// use holocron_sync::{Pipeline, PipelineConfig, PipelineState};
/// use serde_json::json;
///
/// let mut source = StubPageSource::new("https://remote/api");
/// for entity_type in EntityType::ALL {
///     source = source.with_records(entity_type, 10, []);
/// }
/// let source = source.with_records(
///     EntityType::Planets,
///     10,
///     [json!({"url": "https://remote/api/planets/1/", "name": "Tatooine"})],
/// );
/// let config = PipelineConfig::new(ReferenceTranslator::new(
///     "https://remote/api",
///     "https://local/api",
/// ));
/// let mut pipeline = Pipeline::new(source, MemoryCatalogStore::new(), config);
///
/// let runtime = tokio::runtime::Builder::new_current_thread()
///     .build()
///     .expect("runtime");
/// let report = runtime.block_on(pipeline.run()).expect("sync");
///
/// assert_eq!(report.entity(EntityType::Planets).base.created, 1);
/// assert_eq!(pipeline.state(), PipelineState::RelationPhaseCommitted);
/// ```
#[derive(Debug)]
pub struct Pipeline<S, C> {
    source: S,
    store: C,
    config: PipelineConfig,
    state: PipelineState,
}

impl<S, C> Pipeline<S, C>
where
    S: PageSource,
    C: CatalogStore,
{
    /// Pipeline reading from `source` and writing to `store`.
    pub const fn new(source: S, store: C, config: PipelineConfig) -> Self {
        Self {
            source,
            store,
            config,
            state: PipelineState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Remote source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Local store.
    #[must_use]
    pub const fn store(&self) -> &C {
        &self.store
    }

    /// Give back the source and store.
    pub fn into_parts(self) -> (S, C) {
        (self.source, self.store)
    }

    /// Run both phases.
    ///
    /// Running again after a finished run starts over from
    /// [`PipelineState::Idle`]; rows already stored are skipped as duplicates
    /// and existing links are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BasePhase`] when phase 1 fails (nothing is
    /// persisted) and [`PipelineError::RelationPhase`] when phase 2 fails
    /// (base rows stay). Store failures outside the phases surface as the
    /// remaining variants.
    pub async fn run(&mut self) -> Result<SyncReport, PipelineError> {
        let Self {
            source,
            store,
            config,
            state,
        } = self;
        if *state != PipelineState::Idle {
            advance(state, PipelineState::Idle);
        }

        store.apply_migrations().map_err(PipelineError::Migrations)?;
        advance(state, PipelineState::MigrationsApplied);

        let mut report = SyncReport::new();
        let base = base_phase(source, store, config, state, &mut report).await;
        let mut retained = release_after(store, base)?;

        let relations =
            relation_phase(source, store, config, state, &mut report, &mut retained).await;
        release_after(store, relations)?;

        for entry in report.iter() {
            log::info!("{entry}");
        }
        Ok(report)
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    log::info!("pipeline: {state} -> {next}");
    *state = next;
}

/// Release the connection whatever the phase outcome was.
///
/// A phase error wins over a release error, which is only logged.
fn release_after<C, T>(
    store: &mut C,
    outcome: Result<T, PipelineError>,
) -> Result<T, PipelineError>
where
    C: CatalogStore,
{
    let released = store.release_connection();
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(PipelineError::ReleaseConnection(err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            log::error!("releasing the store connection failed: {release_err}");
            Err(err)
        }
    }
}

fn roll_back<P: PhaseTransaction>(transaction: P, phase: Phase) {
    if let Err(err) = transaction.rollback() {
        log::error!("rolling back the {phase} failed: {err}");
    }
}

async fn base_phase<S, C>(
    remote: &S,
    store: &mut C,
    config: &PipelineConfig,
    state: &mut PipelineState,
    report: &mut SyncReport,
) -> Result<RetainedRecords, PipelineError>
where
    S: PageSource,
    C: CatalogStore,
{
    let transaction = store.begin_phase().map_err(|err| PipelineError::BeginPhase {
        phase: Phase::Base,
        source: err,
    })?;
    advance(state, PipelineState::BasePhaseRunning);

    let outcome = import_base(remote, &transaction, config, report).await;
    match outcome {
        Ok(retained) => {
            let committed = transaction.commit().map_err(|err| PipelineError::Commit {
                phase: Phase::Base,
                source: err,
            });
            if committed.is_ok() {
                advance(state, PipelineState::BasePhaseCommitted);
            } else {
                advance(state, PipelineState::BasePhaseRolledBack);
            }
            committed.map(|()| retained)
        }
        Err(err) => {
            log::error!("base phase failed: {err}");
            roll_back(transaction, Phase::Base);
            advance(state, PipelineState::BasePhaseRolledBack);
            Err(PipelineError::BasePhase(err))
        }
    }
}

async fn import_base<S, P>(
    remote: &S,
    transaction: &P,
    config: &PipelineConfig,
    report: &mut SyncReport,
) -> Result<RetainedRecords, ImportError>
where
    S: PageSource,
    P: PhaseTransaction,
{
    let repositories = transaction.repositories();
    let importer = BaseImporter::new(&config.translator, config.id_assignment);
    let reuse = config.relation_records == RelationRecords::Reuse;
    let mut retained = RetainedRecords::default();
    for entity_type in EntityType::ALL {
        let counts = importer
            .import_stream(
                repositories.get(entity_type),
                fetch_all(remote, entity_type),
                |record| {
                    if reuse {
                        retained.push(entity_type, record);
                    }
                },
            )
            .await?;
        report.record_base(entity_type, counts);
    }
    Ok(retained)
}

async fn relation_phase<S, C>(
    remote: &S,
    store: &mut C,
    config: &PipelineConfig,
    state: &mut PipelineState,
    report: &mut SyncReport,
    retained: &mut RetainedRecords,
) -> Result<(), PipelineError>
where
    S: PageSource,
    C: CatalogStore,
{
    let transaction = store.begin_phase().map_err(|err| PipelineError::BeginPhase {
        phase: Phase::Relation,
        source: err,
    })?;
    advance(state, PipelineState::RelationPhaseRunning);

    let outcome = resolve_relations(remote, &transaction, config, report, retained).await;
    match outcome {
        Ok(()) => {
            let committed = transaction.commit().map_err(|err| PipelineError::Commit {
                phase: Phase::Relation,
                source: err,
            });
            if committed.is_ok() {
                advance(state, PipelineState::RelationPhaseCommitted);
            } else {
                advance(state, PipelineState::RelationPhaseRolledBack);
            }
            committed
        }
        Err(err) => {
            log::error!("relation phase failed: {err}");
            roll_back(transaction, Phase::Relation);
            advance(state, PipelineState::RelationPhaseRolledBack);
            Err(PipelineError::RelationPhase(err))
        }
    }
}

async fn resolve_relations<S, P>(
    remote: &S,
    transaction: &P,
    config: &PipelineConfig,
    report: &mut SyncReport,
    retained: &mut RetainedRecords,
) -> Result<(), ImportError>
where
    S: PageSource,
    P: PhaseTransaction,
{
    let repositories = transaction.repositories();
    let resolver = RelationResolver::new(&config.translator);
    for entity_type in EntityType::ALL {
        let counts = match config.relation_records {
            RelationRecords::Refetch => {
                resolver
                    .resolve_stream(&repositories, entity_type, fetch_all(remote, entity_type))
                    .await?
            }
            RelationRecords::Reuse => {
                let records = stream::iter(
                    retained
                        .take(entity_type)
                        .into_iter()
                        .map(Ok::<RawRecord, FetchError>),
                );
                resolver
                    .resolve_stream(&repositories, entity_type, records)
                    .await?
            }
        };
        report.record_relations(entity_type, counts);
    }
    Ok(())
}
