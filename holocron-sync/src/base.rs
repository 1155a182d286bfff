//! Phase 1: create one local row per remote record.
//!
//! Rows are created without relations. Each row's reference URL is rewritten
//! to the local scheme and must embed the identifier the store assigned, so
//! the relation phase can resolve references by URL alone.

use std::fmt;
use std::pin::pin;

use futures_util::{Stream, TryStreamExt};
use holocron_core::{
    EntityId, EntityRepository, FetchError, NewEntity, RawRecord, ReferenceTranslator, extract_id,
};

use crate::error::ImportError;

/// How the importer learns a row's identifier before writing its reference
/// URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IdAssignment {
    /// Predict `MAX(id) + 1`, write the URL with the row and rewrite it when
    /// the store assigned something else.
    #[default]
    Predicted,
    /// Save first, then write the URL built from the returned identifier.
    Authoritative,
}

/// Result of importing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new row was written.
    Created(EntityId),
    /// A new row was written under a different identifier than predicted and
    /// its reference URL was rewritten.
    Reconciled {
        /// Identifier the importer predicted.
        predicted: EntityId,
        /// Identifier the store assigned.
        assigned: EntityId,
    },
    /// A row with the same natural key already existed.
    SkippedDuplicate,
}

/// Per-collection tallies for phase 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseImportCounts {
    /// Rows written, including reconciled ones.
    pub created: usize,
    /// Records skipped because their natural key was already stored.
    pub skipped_duplicates: usize,
    /// Rows whose reference URL had to be rewritten after saving.
    pub reconciled: usize,
}

impl BaseImportCounts {
    /// Fold one outcome into the tallies.
    pub const fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Created(_) => self.created += 1,
            RecordOutcome::Reconciled { .. } => {
                self.created += 1;
                self.reconciled += 1;
            }
            RecordOutcome::SkippedDuplicate => self.skipped_duplicates += 1,
        }
    }

    /// Add `other` to these tallies.
    pub const fn absorb(&mut self, other: Self) {
        self.created += other.created;
        self.skipped_duplicates += other.skipped_duplicates;
        self.reconciled += other.reconciled;
    }
}

impl fmt::Display for BaseImportCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} duplicates skipped, {} reconciled",
            self.created, self.skipped_duplicates, self.reconciled
        )
    }
}

/// Creates base rows for one collection at a time.
///
/// # Examples
/// ```
/// use holocron_core::test_support::MemoryCatalogStore;
/// use holocron_core::{CatalogStore, EntityType, PhaseTransaction, RawRecord, ReferenceTranslator};
/// use holocron_sync::{BaseImporter, IdAssignment, RecordOutcome};
/// use serde_json::json;
///
/// let translator = ReferenceTranslator::new("https://remote/api", "https://local/api");
/// let importer = BaseImporter::new(&translator, IdAssignment::Predicted);
/// let mut store = MemoryCatalogStore::new();
/// let phase = store.begin_phase().expect("begin phase");
/// let repositories = phase.repositories();
///
/// let record = RawRecord::try_from(json!({
///     "url": "https://remote/api/planets/1/",
///     "name": "Tatooine",
///     "climate": "arid",
/// }))
/// .expect("object payload");
/// let outcome = importer
///     .import_record(repositories.get(EntityType::Planets), &record)
///     .expect("import");
/// assert!(matches!(outcome, RecordOutcome::Created(id) if id.get() == 1));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BaseImporter<'t> {
    translator: &'t ReferenceTranslator,
    id_assignment: IdAssignment,
}

impl<'t> BaseImporter<'t> {
    /// Importer writing local reference URLs through `translator`.
    #[must_use]
    pub const fn new(translator: &'t ReferenceTranslator, id_assignment: IdAssignment) -> Self {
        Self {
            translator,
            id_assignment,
        }
    }

    /// Import every record of `records` into `repository`.
    ///
    /// Records are handed to `retain` after they have been imported, which
    /// lets callers keep them for the relation phase.
    ///
    /// # Errors
    ///
    /// Stops at the first fetch, record or store error. Writes made before
    /// the error stay in the caller's transaction.
    pub async fn import_stream<St>(
        &self,
        repository: &dyn EntityRepository,
        records: St,
        mut retain: impl FnMut(RawRecord),
    ) -> Result<BaseImportCounts, ImportError>
    where
        St: Stream<Item = Result<RawRecord, FetchError>>,
    {
        let mut records = pin!(records);
        let mut counts = BaseImportCounts::default();
        while let Some(record) = records.try_next().await? {
            counts.record(self.import_record(repository, &record)?);
            retain(record);
        }
        log::info!("{} base rows: {counts}", repository.entity_type());
        Ok(counts)
    }

    /// Import a single record.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::MalformedRecord`] when the record lacks its
    /// URL or natural key, [`ImportError::Reference`] when its URL carries no
    /// numeric identifier, and [`ImportError::Store`] when a write fails.
    pub fn import_record(
        &self,
        repository: &dyn EntityRepository,
        record: &RawRecord,
    ) -> Result<RecordOutcome, ImportError> {
        let entity_type = repository.entity_type();
        let natural_key = record
            .natural_key(entity_type)
            .map_err(|source| ImportError::malformed(entity_type, source))?;
        let remote_url = record
            .url()
            .map_err(|source| ImportError::malformed(entity_type, source))?;
        extract_id(remote_url)?;

        if repository.find_by_natural_key(natural_key)?.is_some() {
            log::info!("skipping {entity_type} '{natural_key}' ({remote_url}): already stored");
            return Ok(RecordOutcome::SkippedDuplicate);
        }

        let mut entity = NewEntity {
            natural_key: natural_key.to_owned(),
            reference_url: None,
            attributes: record.scalar_attributes(entity_type),
        };

        match self.id_assignment {
            IdAssignment::Predicted => {
                let predicted = repository.predict_next_id()?;
                entity.reference_url =
                    Some(self.translator.local_reference_url(entity_type, predicted));
                let stored = repository.save(entity)?;
                if stored.id == predicted {
                    return Ok(RecordOutcome::Created(stored.id));
                }
                let actual_url = self.translator.local_reference_url(entity_type, stored.id);
                log::warn!(
                    "{entity_type} '{natural_key}' stored as id {} instead of predicted \
                     {predicted}; rewriting its reference URL to {actual_url}",
                    stored.id
                );
                repository.update_reference_url(stored.id, &actual_url)?;
                Ok(RecordOutcome::Reconciled {
                    predicted,
                    assigned: stored.id,
                })
            }
            IdAssignment::Authoritative => {
                let stored = repository.save(entity)?;
                let url = self.translator.local_reference_url(entity_type, stored.id);
                repository.update_reference_url(stored.id, &url)?;
                Ok(RecordOutcome::Created(stored.id))
            }
        }
    }
}
