//! Phase 2: wire relations between the rows created in phase 1.
//!
//! Every reference is rewritten to the local scheme, checked for a numeric
//! identifier and resolved by reference URL. References whose target is not
//! stored locally are dropped; the owning row keeps whatever resolved.

use std::fmt;
use std::pin::pin;

use futures_util::{Stream, TryStreamExt};
use holocron_core::{
    EntityId, EntityType, FetchError, JoinTable, RawRecord, ReferenceTranslator, RelationKind,
    RelationSpec, RelationValue, RepositorySet, extract_id,
};

use crate::error::ImportError;

/// Per-collection tallies for phase 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationCounts {
    /// Join-table rows inserted. Rows that already existed are not counted.
    pub links_created: usize,
    /// Foreign-key columns set to a resolved row.
    pub foreign_keys_set: usize,
    /// References dropped because no local row matched them.
    pub unresolved: usize,
    /// Records skipped because their own row was not stored locally.
    pub missing_owners: usize,
}

impl RelationCounts {
    /// Add `other` to these tallies.
    pub const fn absorb(&mut self, other: Self) {
        self.links_created += other.links_created;
        self.foreign_keys_set += other.foreign_keys_set;
        self.unresolved += other.unresolved;
        self.missing_owners += other.missing_owners;
    }
}

impl fmt::Display for RelationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} links, {} foreign keys, {} unresolved references, {} missing owners",
            self.links_created, self.foreign_keys_set, self.unresolved, self.missing_owners
        )
    }
}

/// Resolves the declared relations of remote records against local rows.
///
/// A single-valued relation delivered as a list keeps its first resolved
/// target; the remaining references count as unresolved.
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'t> {
    translator: &'t ReferenceTranslator,
}

impl<'t> RelationResolver<'t> {
    /// Resolver rewriting references through `translator`.
    #[must_use]
    pub const fn new(translator: &'t ReferenceTranslator) -> Self {
        Self { translator }
    }

    /// Resolve the relations of every record of `records`, which must all
    /// belong to `entity_type`.
    ///
    /// # Errors
    ///
    /// Stops at the first fetch, reference, record or store error.
    pub async fn resolve_stream<St>(
        &self,
        repositories: &RepositorySet<'_>,
        entity_type: EntityType,
        records: St,
    ) -> Result<RelationCounts, ImportError>
    where
        St: Stream<Item = Result<RawRecord, FetchError>>,
    {
        let mut records = pin!(records);
        let mut counts = RelationCounts::default();
        while let Some(record) = records.try_next().await? {
            counts.absorb(self.resolve_record(repositories, entity_type, &record)?);
        }
        log::info!("{entity_type} relations: {counts}");
        Ok(counts)
    }

    /// Resolve every declared relation of one record.
    ///
    /// Records without any relation values are left alone. A record whose
    /// own row cannot be found is skipped and counted in
    /// [`RelationCounts::missing_owners`].
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Reference`] for a reference without a numeric
    /// identifier, [`ImportError::MalformedRecord`] for a record without a
    /// URL or with a relation field of the wrong shape, and
    /// [`ImportError::Store`] when a lookup or write fails.
    pub fn resolve_record(
        &self,
        repositories: &RepositorySet<'_>,
        entity_type: EntityType,
        record: &RawRecord,
    ) -> Result<RelationCounts, ImportError> {
        let mut counts = RelationCounts::default();
        let mut present = Vec::new();
        for relation in entity_type.relations() {
            let value = record
                .relation_value(relation)
                .map_err(|source| ImportError::malformed(entity_type, source))?;
            if !value.is_absent() {
                present.push((relation, value));
            }
        }
        if present.is_empty() {
            return Ok(counts);
        }

        let remote_url = record
            .url()
            .map_err(|source| ImportError::malformed(entity_type, source))?;
        let local_url = self.translator.rewrite_base(remote_url);
        extract_id(&local_url)?;
        let Some(owner) = repositories
            .get(entity_type)
            .find_by_reference_url(&local_url)?
        else {
            log::warn!("no local {entity_type} row for {local_url}; skipping its relations");
            counts.missing_owners += 1;
            return Ok(counts);
        };

        for (relation, value) in present {
            self.resolve_relation(
                repositories,
                entity_type,
                owner.id,
                relation,
                &value,
                &mut counts,
            )?;
        }
        Ok(counts)
    }

    fn resolve_relation(
        &self,
        repositories: &RepositorySet<'_>,
        owner_type: EntityType,
        owner: EntityId,
        relation: &RelationSpec,
        value: &RelationValue<'_>,
        counts: &mut RelationCounts,
    ) -> Result<(), ImportError> {
        let targets = repositories.get(relation.target);
        let mut resolved = Vec::new();
        for url in value.urls() {
            let local_url = self.translator.rewrite_base(url);
            extract_id(&local_url)?;
            let Some(row) = targets.find_by_reference_url(&local_url)? else {
                log::debug!(
                    "dropping {owner_type} {owner} '{}' reference {local_url}: no local row",
                    relation.name
                );
                counts.unresolved += 1;
                continue;
            };
            resolved.push(row.id);
        }

        match relation.kind {
            RelationKind::JoinTable => {
                if resolved.is_empty() {
                    return Ok(());
                }
                let table = JoinTable::between(owner_type, relation.target);
                let pairs: Vec<(EntityId, EntityId)> =
                    resolved.into_iter().map(|related| (owner, related)).collect();
                counts.links_created += repositories
                    .get(owner_type)
                    .bulk_insert_relations(&table, &pairs)?;
            }
            RelationKind::ForeignKey { column } => {
                let target = resolved.first().copied();
                let surplus = resolved.len().saturating_sub(1);
                if surplus > 0 {
                    log::debug!(
                        "{owner_type} {owner} '{}' holds one reference; dropping {surplus} more",
                        relation.name
                    );
                    counts.unresolved += surplus;
                }
                repositories
                    .get(owner_type)
                    .set_foreign_key(owner, column, target)?;
                if target.is_some() {
                    counts.foreign_keys_set += 1;
                }
            }
            RelationKind::InverseForeignKey { column } => {
                for related in resolved {
                    targets.set_foreign_key(related, column, Some(owner))?;
                    counts.foreign_keys_set += 1;
                }
            }
        }
        Ok(())
    }
}
