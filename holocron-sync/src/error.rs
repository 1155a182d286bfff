//! Error types raised while importing the catalogue.

use std::fmt;

use holocron_core::{EntityType, FetchError, RecordError, ReferenceError, StoreError};
use thiserror::Error;

/// Fatal problems inside a single import phase.
///
/// Any of these aborts the phase and rolls back its transaction. Duplicate
/// natural keys, unresolved references and missing owners are not errors;
/// they are logged and counted instead.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The remote API could not deliver a page.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// A reference URL carried no numeric identifier.
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    /// The local store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A remote record lacked a field the importer needs.
    #[error("malformed {entity_type} record: {source}")]
    MalformedRecord {
        /// Collection the record came from.
        entity_type: EntityType,
        /// What was wrong with it.
        #[source]
        source: RecordError,
    },
}

impl ImportError {
    pub(crate) const fn malformed(entity_type: EntityType, source: RecordError) -> Self {
        Self::MalformedRecord {
            entity_type,
            source,
        }
    }
}

/// The two transactional phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Creates the base rows of every entity type.
    Base,
    /// Wires relations between the rows created by [`Phase::Base`].
    Relation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str("base phase"),
            Self::Relation => f.write_str("relation phase"),
        }
    }
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The schema could not be created or checked.
    #[error("failed to apply catalogue migrations")]
    Migrations(#[source] StoreError),
    /// A phase transaction could not be started.
    #[error("failed to begin the {phase}")]
    BeginPhase {
        /// Phase that could not start.
        phase: Phase,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Phase 1 failed and was rolled back. Nothing was persisted.
    #[error("base phase failed and was rolled back")]
    BasePhase(#[source] ImportError),
    /// Phase 2 failed and was rolled back. Base rows remain committed.
    #[error("relation phase failed and was rolled back; base rows remain")]
    RelationPhase(#[source] ImportError),
    /// Committing a phase failed, which discards its writes.
    #[error("failed to commit the {phase}")]
    Commit {
        /// Phase whose commit failed.
        phase: Phase,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// The connection could not be released between phases.
    #[error("failed to release the store connection")]
    ReleaseConnection(#[source] StoreError),
}

impl PipelineError {
    /// Phase the failure happened in, when it happened inside one.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::BeginPhase { phase, .. } | Self::Commit { phase, .. } => Some(*phase),
            Self::BasePhase(_) => Some(Phase::Base),
            Self::RelationPhase(_) => Some(Phase::Relation),
            Self::Migrations(_) | Self::ReleaseConnection(_) => None,
        }
    }
}
