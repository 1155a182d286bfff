//! Two-phase import of the remote catalogue into a local store.
//!
//! Phase 1 ([`BaseImporter`]) creates one row per remote record with its
//! reference URL rewritten to the local scheme. Phase 2
//! ([`RelationResolver`]) resolves every declared relation against those
//! rows and writes foreign keys and join-table rows. [`Pipeline`] runs both
//! phases in separate transactions and reports what happened in a
//! [`SyncReport`].
//!
//! The crate is agnostic of transport and storage: it reads through
//! [`holocron_core::PageSource`] and writes through
//! [`holocron_core::CatalogStore`].

#![forbid(unsafe_code)]

mod base;
mod error;
mod pipeline;
mod relations;

pub use base::{BaseImportCounts, BaseImporter, IdAssignment, RecordOutcome};
pub use error::{ImportError, Phase, PipelineError};
pub use pipeline::{
    EntityReport, Pipeline, PipelineConfig, PipelineState, RelationRecords, SyncReport,
};
pub use relations::{RelationCounts, RelationResolver};
