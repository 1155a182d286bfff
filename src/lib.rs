//! Facade crate for the Holocron catalogue importer.
//!
//! This crate re-exports the core domain types and the sync pipeline, and
//! exposes the HTTP source and SQLite store behind the `store-sqlite` feature.
//!
//! # Examples
//! ```
//! use holocron::{EntityType, ReferenceTranslator};
//!
//! let translator =
//!     ReferenceTranslator::new("https://swapi.dev/api/", "http://localhost:8000/api");
//! assert_eq!(
//!     translator.rewrite_base("https://swapi.dev/api/people/1/"),
//!     "http://localhost:8000/api/people/1/"
//! );
//! assert_eq!(EntityType::People.to_string(), "people");
//! ```

#![forbid(unsafe_code)]

pub use holocron_core::{
    BaseUrl, CatalogStore, EntityId, EntityRepository, EntityType, FetchError, NewEntity, Page,
    PageSource, PhaseTransaction, RawRecord, ReferenceError, ReferenceTranslator, RelationSpec,
    RepositorySet, StoreError, StoredEntity, fetch_all,
};
pub use holocron_sync::{
    IdAssignment, ImportError, Phase, Pipeline, PipelineConfig, PipelineError, PipelineState,
    RelationRecords, SyncReport,
};

#[cfg(feature = "store-sqlite")]
pub use holocron_data::http::{HttpPageSource, HttpPageSourceConfig};
#[cfg(feature = "store-sqlite")]
pub use holocron_data::sqlite::SqliteCatalogStore;
