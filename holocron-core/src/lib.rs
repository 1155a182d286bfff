//! Core domain types for the Holocron catalogue importer.
//!
//! The crate defines the six catalogue entity types and their relation
//! declarations, the translation between remote and local reference URLs,
//! the [`PageSource`] seam with its lazy [`fetch_all`] record stream, and the
//! repository traits the importer writes through. Concrete HTTP and SQLite
//! adapters live in `holocron-data`.

pub mod entity;
pub mod reference;
pub mod relation;
pub mod source;
pub mod store;
#[doc(hidden)]
pub mod test_support;

pub use entity::{
    EntityId, EntityType, NewEntity, RawRecord, RecordError, StoredEntity, URL_FIELD,
    UnknownEntityType,
};
pub use reference::{BaseUrl, ReferenceError, ReferenceTranslator, extract_id, extract_ids};
pub use relation::{
    Cardinality, JoinTable, RelationKind, RelationSpec, RelationValue, foreign_key_columns,
};
pub use source::{FetchError, Page, PageSource, fetch_all};
pub use store::{
    CatalogStore, EntityRepository, PhaseTransaction, RepositorySet, StoreError,
};
