//! SQLite persistence for the local catalogue.
//!
//! [`schema`] owns the versioned migrations, [`SqliteRepository`] implements
//! the per-entity persistence primitives over a borrowed connection, and
//! [`SqliteCatalogStore`] hands out one transaction per import phase.

mod repository;
pub mod schema;
mod store;

pub use repository::SqliteRepository;
pub use schema::{SCHEMA_VERSION, SchemaError};
pub use store::{OpenStoreError, SqliteCatalogStore, SqlitePhase};
