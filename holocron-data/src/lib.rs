//! Adapters connecting the Holocron importer to the outside world.
//!
//! Responsibilities:
//! - Fetch collection pages from the remote catalogue API ([`http`]).
//! - Persist the catalogue into SQLite and own its schema ([`sqlite`]).
//!
//! Boundaries:
//! - No import rules live here; ordering, duplicate handling and relation
//!   resolution belong to `holocron-sync`.
//! - Adapters implement the traits in `holocron-core` and nothing more.

pub mod http;
pub mod sqlite;
