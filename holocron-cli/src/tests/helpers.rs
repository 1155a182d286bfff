//! Test helpers for building stub catalogues and scratch databases.

use super::*;
use crate::sync::{SyncConfig, SyncSourceBuilder};
use camino::Utf8PathBuf;
use holocron_core::EntityType;
use holocron_core::test_support::StubPageSource;
use serde_json::{Value, json};
use std::cell::RefCell;
use tempfile::TempDir;

pub(super) const REMOTE: &str = "https://swapi.test/api";
pub(super) const LOCAL: &str = "http://localhost:8000/api";

/// Hands out a prepared stub source instead of an HTTP client.
pub(super) struct StubSourceBuilder {
    source: RefCell<Option<StubPageSource>>,
}

impl StubSourceBuilder {
    pub(super) const fn new(source: StubPageSource) -> Self {
        Self {
            source: RefCell::new(Some(source)),
        }
    }
}

impl SyncSourceBuilder for StubSourceBuilder {
    type Source = StubPageSource;

    fn build(&self, _config: &SyncConfig) -> Result<Self::Source, CliError> {
        Ok(self
            .source
            .take()
            .expect("stub source is built once per invocation"))
    }
}

/// Remote catalogue with one planet whose residents are `names`.
pub(super) fn tatooine_catalogue(names: &[&str]) -> StubPageSource {
    let reference = |segment: &str, id: usize| format!("{REMOTE}/{segment}/{id}/");
    let people: Vec<Value> = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            json!({
                "url": reference("people", index + 1),
                "name": name,
                "homeworld": reference("planets", 1),
            })
        })
        .collect();
    let residents: Vec<String> = (1..=names.len())
        .map(|id| reference("people", id))
        .collect();

    StubPageSource::new(REMOTE)
        .with_records(EntityType::People, 10, people)
        .with_records(
            EntityType::Planets,
            10,
            [json!({
                "url": reference("planets", 1),
                "name": "Tatooine",
                "residents": residents,
            })],
        )
        .with_records(EntityType::Films, 10, [])
        .with_records(EntityType::Species, 10, [])
        .with_records(EntityType::Starships, 10, [])
        .with_records(EntityType::Vehicles, 10, [])
}

/// Scratch directory with a UTF-8 path for database files.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("catalogue").join("holocron.db")
    }
}
