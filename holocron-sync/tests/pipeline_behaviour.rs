//! Behavioural tests for a full sync into a SQLite database.

use std::cell::RefCell;

use holocron_core::test_support::StubPageSource;
use holocron_core::{EntityType, FetchError, ReferenceTranslator};
use holocron_data::sqlite::SqliteCatalogStore;
use holocron_sync::{Phase, Pipeline, PipelineConfig, PipelineError, SyncReport};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

const REMOTE: &str = "https://swapi.test/api";
const LOCAL: &str = "http://localhost:8000/api";

type SqlitePipeline = Pipeline<StubPageSource, SqliteCatalogStore>;

#[derive(Default)]
struct SyncWorld {
    source: RefCell<Option<StubPageSource>>,
    pipeline: RefCell<Option<SqlitePipeline>>,
    outcomes: RefCell<Vec<Result<SyncReport, PipelineError>>>,
}

impl SyncWorld {
    fn sync(&self) {
        let mut guard = self.pipeline.borrow_mut();
        let pipeline = guard.as_mut().expect("pipeline should be built");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let outcome = runtime.block_on(pipeline.run());
        self.outcomes.borrow_mut().push(outcome);
    }

    fn count(&self, sql: &str) -> i64 {
        let guard = self.pipeline.borrow();
        let pipeline = guard.as_ref().expect("pipeline should be built");
        pipeline
            .store()
            .connection()
            .expect("in-memory store stays connected")
            .query_row(sql, [], |row| row.get(0))
            .expect("count query")
    }
}

#[fixture]
fn world() -> SyncWorld {
    SyncWorld::default()
}

fn url(path: &str, id: usize) -> String {
    format!("{REMOTE}/{path}/{id}/")
}

#[given("a remote catalogue with {count} people from Tatooine")]
fn remote_catalogue(world: &SyncWorld, count: usize) {
    let people: Vec<Value> = (1..=count)
        .map(|id| {
            json!({
                "url": url("people", id),
                "name": format!("Moisture farmer {id}"),
                "homeworld": url("planets", 1),
                "films": [url("films", 1)],
            })
        })
        .collect();
    let residents: Vec<String> = (1..=count).map(|id| url("people", id)).collect();
    let source = StubPageSource::new(REMOTE)
        .with_records(EntityType::People, 2, people)
        .with_records(
            EntityType::Planets,
            2,
            [json!({
                "url": url("planets", 1),
                "name": "Tatooine",
                "residents": residents,
                "films": [url("films", 1)],
            })],
        )
        .with_records(
            EntityType::Films,
            2,
            [json!({
                "url": url("films", 1),
                "title": "A New Hope",
                "characters": residents,
                "planets": [url("planets", 1)],
            })],
        )
        .with_records(EntityType::Species, 2, [])
        .with_records(EntityType::Starships, 2, [])
        .with_records(EntityType::Vehicles, 2, []);
    world.source.replace(Some(source));
}

#[given("the films collection fails on its second request")]
fn films_fail_later(world: &SyncWorld) {
    let source = world.source.take().expect("source should be configured");
    let films = source.page_url(EntityType::Films, 1);
    let failing = source.with_failure_after(
        films.clone(),
        1,
        FetchError::Http {
            url: films,
            status: 502,
            message: "bad gateway".to_owned(),
        },
    );
    world.source.replace(Some(failing));
}

#[when("the catalogue is synced into SQLite")]
fn sync_into_sqlite(world: &SyncWorld) {
    let source = world.source.take().expect("source should be configured");
    let store = SqliteCatalogStore::in_memory().expect("open in-memory store");
    let config = PipelineConfig::new(ReferenceTranslator::new(REMOTE, LOCAL));
    world
        .pipeline
        .replace(Some(Pipeline::new(source, store, config)));
    world.sync();
}

#[when("the catalogue is synced again")]
fn sync_again(world: &SyncWorld) {
    world.sync();
}

#[then("the database holds {people} people and {planets} planets")]
fn row_counts(world: &SyncWorld, people: i64, planets: i64) {
    assert_eq!(world.count("SELECT COUNT(*) FROM people"), people);
    assert_eq!(world.count("SELECT COUNT(*) FROM planets"), planets);
}

#[then("every person's homeworld is set")]
fn homeworlds_set(world: &SyncWorld) {
    assert_eq!(
        world.count("SELECT COUNT(*) FROM people WHERE homeworld_id IS NULL"),
        0
    );
}

#[then("no person has a homeworld")]
fn homeworlds_unset(world: &SyncWorld) {
    assert_eq!(
        world.count("SELECT COUNT(*) FROM people WHERE homeworld_id IS NOT NULL"),
        0
    );
}

#[then("every person appears in A New Hope")]
fn cast_linked(world: &SyncWorld) {
    assert_eq!(
        world.count("SELECT COUNT(*) FROM films_people"),
        world.count("SELECT COUNT(*) FROM people")
    );
}

#[then("every reference URL embeds its row id")]
fn urls_embed_ids(world: &SyncWorld) {
    for entity_type in EntityType::ALL {
        let table = entity_type.table_name();
        let segment = entity_type.path_segment();
        let mismatched = world.count(&format!(
            "SELECT COUNT(*) FROM {table} \
             WHERE url IS NULL OR url != '{LOCAL}/{segment}/' || id || '/'"
        ));
        assert_eq!(mismatched, 0, "{table} has stale reference URLs");
    }
}

#[then("the sync fails in the relation phase")]
fn relation_phase_failed(world: &SyncWorld) {
    let outcomes = world.outcomes.borrow();
    let last = outcomes.last().expect("a sync ran");
    assert!(
        matches!(last, Err(err) if err.phase() == Some(Phase::Relation)),
        "unexpected outcome {last:?}"
    );
}

#[then("the last sync created {rows} rows and {links} links")]
fn last_sync_created(world: &SyncWorld, rows: usize, links: usize) {
    let outcomes = world.outcomes.borrow();
    let report = outcomes
        .last()
        .expect("a sync ran")
        .as_ref()
        .expect("sync succeeded");
    assert_eq!(report.base_totals().created, rows);
    assert_eq!(report.relation_totals().links_created, links);
}

#[scenario(path = "tests/features/pipeline.feature", index = 0)]
fn fresh_sync(world: SyncWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 1)]
fn failing_relation_phase(world: SyncWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 2)]
fn repeated_sync(world: SyncWorld) {
    let _ = world;
}
