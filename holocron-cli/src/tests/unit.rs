//! Focused unit tests covering sync and migrate configuration.

use super::helpers::Workspace;
use super::*;
use crate::migrate::{MigrateArgs, database_from, migrate_database};
use crate::sync::{
    IdStrategy, RecordsStrategy, SyncArgs, SyncConfig, config_from_layers_for_test,
};
use camino::Utf8PathBuf;
use holocron_data::http::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use holocron_sync::{IdAssignment, RelationRecords};
use ortho_config::MergeComposer;
use rstest::rstest;
use serde_json::json;
use std::time::Duration;

fn complete_args() -> SyncArgs {
    SyncArgs {
        database: Some(Utf8PathBuf::from("holocron.db")),
        remote_base: Some("https://swapi.dev/api".to_owned()),
        local_base: Some("http://localhost:8000/api".to_owned()),
        ..SyncArgs::default()
    }
}

#[rstest]
#[case(ARG_DATABASE, ENV_SYNC_DATABASE)]
#[case(ARG_REMOTE_BASE, ENV_SYNC_REMOTE_BASE)]
#[case(ARG_LOCAL_BASE, ENV_SYNC_LOCAL_BASE)]
fn converting_without_required_fields_errors(
    #[case] field: &'static str,
    #[case] env_var: &'static str,
) {
    let mut args = complete_args();
    match field {
        ARG_DATABASE => args.database = None,
        ARG_REMOTE_BASE => args.remote_base = None,
        _ => args.local_base = None,
    }
    let err = SyncConfig::try_from(args).expect_err("missing field should error");
    match err {
        CliError::MissingArgument {
            field: missing,
            env,
        } => {
            assert_eq!(missing, field);
            assert_eq!(env, env_var);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn missing_arguments_name_flag_and_variable() {
    let err = SyncConfig::try_from(SyncArgs::default()).expect_err("database is required");
    assert_eq!(
        err.to_string(),
        "missing database (set --database or HOLOCRON_CMDS_SYNC_DATABASE)"
    );
}

#[rstest]
fn optional_settings_fall_back_to_defaults() {
    let config = SyncConfig::try_from(complete_args()).expect("complete arguments");
    assert_eq!(config.id_assignment, IdAssignment::Predicted);
    assert_eq!(config.relation_records, RelationRecords::Refetch);
    assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
}

#[rstest]
fn flags_parse_into_the_sync_configuration() {
    let cli = Cli::try_parse_from([
        "holocron",
        "sync",
        "--database",
        "mirror.db",
        "--remote-base",
        "https://swapi.dev/api/",
        "--local-base",
        "http://localhost:8000/api",
        "--id-assignment",
        "authoritative",
        "--relation-records",
        "reuse",
        "--timeout-secs",
        "5",
        "--user-agent",
        "archivist/2.0",
    ])
    .expect("valid command line");
    let Command::Sync(args) = cli.command else {
        panic!("expected sync command");
    };
    let config = SyncConfig::try_from(args).expect("complete arguments");

    assert_eq!(config.database, Utf8PathBuf::from("mirror.db"));
    assert_eq!(config.id_assignment, IdAssignment::Authoritative);
    assert_eq!(config.relation_records, RelationRecords::Reuse);
    assert_eq!(config.timeout, Duration::from_secs(5));
    assert_eq!(config.user_agent, "archivist/2.0");

    let pipeline = config.pipeline_config();
    assert_eq!(
        pipeline.translator.remote_base().to_string(),
        "https://swapi.dev/api"
    );
}

#[rstest]
#[case(IdStrategy::Predicted, IdAssignment::Predicted)]
#[case(IdStrategy::Authoritative, IdAssignment::Authoritative)]
fn id_strategies_map_onto_assignments(
    #[case] strategy: IdStrategy,
    #[case] expected: IdAssignment,
) {
    assert_eq!(IdAssignment::from(strategy), expected);
}

#[rstest]
#[case(RecordsStrategy::Refetch, RelationRecords::Refetch)]
#[case(RecordsStrategy::Reuse, RelationRecords::Reuse)]
fn record_strategies_map_onto_sources(
    #[case] strategy: RecordsStrategy,
    #[case] expected: RelationRecords,
) {
    assert_eq!(RelationRecords::from(strategy), expected);
}

#[rstest]
fn merge_layers_maps_configuration_errors() {
    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "timeout_secs": "soon" }));

    let err = config_from_layers_for_test(composer.layers())
        .expect_err("invalid config layer should map to CliError::Configuration");
    match err {
        CliError::Configuration(_) => {}
        other => panic!("expected CliError::Configuration, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_honours_precedence() {
    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({
            "remote_base": "https://from-file/api",
            "local_base": "http://from-file/api",
            "id_assignment": "authoritative",
        }),
        None,
    );
    composer.push_environment(json!({
        "database": "from-env.db",
        "local_base": "http://from-env/api",
    }));
    composer.push_cli(json!({
        "local_base": "http://from-cli/api",
    }));

    let config =
        config_from_layers_for_test(composer.layers()).expect("merged config should build");
    assert_eq!(config.database, Utf8PathBuf::from("from-env.db"));
    assert_eq!(config.remote_base, "https://from-file/api");
    assert_eq!(config.local_base, "http://from-cli/api");
    assert_eq!(config.id_assignment, IdAssignment::Authoritative);
}

#[rstest]
fn migrate_requires_a_database() {
    let err = database_from(MigrateArgs::default()).expect_err("database is required");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_DATABASE);
            assert_eq!(env, ENV_MIGRATE_DATABASE);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn migrate_creates_the_database_and_reports_its_version() {
    let workspace = Workspace::new();
    let database = workspace.database();
    let mut first = Vec::new();
    let mut second = Vec::new();

    migrate_database(&database, &mut first).expect("first migration");
    migrate_database(&database, &mut second).expect("migrations are idempotent");

    assert!(database.is_file());
    let expected = format!("{database}: schema version 1\n");
    assert_eq!(String::from_utf8(first).expect("utf-8"), expected);
    assert_eq!(String::from_utf8(second).expect("utf-8"), expected);
}
