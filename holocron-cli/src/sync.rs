//! Sync command implementation for the Holocron CLI.

use std::io::Write;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use holocron_core::{PageSource, ReferenceTranslator};
use holocron_data::http::{
    DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, HttpPageSource, HttpPageSourceConfig,
};
use holocron_data::sqlite::SqliteCatalogStore;
use holocron_sync::{IdAssignment, Pipeline, PipelineConfig, RelationRecords, SyncReport};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_ID_ASSIGNMENT, ARG_LOCAL_BASE, ARG_RELATION_RECORDS, ARG_REMOTE_BASE,
    ARG_TIMEOUT_SECS, ARG_USER_AGENT, CliError, ENV_SYNC_DATABASE, ENV_SYNC_LOCAL_BASE,
    ENV_SYNC_REMOTE_BASE,
};

/// How local ids are chosen for new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum IdStrategy {
    /// Predict the id before saving and reconcile afterwards.
    Predicted,
    /// Save first and use the id the database assigns.
    Authoritative,
}

impl From<IdStrategy> for IdAssignment {
    fn from(strategy: IdStrategy) -> Self {
        match strategy {
            IdStrategy::Predicted => Self::Predicted,
            IdStrategy::Authoritative => Self::Authoritative,
        }
    }
}

/// Where the relation phase reads its records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RecordsStrategy {
    /// Fetch every collection again.
    Refetch,
    /// Keep the records fetched by the base phase in memory.
    Reuse,
}

impl From<RecordsStrategy> for RelationRecords {
    fn from(strategy: RecordsStrategy) -> Self {
        match strategy {
            RecordsStrategy::Refetch => Self::Refetch,
            RecordsStrategy::Reuse => Self::Reuse,
        }
    }
}

/// CLI arguments for the `sync` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "sync",
    long_about = "Fetch every collection of the remote catalogue, store one row \
                 per record with its reference rewritten to the local base, \
                 then wire foreign keys and join tables. Each phase runs in \
                 its own transaction.",
    about = "Import the remote catalogue into a SQLite database"
)]
#[ortho_config(prefix = "HOLOCRON")]
pub(crate) struct SyncArgs {
    /// Path to the SQLite catalogue database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Base URL of the remote API (e.g. "https://swapi.dev/api").
    #[arg(long = ARG_REMOTE_BASE, value_name = "url")]
    #[serde(default)]
    pub(crate) remote_base: Option<String>,
    /// Base URL that stored references are rewritten to.
    #[arg(long = ARG_LOCAL_BASE, value_name = "url")]
    #[serde(default)]
    pub(crate) local_base: Option<String>,
    /// Id strategy for new rows.
    #[arg(long = ARG_ID_ASSIGNMENT, value_enum, value_name = "strategy")]
    #[serde(default)]
    pub(crate) id_assignment: Option<IdStrategy>,
    /// Record source for the relation phase.
    #[arg(long = ARG_RELATION_RECORDS, value_enum, value_name = "strategy")]
    #[serde(default)]
    pub(crate) relation_records: Option<RecordsStrategy>,
    /// Per-request timeout in seconds.
    #[arg(long = ARG_TIMEOUT_SECS, value_name = "seconds")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
    /// User-Agent header sent with every request.
    #[arg(long = ARG_USER_AGENT, value_name = "agent")]
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
}

impl SyncArgs {
    pub(crate) fn into_config(self) -> Result<SyncConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SyncConfig::try_from(merged)
    }
}

/// Resolved `sync` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyncConfig {
    /// Path to the SQLite catalogue database.
    pub(crate) database: Utf8PathBuf,
    /// Base URL of the remote API.
    pub(crate) remote_base: String,
    /// Base URL of stored references.
    pub(crate) local_base: String,
    pub(crate) id_assignment: IdAssignment,
    pub(crate) relation_records: RelationRecords,
    pub(crate) timeout: Duration,
    pub(crate) user_agent: String,
}

impl SyncConfig {
    pub(crate) fn pipeline_config(&self) -> PipelineConfig {
        let translator =
            ReferenceTranslator::new(self.remote_base.as_str(), self.local_base.as_str());
        PipelineConfig::new(translator)
            .with_id_assignment(self.id_assignment)
            .with_relation_records(self.relation_records)
    }

    fn source_config(&self) -> HttpPageSourceConfig {
        HttpPageSourceConfig::new(self.remote_base.as_str())
            .with_timeout(self.timeout)
            .with_user_agent(self.user_agent.clone())
    }
}

impl TryFrom<SyncArgs> for SyncConfig {
    type Error = CliError;

    fn try_from(args: SyncArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_SYNC_DATABASE,
        })?;
        let remote_base = args.remote_base.ok_or(CliError::MissingArgument {
            field: ARG_REMOTE_BASE,
            env: ENV_SYNC_REMOTE_BASE,
        })?;
        let local_base = args.local_base.ok_or(CliError::MissingArgument {
            field: ARG_LOCAL_BASE,
            env: ENV_SYNC_LOCAL_BASE,
        })?;

        Ok(Self {
            database,
            remote_base,
            local_base,
            id_assignment: args
                .id_assignment
                .map(IdAssignment::from)
                .unwrap_or_default(),
            relation_records: args
                .relation_records
                .map(RelationRecords::from)
                .unwrap_or_default(),
            timeout: Duration::from_secs(args.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            user_agent: args
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
        })
    }
}

/// Builds the page source for the current sync invocation.
pub(super) trait SyncSourceBuilder {
    type Source: PageSource;

    fn build(&self, config: &SyncConfig) -> Result<Self::Source, CliError>;
}

pub(super) struct HttpSourceBuilder;

impl SyncSourceBuilder for HttpSourceBuilder {
    type Source = HttpPageSource;

    fn build(&self, config: &SyncConfig) -> Result<Self::Source, CliError> {
        HttpPageSource::with_config(config.source_config()).map_err(|source| {
            CliError::BuildSource {
                base_url: config.remote_base.clone(),
                source,
            }
        })
    }
}

pub(super) fn run_sync(args: SyncArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_sync_with(args, &HttpSourceBuilder, &mut stdout)
}

pub(super) fn run_sync_with<B: SyncSourceBuilder>(
    args: SyncArgs,
    builder: &B,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let report = execute_sync(&config, builder)?;
    write_sync_report(writer, &report)
}

fn execute_sync<B: SyncSourceBuilder>(
    config: &SyncConfig,
    builder: &B,
) -> Result<SyncReport, CliError> {
    let source = builder.build(config)?;
    let store = SqliteCatalogStore::open(&config.database).map_err(|source| {
        CliError::OpenStore {
            path: config.database.clone(),
            source,
        }
    })?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let mut pipeline = Pipeline::new(source, store, config.pipeline_config());
    log::info!("syncing {} into {}", config.remote_base, config.database);
    let report = runtime.block_on(pipeline.run())?;
    Ok(report)
}

fn write_sync_report(writer: &mut dyn Write, report: &SyncReport) -> Result<(), CliError> {
    for entry in report.iter() {
        writeln!(writer, "{entry}").map_err(CliError::WriteOutput)?;
    }
    writeln!(
        writer,
        "total: {}; {}",
        report.base_totals(),
        report.relation_totals()
    )
    .map_err(CliError::WriteOutput)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SyncConfig, CliError> {
    let merged = SyncArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SyncConfig::try_from(merged)
}
