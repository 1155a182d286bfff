//! Migrate command implementation for the Holocron CLI.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use holocron_core::CatalogStore;
use holocron_data::sqlite::{SCHEMA_VERSION, SqliteCatalogStore};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{ARG_DATABASE, CliError, ENV_MIGRATE_DATABASE};

/// CLI arguments for the `migrate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "migrate",
    about = "Create the catalogue schema or check an existing one"
)]
#[ortho_config(prefix = "HOLOCRON")]
pub(crate) struct MigrateArgs {
    /// Path to the SQLite catalogue database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

impl MigrateArgs {
    fn into_database(self) -> Result<Utf8PathBuf, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        database_from(merged)
    }
}

pub(crate) fn database_from(args: MigrateArgs) -> Result<Utf8PathBuf, CliError> {
    args.database.ok_or(CliError::MissingArgument {
        field: ARG_DATABASE,
        env: ENV_MIGRATE_DATABASE,
    })
}

pub(super) fn run_migrate(args: MigrateArgs) -> Result<(), CliError> {
    let database = args.into_database()?;
    let mut stdout = std::io::stdout().lock();
    migrate_database(&database, &mut stdout)
}

/// Opens `database`, applies migrations and reports the schema version.
pub(crate) fn migrate_database(
    database: &Utf8Path,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let mut store = SqliteCatalogStore::open(database).map_err(|source| CliError::OpenStore {
        path: database.to_path_buf(),
        source,
    })?;
    store
        .apply_migrations()
        .map_err(|source| CliError::Migrate {
            path: database.to_path_buf(),
            source,
        })?;
    log::info!("catalogue at {database} is at schema version {SCHEMA_VERSION}");
    writeln!(writer, "{database}: schema version {SCHEMA_VERSION}")
        .map_err(CliError::WriteOutput)
}
