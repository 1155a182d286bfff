//! Command-line interface for the Holocron catalogue importer.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod logging;
mod migrate;
mod sync;

pub use error::CliError;
pub use logging::{DEFAULT_LOG_FILTER, init_logging};

use migrate::{MigrateArgs, run_migrate};
use sync::{SyncArgs, run_sync};

const ARG_DATABASE: &str = "database";
const ARG_REMOTE_BASE: &str = "remote-base";
const ARG_LOCAL_BASE: &str = "local-base";
const ARG_ID_ASSIGNMENT: &str = "id-assignment";
const ARG_RELATION_RECORDS: &str = "relation-records";
const ARG_TIMEOUT_SECS: &str = "timeout-secs";
const ARG_USER_AGENT: &str = "user-agent";
const ENV_SYNC_DATABASE: &str = "HOLOCRON_CMDS_SYNC_DATABASE";
const ENV_SYNC_REMOTE_BASE: &str = "HOLOCRON_CMDS_SYNC_REMOTE_BASE";
const ENV_SYNC_LOCAL_BASE: &str = "HOLOCRON_CMDS_SYNC_LOCAL_BASE";
const ENV_MIGRATE_DATABASE: &str = "HOLOCRON_CMDS_MIGRATE_DATABASE";

/// Run the Holocron CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging(DEFAULT_LOG_FILTER)?;
    match cli.command {
        Command::Migrate(args) => run_migrate(args),
        Command::Sync(args) => run_sync(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "holocron",
    about = "Mirror a paginated remote catalogue into a local SQLite database",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or check the catalogue schema.
    Migrate(MigrateArgs),
    /// Import every collection and wire their relations.
    Sync(SyncArgs),
}

#[cfg(test)]
mod tests;
