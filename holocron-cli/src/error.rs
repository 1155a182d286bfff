//! Error types emitted by the Holocron CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use holocron_core::StoreError;
use holocron_data::http::SourceBuildError;
use holocron_data::sqlite::OpenStoreError;
use holocron_sync::PipelineError;
use thiserror::Error;

/// Errors emitted by the Holocron CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The log subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The remote page source could not be built.
    #[error("failed to build catalogue client for {base_url:?}: {source}")]
    BuildSource {
        base_url: String,
        #[source]
        source: SourceBuildError,
    },
    /// The catalogue database could not be opened.
    #[error("failed to open catalogue database at {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: OpenStoreError,
    },
    /// Applying migrations failed.
    #[error("failed to migrate catalogue database at {path:?}: {source}")]
    Migrate {
        path: Utf8PathBuf,
        #[source]
        source: StoreError,
    },
    /// The async runtime could not be started.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// The sync pipeline failed.
    #[error("sync failed: {0}")]
    Sync(#[from] PipelineError),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
