//! Process-wide log output for the CLI.
//!
//! Library crates emit records through the `log` facade. The subscriber
//! installed here bridges them into `tracing` and writes to stderr, leaving
//! stdout for command output.

use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder};

use crate::CliError;

/// Filter applied when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`.
pub fn init_logging(default_filter: &str) -> Result<(), CliError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(CliError::Logging)
}
