//! HTTP access to the remote catalogue API.
//!
//! [`HttpPageSource`] implements [`holocron_core::PageSource`] with `reqwest`.
//! Each request carries the configured user agent and an explicit timeout, so
//! a stalled remote cannot hang an import phase. Status, transport, timeout
//! and decoding failures map onto [`holocron_core::FetchError`].

mod source;

pub use source::{
    DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, HttpPageSource, HttpPageSourceConfig,
    SourceBuildError,
};
