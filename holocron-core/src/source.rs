//! Remote page source abstraction and the paginated record stream.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityType, RawRecord};

/// One page of a remote collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    /// Total number of records in the collection.
    #[serde(default)]
    pub count: u64,
    /// Records on this page, in remote order.
    pub results: Vec<RawRecord>,
    /// Absolute URL of the following page, if any.
    #[serde(default)]
    pub next: Option<String>,
    /// Absolute URL of the preceding page, if any.
    #[serde(default)]
    pub previous: Option<String>,
}

/// Errors raised while fetching remote pages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Additional context from the HTTP client.
        message: String,
    },
    /// The request did not reach the server or the connection broke.
    #[error("network error while requesting {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error description.
        message: String,
    },
    /// No response arrived within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },
    /// The body was not a page envelope.
    #[error("failed to decode page from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder error description.
        message: String,
    },
    /// A `next` link pointed back at a page already visited.
    #[error("pagination revisited {url}")]
    PaginationCycle {
        /// Repeated page URL.
        url: String,
    },
}

/// Source of paginated collection pages.
#[async_trait(?Send)]
pub trait PageSource {
    /// URL of the first page of `entity_type`'s collection.
    fn collection_url(&self, entity_type: EntityType) -> String;

    /// Fetch and decode the page at `url`.
    async fn fetch_page(&self, url: &str) -> Result<Page, FetchError>;
}

struct Cursor {
    next_url: Option<String>,
    buffered: VecDeque<RawRecord>,
    visited: HashSet<String>,
    entity_type: EntityType,
}

/// Stream every record of `entity_type`, following `next` links.
///
/// The stream is lazy and single-pass: pages are requested only as records
/// are consumed, and the stream ends after the last page or the first error.
///
/// # Examples
/// ```
/// use futures_util::TryStreamExt;
/// use holocron_core::{EntityType, fetch_all};
/// use holocron_core::test_support::StubPageSource;
/// use serde_json::json;
///
/// let source = StubPageSource::new("https://remote/api").with_records(
///     EntityType::Planets,
///     2,
///     vec![json!({"url": "https://remote/api/planets/1/", "name": "Tatooine"})],
/// );
/// let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
/// let records: Vec<_> = runtime
///     .block_on(fetch_all(&source, EntityType::Planets).try_collect())
///     .expect("stub pages");
/// assert_eq!(records.len(), 1);
/// ```
pub fn fetch_all<S>(
    source: &S,
    entity_type: EntityType,
) -> impl Stream<Item = Result<RawRecord, FetchError>> + '_
where
    S: PageSource + ?Sized,
{
    let cursor = Cursor {
        next_url: Some(source.collection_url(entity_type)),
        buffered: VecDeque::new(),
        visited: HashSet::new(),
        entity_type,
    };
    stream::try_unfold(cursor, move |cursor| next_record(source, cursor))
}

async fn next_record<S>(
    source: &S,
    mut cursor: Cursor,
) -> Result<Option<(RawRecord, Cursor)>, FetchError>
where
    S: PageSource + ?Sized,
{
    loop {
        if let Some(record) = cursor.buffered.pop_front() {
            return Ok(Some((record, cursor)));
        }
        let Some(url) = cursor.next_url.take() else {
            return Ok(None);
        };
        if !cursor.visited.insert(url.clone()) {
            return Err(FetchError::PaginationCycle { url });
        }
        let page = source.fetch_page(&url).await?;
        log::debug!(
            "fetched {} {} record(s) from {url} ({} total)",
            page.results.len(),
            cursor.entity_type,
            page.count
        );
        cursor.buffered.extend(page.results);
        cursor.next_url = page.next.filter(|next| !next.is_empty());
    }
}
