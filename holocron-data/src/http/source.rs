//! `PageSource` backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use holocron_core::{BaseUrl, EntityType, FetchError, Page, PageSource};
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Default user agent for catalogue requests.
pub const DEFAULT_USER_AGENT: &str = "holocron-sync/0.1";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while building an [`HttpPageSource`].
#[derive(Debug, Error)]
pub enum SourceBuildError {
    /// The remote base is not an absolute HTTP(S) URL.
    #[error("invalid remote base URL '{url}': {message}")]
    InvalidBaseUrl {
        /// Rejected URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Configuration for [`HttpPageSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPageSourceConfig {
    /// Remote API base, e.g. `https://swapi.dev/api`.
    pub remote_base: BaseUrl,
    /// Timeout applied to connecting and to each whole request.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl HttpPageSourceConfig {
    /// Configuration with default timeout and user agent.
    #[must_use]
    pub fn new(remote_base: impl Into<BaseUrl>) -> Self {
        Self {
            remote_base: remote_base.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Fetches collection pages over HTTP.
///
/// # Examples
/// ```no_run
/// use futures_util::TryStreamExt;
/// use holocron_core::{EntityType, fetch_all};
/// use holocron_data::http::HttpPageSource;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let source = HttpPageSource::new("https://swapi.dev/api")?;
/// let planets: Vec<_> = fetch_all(&source, EntityType::Planets).try_collect().await?;
/// println!("{} planets", planets.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpPageSource {
    client: Client,
    config: HttpPageSourceConfig,
}

impl HttpPageSource {
    /// Source with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the client fails to build.
    pub fn new(remote_base: impl Into<BaseUrl>) -> Result<Self, SourceBuildError> {
        Self::with_config(HttpPageSourceConfig::new(remote_base))
    }

    /// Source with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the client fails to build.
    pub fn with_config(config: HttpPageSourceConfig) -> Result<Self, SourceBuildError> {
        validate_base(&config.remote_base)?;
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpPageSourceConfig {
        &self.config
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return FetchError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        FetchError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

fn validate_base(base: &BaseUrl) -> Result<(), SourceBuildError> {
    let invalid = |message: String| SourceBuildError::InvalidBaseUrl {
        url: base.to_string(),
        message,
    };
    let parsed = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

#[async_trait(?Send)]
impl PageSource for HttpPageSource {
    fn collection_url(&self, entity_type: EntityType) -> String {
        self.config.remote_base.collection_url(entity_type)
    }

    async fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?
            .error_for_status()
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        serde_json::from_slice(&body).map_err(|err| FetchError::Decode {
            url: url.to_owned(),
            message: err.to_string(),
        })
    }
}
