//! Translation between remote and local reference URLs.
//!
//! Both URL schemes share the shape `{base}/{entityType}/{id}/`. Only the base
//! differs, so translating a reference means swapping the prefix and parsing
//! the trailing numeric segment.

use std::{fmt, ops::Deref};

use thiserror::Error;

use crate::entity::{EntityId, EntityType};

/// Raised when a reference URL does not end in a numeric identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    /// The URL has no trailing `/<digits>/` segment.
    #[error("reference URL '{url}' does not end in a numeric identifier")]
    Malformed {
        /// The offending URL.
        url: String,
    },
}

/// Parse the identifier embedded in a reference URL.
///
/// Accepts both `…/people/42/` and `…/people/42`.
///
/// # Examples
/// ```
/// use holocron_core::{EntityId, extract_id};
///
/// assert_eq!(extract_id("https://remote/api/people/42/"), Ok(EntityId::new(42)));
/// assert!(extract_id("https://remote/api/people/").is_err());
/// ```
pub fn extract_id(url: &str) -> Result<EntityId, ReferenceError> {
    let malformed = || ReferenceError::Malformed {
        url: url.to_owned(),
    };
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    let (_, tail) = trimmed.rsplit_once('/').ok_or_else(malformed)?;
    if tail.is_empty() || !tail.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(malformed());
    }
    tail.parse::<i64>().map(EntityId::new).map_err(|_| malformed())
}

/// Parse every URL with [`extract_id`], failing on the first malformed one.
pub fn extract_ids<'a, I>(urls: I) -> Result<Vec<EntityId>, ReferenceError>
where
    I: IntoIterator<Item = &'a str>,
{
    urls.into_iter().map(extract_id).collect()
}

/// Base URL with trailing slashes removed.
///
/// # Examples
/// ```
/// use holocron_core::BaseUrl;
///
/// let base = BaseUrl::new("http://localhost:8000/api//");
/// assert_eq!(base.as_ref(), "http://localhost:8000/api");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Normalise and wrap a base URL.
    pub fn new(value: impl Into<String>) -> Self {
        let mut value = value.into();
        let trimmed = value.trim_end_matches('/').len();
        value.truncate(trimmed);
        Self(value)
    }

    /// Consume the wrapper and return the inner [`String`].
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Collection URL for `entity_type` under this base.
    #[must_use]
    pub fn collection_url(&self, entity_type: EntityType) -> String {
        format!("{}/{}/", self.0, entity_type.path_segment())
    }
}

impl From<&str> for BaseUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BaseUrl {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for BaseUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for BaseUrl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rewrites references between the remote and local URL schemes.
///
/// # Examples
/// ```
/// use holocron_core::{EntityId, EntityType, ReferenceTranslator};
///
/// let translator = ReferenceTranslator::new("https://swapi.dev/api", "http://localhost:8000/api");
/// assert_eq!(
///     translator.rewrite_base("https://swapi.dev/api/planets/1/"),
///     "http://localhost:8000/api/planets/1/",
/// );
/// assert_eq!(
///     translator.local_reference_url(EntityType::People, EntityId::new(3)),
///     "http://localhost:8000/api/people/3/",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTranslator {
    remote_base: BaseUrl,
    local_base: BaseUrl,
}

impl ReferenceTranslator {
    /// Build a translator from the remote and local base URLs.
    pub fn new(remote_base: impl Into<BaseUrl>, local_base: impl Into<BaseUrl>) -> Self {
        Self {
            remote_base: remote_base.into(),
            local_base: local_base.into(),
        }
    }

    /// The remote API base.
    #[must_use]
    pub const fn remote_base(&self) -> &BaseUrl {
        &self.remote_base
    }

    /// The local API base.
    #[must_use]
    pub const fn local_base(&self) -> &BaseUrl {
        &self.local_base
    }

    /// `{localBase}/{entityType}/{id}/`.
    #[must_use]
    pub fn local_reference_url(&self, entity_type: EntityType, id: EntityId) -> String {
        format!(
            "{}/{}/{}/",
            self.local_base,
            entity_type.path_segment(),
            id.get()
        )
    }

    /// Swap the remote base prefix for the local one.
    ///
    /// URLs that do not start with the remote base are returned unchanged.
    #[must_use]
    pub fn rewrite_base(&self, url: &str) -> String {
        match url.strip_prefix(self.remote_base.as_ref()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                format!("{}{rest}", self.local_base)
            }
            _ => url.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn translator() -> ReferenceTranslator {
        ReferenceTranslator::new("https://swapi.dev/api/", "http://localhost:8000/api")
    }

    #[rstest]
    #[case("https://swapi.dev/api/people/1/", 1)]
    #[case("https://swapi.dev/api/people/1", 1)]
    #[case("http://localhost:8000/api/films/61/", 61)]
    #[case("/planets/007/", 7)]
    fn extracts_trailing_identifier(#[case] url: &str, #[case] expected: i64) {
        assert_eq!(extract_id(url), Ok(EntityId::new(expected)));
    }

    #[rstest]
    #[case("https://swapi.dev/api/people/")]
    #[case("https://swapi.dev/api/people/one/")]
    #[case("https://swapi.dev/api/people/-1/")]
    #[case("https://swapi.dev/api/people/99999999999999999999/")]
    #[case("42")]
    #[case("")]
    fn rejects_malformed_references(#[case] url: &str) {
        assert_eq!(
            extract_id(url),
            Err(ReferenceError::Malformed {
                url: url.to_owned()
            })
        );
    }

    #[rstest]
    fn extract_ids_stops_at_first_malformed() {
        let urls = ["https://x/people/1/", "https://x/people/nope/", "https://x/people/bad"];
        assert_eq!(
            extract_ids(urls),
            Err(ReferenceError::Malformed {
                url: "https://x/people/nope/".to_owned()
            })
        );
        assert_eq!(
            extract_ids(["https://x/people/1/", "https://x/people/2"]),
            Ok(vec![EntityId::new(1), EntityId::new(2)])
        );
    }

    #[rstest]
    fn rewrites_remote_prefix(translator: ReferenceTranslator) {
        assert_eq!(
            translator.rewrite_base("https://swapi.dev/api/starships/9/"),
            "http://localhost:8000/api/starships/9/"
        );
    }

    #[rstest]
    #[case("https://elsewhere.test/api/people/1/")]
    #[case("https://swapi.dev/apiary/people/1/")]
    fn leaves_foreign_urls_unchanged(translator: ReferenceTranslator, #[case] url: &str) {
        assert_eq!(translator.rewrite_base(url), url);
    }

    #[rstest]
    fn builds_local_reference_urls(translator: ReferenceTranslator) {
        assert_eq!(
            translator.local_reference_url(EntityType::Vehicles, EntityId::new(14)),
            "http://localhost:8000/api/vehicles/14/"
        );
        assert_eq!(
            translator.remote_base().collection_url(EntityType::Films),
            "https://swapi.dev/api/films/"
        );
    }
}
