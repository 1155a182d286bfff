//! Entity types, identifiers and record shapes shared by every crate.
//!
//! A [`RawRecord`] is the JSON object delivered by the remote API. The
//! importer turns it into a [`NewEntity`] holding only scalar attributes, and
//! the store hands back a [`StoredEntity`] once the row has an identifier.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::relation::{RelationSpec, RelationValue, relations_for};

/// Field carrying the canonical reference URL on every remote record.
pub const URL_FIELD: &str = "url";

/// Closed set of catalogue resource types.
///
/// # Examples
/// ```
/// use holocron_core::EntityType;
///
/// let parsed: EntityType = "starships".parse().expect("known type");
/// assert_eq!(parsed, EntityType::Starships);
/// assert_eq!(parsed.natural_key_field(), "name");
/// assert_eq!(EntityType::Films.natural_key_field(), "title");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Characters.
    People,
    /// Planets, referenced as homeworlds.
    Planets,
    /// Films.
    Films,
    /// Species.
    Species,
    /// Starships.
    Starships,
    /// Vehicles.
    Vehicles,
}

impl EntityType {
    /// Every entity type, in the order the pipeline processes them.
    pub const ALL: [Self; 6] = [
        Self::People,
        Self::Planets,
        Self::Films,
        Self::Species,
        Self::Starships,
        Self::Vehicles,
    ];

    /// Path segment used in both the remote and local URL schemes.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::People => "people",
            Self::Planets => "planets",
            Self::Films => "films",
            Self::Species => "species",
            Self::Starships => "starships",
            Self::Vehicles => "vehicles",
        }
    }

    /// Name of the local table holding rows of this type.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        self.path_segment()
    }

    /// Column used by join tables to reference rows of this type.
    #[must_use]
    pub const fn key_column(self) -> &'static str {
        match self {
            Self::People => "people_id",
            Self::Planets => "planets_id",
            Self::Films => "films_id",
            Self::Species => "species_id",
            Self::Starships => "starships_id",
            Self::Vehicles => "vehicles_id",
        }
    }

    /// Field that acts as the natural key for duplicate detection.
    #[must_use]
    pub const fn natural_key_field(self) -> &'static str {
        match self {
            Self::Films => "title",
            Self::People | Self::Planets | Self::Species | Self::Starships | Self::Vehicles => {
                "name"
            }
        }
    }

    /// Declared relations, in declaration order.
    #[must_use]
    pub const fn relations(self) -> &'static [RelationSpec] {
        relations_for(self)
    }

    /// Look up a declared relation by its field name.
    #[must_use]
    pub fn relation(self, name: &str) -> Option<&'static RelationSpec> {
        self.relations().iter().find(|spec| spec.name == name)
    }

    /// Rank used to order join-table names alphabetically.
    pub(crate) const fn alphabetical_rank(self) -> u8 {
        match self {
            Self::Films => 0,
            Self::People => 1,
            Self::Planets => 2,
            Self::Species => 3,
            Self::Starships => 4,
            Self::Vehicles => 5,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Raised when a string does not name a known [`EntityType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity type '{name}'")]
pub struct UnknownEntityType {
    /// The rejected name.
    pub name: String,
}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|entity_type| entity_type.path_segment() == value)
            .ok_or_else(|| UnknownEntityType {
                name: value.to_owned(),
            })
    }
}

/// Identifier assigned to a row by the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Wrap a raw store identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Return the raw store identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Problems with the shape of an individual remote record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record was not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,
    /// A required string field is absent or empty.
    #[error("record is missing required field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },
    /// A relation field held something other than a URL or list of URLs.
    #[error("relation field '{field}' must hold a URL or a list of URLs")]
    InvalidRelation {
        /// Name of the offending relation field.
        field: &'static str,
    },
}

/// A record exactly as the remote API delivered it.
///
/// # Examples
/// ```
/// use holocron_core::{EntityType, RawRecord};
/// use serde_json::json;
///
/// let record = RawRecord::try_from(json!({
///     "url": "https://remote/api/people/1/",
///     "name": "Luke Skywalker",
///     "homeworld": "https://remote/api/planets/1/",
/// }))
/// .expect("object payload");
///
/// assert_eq!(record.url().expect("url present"), "https://remote/api/people/1/");
/// let attributes = record.scalar_attributes(EntityType::People);
/// assert!(attributes.contains_key("name"));
/// assert!(!attributes.contains_key("homeworld"));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    /// Wrap an already-decoded JSON object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Borrow the underlying fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The record's remote reference URL.
    pub fn url(&self) -> Result<&str, RecordError> {
        self.required_str(URL_FIELD)
    }

    /// The natural key (name or title) for `entity_type`.
    pub fn natural_key(&self, entity_type: EntityType) -> Result<&str, RecordError> {
        self.required_str(entity_type.natural_key_field())
    }

    /// Read a declared relation field.
    ///
    /// Missing, `null`, empty strings and empty lists all read as
    /// [`RelationValue::Absent`].
    pub fn relation_value(
        &self,
        relation: &'static RelationSpec,
    ) -> Result<RelationValue<'_>, RecordError> {
        match self.0.get(relation.name) {
            None | Some(Value::Null) => Ok(RelationValue::Absent),
            Some(Value::String(url)) if url.is_empty() => Ok(RelationValue::Absent),
            Some(Value::String(url)) => Ok(RelationValue::Single(url.as_str())),
            Some(Value::Array(items)) if items.is_empty() => Ok(RelationValue::Absent),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or(RecordError::InvalidRelation {
                        field: relation.name,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(RelationValue::Many),
            Some(_) => Err(RecordError::InvalidRelation {
                field: relation.name,
            }),
        }
    }

    /// Every field except the reference URL and declared relations.
    #[must_use]
    pub fn scalar_attributes(&self, entity_type: EntityType) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(name, _)| name.as_str() != URL_FIELD)
            .filter(|(name, _)| entity_type.relation(name).is_none())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn required_str(&self, field: &'static str) -> Result<&str, RecordError> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .ok_or(RecordError::MissingField { field })
    }
}

impl TryFrom<Value> for RawRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            _ => Err(RecordError::NotAnObject),
        }
    }
}

/// Scalar portion of a record, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    /// Value of the type's natural key field.
    pub natural_key: String,
    /// Local reference URL, when known before the row is written.
    pub reference_url: Option<String>,
    /// Scalar fields copied from the remote record.
    pub attributes: Map<String, Value>,
}

/// A row as held by the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    /// Store-assigned identifier.
    pub id: EntityId,
    /// Value of the type's natural key field.
    pub natural_key: String,
    /// Local reference URL embedding [`StoredEntity::id`].
    pub reference_url: Option<String>,
    /// Scalar fields copied from the remote record.
    pub attributes: Map<String, Value>,
    /// Creation timestamp assigned by the store.
    pub created: String,
    /// Last-modification timestamp assigned by the store.
    pub edited: String,
}
