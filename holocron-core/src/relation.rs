//! Static relation declarations for every entity type.
//!
//! Relations are declared once, here, as `'static` tables indexed by an
//! exhaustive `match` on [`EntityType`]. Adding a type or a relation is a
//! compile-time change; nothing dispatches on relation names at runtime.

use crate::entity::EntityType;

/// Whether a relation holds one reference or a list of references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// A single reference URL.
    Singular,
    /// A list of reference URLs.
    Plural,
}

/// How a declared relation is stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Foreign-key column on the owning row.
    ForeignKey {
        /// Column on the owning table.
        column: &'static str,
    },
    /// Foreign-key column on each related row, pointing back at the owner.
    InverseForeignKey {
        /// Column on the related table.
        column: &'static str,
    },
    /// Many-to-many join table shared by both directions of the relation.
    JoinTable,
}

/// One declared relation on an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationSpec {
    /// Field name carrying the relation on remote records.
    pub name: &'static str,
    /// Entity type the relation points at.
    pub target: EntityType,
    /// Local storage strategy.
    pub kind: RelationKind,
}

impl RelationSpec {
    const fn join(name: &'static str, target: EntityType) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::JoinTable,
        }
    }

    const fn foreign_key(name: &'static str, target: EntityType, column: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::ForeignKey { column },
        }
    }

    const fn inverse(name: &'static str, target: EntityType, column: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::InverseForeignKey { column },
        }
    }

    /// Singular for foreign keys on the owner, plural otherwise.
    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        match self.kind {
            RelationKind::ForeignKey { .. } => Cardinality::Singular,
            RelationKind::InverseForeignKey { .. } | RelationKind::JoinTable => {
                Cardinality::Plural
            }
        }
    }

    /// The join table realising this relation when owned by `owner`.
    #[must_use]
    pub const fn join_table(&self, owner: EntityType) -> Option<JoinTable> {
        match self.kind {
            RelationKind::JoinTable => Some(JoinTable::between(owner, self.target)),
            RelationKind::ForeignKey { .. } | RelationKind::InverseForeignKey { .. } => None,
        }
    }
}

const PEOPLE: &[RelationSpec] = &[
    RelationSpec::foreign_key("homeworld", EntityType::Planets, "homeworld_id"),
    RelationSpec::join("films", EntityType::Films),
    RelationSpec::join("species", EntityType::Species),
    RelationSpec::join("starships", EntityType::Starships),
    RelationSpec::join("vehicles", EntityType::Vehicles),
];

const PLANETS: &[RelationSpec] = &[
    RelationSpec::inverse("residents", EntityType::People, "homeworld_id"),
    RelationSpec::join("films", EntityType::Films),
];

const FILMS: &[RelationSpec] = &[
    RelationSpec::join("characters", EntityType::People),
    RelationSpec::join("planets", EntityType::Planets),
    RelationSpec::join("starships", EntityType::Starships),
    RelationSpec::join("vehicles", EntityType::Vehicles),
    RelationSpec::join("species", EntityType::Species),
];

const SPECIES: &[RelationSpec] = &[
    RelationSpec::foreign_key("homeworld", EntityType::Planets, "homeworld_id"),
    RelationSpec::join("people", EntityType::People),
    RelationSpec::join("films", EntityType::Films),
];

const STARSHIPS: &[RelationSpec] = &[
    RelationSpec::join("pilots", EntityType::People),
    RelationSpec::join("films", EntityType::Films),
];

const VEHICLES: &[RelationSpec] = &[
    RelationSpec::join("pilots", EntityType::People),
    RelationSpec::join("films", EntityType::Films),
];

pub(crate) const fn relations_for(entity_type: EntityType) -> &'static [RelationSpec] {
    match entity_type {
        EntityType::People => PEOPLE,
        EntityType::Planets => PLANETS,
        EntityType::Films => FILMS,
        EntityType::Species => SPECIES,
        EntityType::Starships => STARSHIPS,
        EntityType::Vehicles => VEHICLES,
    }
}

/// A join table between two entity types.
///
/// The endpoints are kept in alphabetical order so both directions of a
/// relation name the same table.
///
/// # Examples
/// ```
/// use holocron_core::{EntityType, JoinTable};
///
/// let forward = JoinTable::between(EntityType::People, EntityType::Films);
/// let backward = JoinTable::between(EntityType::Films, EntityType::People);
/// assert_eq!(forward, backward);
/// assert_eq!(forward.name(), "films_people");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinTable {
    first: EntityType,
    second: EntityType,
}

impl JoinTable {
    /// Join table linking `a` and `b`, in either order.
    #[must_use]
    pub const fn between(a: EntityType, b: EntityType) -> Self {
        if a.alphabetical_rank() <= b.alphabetical_rank() {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// Alphabetically first endpoint.
    #[must_use]
    pub const fn first(&self) -> EntityType {
        self.first
    }

    /// Alphabetically second endpoint.
    #[must_use]
    pub const fn second(&self) -> EntityType {
        self.second
    }

    /// Table name, `{first}_{second}`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}_{}", self.first.table_name(), self.second.table_name())
    }

    /// Whether `entity_type` is one of the endpoints.
    #[must_use]
    pub fn involves(&self, entity_type: EntityType) -> bool {
        self.first == entity_type || self.second == entity_type
    }

    /// The endpoint opposite `owner`, if `owner` is an endpoint.
    #[must_use]
    pub fn counterpart(&self, owner: EntityType) -> Option<EntityType> {
        if owner == self.first {
            Some(self.second)
        } else if owner == self.second {
            Some(self.first)
        } else {
            None
        }
    }

    /// Every distinct join table declared by any entity type, ordered by name.
    #[must_use]
    pub fn all() -> Vec<Self> {
        let mut tables: Vec<Self> = EntityType::ALL
            .into_iter()
            .flat_map(|owner| {
                owner
                    .relations()
                    .iter()
                    .filter_map(move |spec| spec.join_table(owner))
            })
            .collect();
        tables.sort_by_cached_key(Self::name);
        tables.dedup();
        tables
    }
}

/// Foreign-key columns carried by rows of `entity_type`.
#[must_use]
pub fn foreign_key_columns(entity_type: EntityType) -> Vec<(&'static str, EntityType)> {
    let mut columns: Vec<_> = entity_type
        .relations()
        .iter()
        .filter_map(|spec| match spec.kind {
            RelationKind::ForeignKey { column } => Some((column, spec.target)),
            RelationKind::InverseForeignKey { .. } | RelationKind::JoinTable => None,
        })
        .collect();
    columns.dedup();
    columns
}

/// The value of a relation field on a raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationValue<'a> {
    /// Missing, `null` or empty.
    Absent,
    /// One reference URL.
    Single(&'a str),
    /// A non-empty list of reference URLs.
    Many(Vec<&'a str>),
}

impl<'a> RelationValue<'a> {
    /// All referenced URLs, in record order.
    #[must_use]
    pub fn urls(&self) -> Vec<&'a str> {
        match self {
            Self::Absent => Vec::new(),
            Self::Single(url) => vec![*url],
            Self::Many(urls) => urls.clone(),
        }
    }

    /// Whether there is nothing to resolve.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn every_relation_targets_a_type_that_declares_it_back_or_a_foreign_key() {
        for owner in EntityType::ALL {
            for spec in owner.relations() {
                if let Some(table) = spec.join_table(owner) {
                    assert!(table.involves(owner), "{} owns {}", owner, table.name());
                    assert_eq!(table.counterpart(owner), Some(spec.target));
                }
            }
        }
    }

    #[rstest]
    fn join_tables_are_shared_between_directions() {
        let names: Vec<String> = JoinTable::all().iter().map(JoinTable::name).collect();
        assert_eq!(
            names,
            vec![
                "films_people",
                "films_planets",
                "films_species",
                "films_starships",
                "films_vehicles",
                "people_species",
                "people_starships",
                "people_vehicles",
            ]
        );
    }

    #[rstest]
    #[case(EntityType::People, vec![("homeworld_id", EntityType::Planets)])]
    #[case(EntityType::Species, vec![("homeworld_id", EntityType::Planets)])]
    #[case(EntityType::Planets, vec![])]
    #[case(EntityType::Films, vec![])]
    fn foreign_key_columns_follow_declarations(
        #[case] entity_type: EntityType,
        #[case] expected: Vec<(&'static str, EntityType)>,
    ) {
        assert_eq!(foreign_key_columns(entity_type), expected);
    }

    #[rstest]
    fn inverse_relations_point_at_a_declared_foreign_key() {
        for owner in EntityType::ALL {
            for spec in owner.relations() {
                if let RelationKind::InverseForeignKey { column } = spec.kind {
                    let target_columns = foreign_key_columns(spec.target);
                    assert!(
                        target_columns.contains(&(column, owner)),
                        "{owner}.{} needs {}.{column}",
                        spec.name,
                        spec.target
                    );
                }
            }
        }
    }

    #[rstest]
    fn cardinality_follows_kind() {
        let homeworld = EntityType::People.relation("homeworld").expect("declared");
        let residents = EntityType::Planets.relation("residents").expect("declared");
        assert_eq!(homeworld.cardinality(), Cardinality::Singular);
        assert_eq!(residents.cardinality(), Cardinality::Plural);
    }
}
