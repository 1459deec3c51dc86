//! Relation-slot vocabulary and the gender constraint each slot implies.
//!
//! Kinship terms follow the registry's India-specific vocabulary
//! (dada/dadi, nana/nani, kaka/kaki, bua/fufa, mama/mami, mausi/mausa,
//! jija, saala/saali).

use crate::model::member::Gender;

/// Gender filter implied by a relation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenderConstraint {
    Any,
    Only(Gender),
    /// Opposite of the requesting member.
    OppositeOfRequester,
}

impl GenderConstraint {
    /// Resolves the constraint to a concrete filter.
    ///
    /// An unknown requester gender on `OppositeOfRequester` resolves to
    /// `Male`, matching how the registry has always treated "not Male".
    pub fn resolve(self, requester: Option<Gender>) -> Option<Gender> {
        match self {
            Self::Any => None,
            Self::Only(gender) => Some(gender),
            Self::OppositeOfRequester => Some(requester.map_or(Gender::Male, Gender::opposite)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    Father,
    Mother,
    Spouse,
    Sibling,
    Child,
    Dada,
    Dadi,
    Nana,
    Nani,
    Kaka,
    Kaki,
    Bua,
    Fufa,
    Mama,
    Mami,
    Mausi,
    Mausa,
    Jija,
    Saala,
    Saali,
    FatherInLaw,
    MotherInLaw,
}

const ALL_RELATIONS: [RelationType; 22] = [
    RelationType::Father,
    RelationType::Mother,
    RelationType::Spouse,
    RelationType::Sibling,
    RelationType::Child,
    RelationType::Dada,
    RelationType::Dadi,
    RelationType::Nana,
    RelationType::Nani,
    RelationType::Kaka,
    RelationType::Kaki,
    RelationType::Bua,
    RelationType::Fufa,
    RelationType::Mama,
    RelationType::Mami,
    RelationType::Mausi,
    RelationType::Mausa,
    RelationType::Jija,
    RelationType::Saala,
    RelationType::Saali,
    RelationType::FatherInLaw,
    RelationType::MotherInLaw,
];

impl RelationType {
    /// Every relation slot, in declaration order.
    pub fn all() -> impl Iterator<Item = RelationType> {
        ALL_RELATIONS.into_iter()
    }

    /// Parses a wire value. Unknown values yield `None` (no filter).
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim();
        Self::all().find(|relation| relation.as_str() == normalized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Father => "father",
            Self::Mother => "mother",
            Self::Spouse => "spouse",
            Self::Sibling => "sibling",
            Self::Child => "child",
            Self::Dada => "dada",
            Self::Dadi => "dadi",
            Self::Nana => "nana",
            Self::Nani => "nani",
            Self::Kaka => "kaka",
            Self::Kaki => "kaki",
            Self::Bua => "bua",
            Self::Fufa => "fufa",
            Self::Mama => "mama",
            Self::Mami => "mami",
            Self::Mausi => "mausi",
            Self::Mausa => "mausa",
            Self::Jija => "jija",
            Self::Saala => "saala",
            Self::Saali => "saali",
            Self::FatherInLaw => "father_in_law",
            Self::MotherInLaw => "mother_in_law",
        }
    }

    pub fn gender_constraint(self) -> GenderConstraint {
        match self {
            Self::Father
            | Self::Dada
            | Self::Nana
            | Self::Kaka
            | Self::Fufa
            | Self::Mama
            | Self::Mausa
            | Self::Jija
            | Self::Saala
            | Self::FatherInLaw => GenderConstraint::Only(Gender::Male),
            Self::Mother
            | Self::Dadi
            | Self::Nani
            | Self::Kaki
            | Self::Bua
            | Self::Mami
            | Self::Mausi
            | Self::Saali
            | Self::MotherInLaw => GenderConstraint::Only(Gender::Female),
            Self::Spouse => GenderConstraint::OppositeOfRequester,
            Self::Sibling | Self::Child => GenderConstraint::Any,
        }
    }
}
