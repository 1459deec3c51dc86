//! Member domain model.
//!
//! # Responsibility
//! - Define the person node and its derived lineage fields.
//! - Keep legacy scalar fields (`spouse_id`, location codes) alongside the
//!   normalized ones during migration windows.
//!
//! # Invariants
//! - At most one `current_union_id` and one `parental_union_id`.
//! - `full_name` is always derivable from the name parts.
//! - `family_lineage_links` is a materialized view recomputed by the
//!   relation service, never edited in place by callers.

use crate::model::union::UnionRef;
use crate::model::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Stable member identifier.
pub type MemberId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Male" => Some(Self::Male),
            "Female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Male => Self::Female,
            Self::Female => Self::Male,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaritalStatus {
    #[default]
    Single,
    Married,
    Divorced,
    Widowed,
}

impl MaritalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "Single",
            Self::Married => "Married",
            Self::Divorced => "Divorced",
            Self::Widowed => "Widowed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Single" => Some(Self::Single),
            "Married" => Some(Self::Married),
            "Divorced" => Some(Self::Divorced),
            "Widowed" => Some(Self::Widowed),
            _ => None,
        }
    }
}

/// Back-pointers from a member to the union edges that reference it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageLinks {
    /// Active marriage/partnership edge.
    pub current_union_id: Option<UnionRef>,
    /// Union that produced this member as a child.
    pub parental_union_id: Option<UnionRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImmediateRelations {
    pub father_id: Option<MemberId>,
    pub mother_id: Option<MemberId>,
    pub spouse_id: Option<MemberId>,
    pub siblings_ids: Vec<MemberId>,
    pub children_ids: Vec<MemberId>,
}

/// Father's side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaternalRelations {
    pub dada_id: Option<MemberId>,
    pub dadi_id: Option<MemberId>,
    pub kaka_ids: Vec<MemberId>,
    pub kaki_ids: Vec<MemberId>,
    pub bua_ids: Vec<MemberId>,
    pub fufa_ids: Vec<MemberId>,
}

/// Mother's side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaternalRelations {
    pub nana_id: Option<MemberId>,
    pub nani_id: Option<MemberId>,
    pub mama_ids: Vec<MemberId>,
    pub mami_ids: Vec<MemberId>,
    pub mausi_ids: Vec<MemberId>,
    pub mausa_ids: Vec<MemberId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InLawRelations {
    pub father_in_law_id: Option<MemberId>,
    pub mother_in_law_id: Option<MemberId>,
    /// Husbands of this member's sisters.
    pub jija_ids: Vec<MemberId>,
    /// Brothers of this member's spouse.
    pub saala_ids: Vec<MemberId>,
    /// Sisters of this member's spouse.
    pub saali_ids: Vec<MemberId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedNetwork {
    pub paternal: PaternalRelations,
    pub maternal: MaternalRelations,
    pub in_laws: InLawRelations,
}

/// Cached relation references persisted as one JSON document per member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyLineageLinks {
    pub immediate_relations: ImmediateRelations,
    pub extended_network: ExtendedNetwork,
}

/// Legacy scalar location fields. Values are either numeric codes or names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyLocation {
    pub state: Option<String>,
    pub district: Option<String>,
    /// Taluka code or name.
    pub city: Option<String>,
    pub village: Option<String>,
}

/// Human-readable names denormalized from [`LegacyLocation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationNames {
    pub state_name: Option<String>,
    pub district_name: Option<String>,
    pub taluka_name: Option<String>,
    pub village_name: Option<String>,
}

/// Person node in the kinship graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub uuid: MemberId,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub gender: Gender,
    pub marital_status: MaritalStatus,
    pub lineage_links: LineageLinks,
    pub family_lineage_links: FamilyLineageLinks,
    /// Legacy spouse reference consumed by the marriage backfill.
    pub spouse_id: Option<MemberId>,
    pub location: LegacyLocation,
    pub location_names: LocationNames,
}

impl Member {
    /// Creates a member with a generated id and derived `full_name`.
    pub fn new(first_name: impl Into<String>, last_name: Option<&str>, gender: Gender) -> Self {
        Self::with_id(Uuid::new_v4(), first_name, last_name, gender)
    }

    /// Creates a member with a caller-provided id (import paths).
    pub fn with_id(
        uuid: MemberId,
        first_name: impl Into<String>,
        last_name: Option<&str>,
        gender: Gender,
    ) -> Self {
        let first_name = first_name.into();
        let last_name = last_name.map(str::to_string);
        let full_name = derive_full_name(first_name.as_str(), None, last_name.as_deref());
        Self {
            uuid,
            first_name,
            middle_name: None,
            last_name,
            full_name,
            gender,
            marital_status: MaritalStatus::Single,
            lineage_links: LineageLinks::default(),
            family_lineage_links: FamilyLineageLinks::default(),
            spouse_id: None,
            location: LegacyLocation::default(),
            location_names: LocationNames::default(),
        }
    }

    /// Sets the middle name and re-derives `full_name`.
    pub fn set_middle_name(&mut self, middle_name: Option<&str>) {
        self.middle_name = middle_name.map(str::to_string);
        self.refresh_full_name();
    }

    pub fn refresh_full_name(&mut self) {
        self.full_name = derive_full_name(
            self.first_name.as_str(),
            self.middle_name.as_deref(),
            self.last_name.as_deref(),
        );
    }

    /// Short display name used by network views: `first last`.
    pub fn display_name(&self) -> String {
        derive_full_name(self.first_name.as_str(), None, self.last_name.as_deref())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.first_name.trim().is_empty() {
            return Err(ValidationError::BlankFirstName);
        }
        Ok(())
    }
}

/// Joins name parts with single spaces, collapsing inner whitespace runs.
pub fn derive_full_name(first: &str, middle: Option<&str>, last: Option<&str>) -> String {
    let joined = format!("{} {} {}", first, middle.unwrap_or(""), last.unwrap_or(""));
    WHITESPACE_RE.replace_all(&joined, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{derive_full_name, FamilyLineageLinks, Gender, Member};

    #[test]
    fn full_name_collapses_missing_parts() {
        assert_eq!(derive_full_name("Ravi", None, Some("Patel")), "Ravi Patel");
        assert_eq!(
            derive_full_name(" Ravi ", Some("  Kumar"), Some("Patel ")),
            "Ravi Kumar Patel"
        );
        assert_eq!(derive_full_name("Ravi", Some(""), None), "Ravi");
    }

    #[test]
    fn blank_first_name_fails_validation() {
        let member = Member::new("   ", None, Gender::Male);
        assert!(member.validate().is_err());
    }

    #[test]
    fn lineage_cache_tolerates_partial_documents() {
        let links: FamilyLineageLinks =
            serde_json::from_str(r#"{"immediate_relations":{"siblings_ids":[]}}"#)
                .expect("partial document should parse");
        assert_eq!(links, FamilyLineageLinks::default());
    }

    #[test]
    fn opposite_gender_flips() {
        assert_eq!(Gender::Male.opposite(), Gender::Female);
        assert_eq!(Gender::Female.opposite(), Gender::Male);
    }
}
