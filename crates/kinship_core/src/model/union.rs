//! Union domain model.
//!
//! # Responsibility
//! - Define the marriage / birth-family edge and its verification sub-record.
//! - Provide edge-selection helpers shared by derivation and repair.
//!
//! # Invariants
//! - `husband_id != wife_id`; the unordered pair is unique among live unions.
//! - `children_ids` holds no duplicates and never a partner.
//! - `verification.is_verified` is true exactly when status is `Approved`.
//! - `Deceased` is the soft-delete marker.

use crate::model::member::MemberId;
use crate::model::{ActorId, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Storage identity of a union, referenced by member back-pointers.
pub type UnionRef = Uuid;

/// Prefix of the human-readable sequential union id.
pub const UNION_CODE_PREFIX: &str = "UNION_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionType {
    #[default]
    Marriage,
    BirthFamily,
}

impl UnionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Marriage => "marriage",
            Self::BirthFamily => "birth_family",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "marriage" => Some(Self::Marriage),
            "birth_family" => Some(Self::BirthFamily),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnionStatus {
    #[default]
    Active,
    Divorced,
    /// Soft-delete marker. The record stays for historical traversal.
    Deceased,
    Separated,
}

impl UnionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Divorced => "Divorced",
            Self::Deceased => "Deceased",
            Self::Separated => "Separated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Active" => Some(Self::Active),
            "Divorced" => Some(Self::Divorced),
            "Deceased" => Some(Self::Deceased),
            "Separated" => Some(Self::Separated),
            _ => None,
        }
    }
}

/// Review gate state. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(Self::Pending),
            "Approved" => Some(Self::Approved),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Reviewer decision accepted by the verify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyAction {
    Approve,
    Reject,
}

impl VerifyAction {
    /// Parses the wire value; anything but `approve` / `reject` is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn target_status(self) -> VerificationStatus {
        match self {
            Self::Approve => VerificationStatus::Approved,
            Self::Reject => VerificationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub is_verified: bool,
    pub status: VerificationStatus,
    pub verified_by: Option<ActorId>,
    /// Epoch milliseconds.
    pub verified_at: Option<i64>,
    pub rejection_reason: Option<String>,
}

/// Persisted union edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Union {
    pub uuid: UnionRef,
    /// Human-readable sequential id, e.g. `UNION_0001`.
    pub union_id: String,
    pub husband_id: MemberId,
    pub wife_id: MemberId,
    /// Epoch milliseconds.
    pub marriage_date: Option<i64>,
    pub marriage_place: Option<String>,
    pub union_type: UnionType,
    /// Insertion-ordered, unique.
    pub children_ids: Vec<MemberId>,
    pub status: UnionStatus,
    pub verification: Verification,
    pub created_by: Option<ActorId>,
}

impl Union {
    pub fn is_deceased(&self) -> bool {
        self.status == UnionStatus::Deceased
    }

    pub fn is_partner(&self, member_id: MemberId) -> bool {
        self.husband_id == member_id || self.wife_id == member_id
    }

    pub fn has_child(&self, member_id: MemberId) -> bool {
        self.children_ids.contains(&member_id)
    }

    /// Returns the other partner when `member_id` is one of the partners.
    pub fn other_partner(&self, member_id: MemberId) -> Option<MemberId> {
        if self.husband_id == member_id {
            Some(self.wife_id)
        } else if self.wife_id == member_id {
            Some(self.husband_id)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if parse_union_code(self.union_id.as_str()).is_none() {
            return Err(ValidationError::MalformedUnionCode(self.union_id.clone()));
        }
        if self.verification.is_verified
            != (self.verification.status == VerificationStatus::Approved)
        {
            return Err(ValidationError::InconsistentVerification);
        }
        validate_edge(self.husband_id, self.wife_id, &self.children_ids)
    }
}

/// Creation input for a union; storage assigns `uuid` and `union_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnion {
    pub husband_id: MemberId,
    pub wife_id: MemberId,
    pub marriage_date: Option<i64>,
    pub marriage_place: Option<String>,
    pub union_type: UnionType,
    pub children_ids: Vec<MemberId>,
    pub created_by: Option<ActorId>,
}

impl NewUnion {
    pub fn new(husband_id: MemberId, wife_id: MemberId) -> Self {
        Self {
            husband_id,
            wife_id,
            marriage_date: None,
            marriage_place: None,
            union_type: UnionType::Marriage,
            children_ids: Vec::new(),
            created_by: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_edge(self.husband_id, self.wife_id, &self.children_ids)
    }
}

fn validate_edge(
    husband_id: MemberId,
    wife_id: MemberId,
    children_ids: &[MemberId],
) -> Result<(), ValidationError> {
    if husband_id == wife_id {
        return Err(ValidationError::SelfPairing(husband_id));
    }
    let mut seen = HashSet::new();
    for child in children_ids {
        if *child == husband_id || *child == wife_id {
            return Err(ValidationError::PartnerAsChild(*child));
        }
        if !seen.insert(*child) {
            return Err(ValidationError::DuplicateChild(*child));
        }
    }
    Ok(())
}

/// Returns the pair in canonical (sorted) order.
pub fn normalized_pair(a: MemberId, b: MemberId) -> (MemberId, MemberId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Formats a sequence number as `UNION_0001`. Wider numbers are not truncated.
pub fn format_union_code(seq: i64) -> String {
    format!("{UNION_CODE_PREFIX}{seq:04}")
}

/// Parses `UNION_0001` back into its sequence number.
pub fn parse_union_code(code: &str) -> Option<i64> {
    let digits = code.strip_prefix(UNION_CODE_PREFIX)?;
    if digits.len() < 4 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok().filter(|seq| *seq > 0)
}

/// Picks the member's live partnership: the latest non-deceased union in
/// which the member is a partner. `unions` must be in creation order.
pub fn select_current_union(unions: &[Union], member_id: MemberId) -> Option<&Union> {
    unions
        .iter()
        .rev()
        .find(|union| !union.is_deceased() && union.is_partner(member_id))
}

/// Picks the union that produced the member. Deceased unions still count,
/// a dissolved union does not un-parent its children. `unions` must be in
/// creation order.
pub fn select_parental_union(unions: &[Union], member_id: MemberId) -> Option<&Union> {
    unions.iter().rev().find(|union| union.has_child(member_id))
}

#[cfg(test)]
mod tests {
    use super::{
        format_union_code, normalized_pair, parse_union_code, NewUnion, VerificationStatus,
        VerifyAction,
    };
    use crate::model::ValidationError;
    use uuid::Uuid;

    #[test]
    fn union_code_is_zero_padded_to_four_digits() {
        assert_eq!(format_union_code(1), "UNION_0001");
        assert_eq!(format_union_code(42), "UNION_0042");
        assert_eq!(format_union_code(12345), "UNION_12345");
    }

    #[test]
    fn union_code_parse_rejects_malformed_values() {
        assert_eq!(parse_union_code("UNION_0007"), Some(7));
        assert_eq!(parse_union_code("UNION_7"), None);
        assert_eq!(parse_union_code("UNION_00x1"), None);
        assert_eq!(parse_union_code("MARRIAGE_0001"), None);
        assert_eq!(parse_union_code("UNION_0000"), None);
    }

    #[test]
    fn verify_action_accepts_only_known_values() {
        assert_eq!(VerifyAction::parse("approve"), Some(VerifyAction::Approve));
        assert_eq!(VerifyAction::parse("reject"), Some(VerifyAction::Reject));
        assert_eq!(VerifyAction::parse("Approve"), None);
        assert_eq!(VerifyAction::parse("bogus"), None);
        assert!(VerifyAction::Reject.target_status().is_terminal());
        assert!(!VerificationStatus::Pending.is_terminal());
    }

    #[test]
    fn new_union_rejects_self_pairing_and_partner_children() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            NewUnion::new(a, a).validate(),
            Err(ValidationError::SelfPairing(a))
        );

        let mut draft = NewUnion::new(a, b);
        draft.children_ids = vec![b];
        assert_eq!(draft.validate(), Err(ValidationError::PartnerAsChild(b)));

        let child = Uuid::new_v4();
        draft.children_ids = vec![child, child];
        assert_eq!(draft.validate(), Err(ValidationError::DuplicateChild(child)));
    }

    #[test]
    fn normalized_pair_ignores_role_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(normalized_pair(a, b), normalized_pair(b, a));
    }
}
