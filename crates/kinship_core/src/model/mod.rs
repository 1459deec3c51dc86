//! Kinship graph domain model.
//!
//! # Responsibility
//! - Define the canonical Member / Union / Marriage records.
//! - Own write-time invariant checks (`validate()`) shared by all repositories.
//! - Define the finite relation-type vocabulary and its gender constraints.
//!
//! # Invariants
//! - Union and Marriage edges are authoritative; Member back-pointers and the
//!   lineage cache are derived.
//! - Deletion of a union is a `Deceased` status, never a row removal.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod capability;
pub mod marriage;
pub mod member;
pub mod relation;
pub mod union;

/// Identity of the caller that performed a mutation, recorded as-is.
pub type ActorId = Uuid;

/// Entity-contract violations detected before (or instead of) a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `first_name` is empty after trim.
    BlankFirstName,
    /// Both sides of an edge reference the same member.
    SelfPairing(Uuid),
    /// A child appears more than once in `children_ids`.
    DuplicateChild(Uuid),
    /// A union partner is also listed as its child.
    PartnerAsChild(Uuid),
    /// `is_verified` disagrees with `verification.status`.
    InconsistentVerification,
    /// `union_id` does not follow the `UNION_NNNN` format.
    MalformedUnionCode(String),
    /// Storage rejected a CHECK / NOT NULL / FOREIGN KEY constraint.
    StorageConstraint(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankFirstName => write!(f, "first name must not be blank"),
            Self::SelfPairing(id) => write!(f, "member {id} cannot be paired with itself"),
            Self::DuplicateChild(id) => write!(f, "child {id} is listed more than once"),
            Self::PartnerAsChild(id) => write!(f, "partner {id} cannot be a child of the union"),
            Self::InconsistentVerification => {
                write!(f, "is_verified must be true exactly when status is Approved")
            }
            Self::MalformedUnionCode(code) => write!(f, "malformed union id `{code}`"),
            Self::StorageConstraint(message) => write!(f, "constraint violation: {message}"),
        }
    }
}

impl Error for ValidationError {}
