//! Coarse-grained capability tags gating core operations upstream.
//!
//! Core does not enforce these; it records the actor id it is given. The
//! mapping from operation to tag documents which gate callers must apply.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Permission tag checked by the transport layer before calling core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    MemberView,
    MemberCreate,
    MemberEdit,
    AdminView,
    AdminEdit,
    AdminDelete,
}

/// Tag value for reading members, unions and derived views.
pub const CAPABILITY_MEMBER_VIEW: &str = "member.view";
/// Tag value for creating unions.
pub const CAPABILITY_MEMBER_CREATE: &str = "member.create";
/// Tag value for attaching children.
pub const CAPABILITY_MEMBER_EDIT: &str = "member.edit";
/// Tag value for the pending-verification queue.
pub const CAPABILITY_ADMIN_VIEW: &str = "admin.view";
/// Tag value for verification decisions and status changes.
pub const CAPABILITY_ADMIN_EDIT: &str = "admin.edit";
/// Tag value for soft deletion.
pub const CAPABILITY_ADMIN_DELETE: &str = "admin.delete";

const SUPPORTED_CAPABILITY_STRINGS: &[&str] = &[
    CAPABILITY_MEMBER_VIEW,
    CAPABILITY_MEMBER_CREATE,
    CAPABILITY_MEMBER_EDIT,
    CAPABILITY_ADMIN_VIEW,
    CAPABILITY_ADMIN_EDIT,
    CAPABILITY_ADMIN_DELETE,
];

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MemberView => CAPABILITY_MEMBER_VIEW,
            Self::MemberCreate => CAPABILITY_MEMBER_CREATE,
            Self::MemberEdit => CAPABILITY_MEMBER_EDIT,
            Self::AdminView => CAPABILITY_ADMIN_VIEW,
            Self::AdminEdit => CAPABILITY_ADMIN_EDIT,
            Self::AdminDelete => CAPABILITY_ADMIN_DELETE,
        }
    }
}

/// Returns supported capability tag strings.
pub fn supported_capability_strings() -> &'static [&'static str] {
    SUPPORTED_CAPABILITY_STRINGS
}

/// Parses one capability tag.
pub fn parse_capability(value: &str) -> Result<Capability, CapabilityError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(CapabilityError::EmptyCapability);
    }

    match normalized {
        CAPABILITY_MEMBER_VIEW => Ok(Capability::MemberView),
        CAPABILITY_MEMBER_CREATE => Ok(Capability::MemberCreate),
        CAPABILITY_MEMBER_EDIT => Ok(Capability::MemberEdit),
        CAPABILITY_ADMIN_VIEW => Ok(Capability::AdminView),
        CAPABILITY_ADMIN_EDIT => Ok(Capability::AdminEdit),
        CAPABILITY_ADMIN_DELETE => Ok(Capability::AdminDelete),
        other => Err(CapabilityError::UnsupportedCapability(other.to_string())),
    }
}

/// Core operations exposed to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreOperation {
    CreateUnion,
    GetUnion,
    AddChild,
    ListPendingUnions,
    VerifyUnion,
    UpdateUnionStatus,
    SoftDeleteUnion,
    ListUnionsByMember,
    EligibleRelations,
    FamilyNetwork,
}

/// Returns the capability the caller must have checked for `operation`.
pub fn required_capability(operation: CoreOperation) -> Capability {
    match operation {
        CoreOperation::CreateUnion => Capability::MemberCreate,
        CoreOperation::AddChild => Capability::MemberEdit,
        CoreOperation::ListPendingUnions => Capability::AdminView,
        CoreOperation::VerifyUnion | CoreOperation::UpdateUnionStatus => Capability::AdminEdit,
        CoreOperation::SoftDeleteUnion => Capability::AdminDelete,
        CoreOperation::GetUnion
        | CoreOperation::ListUnionsByMember
        | CoreOperation::EligibleRelations
        | CoreOperation::FamilyNetwork => Capability::MemberView,
    }
}

/// Capability parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    EmptyCapability,
    UnsupportedCapability(String),
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapability => write!(f, "capability value must not be empty"),
            Self::UnsupportedCapability(value) => {
                write!(f, "capability is unsupported: {value}")
            }
        }
    }
}

impl Error for CapabilityError {}
