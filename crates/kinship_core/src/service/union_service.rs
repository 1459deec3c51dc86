//! Union lifecycle use-case service.
//!
//! # Responsibility
//! - Validate partner/child references and the gender rule above storage.
//! - Create, extend, verify and soft-delete union edges.
//! - Keep member back-pointers and lineage caches in step after each edge
//!   commit.
//!
//! # Invariants
//! - Business errors are detected before any write.
//! - At most one non-`Deceased` union per unordered pair.
//! - Verification is one-shot: `Pending -> Approved | Rejected`.
//! - Derived-state failures after an edge commit are logged, not returned;
//!   `LinkRepair` restores them.

use crate::model::member::{Gender, MemberId};
use crate::model::union::{
    select_current_union, NewUnion, Union, UnionRef, UnionStatus, UnionType, VerificationStatus,
    VerifyAction,
};
use crate::model::{ActorId, ValidationError};
use crate::repo::member_repo::MemberRepository;
use crate::repo::union_repo::{UnionListQuery, UnionRepository};
use crate::repo::{RepoError, RepoResult};
use crate::service::relation_service::refresh_neighborhood;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Union creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUnionRequest {
    pub husband_id: MemberId,
    pub wife_id: MemberId,
    /// Epoch milliseconds.
    pub marriage_date: Option<i64>,
    pub marriage_place: Option<String>,
    pub children_ids: Vec<MemberId>,
    pub union_type: UnionType,
    pub created_by: Option<ActorId>,
}

impl CreateUnionRequest {
    pub fn new(husband_id: MemberId, wife_id: MemberId) -> Self {
        Self {
            husband_id,
            wife_id,
            marriage_date: None,
            marriage_place: None,
            children_ids: Vec::new(),
            union_type: UnionType::Marriage,
            created_by: None,
        }
    }
}

/// Errors from union service operations.
#[derive(Debug)]
pub enum UnionServiceError {
    /// A partner reference does not resolve.
    MemberNotFound(MemberId),
    UnionNotFound(UnionRef),
    /// No union carries this `UNION_NNNN` code.
    UnionCodeNotFound(String),
    ChildNotFound(MemberId),
    /// Husband must be Male and wife must be Female.
    InvalidGenderCombination {
        husband_gender: Gender,
        wife_gender: Gender,
    },
    /// A live union already links the pair.
    DuplicateUnion {
        husband_id: MemberId,
        wife_id: MemberId,
    },
    /// Verification action is neither `approve` nor `reject`.
    InvalidAction(String),
    AlreadyFinalized {
        union: UnionRef,
        status: VerificationStatus,
    },
    Validation(ValidationError),
    Repo(RepoError),
}

impl Display for UnionServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::UnionNotFound(id) => write!(f, "union not found: {id}"),
            Self::UnionCodeNotFound(code) => write!(f, "union not found: {code}"),
            Self::ChildNotFound(id) => write!(f, "child member not found: {id}"),
            Self::InvalidGenderCombination {
                husband_gender,
                wife_gender,
            } => write!(
                f,
                "husband must be Male and wife must be Female, got {} and {}",
                husband_gender.as_str(),
                wife_gender.as_str()
            ),
            Self::DuplicateUnion {
                husband_id,
                wife_id,
            } => write!(
                f,
                "a union between {husband_id} and {wife_id} already exists"
            ),
            Self::InvalidAction(action) => {
                write!(f, "invalid verification action `{action}`; expected approve|reject")
            }
            Self::AlreadyFinalized { union, status } => write!(
                f,
                "union {union} is already {}",
                status.as_str()
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UnionServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for UnionServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "union",
                id,
            } => Self::UnionNotFound(id),
            RepoError::NotFound {
                entity: "member",
                id,
            } => Self::MemberNotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for UnionServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Union lifecycle facade over member and union repositories.
pub struct UnionService<M: MemberRepository, U: UnionRepository> {
    members: M,
    unions: U,
}

impl<M: MemberRepository, U: UnionRepository> UnionService<M, U> {
    /// Creates service from repository implementations.
    pub fn new(members: M, unions: U) -> Self {
        Self { members, unions }
    }

    /// Creates a pending union between two existing members.
    ///
    /// # Errors
    /// - `MemberNotFound` / `ChildNotFound` for unresolved references.
    /// - `InvalidGenderCombination` unless husband is Male and wife Female.
    /// - `DuplicateUnion` when a live union already links the pair, including
    ///   a concurrent creator winning the race.
    /// - `Validation` when a partner is listed as a child.
    pub fn create_union(&self, request: CreateUnionRequest) -> Result<Union, UnionServiceError> {
        let husband = self
            .members
            .get_member(request.husband_id)?
            .ok_or(UnionServiceError::MemberNotFound(request.husband_id))?;
        let wife = self
            .members
            .get_member(request.wife_id)?
            .ok_or(UnionServiceError::MemberNotFound(request.wife_id))?;

        if husband.gender != Gender::Male || wife.gender != Gender::Female {
            info!(
                "event=union_create module=union status=error reason=gender husband={} wife={}",
                husband.uuid, wife.uuid
            );
            return Err(UnionServiceError::InvalidGenderCombination {
                husband_gender: husband.gender,
                wife_gender: wife.gender,
            });
        }

        if self.unions.find_live_pair(husband.uuid, wife.uuid)?.is_some() {
            return Err(UnionServiceError::DuplicateUnion {
                husband_id: husband.uuid,
                wife_id: wife.uuid,
            });
        }

        let mut children_ids: Vec<MemberId> = Vec::with_capacity(request.children_ids.len());
        for child_id in request.children_ids {
            if children_ids.contains(&child_id) {
                continue;
            }
            if child_id == husband.uuid || child_id == wife.uuid {
                return Err(ValidationError::PartnerAsChild(child_id).into());
            }
            if self.members.get_member(child_id)?.is_none() {
                return Err(UnionServiceError::ChildNotFound(child_id));
            }
            children_ids.push(child_id);
        }

        let draft = NewUnion {
            husband_id: husband.uuid,
            wife_id: wife.uuid,
            marriage_date: request.marriage_date,
            marriage_place: request.marriage_place,
            union_type: request.union_type,
            children_ids,
            created_by: request.created_by,
        };
        let union = self.unions.create_union(&draft).map_err(|err| match err {
            RepoError::Conflict(_) => UnionServiceError::DuplicateUnion {
                husband_id: draft.husband_id,
                wife_id: draft.wife_id,
            },
            other => other.into(),
        })?;

        info!(
            "event=union_create module=union status=ok union={} union_id={} children={}",
            union.uuid,
            union.union_id,
            union.children_ids.len()
        );

        let mut seeds = vec![union.husband_id, union.wife_id];
        seeds.extend(union.children_ids.iter().copied());
        self.after_commit("union_create", &union, &seeds, || {
            self.members
                .set_current_union(union.husband_id, Some(union.uuid))?;
            self.members.set_current_union(union.wife_id, Some(union.uuid))?;
            for child_id in &union.children_ids {
                self.members.set_parental_union(*child_id, Some(union.uuid))?;
            }
            Ok(())
        });

        Ok(union)
    }

    pub fn get_union(&self, id: UnionRef) -> Result<Union, UnionServiceError> {
        self.unions
            .get_union(id)?
            .ok_or(UnionServiceError::UnionNotFound(id))
    }

    /// Loads by human-readable code, e.g. `UNION_0001`.
    pub fn get_union_by_code(&self, union_id: &str) -> Result<Union, UnionServiceError> {
        self.unions
            .get_union_by_code(union_id)?
            .ok_or_else(|| UnionServiceError::UnionCodeNotFound(union_id.trim().to_string()))
    }

    /// Attaches a child. Attaching an existing child is a no-op.
    pub fn add_child(&self, id: UnionRef, child_id: MemberId) -> Result<Union, UnionServiceError> {
        let union = self.get_union(id)?;
        if self.members.get_member(child_id)?.is_none() {
            return Err(UnionServiceError::ChildNotFound(child_id));
        }
        if union.is_partner(child_id) {
            return Err(ValidationError::PartnerAsChild(child_id).into());
        }
        if union.has_child(child_id) {
            info!(
                "event=union_child_add module=union status=skip reason=already_attached union={} child={}",
                union.uuid, child_id
            );
            return Ok(union);
        }

        self.unions.add_child(id, child_id)?;
        let union = self.get_union(id)?;
        info!(
            "event=union_child_add module=union status=ok union={} child={} children={}",
            union.uuid,
            child_id,
            union.children_ids.len()
        );

        self.after_commit(
            "union_child_add",
            &union,
            &[union.husband_id, union.wife_id, child_id],
            || self.members.set_parental_union(child_id, Some(union.uuid)),
        );
        Ok(union)
    }

    /// Applies a one-shot verification decision.
    ///
    /// `action` is `approve` or `reject`; anything else is `InvalidAction`
    /// and leaves the union untouched.
    pub fn verify(
        &self,
        id: UnionRef,
        action: &str,
        actor: ActorId,
        rejection_reason: Option<&str>,
    ) -> Result<Union, UnionServiceError> {
        let union = self.get_union(id)?;
        let action = VerifyAction::parse(action)
            .ok_or_else(|| UnionServiceError::InvalidAction(action.to_string()))?;
        if union.verification.status.is_terminal() {
            return Err(UnionServiceError::AlreadyFinalized {
                union: id,
                status: union.verification.status,
            });
        }

        if !self
            .unions
            .finalize_verification(id, action, actor, rejection_reason)?
        {
            let current = self.get_union(id)?;
            return Err(UnionServiceError::AlreadyFinalized {
                union: id,
                status: current.verification.status,
            });
        }

        let union = self.get_union(id)?;
        info!(
            "event=union_verify module=union status=ok union={} action={} actor={}",
            union.uuid,
            action.as_str(),
            actor
        );
        Ok(union)
    }

    /// Pending unions, newest first.
    pub fn list_pending(&self) -> Result<Vec<Union>, UnionServiceError> {
        Ok(self.unions.list_unions(&UnionListQuery {
            verification_status: Some(VerificationStatus::Pending),
            include_deceased: true,
            newest_first: true,
        })?)
    }

    /// Changes lifecycle status. `Deceased` is routed through `soft_delete`.
    pub fn update_status(
        &self,
        id: UnionRef,
        status: UnionStatus,
    ) -> Result<Union, UnionServiceError> {
        if status == UnionStatus::Deceased {
            return self.soft_delete(id);
        }
        let union = self.get_union(id)?;
        if union.status == status {
            return Ok(union);
        }
        if union.is_deceased()
            && self
                .unions
                .find_live_pair(union.husband_id, union.wife_id)?
                .is_some()
        {
            return Err(UnionServiceError::DuplicateUnion {
                husband_id: union.husband_id,
                wife_id: union.wife_id,
            });
        }

        self.unions.set_status(id, status).map_err(|err| match err {
            RepoError::Conflict(_) => UnionServiceError::DuplicateUnion {
                husband_id: union.husband_id,
                wife_id: union.wife_id,
            },
            other => other.into(),
        })?;
        let union = self.get_union(id)?;
        info!(
            "event=union_status module=union status=ok union={} union_status={}",
            union.uuid,
            union.status.as_str()
        );

        self.after_commit(
            "union_status",
            &union,
            &[union.husband_id, union.wife_id],
            || self.recompute_current_unions(&[union.husband_id, union.wife_id]),
        );
        Ok(union)
    }

    /// Marks the union `Deceased`; the record is retained.
    pub fn soft_delete(&self, id: UnionRef) -> Result<Union, UnionServiceError> {
        let union = self.get_union(id)?;
        if union.is_deceased() {
            return Ok(union);
        }

        self.unions.set_status(id, UnionStatus::Deceased)?;
        let union = self.get_union(id)?;
        info!(
            "event=union_soft_delete module=union status=ok union={} union_id={}",
            union.uuid, union.union_id
        );

        self.after_commit(
            "union_soft_delete",
            &union,
            &[union.husband_id, union.wife_id],
            || self.recompute_current_unions(&[union.husband_id, union.wife_id]),
        );
        Ok(union)
    }

    /// Unions where the member is a partner or a child, in `union_id` order.
    pub fn list_by_member(&self, member_id: MemberId) -> Result<Vec<Union>, UnionServiceError> {
        if self.members.get_member(member_id)?.is_none() {
            return Err(UnionServiceError::MemberNotFound(member_id));
        }
        Ok(self.unions.list_by_member(member_id)?)
    }

    fn recompute_current_unions(&self, member_ids: &[MemberId]) -> RepoResult<()> {
        for member_id in member_ids {
            let unions = self.unions.list_by_member(*member_id)?;
            let current = select_current_union(&unions, *member_id).map(|union| union.uuid);
            self.members.set_current_union(*member_id, current)?;
        }
        Ok(())
    }

    /// Writes back-pointers, then refreshes the lineage cache around `seeds`.
    /// Failures are logged; the edge is already committed.
    fn after_commit<F>(&self, event: &str, union: &Union, seeds: &[MemberId], pointers: F)
    where
        F: FnOnce() -> RepoResult<()>,
    {
        if let Err(err) = pointers() {
            warn!(
                "event={} module=union status=error stage=back_pointers union={} error={}",
                event, union.uuid, err
            );
        }
        if let Err(err) = refresh_neighborhood(&self.members, &self.unions, seeds) {
            warn!(
                "event={} module=union status=error stage=lineage_refresh union={} error={}",
                event, union.uuid, err
            );
        }
    }
}
