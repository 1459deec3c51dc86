//! Legacy `spouse_id` to marriage-edge reconciliation.
//!
//! # Invariants
//! - Idempotent: a pair that already has a marriage (either role order) is
//!   skipped.
//! - The husband role is always the Male party.

use crate::model::marriage::Marriage;
use crate::model::member::{Gender, Member, MemberId};
use crate::repo::marriage_repo::MarriageRepository;
use crate::repo::member_repo::MemberRepository;
use crate::repo::{RepoError, RepoResult};
use crate::service::reconcile::{is_cancelled, ReconcileError, ReconcileReport};
use log::{debug, info, warn};
use std::sync::atomic::AtomicBool;

enum RecordOutcome {
    Created,
    Skipped,
    Errored,
}

/// Creates a marriage for every legacy spouse reference that lacks one.
pub struct MarriageBackfill<M: MemberRepository, R: MarriageRepository> {
    members: M,
    marriages: R,
}

impl<M: MemberRepository, R: MarriageRepository> MarriageBackfill<M, R> {
    pub fn new(members: M, marriages: R) -> Self {
        Self { members, marriages }
    }

    pub fn run(&self, cancel: &AtomicBool) -> Result<ReconcileReport, ReconcileError> {
        let ids = self.members.list_legacy_spouse_ids()?;
        let mut report = ReconcileReport::default();
        info!(
            "event=marriage_backfill module=reconcile status=start candidates={}",
            ids.len()
        );

        for id in ids {
            if is_cancelled(cancel) {
                report.interrupted = true;
                break;
            }
            report.scanned += 1;
            match self.reconcile_member(id) {
                Ok(RecordOutcome::Created) => report.created += 1,
                Ok(RecordOutcome::Skipped) => report.skipped += 1,
                Ok(RecordOutcome::Errored) => report.errored += 1,
                Err(err) => {
                    warn!(
                        "event=marriage_backfill module=reconcile status=error member={} error={}",
                        id, err
                    );
                    report.errored += 1;
                }
            }
        }

        info!(
            "event=marriage_backfill module=reconcile status=ok {}",
            report
        );
        Ok(report)
    }

    fn reconcile_member(&self, id: MemberId) -> RepoResult<RecordOutcome> {
        let Some(member) = self.members.get_member(id)? else {
            return Ok(RecordOutcome::Skipped);
        };
        let Some(spouse_id) = member.spouse_id else {
            return Ok(RecordOutcome::Skipped);
        };
        if spouse_id == member.uuid {
            debug!(
                "event=marriage_backfill module=reconcile status=skip reason=self_reference member={}",
                member.uuid
            );
            return Ok(RecordOutcome::Skipped);
        }

        let Some(spouse) = self.members.get_member(spouse_id)? else {
            warn!(
                "event=marriage_backfill module=reconcile status=error reason=spouse_missing member={} spouse={}",
                member.uuid, spouse_id
            );
            return Ok(RecordOutcome::Errored);
        };

        if self.marriages.find_between(member.uuid, spouse.uuid)?.is_some() {
            return Ok(RecordOutcome::Skipped);
        }

        let Some((husband, wife)) = assign_roles(&member, &spouse) else {
            warn!(
                "event=marriage_backfill module=reconcile status=error reason=same_gender member={} spouse={}",
                member.uuid, spouse.uuid
            );
            return Ok(RecordOutcome::Errored);
        };

        match self
            .marriages
            .create_marriage(&Marriage::new(husband.uuid, wife.uuid))
        {
            Ok(marriage) => {
                debug!(
                    "event=marriage_backfill module=reconcile status=ok marriage={} husband={} wife={}",
                    marriage, husband.uuid, wife.uuid
                );
                Ok(RecordOutcome::Created)
            }
            Err(RepoError::Conflict(_)) => Ok(RecordOutcome::Skipped),
            Err(err) => Err(err),
        }
    }
}

fn assign_roles<'a>(a: &'a Member, b: &'a Member) -> Option<(&'a Member, &'a Member)> {
    match (a.gender, b.gender) {
        (Gender::Male, Gender::Female) => Some((a, b)),
        (Gender::Female, Gender::Male) => Some((b, a)),
        _ => None,
    }
}
