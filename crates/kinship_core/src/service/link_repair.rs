//! Back-pointer repair from a full scan of union edges.
//!
//! # Invariants
//! - `current_union_id` is the latest non-`Deceased` union the member
//!   partners in.
//! - `parental_union_id` is the latest union listing the member as a child,
//!   `Deceased` unions included.
//! - Only differing pointers are written.

use crate::model::member::{LineageLinks, MemberId};
use crate::model::union::{select_current_union, select_parental_union, Union};
use crate::repo::member_repo::MemberRepository;
use crate::repo::union_repo::{UnionListQuery, UnionRepository};
use crate::repo::RepoResult;
use crate::service::reconcile::{is_cancelled, ReconcileError, ReconcileReport};
use crate::service::relation_service::refresh_family_links;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

/// Pass options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkRepairOptions {
    /// Recompute every lineage cache after the pointer pass.
    pub refresh_cache: bool,
}

pub struct LinkRepair<M: MemberRepository, U: UnionRepository> {
    members: M,
    unions: U,
}

impl<M: MemberRepository, U: UnionRepository> LinkRepair<M, U> {
    pub fn new(members: M, unions: U) -> Self {
        Self { members, unions }
    }

    pub fn run(
        &self,
        options: LinkRepairOptions,
        cancel: &AtomicBool,
    ) -> Result<ReconcileReport, ReconcileError> {
        let edges = self.edges_by_member()?;
        let ids = self.members.list_member_ids()?;
        let mut report = ReconcileReport::default();
        let no_edges: Vec<Union> = Vec::new();

        for id in &ids {
            if is_cancelled(cancel) {
                report.interrupted = true;
                break;
            }
            report.scanned += 1;
            let unions = edges.get(id).unwrap_or(&no_edges);
            match self.repair_member(*id, unions) {
                Ok(true) => report.updated += 1,
                Ok(false) => report.unchanged += 1,
                Err(err) => {
                    warn!(
                        "event=link_repair module=reconcile status=error member={} error={}",
                        id, err
                    );
                    report.errored += 1;
                }
            }
        }

        if options.refresh_cache && !report.interrupted {
            let refresh = refresh_family_links(&self.members, &self.unions, &ids);
            report.errored += refresh.failed as u64;
        }

        info!("event=link_repair module=reconcile status=ok {}", report);
        Ok(report)
    }

    /// Groups every union (creation order) under each partner and child.
    fn edges_by_member(&self) -> RepoResult<HashMap<MemberId, Vec<Union>>> {
        let all = self.unions.list_unions(&UnionListQuery {
            include_deceased: true,
            ..UnionListQuery::default()
        })?;
        let mut edges: HashMap<MemberId, Vec<Union>> = HashMap::new();
        for union in all {
            let mut touched = vec![union.husband_id, union.wife_id];
            touched.extend(union.children_ids.iter().copied());
            for member_id in touched {
                edges.entry(member_id).or_default().push(union.clone());
            }
        }
        Ok(edges)
    }

    fn repair_member(&self, id: MemberId, unions: &[Union]) -> RepoResult<bool> {
        let Some(member) = self.members.get_member(id)? else {
            return Ok(false);
        };
        let expected = LineageLinks {
            current_union_id: select_current_union(unions, id).map(|union| union.uuid),
            parental_union_id: select_parental_union(unions, id).map(|union| union.uuid),
        };
        if member.lineage_links == expected {
            return Ok(false);
        }
        self.members.set_lineage_links(id, &expected)?;
        Ok(true)
    }
}
