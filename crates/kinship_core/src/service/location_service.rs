//! Denormalized name backfill for legacy location codes and `full_name`.
//!
//! # Responsibility
//! - Recompute `full_name` from name parts.
//! - Resolve state/district/taluka codes to names through
//!   [`HierarchyResolver`]; keep non-numeric raw values as names.
//!
//! # Invariants
//! - Only empty name fields are filled; existing names are never replaced.
//! - One update per member, containing only changed fields.
//! - A lookup transport failure leaves the member untouched and counts it
//!   as `unresolved`; the states list failing aborts the pass.

use crate::location::{is_numeric_code, GeoLookup, HierarchyResolver, LocationLevel, LookupError};
use crate::model::member::{derive_full_name, Member, MemberId};
use crate::repo::member_repo::{MemberNameUpdate, MemberRepository};
use crate::service::reconcile::{is_cancelled, ReconcileError, ReconcileReport};
use log::{debug, info, warn};
use std::sync::atomic::AtomicBool;

pub struct LocationBackfill<M: MemberRepository, L: GeoLookup> {
    members: M,
    lookup: L,
}

impl<M: MemberRepository, L: GeoLookup> LocationBackfill<M, L> {
    pub fn new(members: M, lookup: L) -> Self {
        Self { members, lookup }
    }

    pub fn run(&self, cancel: &AtomicBool) -> Result<ReconcileReport, ReconcileError> {
        let mut resolver = HierarchyResolver::new(&self.lookup);
        resolver
            .load_states()
            .map_err(ReconcileError::ExternalLookupUnavailable)?;

        let ids = self.members.list_member_ids()?;
        let mut report = ReconcileReport::default();
        for id in ids {
            if is_cancelled(cancel) {
                report.interrupted = true;
                break;
            }
            report.scanned += 1;
            self.reconcile_member(&mut resolver, id, &mut report);
        }

        info!(
            "event=location_backfill module=reconcile status=ok fetches={} {}",
            resolver.fetch_count(),
            report
        );
        Ok(report)
    }

    fn reconcile_member<G: GeoLookup>(
        &self,
        resolver: &mut HierarchyResolver<G>,
        id: MemberId,
        report: &mut ReconcileReport,
    ) {
        let member = match self.members.get_member(id) {
            Ok(Some(member)) => member,
            Ok(None) => {
                report.skipped += 1;
                return;
            }
            Err(err) => {
                warn!(
                    "event=location_backfill module=reconcile status=error member={} error={}",
                    id, err
                );
                report.errored += 1;
                return;
            }
        };

        let update = match plan_name_update(resolver, &member) {
            Ok(update) => update,
            Err(err) => {
                warn!(
                    "event=location_backfill module=reconcile status=skip reason=lookup member={} error={}",
                    id, err
                );
                report.unresolved += 1;
                return;
            }
        };

        if update.is_empty() {
            report.unchanged += 1;
            return;
        }
        match self.members.apply_name_update(id, &update) {
            Ok(()) => {
                debug!(
                    "event=location_backfill module=reconcile status=ok member={}",
                    id
                );
                report.updated += 1;
            }
            Err(err) => {
                warn!(
                    "event=location_backfill module=reconcile status=error member={} error={}",
                    id, err
                );
                report.errored += 1;
            }
        }
    }
}

/// Computes the fields that need writing for one member.
pub fn plan_name_update<G: GeoLookup>(
    resolver: &mut HierarchyResolver<G>,
    member: &Member,
) -> Result<MemberNameUpdate, LookupError> {
    let mut update = MemberNameUpdate::default();

    let full_name = derive_full_name(
        member.first_name.as_str(),
        member.middle_name.as_deref(),
        member.last_name.as_deref(),
    );
    if !full_name.is_empty() && full_name != member.full_name {
        update.full_name = Some(full_name);
    }

    let location = &member.location;
    let names = &member.location_names;
    let state = present(&location.state);
    let district = present(&location.district);
    let city = present(&location.city);
    let village = present(&location.village);

    let states = resolver.load_states()?;
    let state_code = state.and_then(|state| {
        if is_numeric_code(state) {
            Some(state.to_string())
        } else {
            states.code_for_name(state).map(str::to_string)
        }
    });
    if let Some(state) = state {
        if present(&names.state_name).is_none() {
            update.state_name = states
                .name_for_code(state)
                .map(str::to_string)
                .or_else(|| raw_name(state));
        }
    }

    if let (Some(state_code), Some(district)) = (state_code.as_deref(), district) {
        if present(&names.district_name).is_none() {
            update.district_name = resolver
                .name_for_code(LocationLevel::District, state_code, district)?
                .or_else(|| raw_name(district));
        }
    }

    if let Some(city) = city {
        if present(&names.taluka_name).is_none() {
            let district_code = match district {
                Some(district) if is_numeric_code(district) => Some(district.to_string()),
                Some(district) => match state_code.as_deref() {
                    Some(state_code) => resolver
                        .index(LocationLevel::District, state_code)?
                        .code_for_name(district)
                        .map(str::to_string),
                    None => None,
                },
                None => None,
            };
            if let Some(district_code) = district_code {
                update.taluka_name = resolver
                    .name_for_code(LocationLevel::Taluka, district_code.as_str(), city)?
                    .or_else(|| raw_name(city));
            }
        }

        if let Some(village) = village {
            if present(&names.village_name).is_none() {
                update.village_name = raw_name(village);
            }
        }
    }

    Ok(update)
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn raw_name(value: &str) -> Option<String> {
    (!is_numeric_code(value)).then(|| value.to_string())
}
