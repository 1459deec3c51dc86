//! Shared report and error types for record-at-a-time reconciliation passes.
//!
//! # Invariants
//! - Passes check the cancellation flag between records, never mid-record.
//! - A per-record failure is counted and logged; only pass-level failures
//!   surface as `ReconcileError`.

use crate::location::LookupError;
use crate::repo::RepoError;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};

/// Counters reported by every reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    /// External lookup could not answer; the record is retried next run.
    pub unresolved: u64,
    pub errored: u64,
    /// The pass stopped early on the cancellation flag.
    pub interrupted: bool,
}

impl Display for ReconcileReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scanned={} created={} updated={} unchanged={} skipped={} unresolved={} errored={} interrupted={}",
            self.scanned,
            self.created,
            self.updated,
            self.unchanged,
            self.skipped,
            self.unresolved,
            self.errored,
            self.interrupted
        )
    }
}

/// Pass-level failure: the pass could not run at all.
#[derive(Debug)]
pub enum ReconcileError {
    ExternalLookupUnavailable(LookupError),
    Repo(RepoError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExternalLookupUnavailable(err) => {
                write!(f, "external location lookup unavailable: {err}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ExternalLookupUnavailable(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub(crate) fn is_cancelled(cancel: &AtomicBool) -> bool {
    cancel.load(Ordering::Relaxed)
}
