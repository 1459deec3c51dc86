//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep callers decoupled from storage details.
//! - Host the record-at-a-time reconciliation passes.

pub mod backfill_service;
pub mod link_repair;
pub mod location_service;
pub mod reconcile;
pub mod relation_service;
pub mod union_service;
