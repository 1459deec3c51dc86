//! Core domain logic for the kinship registry.
//! This crate is the single source of truth for graph invariants.

pub mod db;
pub mod location;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use location::{GeoLookup, GeoLookupConfig, HierarchyResolver, HttpGeoLookup, LookupError};
pub use logging::{default_log_level, init_logging, LoggingError};
pub use model::capability::{required_capability, Capability, CoreOperation};
pub use model::marriage::{Marriage, MarriageId, MarriageStatus};
pub use model::member::{FamilyLineageLinks, Gender, MaritalStatus, Member, MemberId};
pub use model::relation::{GenderConstraint, RelationType};
pub use model::union::{Union, UnionRef, UnionStatus, UnionType, VerificationStatus};
pub use model::{ActorId, ValidationError};
pub use repo::marriage_repo::{MarriageRepository, SqliteMarriageRepository};
pub use repo::member_repo::{MemberRepository, SqliteMemberRepository};
pub use repo::union_repo::{SqliteUnionRepository, UnionRepository};
pub use repo::{RepoError, RepoResult};
pub use service::backfill_service::MarriageBackfill;
pub use service::link_repair::{LinkRepair, LinkRepairOptions};
pub use service::location_service::LocationBackfill;
pub use service::reconcile::{ReconcileError, ReconcileReport};
pub use service::relation_service::{
    EligibleQuery, FamilyNetwork, LineageRefresh, MemberSummary, RelationService,
    RelationServiceError,
};
pub use service::union_service::{CreateUnionRequest, UnionService, UnionServiceError};
