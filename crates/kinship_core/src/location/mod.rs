//! Location hierarchy lookup and resolution.
//!
//! # Responsibility
//! - Define the [`GeoLookup`] contract and its blocking HTTP client.
//! - Resolve legacy state/district/taluka codes to names with per-level
//!   caches.

pub mod http;
pub mod lookup;
pub mod resolver;

pub use http::{parse_lookup_body, HttpGeoLookup};
pub use lookup::{
    GeoEntry, GeoLookup, GeoLookupConfig, LocationLevel, LookupError, LookupResponse,
    DEFAULT_GEO_API_BASE, DEFAULT_GEO_TIMEOUT,
};
pub use resolver::{is_numeric_code, HierarchyResolver, LevelIndex};
