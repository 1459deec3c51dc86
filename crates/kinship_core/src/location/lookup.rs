//! Geographic lookup contract shared by the HTTP client and test fakes.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Public base URL of the location hierarchy service.
pub const DEFAULT_GEO_API_BASE: &str = "https://india-location-hub.in/api";
/// Upper bound for a single lookup call.
pub const DEFAULT_GEO_TIMEOUT: Duration = Duration::from_secs(10);

/// Administrative level served by the lookup service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationLevel {
    State,
    District,
    Taluka,
}

impl LocationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::District => "district",
            Self::Taluka => "taluka",
        }
    }

    /// Path segment, also the list key in the response body.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::State => "states",
            Self::District => "districts",
            Self::Taluka => "talukas",
        }
    }

    /// `(primary, alternate)` query parameter naming the parent code.
    pub fn parent_params(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::State => None,
            Self::District => Some(("state_code", "state_id")),
            Self::Taluka => Some(("district_code", "district_id")),
        }
    }
}

/// One row of a lookup list. `code` and `id` are kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoEntry {
    pub code: Option<String>,
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupResponse {
    /// The service's own `success` flag; `false` is an answer, not an error.
    pub success: bool,
    pub entries: Vec<GeoEntry>,
}

/// Transport-level lookup failure. Never cached by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    Unavailable(String),
    Timeout,
    Malformed(String),
}

impl Display for LookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "lookup service unavailable: {message}"),
            Self::Timeout => write!(f, "lookup timed out"),
            Self::Malformed(message) => write!(f, "malformed lookup response: {message}"),
        }
    }
}

impl Error for LookupError {}

/// Location hierarchy source.
pub trait GeoLookup {
    /// Fetches the list for `level`, optionally filtered by one
    /// `(parameter, value)` pair.
    fn fetch(
        &self,
        level: LocationLevel,
        parent: Option<(&str, &str)>,
    ) -> Result<LookupResponse, LookupError>;
}

impl<T: GeoLookup + ?Sized> GeoLookup for &T {
    fn fetch(
        &self,
        level: LocationLevel,
        parent: Option<(&str, &str)>,
    ) -> Result<LookupResponse, LookupError> {
        (**self).fetch(level, parent)
    }
}

/// HTTP lookup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLookupConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeoLookupConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEO_API_BASE.to_string(),
            timeout: DEFAULT_GEO_TIMEOUT,
        }
    }
}
