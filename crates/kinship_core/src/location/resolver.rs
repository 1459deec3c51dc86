//! Cached code/name resolution across state, district and taluka levels.
//!
//! # Invariants
//! - Child-level indexes are cached per `(level, parent code)`.
//! - A pair of unsuccessful answers caches an empty index.
//! - Transport failures are never cached; the next call retries.

use crate::location::lookup::{GeoEntry, GeoLookup, LocationLevel, LookupError};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static NUMERIC_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+-]?\d").expect("valid numeric code regex"));

/// Returns whether a legacy location value is a code rather than a name:
/// optional sign followed by a digit after trimming.
pub fn is_numeric_code(value: &str) -> bool {
    NUMERIC_CODE_RE.is_match(value)
}

/// Lookup tables for one list: `code|id -> name` and `UPPERCASE name -> code`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelIndex {
    codes: HashMap<String, String>,
    names: HashMap<String, String>,
}

impl LevelIndex {
    pub fn from_entries(entries: &[GeoEntry]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            for key in [entry.code.as_deref(), entry.id.as_deref()].into_iter().flatten() {
                index.codes.insert(key.to_string(), entry.name.clone());
            }
            if let Some(code) = entry.code.as_deref().or(entry.id.as_deref()) {
                index
                    .names
                    .insert(entry.name.trim().to_uppercase(), code.to_string());
            }
        }
        index
    }

    pub fn name_for_code(&self, code: &str) -> Option<&str> {
        self.codes.get(code.trim()).map(String::as_str)
    }

    /// Case-insensitive reverse lookup.
    pub fn code_for_name(&self, name: &str) -> Option<&str> {
        self.names.get(&name.trim().to_uppercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.names.is_empty()
    }
}

/// Memoizing resolver over a [`GeoLookup`].
pub struct HierarchyResolver<L: GeoLookup> {
    lookup: L,
    states: Option<LevelIndex>,
    children: HashMap<(LocationLevel, String), LevelIndex>,
    fetches: u64,
}

impl<L: GeoLookup> HierarchyResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            states: None,
            children: HashMap::new(),
            fetches: 0,
        }
    }

    /// Loads the state list once. An unsuccessful answer is an empty index.
    pub fn load_states(&mut self) -> Result<&LevelIndex, LookupError> {
        if self.states.is_none() {
            self.fetches += 1;
            let response = self.lookup.fetch(LocationLevel::State, None)?;
            let index = LevelIndex::from_entries(&response.entries);
            info!(
                "event=geo_lookup module=location status=ok level=state success={} entries={}",
                response.success,
                response.entries.len()
            );
            self.states = Some(index);
        }
        Ok(&*self.states.get_or_insert_with(LevelIndex::default))
    }

    /// Returns the index of `level` entries under `parent_code`.
    ///
    /// `LocationLevel::State` ignores the parent and returns the state list.
    pub fn index(
        &mut self,
        level: LocationLevel,
        parent_code: &str,
    ) -> Result<&LevelIndex, LookupError> {
        let Some((primary, alternate)) = level.parent_params() else {
            return self.load_states();
        };
        let key = (level, parent_code.trim().to_string());
        if !self.children.contains_key(&key) {
            let index = self.fetch_child_index(level, key.1.as_str(), primary, alternate)?;
            self.children.insert(key.clone(), index);
        }
        Ok(&*self.children.entry(key).or_default())
    }

    /// Resolves a code to its name within `parent_code`'s list.
    pub fn name_for_code(
        &mut self,
        level: LocationLevel,
        parent_code: &str,
        code: &str,
    ) -> Result<Option<String>, LookupError> {
        Ok(self
            .index(level, parent_code)?
            .name_for_code(code)
            .map(str::to_string))
    }

    /// Number of external calls issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    fn fetch_child_index(
        &mut self,
        level: LocationLevel,
        parent_code: &str,
        primary: &str,
        alternate: &str,
    ) -> Result<LevelIndex, LookupError> {
        self.fetches += 1;
        let response = self.lookup.fetch(level, Some((primary, parent_code)))?;
        if response.success {
            debug!(
                "event=geo_lookup module=location status=ok level={} param={} parent={} entries={}",
                level.as_str(),
                primary,
                parent_code,
                response.entries.len()
            );
            return Ok(LevelIndex::from_entries(&response.entries));
        }

        self.fetches += 1;
        let response = self.lookup.fetch(level, Some((alternate, parent_code)))?;
        if response.success {
            debug!(
                "event=geo_lookup module=location status=ok level={} param={} parent={} entries={}",
                level.as_str(),
                alternate,
                parent_code,
                response.entries.len()
            );
            return Ok(LevelIndex::from_entries(&response.entries));
        }

        debug!(
            "event=geo_lookup module=location status=skip reason=unsuccessful level={} parent={}",
            level.as_str(),
            parent_code
        );
        Ok(LevelIndex::default())
    }
}
