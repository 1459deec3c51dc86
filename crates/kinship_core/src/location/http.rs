//! Blocking HTTP implementation of [`GeoLookup`].
//!
//! # Invariants
//! - Every request is bounded by the configured timeout.
//! - `code` / `id` may arrive as JSON numbers or strings; both become text.

use crate::location::lookup::{
    GeoEntry, GeoLookup, GeoLookupConfig, LocationLevel, LookupError, LookupResponse,
};
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

/// Location hierarchy client over `GET {base}/{states|districts|talukas}`.
pub struct HttpGeoLookup {
    client: Client,
    base_url: String,
}

impl HttpGeoLookup {
    pub fn new(config: &GeoLookupConfig) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LookupError::Unavailable(format!("failed to build client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl GeoLookup for HttpGeoLookup {
    fn fetch(
        &self,
        level: LocationLevel,
        parent: Option<(&str, &str)>,
    ) -> Result<LookupResponse, LookupError> {
        let url = format!("{}/{}", self.base_url, level.endpoint());
        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some((param, value)) = parent {
            request = request.query(&[(param, value)]);
        }

        let response = request.send().map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Unavailable(format!(
                "{} returned HTTP {}",
                level.endpoint(),
                status
            )));
        }
        let body = response.text().map_err(map_transport_error)?;
        debug!(
            "event=geo_lookup module=location status=ok level={} bytes={}",
            level.as_str(),
            body.len()
        );
        parse_lookup_body(level, body.as_str())
    }
}

fn map_transport_error(err: reqwest::Error) -> LookupError {
    if err.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Unavailable(err.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeValue {
    Text(String),
    Number(serde_json::Number),
}

impl CodeValue {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    code: Option<CodeValue>,
    #[serde(default)]
    id: Option<CodeValue>,
    name: String,
}

/// Parses `{ success, <level plural>: [{ code, id, name }] }`.
///
/// An unsuccessful body yields an empty, unsuccessful response.
pub fn parse_lookup_body(level: LocationLevel, body: &str) -> Result<LookupResponse, LookupError> {
    let document: Value = serde_json::from_str(body)
        .map_err(|err| LookupError::Malformed(format!("invalid json: {err}")))?;
    let success = document
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !success {
        return Ok(LookupResponse::default());
    }

    let list = document.get(level.endpoint()).cloned().ok_or_else(|| {
        LookupError::Malformed(format!("missing `{}` list", level.endpoint()))
    })?;
    let raw: Vec<RawEntry> = serde_json::from_value(list)
        .map_err(|err| LookupError::Malformed(format!("invalid `{}` list: {err}", level.endpoint())))?;

    let entries = raw
        .into_iter()
        .map(|entry| GeoEntry {
            code: entry.code.map(CodeValue::into_text),
            id: entry.id.map(CodeValue::into_text),
            name: entry.name,
        })
        .collect();
    Ok(LookupResponse {
        success: true,
        entries,
    })
}
