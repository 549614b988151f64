//! Location report ingestion.
//!
//! Reports arrive as loosely typed JSON or form fields from the shared page. Validation is
//! fail-fast in a fixed order: missing fields, unknown link, inactive link.
//! Coordinates are coerced the way a browser's `parseFloat` would and are not
//! range-checked, so unparsable input is stored as `NaN`.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::link::{LinkId, LocationSample};
use crate::storage::{LinkStore, LocationStore};

const MISSING_FIELDS: &str = "Missing required fields: linkId, latitude, longitude";

/// Treat an explicit `null` as present; only an absent key becomes `None`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A raw location report as posted by the shared page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    /// Link the report belongs to.
    #[serde(default, deserialize_with = "present")]
    pub link_id: Option<Value>,
    /// Latitude, as sent.
    #[serde(default, deserialize_with = "present")]
    pub latitude: Option<Value>,
    /// Longitude, as sent.
    #[serde(default, deserialize_with = "present")]
    pub longitude: Option<Value>,
    /// Reporting device, as sent.
    #[serde(default, deserialize_with = "present")]
    pub device_id: Option<Value>,
}

impl LocationReport {
    /// Parse a request body.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the body is not a JSON object.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::validation(format!("Malformed request body: {e}")))?;
        if !value.is_object() {
            return Err(Error::validation(MISSING_FIELDS));
        }
        serde_json::from_value(value).map_err(|e| Error::validation(e.to_string()))
    }

    /// Parse an `application/x-www-form-urlencoded` body.
    ///
    /// Every field arrives as a string. A repeated key collects its values
    /// into an array, the way a query-string parser would.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the body is not valid form encoding.
    pub fn from_form(body: &[u8]) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| Error::validation(format!("Malformed request body: {e}")))?;

        let mut fields = Map::new();
        for (key, value) in pairs {
            let value = Value::String(value);
            match fields.get_mut(&key) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    fields.insert(key, value);
                }
            }
        }
        serde_json::from_value(Value::Object(fields)).map_err(|e| Error::validation(e.to_string()))
    }
}

/// What the caller gets back for an accepted report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    /// The stored sample.
    pub sample: LocationSample,
    /// History length after the append.
    pub count: usize,
}

/// JavaScript truthiness, rendered as a string.
fn truthy_string(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// A value converted to a string the way JavaScript's `String()` would.
fn js_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => js_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Coerce a JSON value to a coordinate.
///
/// Non-numbers go through their JavaScript string form first, so `[40.5]`
/// and `"40.5"` both give `40.5` while `[1, 2]` reads as `"1,2"` and gives `1`.
#[must_use]
pub fn coerce_coordinate(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        other => parse_float_prefix(&js_to_string(other)),
    }
}

/// Parse the longest leading decimal number in `input`, like `parseFloat`.
#[must_use]
pub fn parse_float_prefix(input: &str) -> f64 {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

/// Validates reports and appends them to link histories.
#[derive(Clone)]
pub struct Ingestor {
    links: Arc<dyn LinkStore>,
    locations: Arc<dyn LocationStore>,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor").finish_non_exhaustive()
    }
}

impl Ingestor {
    /// Create an ingestor over the given stores.
    #[must_use]
    pub fn new(links: Arc<dyn LinkStore>, locations: Arc<dyn LocationStore>) -> Self {
        Self { links, locations }
    }

    /// Validate `report` and record it.
    ///
    /// # Errors
    ///
    /// - `Validation` if `linkId`, `latitude` or `longitude` is missing
    /// - `NotFound` if the link was never issued
    /// - `Forbidden` if the link has been deactivated
    /// - `Internal` if the stores fail
    pub fn ingest(&self, report: &LocationReport) -> Result<Receipt> {
        let raw_id = report.link_id.as_ref().and_then(truthy_string);
        let (Some(raw_id), Some(latitude), Some(longitude)) =
            (raw_id, report.latitude.as_ref(), report.longitude.as_ref())
        else {
            info!("Rejected location report: missing required fields");
            return Err(Error::validation(MISSING_FIELDS));
        };

        let invalid = || {
            info!("Rejected location report for unknown link {raw_id}");
            Error::not_found("Invalid tracking link")
        };
        let id = LinkId::parse(&raw_id).ok_or_else(invalid)?;
        let link = match self.links.get(&id) {
            Ok(link) => link,
            Err(e) if e.is_not_found() => return Err(invalid()),
            Err(e) => return Err(e),
        };
        if !link.active {
            info!("Rejected location report for inactive link {id}");
            return Err(Error::forbidden("Tracking link is inactive"));
        }

        let device_id = report.device_id.as_ref().and_then(truthy_string);
        let sample = LocationSample::new(
            coerce_coordinate(latitude),
            coerce_coordinate(longitude),
            device_id,
        );
        let count = self.locations.append(&id, sample.clone())?;
        debug!("Recorded sample for {id} from {} ({count} held)", sample.device_id);

        Ok(Receipt { sample, count })
    }
}
