//! Raw record validation and normalization.
//!
//! Records arrive from the backend as loosely typed JSON. Every raw field is
//! optional and deserialized leniently: a wrongly typed value becomes
//! "missing" instead of failing the whole batch. Validation then keeps only
//! records with a present, numeric, finite, in-range location.
//!
//! Rejected records are reported through an optional hook and logged at
//! `debug`; they never abort processing of the rest.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ClusterError, Result};
use crate::{ClusterConfig, Event, GeoPoint, GeoRecord, Location, SourceType};

// ============================================================================
// Raw Types
// ============================================================================

/// Raw coordinates as received. Non-numeric values deserialize to `None`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCoordinates {
    #[serde(alias = "lat", deserialize_with = "lenient_number")]
    pub latitude: Option<f64>,
    #[serde(alias = "lng", alias = "lon", deserialize_with = "lenient_number")]
    pub longitude: Option<f64>,
}

impl RawCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }
}

// Bitwise so that a NaN snapshot compares equal to itself.
impl PartialEq for RawCoordinates {
    fn eq(&self, other: &Self) -> bool {
        fn bits(v: Option<f64>) -> Option<u64> {
            v.map(f64::to_bits)
        }
        bits(self.latitude) == bits(other.latitude)
            && bits(self.longitude) == bits(other.longitude)
    }
}

/// A raw event as supplied by the fetch layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_coordinates")]
    pub location: Option<RawCoordinates>,
    #[serde(alias = "imageUrls", deserialize_with = "lenient_strings")]
    pub image_urls: Vec<String>,
    #[serde(alias = "sourceType", deserialize_with = "lenient_string")]
    pub source_type: Option<String>,
    #[serde(alias = "startDatetime", deserialize_with = "lenient_string")]
    pub start_datetime: Option<String>,
    #[serde(alias = "endDatetime", deserialize_with = "lenient_string")]
    pub end_datetime: Option<String>,
    #[serde(alias = "attendeeCount", deserialize_with = "lenient_count")]
    pub attendee_count: Option<u32>,
    #[serde(deserialize_with = "lenient_strings")]
    pub categories: Vec<String>,
}

/// A raw static location as supplied by the fetch layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLocation {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_coordinates")]
    pub location: Option<RawCoordinates>,
    #[serde(alias = "imageUrls", deserialize_with = "lenient_strings")]
    pub image_urls: Vec<String>,
    #[serde(alias = "sourceType", deserialize_with = "lenient_string")]
    pub source_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub category: Option<String>,
}

// ============================================================================
// Lenient Field Decoding
// ============================================================================

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Ok(None),
    }
}

fn lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        _ => Ok(Vec::new()),
    }
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let count = value
        .as_f64()
        .filter(|n| n.is_finite())
        .map(|n| n.max(0.0).min(u32::MAX as f64) as u32);
    Ok(count)
}

fn lenient_coordinates<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<RawCoordinates>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => {
            Ok(serde_json::from_value::<RawCoordinates>(value).ok())
        }
        _ => Ok(None),
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Why a record was left out of the validated set.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidRecord {
    /// Array element was not a JSON object (index in the input array)
    NotAnObject { index: usize },
    /// No location field at all
    MissingLocation { id: String },
    /// Latitude or longitude missing or not a number
    NonNumericCoordinate { id: String },
    /// Latitude or longitude is NaN or infinite
    NonFiniteCoordinate { id: String },
    /// |latitude| > 90 or |longitude| > 180
    OutOfRange {
        id: String,
        latitude: f64,
        longitude: f64,
    },
    /// Same id as an earlier valid record
    DuplicateId { id: String },
}

impl fmt::Display for InvalidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRecord::NotAnObject { index } => {
                write!(f, "element {} is not an object", index)
            }
            InvalidRecord::MissingLocation { id } => {
                write!(f, "record '{}' has no location", id)
            }
            InvalidRecord::NonNumericCoordinate { id } => {
                write!(f, "record '{}' has a missing or non-numeric coordinate", id)
            }
            InvalidRecord::NonFiniteCoordinate { id } => {
                write!(f, "record '{}' has a NaN or infinite coordinate", id)
            }
            InvalidRecord::OutOfRange {
                id,
                latitude,
                longitude,
            } => {
                write!(
                    f,
                    "record '{}' is out of range ({}, {})",
                    id, latitude, longitude
                )
            }
            InvalidRecord::DuplicateId { id } => {
                write!(f, "record '{}' repeats an earlier id", id)
            }
        }
    }
}

// ============================================================================
// Single-Record Validation
// ============================================================================

/// Check a raw location and turn it into a valid point.
pub fn check_coordinates(
    id: &str,
    location: Option<&RawCoordinates>,
) -> std::result::Result<GeoPoint, InvalidRecord> {
    let location = location.ok_or_else(|| InvalidRecord::MissingLocation { id: id.to_string() })?;

    let (latitude, longitude) = match (location.latitude, location.longitude) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => {
            return Err(InvalidRecord::NonNumericCoordinate { id: id.to_string() });
        }
    };

    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(InvalidRecord::NonFiniteCoordinate { id: id.to_string() });
    }

    let point = GeoPoint::new(latitude, longitude);
    if !point.is_valid() {
        return Err(InvalidRecord::OutOfRange {
            id: id.to_string(),
            latitude,
            longitude,
        });
    }

    Ok(point)
}

impl RawEvent {
    /// Validate into an [`Event`], or report why not.
    pub fn validate(&self) -> std::result::Result<Event, InvalidRecord> {
        let id = self.id.clone().unwrap_or_default();
        let location = check_coordinates(&id, self.location.as_ref())?;

        Ok(Event {
            id,
            name: self.name.clone().unwrap_or_default(),
            location,
            image_urls: self.image_urls.clone(),
            source_type: self
                .source_type
                .as_deref()
                .map(SourceType::from)
                .unwrap_or_default(),
            start_datetime: self.start_datetime.clone(),
            end_datetime: self.end_datetime.clone(),
            attendee_count: self.attendee_count.unwrap_or(0),
            categories: self.categories.clone(),
        })
    }
}

impl RawLocation {
    /// Validate into a [`Location`], or report why not.
    pub fn validate(&self) -> std::result::Result<Location, InvalidRecord> {
        let id = self.id.clone().unwrap_or_default();
        let location = check_coordinates(&id, self.location.as_ref())?;

        Ok(Location {
            id,
            name: self.name.clone().unwrap_or_default(),
            location,
            image_urls: self.image_urls.clone(),
            source_type: self
                .source_type
                .as_deref()
                .map(SourceType::from)
                .unwrap_or(SourceType::Static),
            category: self.category.clone(),
        })
    }
}

/// Validate a single raw event. Returns `None` if it must be dropped.
pub fn validate_event(raw: &RawEvent) -> Option<Event> {
    raw.validate().ok()
}

/// Validate a single raw location. Returns `None` if it must be dropped.
pub fn validate_location(raw: &RawLocation) -> Option<Location> {
    raw.validate().ok()
}

// ============================================================================
// Batch Validation
// ============================================================================

fn validate_batch<R, T, V, F>(
    raws: &[R],
    config: &ClusterConfig,
    kind: &str,
    validate: V,
    mut on_invalid: F,
) -> Vec<T>
where
    T: GeoRecord,
    V: Fn(&R) -> std::result::Result<T, InvalidRecord>,
    F: FnMut(&InvalidRecord),
{
    let mut valid = Vec::with_capacity(raws.len());
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut rejected = 0usize;

    for raw in raws {
        let issue = match validate(raw) {
            Ok(record) => {
                let is_duplicate = config.dedupe_by_id
                    && !record.id().is_empty()
                    && !seen_ids.insert(record.id().to_string());
                if !is_duplicate {
                    valid.push(record);
                    continue;
                }
                InvalidRecord::DuplicateId {
                    id: record.id().to_string(),
                }
            }
            Err(issue) => issue,
        };

        debug!("[Validation] Dropping {}: {}", kind, issue);
        on_invalid(&issue);
        rejected += 1;
    }

    if rejected > 0 {
        info!(
            "[Validation] Kept {} of {} {}s ({} dropped)",
            valid.len(),
            raws.len(),
            kind,
            rejected
        );
    }

    valid
}

/// Validate a batch of raw events, preserving input order.
pub fn validate_events(raws: &[RawEvent], config: &ClusterConfig) -> Vec<Event> {
    validate_events_with(raws, config, |_| {})
}

/// Validate a batch of raw events, reporting each rejected record to `on_invalid`.
pub fn validate_events_with<F>(raws: &[RawEvent], config: &ClusterConfig, on_invalid: F) -> Vec<Event>
where
    F: FnMut(&InvalidRecord),
{
    validate_batch(raws, config, "event", RawEvent::validate, on_invalid)
}

/// Validate a batch of raw locations, preserving input order.
pub fn validate_locations(raws: &[RawLocation], config: &ClusterConfig) -> Vec<Location> {
    validate_locations_with(raws, config, |_| {})
}

/// Validate a batch of raw locations, reporting each rejected record to `on_invalid`.
pub fn validate_locations_with<F>(
    raws: &[RawLocation],
    config: &ClusterConfig,
    on_invalid: F,
) -> Vec<Location>
where
    F: FnMut(&InvalidRecord),
{
    validate_batch(raws, config, "location", RawLocation::validate, on_invalid)
}

/// Parse a JSON array of raw records.
///
/// The top level must be an array; anything else is a contract violation and
/// returns [`ClusterError::InvalidInput`]. Elements that are not objects are
/// bad data: they are reported and skipped.
pub fn parse_records_json<R, F>(json: &str, mut on_invalid: F) -> Result<Vec<R>>
where
    R: DeserializeOwned,
    F: FnMut(&InvalidRecord),
{
    let value: Value = serde_json::from_str(json)?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ClusterError::InvalidInput {
                message: format!("expected a JSON array of records, got {}", json_kind(&other)),
            });
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let parsed = match item {
            Value::Object(_) => serde_json::from_value::<R>(item).ok(),
            _ => None,
        };
        match parsed {
            Some(record) => records.push(record),
            None => {
                let issue = InvalidRecord::NotAnObject { index };
                debug!("[Validation] Dropping element: {}", issue);
                on_invalid(&issue);
            }
        }
    }

    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Tests
// ============================================================================
