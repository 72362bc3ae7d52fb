//! # Map Clusters
//!
//! Geospatial clustering and time-windowing of events and locations for
//! mobile map views.
//!
//! This library provides:
//! - Validation of raw geo-tagged records (missing/NaN/out-of-range coordinates)
//! - Grid clustering at a fixed coordinate precision (~100m cells at 3 decimals)
//! - Overlapping time windows over events (now / today / weekend)
//! - A stateful engine that only recomputes when its input actually changes
//! - Haversine nearby counts for live-location sharing
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use map_clusters::{aggregate, ClusterConfig, Event, GeoPoint};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let now = Utc.with_ymd_and_hms(2024, 5, 15, 10, 0, 0).unwrap();
//! let events = vec![
//!     Event::new("e1", GeoPoint::new(40.7128, -74.0060))
//!         .with_start((now + Duration::hours(2)).to_rfc3339())
//!         .with_attendees(10),
//!     Event::new("e2", GeoPoint::new(40.7129, -74.0061))
//!         .with_start((now + Duration::hours(3)).to_rfc3339())
//!         .with_attendees(50),
//! ];
//!
//! let view = aggregate(&events, &[], &now, &ClusterConfig::default());
//! assert_eq!(view.clusters_now.len(), 1);
//! assert_eq!(view.clusters_now[0].cluster_key, "40.713,-74.006");
//! assert_eq!(view.clusters_now[0].representative.id, "e2");
//! ```

use std::fmt;

use rstar::{RTreeObject, AABB};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ClusterError, Result};

// Geographic utilities (haversine distance, bounds, degree conversions)
pub mod geo_utils;

// Raw record validation and normalization
pub mod validation;
pub use validation::{
    check_coordinates, parse_records_json, validate_event, validate_events, validate_events_with,
    validate_location, validate_locations, validate_locations_with, InvalidRecord,
    RawCoordinates, RawEvent, RawLocation,
};

// Grid clustering at fixed coordinate precision
pub mod clustering;
pub use clustering::{
    cluster_by_attendance, cluster_events, cluster_key, cluster_locations, cluster_records,
    SpatialCluster,
};

// Time windows over events (now / today / weekend)
pub mod temporal;
pub use temporal::{parse_timestamp, partition, TimeWindows};

// Composition of the stages into the published view
pub mod aggregation;
pub use aggregation::{aggregate, aggregate_raw, AggregatedView, ClusterWindow};

// Haversine nearby counts for live-location users
pub mod nearby;
pub use nearby::{annotate_nearby_counts, NearbyCount, NearbyUser};

// Request-scoped map state (user, user location, saved centre)
pub mod context;
pub use context::MapContext;

// Algorithm toolbox - standalone access to the pure stages
pub mod algorithms;

// Stateful cluster engine (singleton owning the last-seen input)
pub mod engine;
pub use engine::{with_engine, EngineStats, MapClusterEngine, ENGINE};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("MapClusters"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A geographic point with latitude and longitude.
///
/// This is the only coordinate shape in the public API. Map-camera style
/// `[longitude, latitude]` pairs go through [`GeoPoint::from_lng_lat`].
///
/// # Example
/// ```
/// use map_clusters::GeoPoint;
/// let point = GeoPoint::new(40.7128, -74.0060); // New York
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a point from a `[longitude, latitude]` pair (map-camera order).
    pub fn from_lng_lat(lng_lat: [f64; 2]) -> Self {
        Self::new(lng_lat[1], lng_lat[0])
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned bounding box (a map viewport).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// R-tree query boxes (`[lng, lat]`) covering the viewport.
    ///
    /// A viewport with `min_lng > max_lng` wraps across the antimeridian and
    /// is split into one box per side.
    pub(crate) fn envelopes(&self) -> Vec<AABB<[f64; 2]>> {
        if self.min_lng > self.max_lng {
            vec![
                AABB::from_corners([self.min_lng, self.min_lat], [180.0, self.max_lat]),
                AABB::from_corners([-180.0, self.min_lat], [self.max_lng, self.max_lat]),
            ]
        } else {
            vec![AABB::from_corners(
                [self.min_lng, self.min_lat],
                [self.max_lng, self.max_lat],
            )]
        }
    }
}

/// Where a record came from.
///
/// Serialized as the plain tag string used by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    /// Created by an app user (the default when no tag is present)
    #[default]
    UserCreated,
    /// Curated static place
    Static,
    /// Imported from Google Places
    GoogleApi,
    /// Imported from Ticketmaster
    Ticketmaster,
    /// Any other provenance, kept verbatim
    Other(String),
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::UserCreated => "user_created",
            SourceType::Static => "static",
            SourceType::GoogleApi => "googleApi",
            SourceType::Ticketmaster => "ticketmaster",
            SourceType::Other(tag) => tag,
        }
    }
}

impl From<&str> for SourceType {
    fn from(tag: &str) -> Self {
        match tag {
            "user_created" => SourceType::UserCreated,
            "static" => SourceType::Static,
            "googleApi" => SourceType::GoogleApi,
            "ticketmaster" => SourceType::Ticketmaster,
            other => SourceType::Other(other.to_string()),
        }
    }
}

impl From<String> for SourceType {
    fn from(tag: String) -> Self {
        SourceType::from(tag.as_str())
    }
}

impl From<SourceType> for String {
    fn from(source: SourceType) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything with an id and a geographic point that can be clustered.
pub trait GeoRecord {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn location(&self) -> GeoPoint;
    fn source_type(&self) -> &SourceType;
}

/// A validated event. Its location is always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    pub image_urls: Vec<String>,
    pub source_type: SourceType,
    /// ISO-8601 start; absent or unparseable keeps the event out of time windows
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    /// Tie-break when choosing a cluster's representative
    pub attendee_count: u32,
    pub categories: Vec<String>,
}

impl Event {
    /// Create a user-created event with no schedule and no attendees.
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            location,
            image_urls: Vec::new(),
            source_type: SourceType::UserCreated,
            start_datetime: None,
            end_datetime: None,
            attendee_count: 0,
            categories: Vec::new(),
        }
    }

    pub fn with_start(mut self, start_datetime: impl Into<String>) -> Self {
        self.start_datetime = Some(start_datetime.into());
        self
    }

    pub fn with_attendees(mut self, attendee_count: u32) -> Self {
        self.attendee_count = attendee_count;
        self
    }

    pub fn with_source(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }
}

impl GeoRecord for Event {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> GeoPoint {
        self.location
    }

    fn source_type(&self) -> &SourceType {
        &self.source_type
    }
}

/// A validated static location. Never appears in time windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    pub image_urls: Vec<String>,
    pub source_type: SourceType,
    pub category: Option<String>,
}

impl Location {
    /// Create a static location with no category.
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            location,
            image_urls: Vec::new(),
            source_type: SourceType::Static,
            category: None,
        }
    }
}

impl GeoRecord for Location {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> GeoPoint {
        self.location
    }

    fn source_type(&self) -> &SourceType {
        &self.source_type
    }
}

/// Configuration for validation, clustering and time windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Decimal places kept when building cluster keys.
    /// Default: 3 (~100m grid cells)
    pub coordinate_precision: u32,

    /// Length of the "now" window in hours.
    /// Default: 24
    pub now_window_hours: u32,

    /// Day-granularity lookahead of the "today" and "weekend" windows.
    /// Default: 7
    pub lookahead_days: u32,

    /// Event provenances kept out of the main event cluster set.
    /// Default: googleApi, static
    pub excluded_event_sources: Vec<SourceType>,

    /// Drop later records that repeat an earlier record's id.
    /// Default: true
    pub dedupe_by_id: bool,

    /// Radius for nearby counts, in miles.
    /// Default: 10.0
    pub nearby_radius_miles: f64,

    /// Minimum map-centre movement that triggers a refetch, in miles.
    /// Default: 1.0
    pub refetch_distance_miles: f64,
}

/// Largest precision that still yields meaningful f64 decimals.
pub const MAX_COORDINATE_PRECISION: u32 = 10;

/// Longest accepted "now" window: one leap year.
pub const MAX_NOW_WINDOW_HOURS: u32 = 366 * 24;

/// Longest accepted "today"/"weekend" lookahead: one leap year.
pub const MAX_LOOKAHEAD_DAYS: u32 = 366;

impl ClusterConfig {
    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.coordinate_precision > MAX_COORDINATE_PRECISION {
            return Err(ClusterError::ConfigError {
                message: format!(
                    "coordinate_precision {} exceeds maximum {}",
                    self.coordinate_precision, MAX_COORDINATE_PRECISION
                ),
            });
        }
        if self.now_window_hours > MAX_NOW_WINDOW_HOURS {
            return Err(ClusterError::ConfigError {
                message: format!(
                    "now_window_hours {} exceeds maximum {}",
                    self.now_window_hours, MAX_NOW_WINDOW_HOURS
                ),
            });
        }
        if self.lookahead_days > MAX_LOOKAHEAD_DAYS {
            return Err(ClusterError::ConfigError {
                message: format!(
                    "lookahead_days {} exceeds maximum {}",
                    self.lookahead_days, MAX_LOOKAHEAD_DAYS
                ),
            });
        }
        if !self.nearby_radius_miles.is_finite() || self.nearby_radius_miles < 0.0 {
            return Err(ClusterError::ConfigError {
                message: format!(
                    "nearby_radius_miles must be a non-negative number, got {}",
                    self.nearby_radius_miles
                ),
            });
        }
        if !self.refetch_distance_miles.is_finite() || self.refetch_distance_miles < 0.0 {
            return Err(ClusterError::ConfigError {
                message: format!(
                    "refetch_distance_miles must be a non-negative number, got {}",
                    self.refetch_distance_miles
                ),
            });
        }
        Ok(())
    }

    /// Whether events of this provenance belong in the main cluster set.
    pub fn includes_event_source(&self, source: &SourceType) -> bool {
        !self.excluded_event_sources.contains(source)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            coordinate_precision: 3,
            now_window_hours: 24,
            lookahead_days: 7,
            excluded_event_sources: vec![SourceType::GoogleApi, SourceType::Static],
            dedupe_by_id: true,
            nearby_radius_miles: 10.0,
            refetch_distance_miles: 1.0,
        }
    }
}

// ============================================================================
// Spatial Indexing Types
// ============================================================================

/// A cluster's marker position, indexed for viewport queries.
#[derive(Debug, Clone)]
pub struct ClusterMarker {
    pub cluster_key: String,
    pub point: GeoPoint,
}

impl RTreeObject for ClusterMarker {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.point.longitude, self.point.latitude])
    }
}

// ============================================================================
// Tests
// ============================================================================
