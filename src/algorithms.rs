//! # Algorithm Toolbox
//!
//! Direct access to the pure stages, for callers that want one of them
//! without the stateful engine.
//!
//! ## Stages
//!
//! - **Validation**: lenient raw records to typed, filtered records
//! - **Clustering**: fixed-precision grid buckets with a representative
//! - **Time Windows**: now / today / weekend partitioning
//! - **Nearby Counts**: haversine neighbour counts with an R-tree prefilter
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: great-circle distance in miles
//! - **Search Envelopes**: antimeridian-aware R-tree query boxes
//!
//! # Example
//!
//! ```rust
//! use map_clusters::algorithms::{cluster_key, haversine_miles, GeoPoint};
//!
//! let nyc = GeoPoint::new(40.7128, -74.0060);
//! assert_eq!(cluster_key(&nyc, 3), "40.713,-74.006");
//!
//! let la = GeoPoint::new(34.0522, -118.2437);
//! println!("NYC to LA: {:.0} mi", haversine_miles(&nyc, &la));
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{Bounds, ClusterConfig, Event, GeoPoint, GeoRecord, Location, SourceType};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    haversine_miles, miles_to_degrees_lat, search_envelopes, EARTH_RADIUS_MILES,
};

// =============================================================================
// Validation
// =============================================================================

/// Turn raw records into valid ones, reporting every rejection.
///
/// Records with missing, non-numeric, non-finite or out-of-range coordinates
/// are dropped. With `dedupe_by_id`, later records repeating an id are
/// dropped too.
pub use crate::validation::{validate_events_with, validate_locations_with};

pub use crate::validation::{
    check_coordinates, parse_records_json, validate_events, validate_locations, InvalidRecord,
    RawEvent, RawLocation,
};

// =============================================================================
// Clustering
// =============================================================================

/// Group records into grid cells keyed by rounded coordinates.
///
/// Generic over any [`GeoRecord`]; the closure decides when a later member
/// replaces the current representative.
pub use crate::clustering::cluster_records;

pub use crate::clustering::{cluster_by_attendance, cluster_key, SpatialCluster};

// =============================================================================
// Time Windows
// =============================================================================

/// Split events into the overlapping now / today / weekend windows.
pub use crate::temporal::partition;

pub use crate::temporal::{parse_timestamp, TimeWindows, WEEKEND_DAYS};

// =============================================================================
// Nearby Counts
// =============================================================================

/// Count, for each user, the other users within a radius.
pub use crate::nearby::annotate_nearby_counts;

pub use crate::nearby::{NearbyCount, NearbyUser};
