//! Grid clustering of geo records.
//!
//! Records are bucketed by their coordinates rounded to a fixed number of
//! decimal places. At the default precision of 3 a cell is roughly 100m
//! across. This is a grid, not a distance-based algorithm: two records a
//! metre apart on either side of a cell edge never merge.
//!
//! One generic clusterer serves both events and locations; the per-type
//! behaviour is only the representative tie-break.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{ClusterConfig, Event, GeoPoint, GeoRecord, Location};

/// A group of records sharing one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialCluster<T> {
    /// Rounded `"lat,lng"` pair, e.g. `"40.712,-74.006"`
    pub cluster_key: String,
    /// Members in order of first appearance in the input
    pub members: Vec<T>,
    /// The member shown on the map pin
    pub representative: T,
    /// The representative's point (not the centroid of the members)
    pub location: GeoPoint,
}

impl<T> SpatialCluster<T> {
    /// Number of members (the marker's count badge).
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Build the grid-cell key for a point.
///
/// Coordinates are rounded half away from zero at `precision` decimals, then
/// written in fixed notation (never scientific). A coordinate that rounds to
/// zero is written without a sign.
///
/// # Example
/// ```
/// use map_clusters::{cluster_key, GeoPoint};
///
/// assert_eq!(cluster_key(&GeoPoint::new(40.71234, -74.00601), 3), "40.712,-74.006");
/// assert_eq!(cluster_key(&GeoPoint::new(40.0625, -74.1875), 3), "40.063,-74.188");
/// ```
pub fn cluster_key(point: &GeoPoint, precision: u32) -> String {
    format!(
        "{},{}",
        format_coordinate(point.latitude, precision),
        format_coordinate(point.longitude, precision)
    )
}

fn format_coordinate(value: f64, precision: u32) -> String {
    let scale = 10f64.powi(precision as i32);
    let mut rounded = (value * scale).round() / scale;
    // Folds -0.0 into 0.0
    if rounded == 0.0 {
        rounded = 0.0;
    }
    format!("{:.*}", precision as usize, rounded)
}

/// Cluster records by grid cell.
///
/// `prefer(candidate, current)` decides whether a newly seen member replaces
/// the current representative. Clusters come back in creation order.
/// Records with invalid points are skipped.
pub fn cluster_records<T, F>(records: &[T], precision: u32, mut prefer: F) -> Vec<SpatialCluster<T>>
where
    T: GeoRecord + Clone,
    F: FnMut(&T, &T) -> bool,
{
    let mut clusters: Vec<SpatialCluster<T>> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for record in records {
        let point = record.location();
        if !point.is_valid() {
            debug!(
                "[Clustering] Skipping '{}' with invalid point ({}, {})",
                record.id(),
                point.latitude,
                point.longitude
            );
            continue;
        }

        let key = cluster_key(&point, precision);
        match index_by_key.get(&key) {
            Some(&idx) => {
                let cluster = &mut clusters[idx];
                cluster.members.push(record.clone());
                if prefer(record, &cluster.representative) {
                    cluster.representative = record.clone();
                    cluster.location = point;
                }
            }
            None => {
                index_by_key.insert(key.clone(), clusters.len());
                clusters.push(SpatialCluster {
                    cluster_key: key,
                    members: vec![record.clone()],
                    representative: record.clone(),
                    location: point,
                });
            }
        }
    }

    clusters
}

/// Cluster events with no provenance filter.
///
/// The representative is the member with the highest attendee count; on a
/// tie the earlier member is kept.
pub fn cluster_by_attendance(events: &[Event], precision: u32) -> Vec<SpatialCluster<Event>> {
    cluster_records(events, precision, |candidate, current| {
        candidate.attendee_count > current.attendee_count
    })
}

/// Cluster events for the main event layer.
///
/// Events whose provenance is excluded by the config (Google Places and
/// static imports by default) are left out.
pub fn cluster_events(events: &[Event], config: &ClusterConfig) -> Vec<SpatialCluster<Event>> {
    let included: Vec<Event> = events
        .iter()
        .filter(|e| config.includes_event_source(&e.source_type))
        .cloned()
        .collect();
    cluster_by_attendance(&included, config.coordinate_precision)
}

/// Cluster static locations. The first member of each cell stays its
/// representative.
pub fn cluster_locations(
    locations: &[Location],
    config: &ClusterConfig,
) -> Vec<SpatialCluster<Location>> {
    cluster_records(locations, config.coordinate_precision, |_, _| false)
}
