//! Composition of validation, time windows and clustering into the view the
//! map renders.
//!
//! `aggregate` is pure: the same validated input and `now` always produce a
//! structurally identical view (same keys, member order and representatives).
//! Skipping recomputation on unchanged input is the engine's job.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use log::info;
use serde::{Deserialize, Serialize};

use crate::clustering::{cluster_by_attendance, cluster_events, cluster_locations, SpatialCluster};
use crate::error::{ClusterError, Result};
use crate::temporal::partition;
use crate::validation::{validate_events, validate_locations, RawEvent, RawLocation};
use crate::{ClusterConfig, ClusterMarker, Event, Location};

/// Names one of the cluster sets in an [`AggregatedView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterWindow {
    /// All valid events, minus excluded provenances
    All,
    /// All valid locations
    Locations,
    /// Events starting within the next 24 hours
    Now,
    /// Events starting within the next 7 calendar days
    Today,
    /// Friday to Sunday events within the next 7 calendar days
    Weekend,
}

impl ClusterWindow {
    pub const ALL_WINDOWS: [ClusterWindow; 5] = [
        ClusterWindow::All,
        ClusterWindow::Locations,
        ClusterWindow::Now,
        ClusterWindow::Today,
        ClusterWindow::Weekend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterWindow::All => "all",
            ClusterWindow::Locations => "locations",
            ClusterWindow::Now => "now",
            ClusterWindow::Today => "today",
            ClusterWindow::Weekend => "weekend",
        }
    }
}

impl FromStr for ClusterWindow {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        ClusterWindow::ALL_WINDOWS
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| ClusterError::UnknownWindow {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for ClusterWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the map needs for one input snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedView {
    /// Validated events, input order
    pub events: Vec<Event>,
    /// Validated locations, input order
    pub locations: Vec<Location>,
    /// Event clusters excluding configured provenances (googleApi, static)
    pub clusters: Vec<SpatialCluster<Event>>,
    /// Location clusters, no provenance filter
    pub clusters_locations: Vec<SpatialCluster<Location>>,
    pub clusters_now: Vec<SpatialCluster<Event>>,
    pub clusters_today: Vec<SpatialCluster<Event>>,
    pub clusters_weekend: Vec<SpatialCluster<Event>>,
    /// The `now` the windows were computed against, unix seconds
    pub generated_at: i64,
}

impl AggregatedView {
    /// Event clusters for a window. `None` for [`ClusterWindow::Locations`].
    pub fn event_clusters(&self, window: ClusterWindow) -> Option<&[SpatialCluster<Event>]> {
        match window {
            ClusterWindow::All => Some(self.clusters.as_slice()),
            ClusterWindow::Now => Some(self.clusters_now.as_slice()),
            ClusterWindow::Today => Some(self.clusters_today.as_slice()),
            ClusterWindow::Weekend => Some(self.clusters_weekend.as_slice()),
            ClusterWindow::Locations => None,
        }
    }

    /// Number of clusters in a window.
    pub fn cluster_count(&self, window: ClusterWindow) -> usize {
        match self.event_clusters(window) {
            Some(clusters) => clusters.len(),
            None => self.clusters_locations.len(),
        }
    }

    /// Marker positions for a window, keyed by cluster.
    pub fn markers(&self, window: ClusterWindow) -> Vec<ClusterMarker> {
        match self.event_clusters(window) {
            Some(clusters) => to_markers(clusters),
            None => to_markers(&self.clusters_locations),
        }
    }

    /// Serialize one window's clusters as a JSON array.
    pub fn clusters_json(&self, window: ClusterWindow) -> Result<String> {
        let json = match self.event_clusters(window) {
            Some(clusters) => serde_json::to_string(clusters)?,
            None => serde_json::to_string(&self.clusters_locations)?,
        };
        Ok(json)
    }
}

fn to_markers<T>(clusters: &[SpatialCluster<T>]) -> Vec<ClusterMarker> {
    clusters
        .iter()
        .map(|c| ClusterMarker {
            cluster_key: c.cluster_key.clone(),
            point: c.location,
        })
        .collect()
}

/// Build the full view from validated records.
///
/// Time windows are taken from all valid events; only the main event layer
/// (`clusters`) applies the provenance filter.
pub fn aggregate<Tz: TimeZone>(
    events: &[Event],
    locations: &[Location],
    now: &DateTime<Tz>,
    config: &ClusterConfig,
) -> AggregatedView {
    let precision = config.coordinate_precision;
    let windows = partition(events, now, config);

    let view = AggregatedView {
        events: events.to_vec(),
        locations: locations.to_vec(),
        clusters: cluster_events(events, config),
        clusters_locations: cluster_locations(locations, config),
        clusters_now: cluster_by_attendance(&windows.now, precision),
        clusters_today: cluster_by_attendance(&windows.today, precision),
        clusters_weekend: cluster_by_attendance(&windows.weekend, precision),
        generated_at: now.timestamp(),
    };

    info!(
        "[Aggregation] {} events, {} locations -> {} event clusters, {} location clusters (now {}, today {}, weekend {})",
        view.events.len(),
        view.locations.len(),
        view.clusters.len(),
        view.clusters_locations.len(),
        view.clusters_now.len(),
        view.clusters_today.len(),
        view.clusters_weekend.len()
    );

    view
}

/// Validate raw records, then build the view.
pub fn aggregate_raw<Tz: TimeZone>(
    raw_events: &[RawEvent],
    raw_locations: &[RawLocation],
    now: &DateTime<Tz>,
    config: &ClusterConfig,
) -> AggregatedView {
    let events = validate_events(raw_events, config);
    let locations = validate_locations(raw_locations, config);
    aggregate(&events, &locations, now, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::RawCoordinates;
    use crate::{GeoPoint, SourceType};
    use chrono::{Duration, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 10, 0, 0).unwrap()
    }

    fn keys<T>(clusters: &[SpatialCluster<T>]) -> Vec<&str> {
        clusters.iter().map(|c| c.cluster_key.as_str()).collect()
    }

    #[test]
    fn test_two_nearby_events_form_one_cluster_everywhere() {
        let now = now();
        let events = vec![
            Event::new("e1", GeoPoint::new(40.7128, -74.0060))
                .with_start((now + Duration::hours(2)).to_rfc3339())
                .with_attendees(10),
            Event::new("e2", GeoPoint::new(40.7129, -74.0061))
                .with_start((now + Duration::hours(3)).to_rfc3339())
                .with_attendees(50),
        ];

        let view = aggregate(&events, &[], &now, &ClusterConfig::default());

        for window in [ClusterWindow::All, ClusterWindow::Now, ClusterWindow::Today] {
            let clusters = view.event_clusters(window).unwrap();
            assert_eq!(clusters.len(), 1, "window {}", window);
            assert_eq!(clusters[0].cluster_key, "40.713,-74.006");
            assert_eq!(clusters[0].members.len(), 2);
            assert_eq!(clusters[0].members[0].id, "e1");
            assert_eq!(clusters[0].representative.id, "e2");
        }
        assert!(view.clusters_weekend.is_empty());
        assert_eq!(view.generated_at, now.timestamp());
    }

    #[test]
    fn test_windows_ignore_provenance_filter() {
        let now = now();
        let events = vec![
            Event::new("google", GeoPoint::new(1.0, 1.0))
                .with_source(SourceType::GoogleApi)
                .with_start((now + Duration::hours(1)).to_rfc3339()),
            Event::new("user", GeoPoint::new(2.0, 2.0))
                .with_start((now + Duration::hours(1)).to_rfc3339()),
        ];
        let view = aggregate(&events, &[], &now, &ClusterConfig::default());

        assert_eq!(keys(&view.clusters), vec!["2.000,2.000"]);
        assert_eq!(keys(&view.clusters_now), vec!["1.000,1.000", "2.000,2.000"]);
    }

    #[test]
    fn test_locations_are_clustered_but_never_windowed() {
        let locations = vec![
            Location::new("l1", GeoPoint::new(3.0, 3.0)),
            Location::new("l2", GeoPoint::new(3.0002, 3.0002)),
        ];
        let view = aggregate(&[], &locations, &now(), &ClusterConfig::default());

        assert_eq!(view.clusters_locations.len(), 1);
        assert_eq!(view.clusters_locations[0].representative.id, "l1");
        assert!(view.clusters_now.is_empty());
        assert!(view.clusters_today.is_empty());
        assert_eq!(view.cluster_count(ClusterWindow::Locations), 1);
        assert!(view.event_clusters(ClusterWindow::Locations).is_none());
    }

    #[test]
    fn test_aggregate_raw_drops_invalid_records() {
        let raw_events = vec![
            RawEvent {
                id: Some("good".to_string()),
                location: Some(RawCoordinates::new(10.0, 10.0)),
                ..RawEvent::default()
            },
            RawEvent {
                id: Some("bad".to_string()),
                location: Some(RawCoordinates::new(-91.0, 10.0)),
                ..RawEvent::default()
            },
        ];
        let view = aggregate_raw(&raw_events, &[], &now(), &ClusterConfig::default());
        assert_eq!(view.events.len(), 1);
        assert_eq!(view.clusters.len(), 1);
        assert!(view
            .clusters
            .iter()
            .all(|c| c.members.iter().all(|m| m.id != "bad")));
    }

    #[test]
    fn test_empty_input_gives_empty_view() {
        let view = aggregate(&[], &[], &now(), &ClusterConfig::default());
        for window in ClusterWindow::ALL_WINDOWS {
            assert_eq!(view.cluster_count(window), 0);
        }
        assert!(view.events.is_empty());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let now = now();
        let events: Vec<Event> = (0..30)
            .map(|i| {
                Event::new(format!("e{}", i), GeoPoint::new(40.0 + (i % 4) as f64 * 0.01, -74.0))
                    .with_start((now + Duration::hours(i as i64 * 6)).to_rfc3339())
                    .with_attendees(i)
            })
            .collect();
        let config = ClusterConfig::default();
        assert_eq!(
            aggregate(&events, &[], &now, &config),
            aggregate(&events, &[], &now, &config)
        );
    }

    #[test]
    fn test_window_names() {
        assert_eq!("weekend".parse::<ClusterWindow>(), Ok(ClusterWindow::Weekend));
        assert_eq!("locations".parse::<ClusterWindow>(), Ok(ClusterWindow::Locations));
        assert_eq!(
            "tomorrow".parse::<ClusterWindow>(),
            Err(ClusterError::UnknownWindow {
                name: "tomorrow".to_string()
            })
        );
        for window in ClusterWindow::ALL_WINDOWS {
            assert_eq!(window.as_str().parse::<ClusterWindow>(), Ok(window));
        }
    }

    #[test]
    fn test_clusters_json_and_markers() {
        let events = vec![Event::new("e1", GeoPoint::new(5.0, 6.0))];
        let view = aggregate(&events, &[], &now(), &ClusterConfig::default());

        let json = view.clusters_json(ClusterWindow::All).unwrap();
        let parsed: Vec<SpatialCluster<Event>> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, view.clusters);

        let markers = view.markers(ClusterWindow::All);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].cluster_key, "5.000,6.000");
        assert_eq!(markers[0].point, GeoPoint::new(5.0, 6.0));
        assert_eq!(view.clusters_json(ClusterWindow::Locations).unwrap(), "[]");
    }
}
