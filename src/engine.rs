//! # Cluster Engine
//!
//! Stateful owner of the last-seen input and the view derived from it.
//!
//! ## Architecture
//!
//! The engine holds:
//! - The last raw event and location lists it processed
//! - The aggregated view built from them
//! - One R-tree of cluster markers per window for viewport queries
//!
//! Recomputation is whole and only happens when the incoming lists differ
//! (deep equality) from the last snapshot, when the configuration changes,
//! or on an explicit [`MapClusterEngine::refresh`]. The engine is meant to be
//! owned by a single caller; the FFI layer shares one instance through
//! [`ENGINE`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone};
use log::{debug, info};
use once_cell::sync::Lazy;
use rstar::RTree;
use serde::Serialize;

use crate::aggregation::{aggregate, AggregatedView, ClusterWindow};
use crate::clustering::SpatialCluster;
use crate::error::Result;
use crate::nearby::{annotate_nearby_counts, NearbyCount, NearbyUser};
use crate::validation::{
    parse_records_json, validate_events_with, validate_locations_with, RawEvent, RawLocation,
};
use crate::{Bounds, ClusterConfig, ClusterMarker, Event};

// ============================================================================
// Cluster Engine
// ============================================================================

/// The stateful cluster engine.
pub struct MapClusterEngine {
    // Last processed input
    raw_events: Vec<RawEvent>,
    raw_locations: Vec<RawLocation>,

    // Derived state
    view: AggregatedView,

    // Spatial index for viewport queries, one tree per window
    spatial_index: HashMap<ClusterWindow, RTree<ClusterMarker>>,

    // Dirty tracking
    /// Set until the first recompute, and after a config change
    stale: bool,
    spatial_dirty: bool,

    // Counters
    generation: u64,
    skipped_updates: u64,
    rejected_records: u64,

    // Configuration
    config: ClusterConfig,
}

impl MapClusterEngine {
    /// Create a new engine with default configuration.
    pub fn new() -> Self {
        Self {
            raw_events: Vec::new(),
            raw_locations: Vec::new(),
            view: AggregatedView::default(),
            spatial_index: HashMap::new(),
            stale: true,
            spatial_dirty: true,
            generation: 0,
            skipped_updates: 0,
            rejected_records: 0,
            config: ClusterConfig::default(),
        }
    }

    /// Create a new engine with a custom configuration.
    pub fn with_config(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Supply the current record lists.
    ///
    /// Returns `true` if the view was rebuilt, `false` if the input matched
    /// the last snapshot and the previous view was kept.
    pub fn update<Tz: TimeZone>(
        &mut self,
        raw_events: Vec<RawEvent>,
        raw_locations: Vec<RawLocation>,
        now: &DateTime<Tz>,
    ) -> bool {
        if !self.stale && raw_events == self.raw_events && raw_locations == self.raw_locations {
            self.skipped_updates += 1;
            debug!(
                "[ClusterEngine] Input unchanged ({} events, {} locations), keeping generation {}",
                raw_events.len(),
                raw_locations.len(),
                self.generation
            );
            return false;
        }

        self.raw_events = raw_events;
        self.raw_locations = raw_locations;
        self.recompute(now, 0);
        true
    }

    /// Supply the current record lists as JSON arrays.
    ///
    /// Fails without touching the engine if either payload is not a JSON
    /// array. Elements that are not objects are dropped and counted as
    /// rejected records.
    pub fn update_json<Tz: TimeZone>(
        &mut self,
        events_json: &str,
        locations_json: &str,
        now: &DateTime<Tz>,
    ) -> Result<bool> {
        let mut malformed = 0u64;
        let raw_events: Vec<RawEvent> = parse_records_json(events_json, |_| malformed += 1)?;
        let raw_locations: Vec<RawLocation> =
            parse_records_json(locations_json, |_| malformed += 1)?;

        if !self.stale && raw_events == self.raw_events && raw_locations == self.raw_locations {
            self.skipped_updates += 1;
            return Ok(false);
        }

        self.raw_events = raw_events;
        self.raw_locations = raw_locations;
        self.recompute(now, malformed);
        Ok(true)
    }

    /// Rebuild the view from the cached input, e.g. because the clock moved
    /// on and the time windows need to follow.
    pub fn refresh<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) {
        self.recompute(now, 0);
    }

    fn recompute<Tz: TimeZone>(&mut self, now: &DateTime<Tz>, malformed: u64) {
        let mut rejected = malformed;
        let events = validate_events_with(&self.raw_events, &self.config, |_| rejected += 1);
        let locations =
            validate_locations_with(&self.raw_locations, &self.config, |_| rejected += 1);

        self.view = aggregate(&events, &locations, now, &self.config);
        self.rejected_records = rejected;
        self.generation += 1;
        self.stale = false;
        self.spatial_dirty = true;

        info!(
            "[ClusterEngine] Generation {}: {} events, {} locations ({} rejected)",
            self.generation,
            self.view.events.len(),
            self.view.locations.len(),
            rejected
        );
    }

    /// Drop all input and derived state. The configuration is kept.
    pub fn clear(&mut self) {
        let config = std::mem::take(&mut self.config);
        *self = Self {
            config,
            ..Self::new()
        };
    }

    // ========================================================================
    // View Access
    // ========================================================================

    /// The current view (empty before the first update).
    pub fn view(&self) -> &AggregatedView {
        &self.view
    }

    /// The current view as JSON.
    pub fn view_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.view)?)
    }

    /// One window's event clusters. `None` for [`ClusterWindow::Locations`],
    /// whose clusters are in [`AggregatedView::clusters_locations`].
    pub fn clusters(&self, window: ClusterWindow) -> Option<&[SpatialCluster<Event>]> {
        self.view.event_clusters(window)
    }

    /// One window's clusters as a JSON array.
    pub fn clusters_json(&self, window: ClusterWindow) -> Result<String> {
        self.view.clusters_json(window)
    }

    /// Whether the engine has processed any input yet.
    pub fn has_view(&self) -> bool {
        self.generation > 0
    }

    // ========================================================================
    // Spatial Queries
    // ========================================================================

    /// Ensure the per-window spatial indexes match the current view.
    fn ensure_spatial_index(&mut self) {
        if !self.spatial_dirty {
            return;
        }

        self.spatial_index = ClusterWindow::ALL_WINDOWS
            .into_iter()
            .map(|window| (window, RTree::bulk_load(self.view.markers(window))))
            .collect();
        self.spatial_dirty = false;
    }

    /// Cluster markers of a window inside a viewport.
    ///
    /// A viewport with `min_lng > max_lng` wraps across the antimeridian.
    pub fn clusters_in_viewport(&mut self, window: ClusterWindow, bounds: &Bounds) -> Vec<ClusterMarker> {
        self.ensure_spatial_index();

        let Some(tree) = self.spatial_index.get(&window) else {
            return Vec::new();
        };

        bounds
            .envelopes()
            .iter()
            .flat_map(|envelope| tree.locate_in_envelope(envelope))
            .cloned()
            .collect()
    }

    /// Full clusters of a window inside a viewport, in creation order, as JSON.
    pub fn clusters_in_viewport_json(&mut self, window: ClusterWindow, bounds: &Bounds) -> Result<String> {
        let keys: HashSet<String> = self
            .clusters_in_viewport(window, bounds)
            .into_iter()
            .map(|m| m.cluster_key)
            .collect();

        match self.view.event_clusters(window) {
            Some(clusters) => clusters_with_keys(clusters, &keys),
            None => clusters_with_keys(&self.view.clusters_locations, &keys),
        }
    }

    // ========================================================================
    // Nearby Users
    // ========================================================================

    /// Nearby counts at the configured `nearby_radius_miles`.
    pub fn annotate_nearby(&self, users: &[NearbyUser]) -> Vec<NearbyCount> {
        annotate_nearby_counts(users, self.config.nearby_radius_miles)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Replace the configuration.
    ///
    /// Invalid configurations are rejected and the current one is kept. A
    /// change marks the view stale, so the next update recomputes even if
    /// the input is unchanged.
    pub fn set_config(&mut self, config: ClusterConfig) -> Result<()> {
        config.validate()?;
        if config != self.config {
            self.config = config;
            self.stale = true;
        }
        Ok(())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            event_count: self.view.events.len() as u64,
            location_count: self.view.locations.len() as u64,
            cluster_count: self.view.clusters.len() as u64,
            location_cluster_count: self.view.clusters_locations.len() as u64,
            rejected_records: self.rejected_records,
            generation: self.generation,
            skipped_updates: self.skipped_updates,
        }
    }
}

impl Default for MapClusterEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn clusters_with_keys<T: Serialize>(
    clusters: &[SpatialCluster<T>],
    keys: &HashSet<String>,
) -> Result<String> {
    let selected: Vec<&SpatialCluster<T>> = clusters
        .iter()
        .filter(|c| keys.contains(&c.cluster_key))
        .collect();
    Ok(serde_json::to_string(&selected)?)
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct EngineStats {
    pub event_count: u64,
    pub location_count: u64,
    pub cluster_count: u64,
    pub location_cluster_count: u64,
    /// Records dropped by the last recompute
    pub rejected_records: u64,
    /// Number of recomputes so far
    pub generation: u64,
    /// Updates skipped because the input was unchanged
    pub skipped_updates: u64,
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Global engine instance.
///
/// This singleton allows FFI calls to access a shared engine without
/// passing state back and forth across the FFI boundary.
pub static ENGINE: Lazy<Mutex<MapClusterEngine>> = Lazy::new(|| Mutex::new(MapClusterEngine::new()));

/// Get a lock on the global engine.
///
/// A panic while the lock was held leaves the engine usable: its state is
/// always a whole view, never a half-built one.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&mut MapClusterEngine) -> R,
{
    let mut engine = ENGINE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut engine)
}

// ============================================================================
// Tests
// ============================================================================
