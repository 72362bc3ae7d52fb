//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the cluster engine
//! to Kotlin and Swift. Record lists cross the boundary as JSON, the way the
//! backend delivers them. The device clock is read here; everything below
//! this layer takes `now` explicitly.

use chrono::Local;
use log::{info, warn};

use crate::engine::{with_engine, EngineStats};
use crate::error::ClusterError;
use crate::nearby::{annotate_nearby_counts, NearbyCount, NearbyUser};
use crate::{init_logging, Bounds, ClusterConfig, ClusterWindow};

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Initialize the engine (call once at app startup).
#[uniffi::export]
pub fn engine_init() {
    init_logging();
    info!("[MapClusters] Initialized");
}

/// Clear all engine state. The configuration is kept.
#[uniffi::export]
pub fn engine_clear() {
    with_engine(|e| e.clear());
    info!("[MapClusters] Cleared");
}

// ============================================================================
// Input
// ============================================================================

/// Supply the current events and locations as JSON arrays.
///
/// Returns `true` when the view was rebuilt and `false` when the input
/// matched the previous call.
#[uniffi::export]
pub fn engine_update_json(events_json: String, locations_json: String) -> Result<bool, ClusterError> {
    let now = Local::now();
    let result = with_engine(|e| e.update_json(&events_json, &locations_json, &now));

    match &result {
        Ok(true) => info!("[MapClusters] View rebuilt"),
        Ok(false) => {}
        Err(e) => warn!("[MapClusters] Update rejected: {}", e),
    }
    result
}

/// Rebuild the view from the cached input against the current time.
#[uniffi::export]
pub fn engine_refresh() {
    let now = Local::now();
    with_engine(|e| e.refresh(&now));
}

/// Replace the engine configuration from JSON. Missing fields take their
/// defaults.
#[uniffi::export]
pub fn engine_set_config_json(config_json: String) -> Result<(), ClusterError> {
    let config: ClusterConfig = serde_json::from_str(&config_json).map_err(|e| {
        warn!("[MapClusters] Unreadable config: {}", e);
        ClusterError::ConfigError {
            message: e.to_string(),
        }
    })?;

    with_engine(|e| e.set_config(config)).map_err(|e| {
        warn!("[MapClusters] Config rejected: {}", e);
        e
    })
}

// ============================================================================
// Output
// ============================================================================

/// Get the whole view (validated lists plus every cluster set) as JSON.
#[uniffi::export]
pub fn engine_get_view_json() -> Result<String, ClusterError> {
    with_engine(|e| e.view_json())
}

/// Get one window's clusters as JSON.
///
/// `window` is one of `all`, `locations`, `now`, `today`, `weekend`.
#[uniffi::export]
pub fn engine_get_clusters_json(window: String) -> Result<String, ClusterError> {
    let window: ClusterWindow = window.parse()?;
    with_engine(|e| e.clusters_json(window))
}

/// Get one window's clusters inside a map viewport as JSON.
#[uniffi::export]
pub fn engine_query_viewport_json(window: String, bounds: Bounds) -> Result<String, ClusterError> {
    let window: ClusterWindow = window.parse()?;
    with_engine(|e| e.clusters_in_viewport_json(window, &bounds))
}

/// Get engine statistics.
#[uniffi::export]
pub fn engine_get_stats() -> EngineStats {
    with_engine(|e| e.stats())
}

// ============================================================================
// Nearby Users
// ============================================================================

/// Annotate users with nearby counts at the engine's configured radius.
#[uniffi::export]
pub fn engine_annotate_nearby_counts(users: Vec<NearbyUser>) -> Vec<NearbyCount> {
    with_engine(|e| e.annotate_nearby(&users))
}

/// Annotate users sharing their location with how many others are within
/// `radius_miles`.
#[uniffi::export]
pub fn ffi_annotate_nearby_counts(users: Vec<NearbyUser>, radius_miles: f64) -> Vec<NearbyCount> {
    init_logging();
    let start = std::time::Instant::now();
    let counts = annotate_nearby_counts(&users, radius_miles);
    info!(
        "[MapClusters] Nearby counts for {} users in {:?}",
        users.len(),
        start.elapsed()
    );
    counts
}
