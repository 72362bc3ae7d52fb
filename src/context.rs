//! Request-scoped map state.
//!
//! Holds who is looking at the map, where they are, and the centre the last
//! fetch was made for. Callers own one per map screen and pass it where it
//! is needed.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_miles;
use crate::nearby::{annotate_nearby_counts, NearbyCount, NearbyUser};
use crate::{ClusterConfig, GeoPoint};

/// State of one map screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapContext {
    /// The signed-in user, if any
    pub user_id: Option<String>,
    pub user_location: Option<GeoPoint>,
    /// Centre the last fetch was made for
    pub saved_center: Option<GeoPoint>,
}

impl MapContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a signed-in user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Record the user's current position. Invalid points are ignored.
    pub fn set_user_location(&mut self, location: GeoPoint) {
        if location.is_valid() {
            self.user_location = Some(location);
        }
    }

    /// Decide whether moving the map to `center` (`[lng, lat]`, map-camera
    /// order) warrants a new fetch.
    ///
    /// Returns `true` and saves `center` when nothing was fetched yet or the
    /// centre moved at least `min_move_miles`. An invalid centre never
    /// triggers a fetch.
    pub fn should_fetch(&mut self, center: [f64; 2], min_move_miles: f64) -> bool {
        let center = GeoPoint::from_lng_lat(center);
        if !center.is_valid() {
            debug!("[MapContext] Ignoring invalid centre {:?}", center);
            return false;
        }

        let fetch = match self.saved_center {
            None => true,
            Some(saved) => haversine_miles(&saved, &center) >= min_move_miles,
        };

        if fetch {
            self.saved_center = Some(center);
        }
        fetch
    }

    /// [`MapContext::should_fetch`] at the configured
    /// `refetch_distance_miles`.
    pub fn should_refetch(&mut self, center: [f64; 2], config: &ClusterConfig) -> bool {
        self.should_fetch(center, config.refetch_distance_miles)
    }

    /// Nearby counts for the other users sharing their location.
    ///
    /// The context's own user is left out of both the output and the counts.
    pub fn nearby_users(&self, users: &[NearbyUser], radius_miles: f64) -> Vec<NearbyCount> {
        let others: Vec<NearbyUser> = match &self.user_id {
            Some(me) => users.iter().filter(|u| &u.id != me).cloned().collect(),
            None => users.to_vec(),
        };
        annotate_nearby_counts(&others, radius_miles)
    }
}
