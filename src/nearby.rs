//! Nearby counts for users sharing their live location.
//!
//! For every user, count the other users within a radius measured by
//! haversine great-circle distance. Candidates are pre-filtered with an
//! R-tree envelope query, so only pairs that can be in range get the exact
//! distance check.

use log::warn;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::geo_utils::{haversine_miles, search_envelopes};
use crate::GeoPoint;

/// A user sharing their location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NearbyUser {
    pub id: String,
    pub location: GeoPoint,
}

impl NearbyUser {
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            location,
        }
    }
}

/// A user annotated with how many other users are nearby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NearbyCount {
    pub id: String,
    pub location: GeoPoint,
    pub nearby_count: u32,
}

/// Position of a user in the input slice, indexed by point.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    index: usize,
    point: GeoPoint,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.point.longitude, self.point.latitude])
    }
}

fn count_within(
    tree: &RTree<IndexedPoint>,
    index: usize,
    center: &GeoPoint,
    radius_miles: f64,
) -> u32 {
    if !center.is_valid() {
        return 0;
    }

    search_envelopes(center, radius_miles)
        .iter()
        .flat_map(|envelope| tree.locate_in_envelope(envelope))
        .filter(|candidate| candidate.index != index)
        .filter(|candidate| haversine_miles(center, &candidate.point) <= radius_miles)
        .count() as u32
}

/// Annotate each user with the number of other users within `radius_miles`.
///
/// The relation is symmetric: if A counts B, B counts A. Users with invalid
/// coordinates get a count of 0 and are never counted by anyone. A negative
/// or NaN radius yields 0 for everyone. Output order matches input order.
///
/// # Example
/// ```
/// use map_clusters::{annotate_nearby_counts, GeoPoint, NearbyUser};
///
/// let users = vec![
///     NearbyUser::new("a", GeoPoint::new(40.0, -74.0)),
///     NearbyUser::new("b", GeoPoint::new(40.05, -74.0)),
///     NearbyUser::new("c", GeoPoint::new(45.0, -74.0)),
/// ];
/// let counts = annotate_nearby_counts(&users, 10.0);
/// assert_eq!(counts[0].nearby_count, 1);
/// assert_eq!(counts[2].nearby_count, 0);
/// ```
pub fn annotate_nearby_counts(users: &[NearbyUser], radius_miles: f64) -> Vec<NearbyCount> {
    if radius_miles.is_nan() || radius_miles < 0.0 {
        warn!(
            "[Nearby] Radius {} is not a usable distance, reporting zero counts",
            radius_miles
        );
        return users
            .iter()
            .map(|u| NearbyCount {
                id: u.id.clone(),
                location: u.location,
                nearby_count: 0,
            })
            .collect();
    }

    let indexed: Vec<IndexedPoint> = users
        .iter()
        .enumerate()
        .filter(|(_, u)| u.location.is_valid())
        .map(|(index, u)| IndexedPoint {
            index,
            point: u.location,
        })
        .collect();
    let tree = RTree::bulk_load(indexed);

    #[cfg(feature = "parallel")]
    let counts: Vec<u32> = users
        .par_iter()
        .enumerate()
        .map(|(i, u)| count_within(&tree, i, &u.location, radius_miles))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let counts: Vec<u32> = users
        .iter()
        .enumerate()
        .map(|(i, u)| count_within(&tree, i, &u.location, radius_miles))
        .collect();

    users
        .iter()
        .zip(counts)
        .map(|(u, nearby_count)| NearbyCount {
            id: u.id.clone(),
            location: u.location,
            nearby_count,
        })
        .collect()
}
