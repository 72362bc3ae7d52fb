//! Geographic utilities: haversine distance, degree conversions and
//! antimeridian-aware search envelopes.

use rstar::AABB;

use crate::GeoPoint;

/// Mean Earth radius in miles used by the nearby-count calculation.
pub const EARTH_RADIUS_MILES: f64 = 3956.0;

/// Miles spanned by one degree of latitude.
pub const MILES_PER_DEGREE_LAT: f64 = EARTH_RADIUS_MILES * std::f64::consts::PI / 180.0;

/// Great-circle distance between two points in miles (haversine formula).
///
/// # Example
/// ```
/// use map_clusters::GeoPoint;
/// use map_clusters::geo_utils::haversine_miles;
///
/// let a = GeoPoint::new(40.0, -74.0);
/// let b = GeoPoint::new(41.0, -74.0);
/// assert!((haversine_miles(&a, &b) - 69.04).abs() < 0.1);
/// ```
pub fn haversine_miles(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Clamp guards asin against a > 1.0 from rounding on antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_MILES * c
}

/// Convert a distance in miles to degrees of latitude.
pub fn miles_to_degrees_lat(miles: f64) -> f64 {
    miles / MILES_PER_DEGREE_LAT
}

/// Slack added to search envelopes so rounding never drops a boundary point.
const ENVELOPE_MARGIN_DEGREES: f64 = 1e-9;

/// Build the R-tree envelopes (in `[lng, lat]` space) that cover every point
/// within `radius_miles` of `center`.
///
/// The longitude half-width is the exact extent of the spherical cap,
/// `asin(sin(d / R) / cos(lat))`. A circle crossing the antimeridian yields
/// two envelopes, one per side. A circle reaching a pole covers every
/// longitude.
pub fn search_envelopes(center: &GeoPoint, radius_miles: f64) -> Vec<AABB<[f64; 2]>> {
    let angular = radius_miles / EARTH_RADIUS_MILES;
    let dlat = miles_to_degrees_lat(radius_miles) + ENVELOPE_MARGIN_DEGREES;
    let min_lat = (center.latitude - dlat).max(-90.0);
    let max_lat = (center.latitude + dlat).min(90.0);

    let all_longitudes = vec![AABB::from_corners([-180.0, min_lat], [180.0, max_lat])];
    if angular >= std::f64::consts::FRAC_PI_2 || center.latitude.abs() + dlat >= 90.0 {
        return all_longitudes;
    }

    let ratio = angular.sin() / center.latitude.to_radians().cos();
    if ratio >= 1.0 {
        return all_longitudes;
    }
    let dlng = ratio.asin().to_degrees() + ENVELOPE_MARGIN_DEGREES;

    let min_lng = center.longitude - dlng;
    let max_lng = center.longitude + dlng;

    let mut envelopes = vec![AABB::from_corners(
        [min_lng.max(-180.0), min_lat],
        [max_lng.min(180.0), max_lat],
    )];
    if min_lng < -180.0 {
        envelopes.push(AABB::from_corners(
            [min_lng + 360.0, min_lat],
            [180.0, max_lat],
        ));
    }
    if max_lng > 180.0 {
        envelopes.push(AABB::from_corners(
            [-180.0, min_lat],
            [max_lng - 360.0, max_lat],
        ));
    }
    envelopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstar::Envelope;

    #[test]
    fn test_haversine_zero_distance() {
        let p = GeoPoint::new(40.7128, -74.0060);
        assert_eq!(haversine_miles(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // New York to Los Angeles is roughly 2445 miles
        let nyc = GeoPoint::new(40.7128, -74.0060);
        let la = GeoPoint::new(34.0522, -118.2437);
        let d = haversine_miles(&nyc, &la);
        assert!(d > 2400.0 && d < 2500.0, "got {}", d);
    }

    #[test]
    fn test_haversine_across_antimeridian() {
        let west = GeoPoint::new(0.0, 179.99);
        let east = GeoPoint::new(0.0, -179.99);
        assert!(haversine_miles(&west, &east) < 2.0);
    }

    #[test]
    fn test_degree_conversion() {
        assert!((miles_to_degrees_lat(MILES_PER_DEGREE_LAT) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_search_envelope_covers_cap_edge() {
        // Due east of the centre at exactly the radius, at a high latitude
        let center = GeoPoint::new(70.0, 20.0);
        let radius = 25.0;
        let envelopes = search_envelopes(&center, radius);
        assert_eq!(envelopes.len(), 1);

        let mut lo = 0.0;
        let mut hi = 10.0;
        for _ in 0..100 {
            let mid = (lo + hi) / 2.0;
            if haversine_miles(&center, &GeoPoint::new(70.0, 20.0 + mid)) <= radius {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        assert!(envelopes[0].contains_point(&[20.0 + lo, 70.0]));
    }

    #[test]
    fn test_search_envelope_wraps_antimeridian() {
        let envelopes = search_envelopes(&GeoPoint::new(0.0, 179.95), 10.0);
        assert_eq!(envelopes.len(), 2);
        assert!(envelopes.iter().any(|e| e.contains_point(&[-179.95, 0.0])));
    }

    #[test]
    fn test_search_envelope_near_pole_covers_all_longitudes() {
        let envelopes = search_envelopes(&GeoPoint::new(89.99, 0.0), 10.0);
        assert_eq!(envelopes.len(), 1);
        assert!(envelopes[0].contains_point(&[179.0, 89.995]));
        assert!(envelopes[0].contains_point(&[-179.0, 89.995]));
    }
}
