//! Planar distance approximation for incident-scale coordinates
//!
//! Positions on a fireground are tens to hundreds of meters apart, so a
//! flat-earth approximation is adequate: degrees are scaled to meters
//! with the longitude axis corrected by the cosine of the latitude.

const METERS_PER_DEGREE: f64 = 111_000.0;

/// Approximate distance in meters between two WGS84 coordinates.
///
/// The longitude correction uses the latitude of the first point; at the
/// distances this engine cares about the asymmetry is noise.
pub fn planar_distance_m(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let dy = (lat_a - lat_b) * METERS_PER_DEGREE;
    let dx = (lon_a - lon_b) * METERS_PER_DEGREE * lat_a.to_radians().cos();
    dy.hypot(dx)
}
