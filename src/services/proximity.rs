//! Nearest-beacon matching on the firefighter's floor

use crate::domain::geo::planar_distance_m;
use crate::domain::types::{Beacon, FirefighterId, Position};

/// Beacons at or beyond this distance are out of range
pub const BEACON_RANGE_M: f64 = 50.0;

/// Closest beacon on the same floor strictly within range, with its
/// distance in meters. Ties keep the first candidate encountered.
pub fn nearest_beacon(position: &Position, beacons: &[Beacon]) -> Option<(Beacon, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, beacon) in beacons.iter().enumerate() {
        if beacon.floor != position.floor {
            continue;
        }
        let distance = planar_distance_m(
            position.latitude,
            position.longitude,
            beacon.latitude,
            beacon.longitude,
        );
        if distance >= BEACON_RANGE_M {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, distance)| (beacons[index].clone(), distance))
}

/// The inverse query: every firefighter whose latest fix puts them on the
/// beacon's floor and strictly within range.
pub fn firefighters_in_range(
    beacon: &Beacon,
    latest_positions: &[Position],
) -> Vec<(FirefighterId, f64)> {
    latest_positions
        .iter()
        .filter(|position| position.floor == beacon.floor)
        .filter_map(|position| {
            let distance = planar_distance_m(
                beacon.latitude,
                beacon.longitude,
                position.latitude,
                position.longitude,
            );
            (distance < BEACON_RANGE_M).then_some((position.firefighter_id, distance))
        })
        .collect()
}
