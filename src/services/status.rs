//! Operational status reports assembled from store reads
//!
//! Pure read-side composition: no state of its own, every call builds
//! its answer from the store at the moment it is asked.

use crate::domain::types::{Beacon, BeaconId, Firefighter, FirefighterId, Position, Vitals};
use crate::services::alerts::MAN_DOWN_SECS;
use crate::services::movement::{seconds_since_last_contact, stationary_seconds};
use crate::services::proximity::{firefighters_in_range, nearest_beacon};
use crate::services::store::TelemetryStore;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementState {
    Moving,
    Stationary,
}

impl MovementState {
    pub fn as_str(&self) -> &str {
        match self {
            MovementState::Moving => "moving",
            MovementState::Stationary => "stationary",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyBeacon {
    pub beacon: Beacon,
    pub distance_m: f64,
}

/// Everything an operator display needs about one firefighter.
#[derive(Debug, Clone, Serialize)]
pub struct FirefighterStatus {
    pub firefighter: Firefighter,
    pub position: Option<Position>,
    pub vitals: Option<Vitals>,
    pub nearest_beacon: Option<NearbyBeacon>,
    pub stationary_seconds: i64,
    pub movement_state: MovementState,
    pub seconds_since_contact: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangedFirefighter {
    pub firefighter_id: FirefighterId,
    pub distance_m: f64,
}

/// One beacon and the firefighters currently inside its range.
#[derive(Debug, Clone, Serialize)]
pub struct BeaconCoverage {
    pub beacon: Beacon,
    pub firefighters: Vec<RangedFirefighter>,
}

/// Status snapshot for one firefighter, or None when the id is unknown.
pub fn firefighter_status(
    store: &TelemetryStore,
    id: FirefighterId,
    position_window: usize,
    now: DateTime<Utc>,
) -> Option<FirefighterStatus> {
    let firefighter = store.firefighter(id)?;
    let positions = store.recent_positions(id, position_window);
    let stationary = stationary_seconds(&positions, now);
    let position = positions.first().cloned();
    let vitals = store.latest_vitals(id);

    let nearest = position.as_ref().and_then(|position| {
        nearest_beacon(position, &store.beacons()).map(|(beacon, distance_m)| NearbyBeacon {
            beacon,
            distance_m,
        })
    });

    let movement_state = if stationary >= MAN_DOWN_SECS {
        MovementState::Stationary
    } else {
        MovementState::Moving
    };

    let seconds_since_contact = seconds_since_last_contact(
        position.as_ref().map(|p| p.timestamp),
        vitals.as_ref().map(|v| v.timestamp),
        now,
    );

    Some(FirefighterStatus {
        firefighter,
        position,
        vitals,
        nearest_beacon: nearest,
        stationary_seconds: stationary,
        movement_state,
        seconds_since_contact,
    })
}

/// Status snapshots for every known firefighter, in id order.
pub fn all_firefighter_statuses(
    store: &TelemetryStore,
    position_window: usize,
    now: DateTime<Utc>,
) -> Vec<FirefighterStatus> {
    store
        .firefighters()
        .iter()
        .filter_map(|firefighter| firefighter_status(store, firefighter.id, position_window, now))
        .collect()
}

/// Coverage report for one beacon, or None when the id is unknown.
pub fn beacon_coverage(store: &TelemetryStore, id: BeaconId) -> Option<BeaconCoverage> {
    let beacon = store.beacon(id)?;
    let latest = store.latest_positions();
    let firefighters = firefighters_in_range(&beacon, &latest)
        .into_iter()
        .map(|(firefighter_id, distance_m)| RangedFirefighter {
            firefighter_id,
            distance_m,
        })
        .collect();
    Some(BeaconCoverage {
        beacon,
        firefighters,
    })
}

/// Coverage reports for every beacon, in id order.
pub fn all_beacon_coverage(store: &TelemetryStore) -> Vec<BeaconCoverage> {
    store
        .beacons()
        .iter()
        .filter_map(|beacon| beacon_coverage(store, beacon.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::Config;
    use crate::services::normalize::{BeaconRecord, FirefighterRecord};
    use chrono::Duration;

    fn record(tag: &str, gps: Option<(f64, f64)>) -> FirefighterRecord {
        FirefighterRecord {
            tag: tag.to_string(),
            badge: tag.to_string(),
            name: None,
            team: None,
            gps,
            floor: 0,
            heart_rate: Some(88.0),
            temperature: None,
            oxygen_level: None,
            co_level: None,
            battery_level: None,
            scba_pressure: None,
        }
    }

    #[test]
    fn test_unknown_id_yields_none() {
        let store = TelemetryStore::new(&Config::default());
        assert!(firefighter_status(&store, FirefighterId(99), 100, Utc::now()).is_none());
        assert!(beacon_coverage(&store, BeaconId(99)).is_none());
    }

    #[test]
    fn test_status_without_history() {
        let store = TelemetryStore::new(&Config::default());
        let now = Utc::now();
        let id = store.ingest_firefighter(None, &record("T1", None), now);
        let status = firefighter_status(&store, id, 100, now).unwrap();
        assert!(status.position.is_none());
        assert!(status.nearest_beacon.is_none());
        assert_eq!(status.stationary_seconds, 0);
        assert_eq!(status.movement_state, MovementState::Moving);
        // the vitals row from ingest counts as contact
        assert_eq!(status.seconds_since_contact, Some(0));
    }

    #[test]
    fn test_stationary_firefighter_reports_state_and_beacon() {
        let store = TelemetryStore::new(&Config::default());
        let base = Utc::now();
        let id = store.ingest_firefighter(None, &record("T1", Some((52.0, 21.0))), base);
        for i in 1..5 {
            store.ingest_firefighter(
                Some(id),
                &record("T1", Some((52.0, 21.0))),
                base + Duration::seconds(i * 10),
            );
        }
        let mut beacon = BeaconRecord {
            beacon_id: "BCN-1".to_string(),
            name: None,
            gps: Some((52.0001, 21.0)),
            floor: Some(0),
            battery_percent: None,
            signal_quality: None,
            tags_in_range: None,
            is_online: None,
        };
        store.upsert_beacon(&beacon, (52.0, 21.0), base);
        beacon.beacon_id = "BCN-far".to_string();
        beacon.gps = Some((53.0, 22.0));
        store.upsert_beacon(&beacon, (52.0, 21.0), base);

        let now = base + Duration::seconds(45);
        let status = firefighter_status(&store, id, 100, now).unwrap();
        assert_eq!(status.movement_state, MovementState::Stationary);
        assert_eq!(status.stationary_seconds, 45);
        let nearest = status.nearest_beacon.unwrap();
        assert_eq!(nearest.beacon.beacon_id, "BCN-1");
        assert!(nearest.distance_m < 50.0);
    }

    #[test]
    fn test_beacon_coverage_lists_in_range() {
        let store = TelemetryStore::new(&Config::default());
        let now = Utc::now();
        let near = store.ingest_firefighter(None, &record("T1", Some((52.0001, 21.0))), now);
        store.ingest_firefighter(None, &record("T2", Some((59.0, 21.0))), now);
        let beacon = BeaconRecord {
            beacon_id: "BCN-1".to_string(),
            name: None,
            gps: Some((52.0, 21.0)),
            floor: Some(0),
            battery_percent: None,
            signal_quality: None,
            tags_in_range: None,
            is_online: None,
        };
        let beacon_id = store.upsert_beacon(&beacon, (52.0, 21.0), now);

        let coverage = beacon_coverage(&store, beacon_id).unwrap();
        assert_eq!(coverage.firefighters.len(), 1);
        assert_eq!(coverage.firefighters[0].firefighter_id, near);

        let all = all_beacon_coverage(&store);
        assert_eq!(all.len(), 1);
    }
}
