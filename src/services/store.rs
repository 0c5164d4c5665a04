//! In-memory entity store
//!
//! Owns all normalized state: firefighter and beacon records, per
//! firefighter position/vitals history, and the alert list. Every write
//! path takes the lock once and applies its whole unit of work under it,
//! so a reader never observes a firefighter whose position row landed
//! without the matching vitals row. Reads hand out clones; nothing
//! borrows across the lock.

use crate::domain::types::{
    Alert, AlertId, AlertType, Beacon, BeaconId, Firefighter, FirefighterId, Position, Vitals,
};
use crate::infra::config::Config;
use crate::services::normalize::{BeaconRecord, FirefighterRecord};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Outcome of a missing-beacon sweep, for cycle logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BeaconSweep {
    pub marked_offline: usize,
    pub deleted: usize,
}

/// Entity and history counts, for metrics and exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCounts {
    pub firefighters: usize,
    pub beacons: usize,
    pub beacons_online: usize,
    pub alerts: usize,
    pub positions: usize,
    pub vitals: usize,
}

#[derive(Default)]
struct StoreInner {
    firefighters: FxHashMap<FirefighterId, Firefighter>,
    badge_index: FxHashMap<String, FirefighterId>,
    positions: FxHashMap<FirefighterId, Vec<Position>>,
    vitals: FxHashMap<FirefighterId, Vec<Vitals>>,
    beacons: FxHashMap<BeaconId, Beacon>,
    beacon_index: FxHashMap<String, BeaconId>,
    alerts: Vec<Alert>,
    next_firefighter_id: i64,
    next_beacon_id: i64,
    next_alert_id: i64,
}

pub struct TelemetryStore {
    inner: RwLock<StoreInner>,
    legacy_beacon_ids: Vec<String>,
}

impl TelemetryStore {
    pub fn new(config: &Config) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                next_firefighter_id: 1,
                next_beacon_id: 1,
                next_alert_id: 1,
                ..StoreInner::default()
            }),
            legacy_beacon_ids: config.legacy_beacon_ids().to_vec(),
        }
    }

    /// Commit one firefighter record: resolve or create the entity row,
    /// fold in name/team changes, append a position row when the record
    /// carried a fix, and always append a vitals row. One lock, one unit.
    pub fn ingest_firefighter(
        &self,
        known: Option<FirefighterId>,
        record: &FirefighterRecord,
        now: DateTime<Utc>,
    ) -> FirefighterId {
        let mut inner = self.inner.write();

        let id = match known.filter(|id| inner.firefighters.contains_key(id)) {
            Some(id) => id,
            None => match inner.badge_index.get(&record.badge).copied() {
                Some(id) => id,
                None => {
                    let id = FirefighterId(inner.next_firefighter_id);
                    inner.next_firefighter_id += 1;
                    let name = record
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("Firefighter {}", record.badge));
                    inner.firefighters.insert(
                        id,
                        Firefighter {
                            id,
                            name,
                            badge_number: record.badge.clone(),
                            team: record.team.clone(),
                            on_mission: false,
                            created_at: now,
                        },
                    );
                    inner.badge_index.insert(record.badge.clone(), id);
                    debug!(badge = %record.badge, firefighter_id = %id, "firefighter_created");
                    id
                }
            },
        };

        if let Some(firefighter) = inner.firefighters.get_mut(&id) {
            if let Some(name) = record.name.as_deref() {
                if name != firefighter.name {
                    firefighter.name = name.to_string();
                }
            }
            if let Some(team) = record.team.as_deref() {
                if Some(team) != firefighter.team.as_deref() {
                    firefighter.team = Some(team.to_string());
                }
            }
        }

        if let Some((latitude, longitude)) = record.gps {
            inner.positions.entry(id).or_default().push(Position {
                firefighter_id: id,
                latitude,
                longitude,
                floor: record.floor,
                timestamp: now,
            });
        }

        inner.vitals.entry(id).or_default().push(Vitals {
            firefighter_id: id,
            heart_rate: record.heart_rate,
            temperature: record.temperature,
            oxygen_level: record.oxygen_level,
            co_level: record.co_level,
            battery_level: record.battery_level,
            scba_pressure: record.scba_pressure,
            timestamp: now,
        });

        id
    }

    /// Commit one beacon record. Absent fields keep their stored values;
    /// presence in the feed itself implies the beacon is online unless
    /// the record says otherwise.
    pub fn upsert_beacon(
        &self,
        record: &BeaconRecord,
        fallback_gps: (f64, f64),
        now: DateTime<Utc>,
    ) -> BeaconId {
        let mut inner = self.inner.write();

        let id = match inner.beacon_index.get(&record.beacon_id).copied() {
            Some(id) => id,
            None => {
                let id = BeaconId(inner.next_beacon_id);
                inner.next_beacon_id += 1;
                let (latitude, longitude) = record.gps.unwrap_or(fallback_gps);
                inner.beacons.insert(
                    id,
                    Beacon {
                        id,
                        beacon_id: record.beacon_id.clone(),
                        name: record
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("Beacon {}", record.beacon_id)),
                        latitude,
                        longitude,
                        floor: record.floor.unwrap_or(0),
                        battery_percent: 100.0,
                        signal_quality: 100.0,
                        tags_in_range: 0,
                        is_online: true,
                        last_seen: now,
                    },
                );
                inner.beacon_index.insert(record.beacon_id.clone(), id);
                debug!(beacon_id = %record.beacon_id, internal_id = %id, "beacon_created");
                id
            }
        };

        if let Some(beacon) = inner.beacons.get_mut(&id) {
            if let Some((latitude, longitude)) = record.gps {
                beacon.latitude = latitude;
                beacon.longitude = longitude;
            }
            if let Some(floor) = record.floor {
                beacon.floor = floor;
            }
            if let Some(battery) = record.battery_percent {
                beacon.battery_percent = battery;
            }
            if let Some(signal) = record.signal_quality {
                beacon.signal_quality = signal;
            }
            if let Some(tags) = record.tags_in_range {
                beacon.tags_in_range = tags;
            }
            beacon.is_online = record.is_online.unwrap_or(true);
            beacon.last_seen = now;
        }

        id
    }

    /// Reconcile stored beacons against the set seen in the current
    /// payload: legacy seed ids vanish outright, everything else is
    /// marked offline and kept.
    pub fn sweep_missing_beacons(&self, seen: &FxHashSet<String>) -> BeaconSweep {
        let mut inner = self.inner.write();
        let mut sweep = BeaconSweep::default();

        let missing: Vec<BeaconId> = inner
            .beacons
            .values()
            .filter(|beacon| !seen.contains(&beacon.beacon_id))
            .map(|beacon| beacon.id)
            .collect();

        for id in missing {
            let is_legacy = inner
                .beacons
                .get(&id)
                .is_some_and(|beacon| self.legacy_beacon_ids.contains(&beacon.beacon_id));
            if is_legacy {
                if let Some(beacon) = inner.beacons.remove(&id) {
                    inner.beacon_index.remove(&beacon.beacon_id);
                    debug!(beacon_id = %beacon.beacon_id, "legacy_beacon_deleted");
                    sweep.deleted += 1;
                }
            } else if let Some(beacon) = inner.beacons.get_mut(&id) {
                if beacon.is_online {
                    debug!(beacon_id = %beacon.beacon_id, "beacon_marked_offline");
                }
                beacon.is_online = false;
                sweep.marked_offline += 1;
            }
        }

        sweep
    }

    /// Insert an alert unless an unacknowledged row with the same
    /// (firefighter, type) key already exists inside the trailing window.
    /// Returns the new id, or None when the insert was suppressed.
    pub fn insert_alert_deduped(
        &self,
        firefighter_id: Option<FirefighterId>,
        alert_type: AlertType,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<AlertId> {
        let mut inner = self.inner.write();
        let cutoff = now - window;

        let duplicate = inner.alerts.iter().any(|alert| {
            !alert.acknowledged
                && alert.firefighter_id == firefighter_id
                && alert.alert_type == alert_type
                && alert.timestamp > cutoff
        });
        if duplicate {
            return None;
        }

        let id = AlertId(inner.next_alert_id);
        inner.next_alert_id += 1;
        let severity = alert_type.severity();
        let message = alert_type.message().to_string();
        inner.alerts.push(Alert {
            id,
            firefighter_id,
            alert_type,
            severity,
            message,
            timestamp: now,
            acknowledged: false,
        });
        Some(id)
    }

    /// Drop the oldest alerts above the cap, acknowledged or not.
    /// Returns how many rows were removed.
    pub fn prune_alerts(&self, cap: usize) -> usize {
        let mut inner = self.inner.write();
        if inner.alerts.len() <= cap {
            return 0;
        }
        inner.alerts.sort_by_key(|alert| alert.timestamp);
        let excess = inner.alerts.len() - cap;
        inner.alerts.drain(..excess);
        excess
    }

    pub fn acknowledge_alert(&self, id: AlertId) -> bool {
        let mut inner = self.inner.write();
        match inner.alerts.iter_mut().find(|alert| alert.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn firefighter(&self, id: FirefighterId) -> Option<Firefighter> {
        self.inner.read().firefighters.get(&id).cloned()
    }

    /// All firefighters, ordered by internal id.
    pub fn firefighters(&self) -> Vec<Firefighter> {
        let inner = self.inner.read();
        let mut all: Vec<Firefighter> = inner.firefighters.values().cloned().collect();
        all.sort_by_key(|firefighter| firefighter.id);
        all
    }

    pub fn beacon(&self, id: BeaconId) -> Option<Beacon> {
        self.inner.read().beacons.get(&id).cloned()
    }

    /// All beacons, ordered by internal id.
    pub fn beacons(&self) -> Vec<Beacon> {
        let inner = self.inner.read();
        let mut all: Vec<Beacon> = inner.beacons.values().cloned().collect();
        all.sort_by_key(|beacon| beacon.id);
        all
    }

    pub fn latest_position(&self, id: FirefighterId) -> Option<Position> {
        let inner = self.inner.read();
        inner
            .positions
            .get(&id)
            .and_then(|history| history.last())
            .cloned()
    }

    pub fn latest_vitals(&self, id: FirefighterId) -> Option<Vitals> {
        let inner = self.inner.read();
        inner
            .vitals
            .get(&id)
            .and_then(|history| history.last())
            .cloned()
    }

    /// Up to `limit` most recent positions, newest first.
    pub fn recent_positions(&self, id: FirefighterId, limit: usize) -> Vec<Position> {
        let inner = self.inner.read();
        match inner.positions.get(&id) {
            Some(history) => history.iter().rev().take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Up to `limit` most recent vitals, newest first.
    pub fn recent_vitals(&self, id: FirefighterId, limit: usize) -> Vec<Vitals> {
        let inner = self.inner.read();
        match inner.vitals.get(&id) {
            Some(history) => history.iter().rev().take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// The newest position of every firefighter that has one.
    pub fn latest_positions(&self) -> Vec<Position> {
        let inner = self.inner.read();
        let mut latest: Vec<Position> = inner
            .positions
            .values()
            .filter_map(|history| history.last())
            .cloned()
            .collect();
        latest.sort_by_key(|position| position.firefighter_id);
        latest
    }

    /// All alerts, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        let inner = self.inner.read();
        let mut all = inner.alerts.clone();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        all
    }

    pub fn unacknowledged_alerts(&self) -> Vec<Alert> {
        self.alerts()
            .into_iter()
            .filter(|alert| !alert.acknowledged)
            .collect()
    }

    /// Alerts attributed to one firefighter, newest first.
    pub fn alerts_for(&self, id: FirefighterId) -> Vec<Alert> {
        self.alerts()
            .into_iter()
            .filter(|alert| alert.firefighter_id == Some(id))
            .collect()
    }

    /// System-level alerts (no firefighter attribution), newest first.
    pub fn system_alerts(&self) -> Vec<Alert> {
        self.alerts()
            .into_iter()
            .filter(|alert| alert.firefighter_id.is_none())
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        let inner = self.inner.read();
        StoreCounts {
            firefighters: inner.firefighters.len(),
            beacons: inner.beacons.len(),
            beacons_online: inner.beacons.values().filter(|b| b.is_online).count(),
            alerts: inner.alerts.len(),
            positions: inner.positions.values().map(Vec::len).sum(),
            vitals: inner.vitals.values().map(Vec::len).sum(),
        }
    }
}
