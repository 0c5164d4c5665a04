//! Alert derivation, dedup, and retention
//!
//! Two sources feed the alert list: local rules evaluated against the
//! store every cycle, and alert records passed through from upstream.
//! Both funnel through the same deduped insert, so neither can flood the
//! list while a condition persists. A condition that clears and returns,
//! or one that simply persists past the dedup window, produces a fresh
//! row.

use crate::domain::types::{AlertType, FirefighterId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::movement::stationary_seconds;
use crate::services::normalize::AlertRecord;
use crate::services::poller::IdentityMap;
use crate::services::store::TelemetryStore;
use chrono::{DateTime, Duration, Utc};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{info, warn};

/// Stationary for this long means a possible man-down
pub const MAN_DOWN_SECS: i64 = 30;

const HEART_RATE_MAX_BPM: f64 = 180.0;
const BATTERY_MIN_PERCENT: f64 = 20.0;
const SCBA_CRITICAL_BAR: f64 = 50.0;
const SCBA_LOW_BAR: f64 = 100.0;
const CO_MAX_PPM: f64 = 30.0;
const OXYGEN_MIN_PERCENT: f64 = 90.0;
const TEMPERATURE_MAX_C: f64 = 40.0;

pub struct AlertEngine {
    store: Arc<TelemetryStore>,
    metrics: Arc<Metrics>,
    dedup_window: Duration,
    retention_cap: usize,
    position_window: usize,
}

impl AlertEngine {
    pub fn new(store: Arc<TelemetryStore>, config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            metrics,
            dedup_window: Duration::seconds(config.dedup_window_secs() as i64),
            retention_cap: config.retention_cap(),
            position_window: config.position_window(),
        }
    }

    /// Insert through the dedup window. Returns true when a row landed.
    pub fn create_alert(
        &self,
        firefighter_id: Option<FirefighterId>,
        alert_type: AlertType,
        now: DateTime<Utc>,
    ) -> bool {
        let severity = alert_type.severity();
        let tag = alert_type.as_str().to_string();
        match self
            .store
            .insert_alert_deduped(firefighter_id, alert_type, self.dedup_window, now)
        {
            Some(id) => {
                self.metrics.record_alert_created();
                match firefighter_id {
                    Some(firefighter_id) => info!(
                        alert_id = %id,
                        alert_type = %tag,
                        severity = %severity,
                        firefighter_id = %firefighter_id,
                        "alert_created"
                    ),
                    None => info!(
                        alert_id = %id,
                        alert_type = %tag,
                        severity = %severity,
                        "system_alert_created"
                    ),
                }
                true
            }
            None => {
                self.metrics.record_alert_deduped();
                false
            }
        }
    }

    /// Threshold pass for one firefighter. Needs at least one vitals row;
    /// absent readings never fire.
    pub fn evaluate_firefighter(&self, id: FirefighterId, now: DateTime<Utc>) {
        let Some(vitals) = self.store.latest_vitals(id) else {
            return;
        };

        let mut fired: SmallVec<[AlertType; 4]> = SmallVec::new();

        let positions = self.store.recent_positions(id, self.position_window);
        if stationary_seconds(&positions, now) >= MAN_DOWN_SECS {
            fired.push(AlertType::ManDown);
        }
        if vitals.heart_rate.is_some_and(|hr| hr > HEART_RATE_MAX_BPM) {
            fired.push(AlertType::HighHeartRate);
        }
        if vitals
            .battery_level
            .is_some_and(|battery| battery < BATTERY_MIN_PERCENT)
        {
            fired.push(AlertType::LowBattery);
        }
        if let Some(pressure) = vitals.scba_pressure {
            if pressure < SCBA_CRITICAL_BAR {
                fired.push(AlertType::ScbaCritical);
            } else if pressure < SCBA_LOW_BAR {
                fired.push(AlertType::ScbaLowPressure);
            }
        }
        if vitals.co_level.is_some_and(|co| co > CO_MAX_PPM) {
            fired.push(AlertType::HighCo);
        }
        if vitals
            .oxygen_level
            .is_some_and(|oxygen| oxygen < OXYGEN_MIN_PERCENT)
        {
            fired.push(AlertType::LowOxygen);
        }
        if vitals
            .temperature
            .is_some_and(|temp| temp > TEMPERATURE_MAX_C)
        {
            fired.push(AlertType::HighTemperature);
        }

        for alert_type in fired {
            self.create_alert(Some(id), alert_type, now);
        }
    }

    /// A single system-level alert covers any number of offline beacons.
    pub fn evaluate_beacons(&self, now: DateTime<Utc>) {
        let offline = self
            .store
            .beacons()
            .iter()
            .filter(|beacon| !beacon.is_online)
            .count();
        if offline > 0 {
            self.create_alert(None, AlertType::BeaconOffline, now);
        }
    }

    /// Full local rule pass: every known firefighter, then the beacons.
    pub fn run_rules(&self, identity: &IdentityMap, now: DateTime<Utc>) {
        for id in identity.firefighter_ids() {
            self.evaluate_firefighter(id, now);
        }
        self.evaluate_beacons(now);
    }

    /// Pass upstream alert records through. A tag that does not resolve
    /// to a known firefighter demotes the alert to system-level rather
    /// than dropping it.
    pub fn ingest_upstream(&self, records: &[AlertRecord], identity: &IdentityMap, now: DateTime<Utc>) {
        for record in records {
            let firefighter_id = record.tag.as_deref().and_then(|tag| identity.resolve_tag(tag));
            if firefighter_id.is_none() {
                if let Some(tag) = record.tag.as_deref() {
                    warn!(tag = %tag, alert_type = %record.alert_type, "alert_tag_unresolved");
                }
            }
            // parsing is infallible: unmatched tags land in Unknown
            let Ok(alert_type) = record.alert_type.parse::<AlertType>();
            self.create_alert(firefighter_id, alert_type, now);
        }
    }

    /// Retention sweep: cap the alert list, oldest rows first.
    pub fn sweep(&self) {
        let pruned = self.store.prune_alerts(self.retention_cap);
        if pruned > 0 {
            self.metrics.record_alerts_pruned(pruned as u64);
            info!(pruned = %pruned, cap = %self.retention_cap, "alert_retention_sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::normalize::{BeaconRecord, FirefighterRecord};

    fn engine() -> (Arc<TelemetryStore>, AlertEngine) {
        let config = Config::default();
        let store = Arc::new(TelemetryStore::new(&config));
        let metrics = Arc::new(Metrics::new());
        let engine = AlertEngine::new(store.clone(), &config, metrics);
        (store, engine)
    }

    fn vitals_record(tag: &str) -> FirefighterRecord {
        FirefighterRecord {
            tag: tag.to_string(),
            badge: tag.to_string(),
            name: None,
            team: None,
            gps: None,
            floor: 0,
            heart_rate: None,
            temperature: None,
            oxygen_level: None,
            co_level: None,
            battery_level: None,
            scba_pressure: None,
        }
    }

    fn offline_beacon(beacon_id: &str) -> BeaconRecord {
        BeaconRecord {
            beacon_id: beacon_id.to_string(),
            name: None,
            gps: None,
            floor: None,
            battery_percent: None,
            signal_quality: None,
            tags_in_range: None,
            is_online: Some(false),
        }
    }

    #[test]
    fn test_vitals_thresholds_fire_exactly_once_each() {
        let (store, engine) = engine();
        let now = Utc::now();
        let mut record = vitals_record("T1");
        record.heart_rate = Some(190.0);
        record.scba_pressure = Some(40.0);
        record.temperature = Some(36.0);
        let id = store.ingest_firefighter(None, &record, now);

        engine.evaluate_firefighter(id, now);

        let alerts = store.alerts_for(id);
        assert_eq!(alerts.len(), 2);
        let types: Vec<&str> = alerts.iter().map(|a| a.alert_type.as_str()).collect();
        assert!(types.contains(&"high_heart_rate"));
        assert!(types.contains(&"scba_critical"));
        for alert in &alerts {
            assert_eq!(alert.severity, alert.alert_type.severity());
        }
    }

    #[test]
    fn test_scba_bands_do_not_overlap() {
        let (store, engine) = engine();
        let now = Utc::now();
        let mut record = vitals_record("T1");
        record.scba_pressure = Some(75.0);
        let id = store.ingest_firefighter(None, &record, now);

        engine.evaluate_firefighter(id, now);

        let alerts = store.alerts_for(id);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::ScbaLowPressure);
        assert_eq!(alerts[0].severity, crate::domain::types::Severity::Warning);
    }

    #[test]
    fn test_boundary_values_do_not_fire() {
        let (store, engine) = engine();
        let now = Utc::now();
        let mut record = vitals_record("T1");
        record.heart_rate = Some(180.0);
        record.battery_level = Some(20.0);
        record.co_level = Some(30.0);
        record.oxygen_level = Some(90.0);
        record.temperature = Some(40.0);
        record.scba_pressure = Some(100.0);
        let id = store.ingest_firefighter(None, &record, now);

        engine.evaluate_firefighter(id, now);

        assert!(store.alerts_for(id).is_empty());
    }

    #[test]
    fn test_absent_readings_never_fire() {
        let (store, engine) = engine();
        let now = Utc::now();
        let id = store.ingest_firefighter(None, &vitals_record("T1"), now);
        engine.evaluate_firefighter(id, now);
        assert!(store.alerts_for(id).is_empty());
    }

    #[test]
    fn test_zero_readings_fire_minimum_rules() {
        let (store, engine) = engine();
        let now = Utc::now();
        let mut record = vitals_record("T1");
        record.battery_level = Some(0.0);
        record.oxygen_level = Some(0.0);
        record.scba_pressure = Some(0.0);
        let id = store.ingest_firefighter(None, &record, now);

        engine.evaluate_firefighter(id, now);

        let alerts = store.alerts_for(id);
        let mut types: Vec<String> = alerts
            .iter()
            .map(|a| a.alert_type.as_str().to_string())
            .collect();
        types.sort();
        assert_eq!(types, vec!["low_battery", "low_oxygen", "scba_critical"]);
    }

    #[test]
    fn test_man_down_fires_once_within_window() {
        let (store, engine) = engine();
        let base = Utc::now();
        let id = store.ingest_firefighter(None, &vitals_record("T1"), base);
        // identical fixes 40 s apart
        for i in 0..4 {
            let mut record = vitals_record("T1");
            record.gps = Some((52.0, 21.0));
            store.ingest_firefighter(Some(id), &record, base + Duration::seconds(i * 10));
        }

        let now = base + Duration::seconds(40);
        engine.evaluate_firefighter(id, now);
        let first = store.alerts_for(id);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].alert_type, AlertType::ManDown);

        // still down 5 s later: suppressed by the dedup window
        engine.evaluate_firefighter(id, now + Duration::seconds(5));
        assert_eq!(store.alerts_for(id).len(), 1);

        // still down past the window: a fresh row
        engine.evaluate_firefighter(id, now + Duration::seconds(31));
        assert_eq!(store.alerts_for(id).len(), 2);
    }

    #[test]
    fn test_offline_beacons_raise_one_system_alert() {
        let (store, engine) = engine();
        let now = Utc::now();
        store.upsert_beacon(&offline_beacon("BCN-1"), (52.0, 21.0), now);
        store.upsert_beacon(&offline_beacon("BCN-2"), (52.0, 21.0), now);

        engine.evaluate_beacons(now);
        engine.evaluate_beacons(now + Duration::seconds(2));

        let system = store.system_alerts();
        assert_eq!(system.len(), 1);
        assert_eq!(system[0].alert_type, AlertType::BeaconOffline);
        assert_eq!(system[0].firefighter_id, None);
    }

    #[test]
    fn test_upstream_passthrough_resolves_tags() {
        let (store, engine) = engine();
        let now = Utc::now();
        let id = store.ingest_firefighter(None, &vitals_record("TAG-9"), now);
        let mut identity = IdentityMap::new();
        identity.insert_tag("TAG-9", id);

        let records = vec![
            AlertRecord { alert_type: "sos_pressed".to_string(), tag: Some("TAG-9".to_string()) },
            AlertRecord { alert_type: "explosive_gas".to_string(), tag: Some("GHOST".to_string()) },
            AlertRecord { alert_type: "radio_silence".to_string(), tag: None },
        ];
        engine.ingest_upstream(&records, &identity, now);

        let personal = store.alerts_for(id);
        assert_eq!(personal.len(), 1);
        assert_eq!(personal[0].alert_type, AlertType::SosPressed);
        assert_eq!(personal[0].message, "SOS button pressed");

        // unresolved tag and missing tag both land as system-level
        let system = store.system_alerts();
        assert_eq!(system.len(), 2);
        let unknown = system
            .iter()
            .find(|a| matches!(a.alert_type, AlertType::Unknown(_)))
            .unwrap();
        assert_eq!(unknown.alert_type.as_str(), "radio_silence");
        assert_eq!(unknown.message, "radio_silence");
        assert_eq!(unknown.severity, crate::domain::types::Severity::Warning);
    }

    #[test]
    fn test_sweep_applies_retention_cap() {
        let (store, engine) = engine();
        let base = Utc::now();
        for i in 0..55 {
            store.insert_alert_deduped(
                None,
                AlertType::Unknown(format!("synthetic_{i}")),
                Duration::seconds(0),
                base + Duration::seconds(i),
            );
        }
        engine.sweep();
        assert_eq!(store.alerts().len(), 50);
    }

    #[test]
    fn test_configured_window_and_cap_are_honored() {
        let config = Config::default()
            .with_dedup_window_secs(0)
            .with_retention_cap(3);
        let store = Arc::new(TelemetryStore::new(&config));
        let engine = AlertEngine::new(store.clone(), &config, Arc::new(Metrics::new()));
        let base = Utc::now();

        // a zero window means every evaluation lands a row
        for i in 0..5 {
            assert!(engine.create_alert(
                None,
                AlertType::BeaconOffline,
                base + Duration::seconds(i)
            ));
        }
        assert_eq!(store.alerts().len(), 5);

        engine.sweep();
        assert_eq!(store.alerts().len(), 3);
    }
}
