//! Upstream poll loop
//!
//! Drives the whole engine on a fixed cadence: fetch and ingest the three
//! upstream sections, run the local rule pass, then sweep retention. Each
//! section is isolated; a fetch failure is logged and skipped, never
//! propagated, so one bad upstream response cannot starve the local
//! rules or the next tick.

use crate::domain::types::{BeaconId, FirefighterId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::upstream::TelemetrySource;
use crate::services::alerts::AlertEngine;
use crate::services::normalize::{
    parse_alerts, parse_beacons, parse_firefighters, unwrap_records,
};
use crate::services::store::TelemetryStore;
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// External-id resolution state owned by the poll loop. Maps upstream
/// tag ids to internal firefighter ids and hardware beacon ids to
/// internal beacon ids; rebuilt from scratch on every process start.
#[derive(Default)]
pub struct IdentityMap {
    tags: FxHashMap<String, FirefighterId>,
    beacons: FxHashMap<String, BeaconId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tag(&mut self, tag: &str, id: FirefighterId) {
        self.tags.insert(tag.to_string(), id);
    }

    pub fn resolve_tag(&self, tag: &str) -> Option<FirefighterId> {
        self.tags.get(tag).copied()
    }

    pub fn insert_beacon(&mut self, beacon_id: &str, id: BeaconId) {
        self.beacons.insert(beacon_id.to_string(), id);
    }

    pub fn resolve_beacon(&self, beacon_id: &str) -> Option<BeaconId> {
        self.beacons.get(beacon_id).copied()
    }

    /// Known internal firefighter ids, deduped and in stable order.
    pub fn firefighter_ids(&self) -> Vec<FirefighterId> {
        let mut ids: Vec<_> = self.tags.values().copied().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn beacon_count(&self) -> usize {
        self.beacons.len()
    }
}

pub struct Poller<S: TelemetrySource> {
    source: S,
    store: Arc<TelemetryStore>,
    engine: AlertEngine,
    identity: IdentityMap,
    metrics: Arc<Metrics>,
    interval: Duration,
    fallback_gps: (f64, f64),
}

impl<S: TelemetrySource> Poller<S> {
    pub fn new(
        source: S,
        store: Arc<TelemetryStore>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        let engine = AlertEngine::new(store.clone(), config, metrics.clone());
        Self {
            source,
            store,
            engine,
            identity: IdentityMap::new(),
            metrics,
            interval: Duration::from_millis(config.poll_interval_ms()),
            fallback_gps: config.fallback_gps(),
        }
    }

    /// One full cycle: the three upstream sections in order, then the
    /// local rule pass and the retention sweep. Never fails.
    pub async fn run_once(&mut self) {
        let started = std::time::Instant::now();
        let now = Utc::now();

        match self.source.fetch_firefighters().await {
            Ok(payload) => {
                let count = self.ingest_firefighters(&payload, now);
                debug!(records = %count, "firefighters_ingested");
            }
            Err(error) => {
                self.metrics.record_fetch_error();
                warn!(error = %error, "firefighters_fetch_failed");
            }
        }

        match self.source.fetch_beacons().await {
            Ok(payload) => {
                let count = self.ingest_beacons(&payload, now);
                debug!(records = %count, "beacons_ingested");
            }
            Err(error) => {
                self.metrics.record_fetch_error();
                warn!(error = %error, "beacons_fetch_failed");
            }
        }

        match self.source.fetch_alerts().await {
            Ok(payload) => {
                let count = self.ingest_alerts(&payload, now);
                debug!(records = %count, "upstream_alerts_ingested");
            }
            Err(error) => {
                self.metrics.record_fetch_error();
                warn!(error = %error, "alerts_fetch_failed");
            }
        }

        self.engine.run_rules(&self.identity, now);
        self.engine.sweep();

        self.metrics.record_cycle(started.elapsed().as_millis() as u64);
    }

    /// Seed the identity maps before the first tick. Failures are logged
    /// and left for the regular cadence to repair.
    pub async fn initial_sync(&mut self) {
        let now = Utc::now();
        match self.source.fetch_firefighters().await {
            Ok(payload) => {
                self.ingest_firefighters(&payload, now);
            }
            Err(error) => warn!(error = %error, "initial_firefighter_sync_failed"),
        }
        match self.source.fetch_beacons().await {
            Ok(payload) => {
                self.ingest_beacons(&payload, now);
            }
            Err(error) => warn!(error = %error, "initial_beacon_sync_failed"),
        }
        info!(
            firefighters = %self.identity.tag_count(),
            beacons = %self.identity.beacon_count(),
            "initial_sync_complete"
        );
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_ms = %self.interval.as_millis(), "poller_started");
        self.initial_sync().await;

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("poller_shutdown");
                        return;
                    }
                }
            }
        }
    }

    fn ingest_firefighters(&mut self, payload: &Value, now: DateTime<Utc>) -> usize {
        let raw = unwrap_records(payload, "firefighters").len();
        let records = parse_firefighters(payload);
        self.record_section_counts(raw, records.len());

        for record in &records {
            let known = self.identity.resolve_tag(&record.tag);
            let id = self.store.ingest_firefighter(known, record, now);
            if known.is_none() {
                self.identity.insert_tag(&record.tag, id);
            }
        }
        records.len()
    }

    fn ingest_beacons(&mut self, payload: &Value, now: DateTime<Utc>) -> usize {
        let raw = unwrap_records(payload, "beacons").len();
        let records = parse_beacons(payload);
        self.record_section_counts(raw, records.len());

        for record in &records {
            let id = self.store.upsert_beacon(record, self.fallback_gps, now);
            if self.identity.resolve_beacon(&record.beacon_id).is_none() {
                self.identity.insert_beacon(&record.beacon_id, id);
            }
        }

        let seen: FxHashSet<String> = records
            .iter()
            .map(|record| record.beacon_id.clone())
            .collect();
        let sweep = self.store.sweep_missing_beacons(&seen);
        if sweep.deleted > 0 || sweep.marked_offline > 0 {
            debug!(
                deleted = %sweep.deleted,
                marked_offline = %sweep.marked_offline,
                "beacon_sweep"
            );
        }
        records.len()
    }

    fn ingest_alerts(&mut self, payload: &Value, now: DateTime<Utc>) -> usize {
        let raw = unwrap_records(payload, "alerts").len();
        let records = parse_alerts(payload);
        self.record_section_counts(raw, records.len());

        self.engine.ingest_upstream(&records, &self.identity, now);
        records.len()
    }

    fn record_section_counts(&self, raw: usize, parsed: usize) {
        self.metrics.record_normalized(parsed as u64);
        if raw > parsed {
            self.metrics.record_dropped((raw - parsed) as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_map_round_trip() {
        let mut identity = IdentityMap::new();
        assert_eq!(identity.resolve_tag("T1"), None);
        identity.insert_tag("T1", FirefighterId(7));
        identity.insert_tag("T2", FirefighterId(3));
        assert_eq!(identity.resolve_tag("T1"), Some(FirefighterId(7)));
        assert_eq!(identity.tag_count(), 2);
    }

    #[test]
    fn test_firefighter_ids_deduped_and_sorted() {
        let mut identity = IdentityMap::new();
        // two tags can map to the same row when badges collide
        identity.insert_tag("T1", FirefighterId(9));
        identity.insert_tag("T2", FirefighterId(9));
        identity.insert_tag("T3", FirefighterId(2));
        assert_eq!(
            identity.firefighter_ids(),
            vec![FirefighterId(2), FirefighterId(9)]
        );
    }
}
