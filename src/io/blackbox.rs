//! Incident black-box export
//!
//! Serializes the entire store to a single pretty-printed JSON file:
//! every firefighter with full position/vitals/alert history, every
//! beacon, the system-level alerts, and headline counts. Written once on
//! shutdown so a post-incident review has the complete picture even if
//! the operator console never saved anything.

use crate::domain::types::{Alert, Beacon, Firefighter, Position, Vitals};
use crate::services::store::TelemetryStore;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Serialize)]
struct ExportStatistics {
    firefighters: usize,
    beacons: usize,
    beacons_online: usize,
    alerts: usize,
    positions: usize,
    vitals: usize,
}

#[derive(Serialize)]
struct FirefighterDump {
    #[serde(flatten)]
    firefighter: Firefighter,
    positions: Vec<Position>,
    vitals: Vec<Vitals>,
    alerts: Vec<Alert>,
}

#[derive(Serialize)]
struct ExportDocument {
    generated_at: DateTime<Utc>,
    site: String,
    statistics: ExportStatistics,
    firefighters: Vec<FirefighterDump>,
    beacons: Vec<Beacon>,
    system_alerts: Vec<Alert>,
}

pub struct Blackbox {
    path: PathBuf,
    site: String,
}

impl Blackbox {
    pub fn new(path: &str, site: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            site: site.to_string(),
        }
    }

    /// Write the full snapshot. Returns the number of bytes written.
    pub fn export(&self, store: &TelemetryStore) -> anyhow::Result<usize> {
        let counts = store.counts();
        let firefighters = store
            .firefighters()
            .into_iter()
            .map(|firefighter| {
                let id = firefighter.id;
                FirefighterDump {
                    firefighter,
                    positions: store.recent_positions(id, usize::MAX),
                    vitals: store.recent_vitals(id, usize::MAX),
                    alerts: store.alerts_for(id),
                }
            })
            .collect();

        let document = ExportDocument {
            generated_at: Utc::now(),
            site: self.site.clone(),
            statistics: ExportStatistics {
                firefighters: counts.firefighters,
                beacons: counts.beacons,
                beacons_online: counts.beacons_online,
                alerts: counts.alerts,
                positions: counts.positions,
                vitals: counts.vitals,
            },
            firefighters,
            beacons: store.beacons(),
            system_alerts: store.system_alerts(),
        };

        let json = serde_json::to_string_pretty(&document)
            .context("failed to serialize blackbox document")?;
        self.write_file(&json)?;
        info!(
            file = %self.path.display(),
            bytes = %json.len(),
            firefighters = %counts.firefighters,
            alerts = %counts.alerts,
            "blackbox_exported"
        );
        Ok(json.len())
    }

    fn write_file(&self, json: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create directory {}", parent.display())
                })?;
            }
        }
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
