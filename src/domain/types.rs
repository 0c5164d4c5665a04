//! Shared types for the firewatch engine

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Newtype wrapper for internal firefighter IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
pub struct FirefighterId(pub i64);

impl std::fmt::Display for FirefighterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for internal beacon IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
pub struct BeaconId(pub i64);

impl std::fmt::Display for BeaconId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for alert IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
pub struct AlertId(pub i64);

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tracked firefighter. Created on first sight of an unknown badge,
/// then updated in place; never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Firefighter {
    pub id: FirefighterId,
    pub name: String,
    pub badge_number: String,
    pub team: Option<String>,
    pub on_mission: bool,
    pub created_at: DateTime<Utc>,
}

/// One GPS fix. Appended only when the upstream record carried a usable
/// coordinate; history is never rewritten.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub firefighter_id: FirefighterId,
    pub latitude: f64,
    pub longitude: f64,
    pub floor: i32,
    pub timestamp: DateTime<Utc>,
}

/// One vitals sample. Appended every ingest cycle even when all readings
/// are absent, so the row doubles as a liveness marker.
#[derive(Debug, Clone, Serialize)]
pub struct Vitals {
    pub firefighter_id: FirefighterId,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub oxygen_level: Option<f64>,
    pub co_level: Option<f64>,
    pub battery_level: Option<f64>,
    pub scba_pressure: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A location beacon keyed by its external hardware id.
#[derive(Debug, Clone, Serialize)]
pub struct Beacon {
    pub id: BeaconId,
    pub beacon_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub floor: i32,
    pub battery_percent: f64,
    pub signal_quality: f64,
    pub tags_in_range: i64,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

/// A synthesized or passed-through alert row.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub firefighter_id: Option<FirefighterId>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertType {
    ManDown,
    HighHeartRate,
    LowBattery,
    ScbaCritical,
    ScbaLowPressure,
    HighCo,
    LowOxygen,
    HighTemperature,
    BeaconOffline,
    SosPressed,
    TagOffline,
    ExplosiveGas,
    Unknown(String),
}

impl std::str::FromStr for AlertType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "man_down" => AlertType::ManDown,
            "high_heart_rate" => AlertType::HighHeartRate,
            "low_battery" => AlertType::LowBattery,
            "scba_critical" => AlertType::ScbaCritical,
            "scba_low_pressure" => AlertType::ScbaLowPressure,
            "high_co" => AlertType::HighCo,
            "low_oxygen" => AlertType::LowOxygen,
            "high_temperature" => AlertType::HighTemperature,
            "beacon_offline" => AlertType::BeaconOffline,
            "sos_pressed" => AlertType::SosPressed,
            "tag_offline" => AlertType::TagOffline,
            "explosive_gas" => AlertType::ExplosiveGas,
            other => AlertType::Unknown(other.to_string()),
        })
    }
}

impl AlertType {
    pub fn as_str(&self) -> &str {
        match self {
            AlertType::ManDown => "man_down",
            AlertType::HighHeartRate => "high_heart_rate",
            AlertType::LowBattery => "low_battery",
            AlertType::ScbaCritical => "scba_critical",
            AlertType::ScbaLowPressure => "scba_low_pressure",
            AlertType::HighCo => "high_co",
            AlertType::LowOxygen => "low_oxygen",
            AlertType::HighTemperature => "high_temperature",
            AlertType::BeaconOffline => "beacon_offline",
            AlertType::SosPressed => "sos_pressed",
            AlertType::TagOffline => "tag_offline",
            AlertType::ExplosiveGas => "explosive_gas",
            AlertType::Unknown(s) => s,
        }
    }

    /// Unrecognized upstream types default to warning so they surface
    /// without being able to page anyone.
    pub fn severity(&self) -> Severity {
        match self {
            AlertType::ManDown
            | AlertType::ScbaCritical
            | AlertType::HighCo
            | AlertType::LowOxygen
            | AlertType::HighTemperature
            | AlertType::SosPressed
            | AlertType::TagOffline
            | AlertType::ExplosiveGas => Severity::Critical,
            AlertType::HighHeartRate
            | AlertType::LowBattery
            | AlertType::ScbaLowPressure
            | AlertType::BeaconOffline
            | AlertType::Unknown(_) => Severity::Warning,
        }
    }

    /// Operator-facing message. Unknown types carry the raw type string
    /// so nothing upstream sends is silently renamed.
    pub fn message(&self) -> &str {
        match self {
            AlertType::ManDown => "Firefighter is not moving",
            AlertType::HighHeartRate => "High heart rate",
            AlertType::LowBattery => "Low device battery",
            AlertType::ScbaCritical => "SCBA pressure critically low",
            AlertType::ScbaLowPressure => "SCBA pressure low",
            AlertType::HighCo => "High CO concentration",
            AlertType::LowOxygen => "Low oxygen level",
            AlertType::HighTemperature => "High temperature",
            AlertType::BeaconOffline => "Beacon offline",
            AlertType::SosPressed => "SOS button pressed",
            AlertType::TagOffline => "Tag offline",
            AlertType::ExplosiveGas => "Explosive gas detected",
            AlertType::Unknown(s) => s,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AlertType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_from_str() {
        assert_eq!(
            "man_down".parse::<AlertType>().unwrap(),
            AlertType::ManDown
        );
        assert_eq!(
            "scba_low_pressure".parse::<AlertType>().unwrap(),
            AlertType::ScbaLowPressure
        );
        assert!(matches!(
            "reactor_meltdown".parse::<AlertType>().unwrap(),
            AlertType::Unknown(_)
        ));
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(AlertType::ManDown.severity(), Severity::Critical);
        assert_eq!(AlertType::HighTemperature.severity(), Severity::Critical);
        assert_eq!(AlertType::SosPressed.severity(), Severity::Critical);
        assert_eq!(AlertType::HighHeartRate.severity(), Severity::Warning);
        assert_eq!(AlertType::BeaconOffline.severity(), Severity::Warning);
        assert_eq!(
            AlertType::Unknown("whatever".to_string()).severity(),
            Severity::Warning
        );
    }

    #[test]
    fn test_unknown_type_keeps_raw_string() {
        let alert_type: AlertType = "thermal_runaway".parse().unwrap();
        assert_eq!(alert_type.as_str(), "thermal_runaway");
        assert_eq!(alert_type.message(), "thermal_runaway");
    }

    #[test]
    fn test_alert_type_serializes_as_tag() {
        let json = serde_json::to_string(&AlertType::ScbaCritical).unwrap();
        assert_eq!(json, "\"scba_critical\"");
    }
}
