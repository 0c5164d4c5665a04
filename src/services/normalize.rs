//! Tolerant normalization of upstream telemetry payloads
//!
//! The upstream feed drifts between firmware versions: record lists come
//! bare or wrapped, fields live nested or flat under shifting names, and
//! GPS appears as an ordered pair, a mapping, or loose fields. Extraction
//! is table-driven: each canonical field has an ordered alias chain and
//! the first alias that resolves to a usable value wins. A record is only
//! dropped when its external id cannot be recovered; a whole payload only
//! yields nothing when no record list can be found in it. Neither case is
//! an error.

use crate::services::coerce::{float_of, int_of, to_signal_quality};
use serde_json::Value;
use tracing::debug;

/// Nested key path probed inside a single record
type Path = &'static [&'static str];

const FF_TAG: &[Path] = &[&["tag_id"], &["id"]];
const FF_BADGE: &[Path] = &[
    &["firefighter", "id"],
    &["firefighter", "badge_number"],
    &["badge_number"],
    &["badge"],
];
const FF_NAME: &[Path] = &[
    &["firefighter", "name"],
    &["name"],
    &["firefighter_name"],
    &["full_name"],
    &["display_name"],
];
const FF_TEAM: &[Path] = &[&["firefighter", "team"], &["team"]];
const FF_HEART_RATE: &[Path] = &[
    &["vitals", "heart_rate_bpm"],
    &["vitals", "heart_rate"],
    &["vitals", "hr"],
    &["heart_rate"],
];
const FF_TEMPERATURE: &[Path] = &[
    &["vitals", "skin_temperature_c"],
    &["vitals", "temperature_celsius"],
    &["vitals", "temperature"],
    &["vitals", "temp"],
    &["temperature"],
];
const FF_OXYGEN: &[Path] = &[
    &["environment", "o2_percent"],
    &["vitals", "oxygen_level_percent"],
    &["vitals", "oxygen_level"],
    &["vitals", "o2"],
    &["oxygen_level"],
];
const FF_CO: &[Path] = &[
    &["environment", "co_ppm"],
    &["vitals", "co_ppm"],
    &["vitals", "co_level"],
    &["vitals", "co"],
    &["co_level"],
];
const FF_SCBA: &[Path] = &[
    &["scba", "cylinder_pressure_bar"],
    &["vitals", "scba_pressure_bar"],
    &["vitals", "scba_pressure"],
    &["vitals", "scba"],
    &["scba_pressure"],
];
const FF_BATTERY: &[Path] = &[
    &["device", "battery_percent"],
    &["vitals", "battery_percent"],
    &["vitals", "battery_level"],
    &["vitals", "battery"],
    &["battery_percent"],
    &["battery_level"],
    &["battery"],
    &["device_battery"],
    &["tag_battery"],
];
const FF_FLOOR: &[Path] = &[&["position", "floor"]];

const BEACON_ID: &[Path] = &[&["beacon_id"], &["id"]];
const BEACON_NAME: &[Path] = &[&["name"]];
const BEACON_FLOOR: &[Path] = &[&["position", "floor"], &["floor"]];
const BEACON_BATTERY: &[Path] = &[&["status", "battery_percent"], &["battery_percent"]];
const BEACON_SIGNAL: &[Path] = &[&["status", "signal_quality"], &["signal_quality"]];
const BEACON_TAGS: &[Path] = &[&["status", "tags_in_range"], &["tags_in_range"]];
const BEACON_ONLINE: &[Path] = &[&["status", "is_online"], &["is_online"]];

const ALERT_TYPE: &[Path] = &[&["alert_type"], &["type"]];
const ALERT_TAG: &[Path] = &[&["tag_id"], &["firefighter_id"]];

/// Canonical firefighter record extracted from one upstream element.
#[derive(Debug, Clone, PartialEq)]
pub struct FirefighterRecord {
    pub tag: String,
    pub badge: String,
    pub name: Option<String>,
    pub team: Option<String>,
    pub gps: Option<(f64, f64)>,
    pub floor: i32,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub oxygen_level: Option<f64>,
    pub co_level: Option<f64>,
    pub battery_level: Option<f64>,
    pub scba_pressure: Option<f64>,
}

/// Canonical beacon record. `None` fields were absent upstream and must
/// not clobber stored state.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconRecord {
    pub beacon_id: String,
    pub name: Option<String>,
    pub gps: Option<(f64, f64)>,
    pub floor: Option<i32>,
    pub battery_percent: Option<f64>,
    pub signal_quality: Option<f64>,
    pub tags_in_range: Option<i64>,
    pub is_online: Option<bool>,
}

/// Canonical upstream alert record.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub alert_type: String,
    pub tag: Option<String>,
}

/// Locate the record list inside a payload of unknown shape: a bare
/// array, a wrapper object keyed by the section name or a generic
/// envelope key, or failing those, the first array-valued entry.
pub fn unwrap_records<'a>(payload: &'a Value, section: &str) -> &'a [Value] {
    if let Value::Array(records) = payload {
        return records;
    }
    if let Value::Object(map) = payload {
        for key in [section, "data", "items"] {
            if let Some(Value::Array(records)) = map.get(key) {
                return records;
            }
        }
        for value in map.values() {
            if let Value::Array(records) = value {
                return records;
            }
        }
    }
    &[]
}

fn lookup<'a>(record: &'a Value, path: Path) -> Option<&'a Value> {
    let mut cursor = record;
    for key in path {
        cursor = cursor.get(key)?;
    }
    if cursor.is_null() {
        None
    } else {
        Some(cursor)
    }
}

fn first_of<'a>(record: &'a Value, chain: &[Path]) -> Option<&'a Value> {
    chain.iter().find_map(|path| lookup(record, path))
}

/// First alias whose value reads as a number.
fn float_field(record: &Value, chain: &[Path]) -> Option<f64> {
    chain
        .iter()
        .find_map(|path| lookup(record, path).and_then(float_of))
}

/// First alias whose value reads as an integer (sequences count).
fn int_field(record: &Value, chain: &[Path]) -> Option<i64> {
    chain
        .iter()
        .find_map(|path| lookup(record, path).and_then(int_of))
}

/// First alias holding a non-empty string.
fn string_field(record: &Value, chain: &[Path]) -> Option<String> {
    chain.iter().find_map(|path| {
        lookup(record, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn bool_field(record: &Value, chain: &[Path]) -> Option<bool> {
    chain
        .iter()
        .find_map(|path| lookup(record, path).and_then(Value::as_bool))
}

/// External ids may arrive as strings or numbers; both become strings.
/// Empty strings do not identify anything.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// GPS ladder inside the `position` sub-object. An ordered pair takes
/// precedence over a mapping; if the pair is present but unreadable the
/// fix is absent rather than falling through to stale-looking fields.
fn extract_gps(record: &Value) -> Option<(f64, f64)> {
    let position = record.get("position")?;
    let gps = position.get("gps");
    if let Some(pair) = gps.and_then(Value::as_array) {
        if pair.len() >= 2 {
            let lat = float_of(pair.first()?)?;
            let lon = float_of(pair.get(1)?)?;
            return Some((lat, lon));
        }
    }
    if let Some(mapping) = gps.filter(|v| v.is_object()) {
        let lat = first_of(mapping, &[&["lat"], &["latitude"]]).and_then(float_of)?;
        let lon = first_of(mapping, &[&["lon"], &["longitude"]]).and_then(float_of)?;
        return Some((lat, lon));
    }
    let lat = first_of(position, &[&["latitude"], &["lat"]]).and_then(float_of)?;
    let lon = first_of(position, &[&["longitude"], &["lon"]]).and_then(float_of)?;
    Some((lat, lon))
}

fn extract_firefighter(record: &Value) -> Option<FirefighterRecord> {
    let tag = first_of(record, FF_TAG).and_then(id_string)?;
    let badge = first_of(record, FF_BADGE)
        .and_then(id_string)
        .unwrap_or_else(|| tag.clone());
    Some(FirefighterRecord {
        badge,
        name: string_field(record, FF_NAME),
        team: string_field(record, FF_TEAM),
        gps: extract_gps(record),
        floor: int_field(record, FF_FLOOR).unwrap_or(0) as i32,
        heart_rate: float_field(record, FF_HEART_RATE),
        temperature: float_field(record, FF_TEMPERATURE),
        oxygen_level: float_field(record, FF_OXYGEN),
        co_level: float_field(record, FF_CO),
        battery_level: float_field(record, FF_BATTERY),
        scba_pressure: float_field(record, FF_SCBA),
        tag,
    })
}

fn extract_beacon(record: &Value) -> Option<BeaconRecord> {
    let beacon_id = first_of(record, BEACON_ID).and_then(id_string)?;
    Some(BeaconRecord {
        beacon_id,
        name: string_field(record, BEACON_NAME),
        gps: extract_gps(record),
        floor: int_field(record, BEACON_FLOOR).map(|f| f as i32),
        battery_percent: float_field(record, BEACON_BATTERY),
        signal_quality: first_of(record, BEACON_SIGNAL).map(|v| to_signal_quality(Some(v))),
        tags_in_range: int_field(record, BEACON_TAGS),
        is_online: bool_field(record, BEACON_ONLINE),
    })
}

fn extract_alert(record: &Value) -> Option<AlertRecord> {
    let alert_type = string_field(record, ALERT_TYPE)?;
    Some(AlertRecord {
        alert_type,
        tag: first_of(record, ALERT_TAG).and_then(id_string),
    })
}

/// Firefighter records from one payload. Elements without a recoverable
/// tag id are dropped; a shapeless payload yields an empty vec.
pub fn parse_firefighters(payload: &Value) -> Vec<FirefighterRecord> {
    let raw = unwrap_records(payload, "firefighters");
    let mut records = Vec::with_capacity(raw.len());
    for element in raw {
        match extract_firefighter(element) {
            Some(record) => records.push(record),
            None => debug!("firefighter_record_dropped"),
        }
    }
    records
}

/// Beacon records from one payload.
pub fn parse_beacons(payload: &Value) -> Vec<BeaconRecord> {
    let raw = unwrap_records(payload, "beacons");
    let mut records = Vec::with_capacity(raw.len());
    for element in raw {
        match extract_beacon(element) {
            Some(record) => records.push(record),
            None => debug!("beacon_record_dropped"),
        }
    }
    records
}

/// Upstream alert records from one payload. Elements without a type
/// string are dropped.
pub fn parse_alerts(payload: &Value) -> Vec<AlertRecord> {
    let raw = unwrap_records(payload, "alerts");
    let mut records = Vec::with_capacity(raw.len());
    for element in raw {
        match extract_alert(element) {
            Some(record) => records.push(record),
            None => debug!("alert_record_dropped"),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_bare_array() {
        let payload = json!([{"id": "FF-001"}]);
        assert_eq!(unwrap_records(&payload, "firefighters").len(), 1);
    }

    #[test]
    fn test_unwrap_section_key() {
        let payload = json!({"firefighters": [{"id": "FF-001"}, {"id": "FF-002"}]});
        assert_eq!(unwrap_records(&payload, "firefighters").len(), 2);
    }

    #[test]
    fn test_unwrap_envelope_keys() {
        let data = json!({"data": [{"id": "B-1"}]});
        assert_eq!(unwrap_records(&data, "beacons").len(), 1);
        let items = json!({"items": [{"id": "B-1"}]});
        assert_eq!(unwrap_records(&items, "beacons").len(), 1);
    }

    #[test]
    fn test_unwrap_first_array_value() {
        let payload = json!({"meta": {"v": 2}, "rows": [{"id": "FF-001"}]});
        assert_eq!(unwrap_records(&payload, "firefighters").len(), 1);
    }

    #[test]
    fn test_unwrap_shapeless_payloads() {
        assert!(unwrap_records(&json!("garbage"), "firefighters").is_empty());
        assert!(unwrap_records(&json!(42), "firefighters").is_empty());
        assert!(unwrap_records(&json!({"status": "ok"}), "firefighters").is_empty());
        assert!(unwrap_records(&json!(null), "firefighters").is_empty());
    }

    #[test]
    fn test_firefighter_nested_shape() {
        let payload = json!([{
            "tag_id": "FF-007",
            "firefighter": {"name": "Anna Kowalska", "badge_number": "B-77", "team": "Alpha"},
            "position": {"gps": [52.23, 21.01], "floor": 3},
            "vitals": {"heart_rate_bpm": 112, "skin_temperature_c": 37.1},
            "scba": {"cylinder_pressure_bar": 210},
            "environment": {"o2_percent": 20.8, "co_ppm": 4},
            "device": {"battery_percent": 88}
        }]);
        let records = parse_firefighters(&payload);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.tag, "FF-007");
        assert_eq!(r.badge, "B-77");
        assert_eq!(r.name.as_deref(), Some("Anna Kowalska"));
        assert_eq!(r.team.as_deref(), Some("Alpha"));
        assert_eq!(r.gps, Some((52.23, 21.01)));
        assert_eq!(r.floor, 3);
        assert_eq!(r.heart_rate, Some(112.0));
        assert_eq!(r.temperature, Some(37.1));
        assert_eq!(r.oxygen_level, Some(20.8));
        assert_eq!(r.co_level, Some(4.0));
        assert_eq!(r.battery_level, Some(88.0));
        assert_eq!(r.scba_pressure, Some(210.0));
    }

    #[test]
    fn test_firefighter_flat_shape() {
        let payload = json!([{
            "id": "FF-002",
            "name": "Jan Nowak",
            "heart_rate": "95",
            "temperature": 36.4,
            "oxygen_level": 20.9,
            "co_level": 2,
            "battery": 41,
            "scba_pressure": 180
        }]);
        let records = parse_firefighters(&payload);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.tag, "FF-002");
        // no badge aliases resolve, so the tag stands in
        assert_eq!(r.badge, "FF-002");
        assert_eq!(r.heart_rate, Some(95.0));
        assert_eq!(r.battery_level, Some(41.0));
        assert_eq!(r.gps, None);
        assert_eq!(r.floor, 0);
    }

    #[test]
    fn test_gps_pair_and_mapping_agree() {
        let pair = json!([{"id": "A", "position": {"gps": [52.1, 21.2]}}]);
        let mapping = json!([{"id": "A", "position": {"gps": {"lat": 52.1, "lon": 21.2}}}]);
        let direct = json!([{"id": "A", "position": {"latitude": 52.1, "longitude": 21.2}}]);
        let from_pair = parse_firefighters(&pair)[0].gps;
        assert_eq!(from_pair, Some((52.1, 21.2)));
        assert_eq!(parse_firefighters(&mapping)[0].gps, from_pair);
        assert_eq!(parse_firefighters(&direct)[0].gps, from_pair);
    }

    #[test]
    fn test_gps_pair_takes_precedence() {
        let payload = json!([{
            "id": "A",
            "position": {"gps": [50.0, 20.0], "latitude": 99.0, "longitude": 99.0}
        }]);
        assert_eq!(parse_firefighters(&payload)[0].gps, Some((50.0, 20.0)));
    }

    #[test]
    fn test_gps_unreadable_pair_means_no_fix() {
        let payload = json!([{
            "id": "A",
            "position": {"gps": [52.1, "north"], "latitude": 99.0, "longitude": 99.0}
        }]);
        assert_eq!(parse_firefighters(&payload)[0].gps, None);
    }

    #[test]
    fn test_gps_short_pair_falls_back_to_direct_fields() {
        let payload = json!([{
            "id": "A",
            "position": {"gps": [], "latitude": 51.5, "longitude": 19.5}
        }]);
        assert_eq!(parse_firefighters(&payload)[0].gps, Some((51.5, 19.5)));
    }

    #[test]
    fn test_gps_mapping_skips_null_lat() {
        let payload = json!([{
            "id": "A",
            "position": {"gps": {"lat": null, "latitude": 52.4, "lon": 21.3}}
        }]);
        assert_eq!(parse_firefighters(&payload)[0].gps, Some((52.4, 21.3)));
    }

    #[test]
    fn test_numeric_ids_stringify() {
        let payload = json!([{"id": 1234, "heart_rate": 80}]);
        let records = parse_firefighters(&payload);
        assert_eq!(records[0].tag, "1234");
    }

    #[test]
    fn test_records_without_id_are_dropped() {
        let payload = json!([
            {"name": "No Tag"},
            {"id": "", "name": "Empty Tag"},
            {"id": "FF-009"},
            "not-an-object",
            null
        ]);
        let records = parse_firefighters(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag, "FF-009");
    }

    #[test]
    fn test_alias_order_prefers_nested() {
        let payload = json!([{
            "id": "FF-001",
            "vitals": {"heart_rate": 100, "hr": 150},
            "heart_rate": 60
        }]);
        assert_eq!(parse_firefighters(&payload)[0].heart_rate, Some(100.0));
    }

    #[test]
    fn test_unreadable_alias_value_falls_through() {
        let payload = json!([{
            "id": "FF-001",
            "vitals": {"heart_rate": "resting"},
            "heart_rate": 72
        }]);
        assert_eq!(parse_firefighters(&payload)[0].heart_rate, Some(72.0));
    }

    #[test]
    fn test_battery_flat_fallbacks() {
        let payload = json!([{"id": "FF-001", "tag_battery": "19.5"}]);
        assert_eq!(parse_firefighters(&payload)[0].battery_level, Some(19.5));
    }

    #[test]
    fn test_name_must_be_nonempty_string() {
        let payload = json!([{"id": "FF-001", "name": "   ", "firefighter_name": "Ewa"}]);
        assert_eq!(parse_firefighters(&payload)[0].name.as_deref(), Some("Ewa"));
    }

    #[test]
    fn test_beacon_full_record() {
        let payload = json!({"beacons": [{
            "beacon_id": "BCN-01",
            "name": "Stairwell A",
            "position": {"gps": {"latitude": 52.2, "longitude": 21.0}, "floor": 2},
            "status": {"battery_percent": "77", "signal_quality": "good",
                       "tags_in_range": ["FF-1", "FF-2"], "is_online": true}
        }]});
        let records = parse_beacons(&payload);
        assert_eq!(records.len(), 1);
        let b = &records[0];
        assert_eq!(b.beacon_id, "BCN-01");
        assert_eq!(b.name.as_deref(), Some("Stairwell A"));
        assert_eq!(b.gps, Some((52.2, 21.0)));
        assert_eq!(b.floor, Some(2));
        assert_eq!(b.battery_percent, Some(77.0));
        assert_eq!(b.signal_quality, Some(75.0));
        assert_eq!(b.tags_in_range, Some(2));
        assert_eq!(b.is_online, Some(true));
    }

    #[test]
    fn test_beacon_sparse_record_leaves_fields_absent() {
        let payload = json!([{"id": "BCN-02"}]);
        let records = parse_beacons(&payload);
        let b = &records[0];
        assert_eq!(b.beacon_id, "BCN-02");
        assert_eq!(b.name, None);
        assert_eq!(b.gps, None);
        assert_eq!(b.floor, None);
        assert_eq!(b.battery_percent, None);
        assert_eq!(b.signal_quality, None);
        assert_eq!(b.tags_in_range, None);
        assert_eq!(b.is_online, None);
    }

    #[test]
    fn test_beacon_garbage_signal_reads_full_strength() {
        let payload = json!([{"id": "BCN-03", "signal_quality": "stellar"}]);
        assert_eq!(parse_beacons(&payload)[0].signal_quality, Some(100.0));
    }

    #[test]
    fn test_alert_records() {
        let payload = json!({"alerts": [
            {"alert_type": "sos_pressed", "tag_id": "FF-004"},
            {"type": "explosive_gas"},
            {"tag_id": "FF-005"}
        ]});
        let records = parse_alerts(&payload);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].alert_type, "sos_pressed");
        assert_eq!(records[0].tag.as_deref(), Some("FF-004"));
        assert_eq!(records[1].alert_type, "explosive_gas");
        assert_eq!(records[1].tag, None);
    }

    #[test]
    fn test_reparse_is_deterministic() {
        let payload = json!({"firefighters": [{
            "tag_id": "FF-010",
            "firefighter": {"name": "Piotr"},
            "vitals": {"hr": 90, "battery": 60},
            "position": {"gps": [52.0, 21.0], "floor": 1}
        }]});
        let first = parse_firefighters(&payload);
        let second = parse_firefighters(&payload);
        assert_eq!(first, second);
    }
}
