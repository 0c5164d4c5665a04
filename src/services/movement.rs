//! Stationarity and last-contact derivation from position history

use crate::domain::geo::planar_distance_m;
use crate::domain::types::Position;
use chrono::{DateTime, Utc};

/// Drift below this radius does not count as leaving the anchor point
pub const STATIONARY_RADIUS_M: f64 = 5.0;

/// How long the firefighter has been within [`STATIONARY_RADIUS_M`] of
/// their newest fix. `positions` must be ordered newest first; the scan
/// walks back in time extending the stationary span until the first fix
/// outside the radius. Fewer than two fixes is not evidence of anything,
/// so it reads as zero.
pub fn stationary_seconds(positions: &[Position], now: DateTime<Utc>) -> i64 {
    let Some(anchor) = positions.first() else {
        return 0;
    };
    if positions.len() < 2 {
        return 0;
    }

    let mut stationary_since = anchor.timestamp;
    for position in &positions[1..] {
        let distance = planar_distance_m(
            anchor.latitude,
            anchor.longitude,
            position.latitude,
            position.longitude,
        );
        if distance > STATIONARY_RADIUS_M {
            break;
        }
        stationary_since = position.timestamp;
    }

    (now - stationary_since).num_seconds().max(0)
}

/// Seconds since the newest position or vitals row, whichever is later.
/// None when the firefighter has never reported either.
pub fn seconds_since_last_contact(
    last_position: Option<DateTime<Utc>>,
    last_vitals: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<i64> {
    let last = match (last_position, last_vitals) {
        (Some(position), Some(vitals)) => position.max(vitals),
        (Some(position), None) => position,
        (None, Some(vitals)) => vitals,
        (None, None) => return None,
    };
    Some((now - last).num_seconds().max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::FirefighterId;
    use chrono::Duration;

    // ~0.000009 deg of latitude per meter
    const DEG_PER_M: f64 = 1.0 / 111_000.0;

    fn fix(lat: f64, lon: f64, at: DateTime<Utc>) -> Position {
        Position {
            firefighter_id: FirefighterId(1),
            latitude: lat,
            longitude: lon,
            floor: 0,
            timestamp: at,
        }
    }

    /// Newest-first track: entry i is `i * step_m` meters south of the
    /// anchor and `i * gap_secs` seconds older.
    fn track(count: usize, step_m: f64, gap_secs: i64, now: DateTime<Utc>) -> Vec<Position> {
        (0..count)
            .map(|i| {
                fix(
                    52.0 - i as f64 * step_m * DEG_PER_M,
                    21.0,
                    now - Duration::seconds(gap_secs * (i as i64 + 1)),
                )
            })
            .collect()
    }

    #[test]
    fn test_too_few_samples_reads_zero() {
        let now = Utc::now();
        assert_eq!(stationary_seconds(&[], now), 0);
        assert_eq!(stationary_seconds(&[fix(52.0, 21.0, now)], now), 0);
    }

    #[test]
    fn test_all_within_radius_spans_whole_window() {
        let now = Utc::now();
        // 10 fixes 3 m apart of the anchor... each within 5 m of it
        let positions: Vec<Position> = (0..10)
            .map(|i| {
                fix(
                    52.0 + if i == 0 { 0.0 } else { 3.0 * DEG_PER_M },
                    21.0,
                    now - Duration::seconds(5 * i),
                )
            })
            .collect();
        // oldest fix is 45 s old
        assert_eq!(stationary_seconds(&positions, now), 45);
    }

    #[test]
    fn test_scan_stops_at_first_departure() {
        let now = Utc::now();
        let mut positions = track(3, 1.0, 10, now); // 10s, 20s, 30s old, all close
        positions.push(fix(52.0 - 40.0 * DEG_PER_M, 21.0, now - Duration::seconds(40)));
        positions.push(fix(52.0, 21.0, now - Duration::seconds(50)));
        // the 40 m jump at 40 s caps the span at the 30 s fix, even though
        // the 50 s fix is back inside the radius
        assert_eq!(stationary_seconds(&positions, now), 30);
    }

    #[test]
    fn test_moving_track_reads_age_of_newest() {
        let now = Utc::now();
        // 20 m between consecutive fixes: the second fix already breaks
        let positions = track(5, 20.0, 5, now);
        assert_eq!(stationary_seconds(&positions, now), 5);
    }

    #[test]
    fn test_distance_is_measured_from_anchor_not_pairwise() {
        let now = Utc::now();
        // each step is 4 m from the previous but the third is 8 m from
        // the anchor, so the span stops at the second fix
        let positions = vec![
            fix(52.0, 21.0, now - Duration::seconds(5)),
            fix(52.0 - 4.0 * DEG_PER_M, 21.0, now - Duration::seconds(10)),
            fix(52.0 - 8.0 * DEG_PER_M, 21.0, now - Duration::seconds(15)),
        ];
        assert_eq!(stationary_seconds(&positions, now), 10);
    }

    #[test]
    fn test_last_contact_prefers_latest_of_both() {
        let now = Utc::now();
        let position_at = now - Duration::seconds(20);
        let vitals_at = now - Duration::seconds(8);
        assert_eq!(
            seconds_since_last_contact(Some(position_at), Some(vitals_at), now),
            Some(8)
        );
        assert_eq!(
            seconds_since_last_contact(Some(position_at), None, now),
            Some(20)
        );
        assert_eq!(seconds_since_last_contact(None, None, now), None);
    }

    #[test]
    fn test_future_timestamps_clamp_to_zero() {
        let now = Utc::now();
        let ahead = now + Duration::seconds(3);
        assert_eq!(seconds_since_last_contact(Some(ahead), None, now), Some(0));
        let positions = vec![
            fix(52.0, 21.0, ahead),
            fix(52.0, 21.0, ahead + Duration::seconds(1)),
        ];
        assert_eq!(stationary_seconds(&positions, now), 0);
    }
}
