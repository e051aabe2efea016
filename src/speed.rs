//! Point-to-point speed anomaly detection.
//!
//! Two readings of the same plate at known mileposts of the same road
//! imply a travel speed. Speeds above a caller-supplied threshold are
//! reported; everything else stays silent. Only chronologically
//! adjacent same-plate readings are compared, so cost is one sort plus
//! one scan per plate.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{CorrelatorError, Result};
use crate::locator::resolve_location;
use crate::{Reading, SourceType};

/// Configuration for speed anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedConfig {
    /// Speeds at or below this threshold (km/h) are not materialized
    pub min_speed_kmh: f64,

    /// Circumference in kilometers per canonical road code, for closed
    /// loops. On a ring road the effective distance is the minor arc:
    /// a gap longer than half the circumference is replaced by
    /// `circumference - gap`.
    pub ring_roads: HashMap<String, f64>,
}

impl SpeedConfig {
    /// Config with the given threshold and no ring roads.
    pub fn new(min_speed_kmh: f64) -> Self {
        Self {
            min_speed_kmh,
            ring_roads: HashMap::new(),
        }
    }

    /// Register a ring road by canonical code (e.g. `"M-30"`).
    pub fn with_ring_road(mut self, road: impl Into<String>, circumference_km: f64) -> Self {
        self.ring_roads.insert(road.into(), circumference_km);
        self
    }

    /// Config preloaded with the Madrid orbital motorways
    /// (M-30: 32.5 km, M-40: 63.3 km).
    pub fn with_madrid_ring_roads(min_speed_kmh: f64) -> Self {
        Self::new(min_speed_kmh)
            .with_ring_road("M-30", 32.5)
            .with_ring_road("M-40", 63.3)
    }

    fn validate(&self) -> Result<()> {
        if !self.min_speed_kmh.is_finite() || self.min_speed_kmh < 0.0 {
            return Err(CorrelatorError::InvalidThreshold {
                parameter: "min_speed_kmh",
                message: format!("must be finite and >= 0, got {}", self.min_speed_kmh),
            });
        }
        for (road, &circumference) in &self.ring_roads {
            if !circumference.is_finite() || circumference <= 0.0 {
                return Err(CorrelatorError::InvalidCircumference {
                    road: road.clone(),
                    value: circumference,
                });
            }
        }
        Ok(())
    }
}

/// One anomalous point-to-point speed observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedEvent {
    pub plate: String,
    /// Chronologically earlier reading
    pub from_reading: Reading,
    /// Chronologically later reading
    pub to_reading: Reading,
    pub distance_km: f64,
    pub elapsed_hours: f64,
    pub speed_kmh: f64,
}

/// Detect anomalous point-to-point speeds across all plates.
///
/// LPR readings are grouped by plate; plates with fewer than two
/// readings cannot yield a speed and are skipped. Within a plate,
/// only chronologically consecutive pairs are compared, and a pair is
/// skipped when either location is unparseable, the canonical roads
/// differ, or the elapsed time is zero. Events above `min_speed_kmh`
/// are returned sorted by the earlier reading's timestamp, then plate.
pub fn detect_speed_anomalies(readings: &[Reading], config: &SpeedConfig) -> Result<Vec<SpeedEvent>> {
    config.validate()?;

    let groups = group_by_plate(readings);
    let mut events: Vec<SpeedEvent> = groups
        .into_iter()
        .flat_map(|(_, plate_readings)| plate_events(plate_readings, config))
        .collect();

    sort_events(&mut events);
    debug!("[speed] {} anomalies above {} km/h", events.len(), config.min_speed_kmh);
    Ok(events)
}

/// Parallel variant of [`detect_speed_anomalies`]: per-plate partitions
/// are independent, so they are processed on the rayon pool. The same
/// explicit post-sort keeps the output deterministic.
#[cfg(feature = "parallel")]
pub fn detect_speed_anomalies_parallel(
    readings: &[Reading],
    config: &SpeedConfig,
) -> Result<Vec<SpeedEvent>> {
    config.validate()?;

    let groups = group_by_plate(readings);
    let mut events: Vec<SpeedEvent> = groups
        .into_par_iter()
        .flat_map(|(_, plate_readings)| plate_events(plate_readings, config))
        .collect();

    sort_events(&mut events);
    Ok(events)
}

/// Measure the speed between two readings of the same plate,
/// regardless of argument order.
///
/// Returns `None` when either location is unparseable, the canonical
/// roads differ, or the elapsed time is zero. The result's `from` and
/// `to` readings are ordered chronologically, and the magnitude is
/// direction-agnostic.
pub fn pair_speed(a: &Reading, b: &Reading, config: &SpeedConfig) -> Option<SpeedEvent> {
    let (first, second) = match (a.timestamp, b.timestamp) {
        (Some(ta), Some(tb)) if ta <= tb => (a, b),
        (Some(_), Some(_)) => (b, a),
        _ => return None,
    };

    let loc1 = resolve_location(first)?;
    let loc2 = resolve_location(second)?;
    if loc1.road != loc2.road {
        return None;
    }

    let mut distance_km = (loc2.milepost_km - loc1.milepost_km).abs();
    if let Some(&circumference) = config.ring_roads.get(&loc1.road) {
        if distance_km > circumference / 2.0 {
            distance_km = circumference - distance_km;
        }
    }

    let elapsed = second.timestamp? - first.timestamp?;
    let elapsed_hours = elapsed.num_milliseconds() as f64 / 3_600_000.0;
    if elapsed_hours <= 0.0 {
        return None;
    }

    Some(SpeedEvent {
        plate: first.plate.clone(),
        from_reading: first.clone(),
        to_reading: second.clone(),
        distance_km,
        elapsed_hours,
        speed_kmh: distance_km / elapsed_hours,
    })
}

/// Reduce an event list to each plate's single fastest event, sorted
/// by speed descending (plate as tiebreaker).
pub fn fastest_per_plate(events: &[SpeedEvent]) -> Vec<SpeedEvent> {
    let mut best: HashMap<&str, &SpeedEvent> = HashMap::new();
    for event in events {
        match best.get(event.plate.as_str()) {
            Some(current) if current.speed_kmh >= event.speed_kmh => {}
            _ => {
                best.insert(event.plate.as_str(), event);
            }
        }
    }

    let mut digest: Vec<SpeedEvent> = best.into_values().cloned().collect();
    digest.sort_by(|a, b| {
        b.speed_kmh
            .partial_cmp(&a.speed_kmh)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.plate.cmp(&b.plate))
    });
    digest
}

fn group_by_plate(readings: &[Reading]) -> Vec<(String, Vec<&Reading>)> {
    let mut groups: HashMap<&str, Vec<&Reading>> = HashMap::new();
    for reading in readings {
        if reading.source == SourceType::Lpr && reading.has_required_fields() {
            groups.entry(reading.plate.as_str()).or_default().push(reading);
        }
    }

    // Scan order is irrelevant; the output is post-sorted.
    groups
        .into_iter()
        .filter(|(_, readings)| readings.len() >= 2)
        .map(|(plate, readings)| (plate.to_string(), readings))
        .collect()
}

fn plate_events(mut plate_readings: Vec<&Reading>, config: &SpeedConfig) -> Vec<SpeedEvent> {
    plate_readings.sort_by_key(|r| r.timestamp);

    plate_readings
        .windows(2)
        .filter_map(|pair| pair_speed(pair[0], pair[1], config))
        .filter(|event| event.speed_kmh > config.min_speed_kmh)
        .collect()
}

fn sort_events(events: &mut [SpeedEvent]) {
    events.sort_by(|a, b| {
        a.from_reading
            .timestamp
            .cmp(&b.from_reading.timestamp)
            .then_with(|| a.plate.cmp(&b.plate))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reader;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32, s: u32) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, m, s).single()
    }

    fn located(id: &str, plate: &str, time: Option<DateTime<Utc>>, road: &str, pk: &str) -> Reading {
        Reading::new(id, plate, time, format!("{road}-{pk}")).with_reader(Reader {
            name: Some(road.to_string()),
            road: Some(road.to_string()),
            milepost: Some(pk.to_string()),
        })
    }

    #[test]
    fn test_anomaly_above_threshold() {
        // 10 km in 6 minutes = 100 km/h
        let readings = vec![
            located("1", "1234ABC", at(10, 0, 0), "A-1", "PK10.0"),
            located("2", "1234ABC", at(10, 6, 0), "A-1", "PK20.0"),
        ];

        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(90.0)).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!((event.distance_km - 10.0).abs() < 1e-9);
        assert!((event.elapsed_hours - 0.1).abs() < 1e-9);
        assert!((event.speed_kmh - 100.0).abs() < 1e-6);

        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(110.0)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_ring_road_minor_arc() {
        // On a 32.5 km circle, PK2 to PK31 is 3.5 km, not 29
        let readings = vec![
            located("1", "1234ABC", at(10, 0, 0), "M-30", "PK2"),
            located("2", "1234ABC", at(10, 1, 0), "M-30", "PK31"),
        ];

        let config = SpeedConfig::with_madrid_ring_roads(0.0);
        let events = detect_speed_anomalies(&readings, &config).unwrap();
        assert_eq!(events.len(), 1);
        assert!((events[0].distance_km - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_non_ring_road_keeps_full_distance() {
        let readings = vec![
            located("1", "1234ABC", at(10, 0, 0), "A-1", "PK2"),
            located("2", "1234ABC", at(10, 1, 0), "A-1", "PK31"),
        ];

        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        assert_eq!(events.len(), 1);
        assert!((events[0].distance_km - 29.0).abs() < 1e-9);
    }

    #[test]
    fn test_pair_speed_symmetric() {
        let a = located("1", "1234ABC", at(10, 0, 0), "A-1", "PK10");
        let b = located("2", "1234ABC", at(10, 6, 0), "A-1", "PK20");
        let config = SpeedConfig::new(0.0);

        let forward = pair_speed(&a, &b, &config).unwrap();
        let backward = pair_speed(&b, &a, &config).unwrap();
        assert_eq!(forward.speed_kmh, backward.speed_kmh);
        assert_eq!(forward.from_reading.id, backward.from_reading.id);
    }

    #[test]
    fn test_different_roads_skipped() {
        let readings = vec![
            located("1", "1234ABC", at(10, 0, 0), "A-1", "PK10"),
            located("2", "1234ABC", at(10, 6, 0), "A-2", "PK20"),
        ];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_road_normalization_applies_before_comparison() {
        // "A1" and "A-1" are the same canonical road
        let readings = vec![
            located("1", "1234ABC", at(10, 0, 0), "A1", "PK10"),
            located("2", "1234ABC", at(10, 6, 0), "A-1", "PK20"),
        ];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_unparseable_location_skipped() {
        let readings = vec![
            Reading::new("1", "1234ABC", at(10, 0, 0), "camara centro"),
            located("2", "1234ABC", at(10, 6, 0), "A-1", "PK20"),
        ];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_zero_elapsed_skipped() {
        let readings = vec![
            located("1", "1234ABC", at(10, 0, 0), "A-1", "PK10"),
            located("2", "1234ABC", at(10, 0, 0), "A-1", "PK20"),
        ];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_single_reading_plate_skipped() {
        let readings = vec![located("1", "1234ABC", at(10, 0, 0), "A-1", "PK10")];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_only_adjacent_pairs_compared() {
        // Three readings: 0 -> 10 km in 6 min, 10 -> 11 km in 54 min.
        // The 0 -> 11 jump (non-adjacent) is never evaluated.
        let readings = vec![
            located("1", "1234ABC", at(10, 0, 0), "A-1", "PK0"),
            located("2", "1234ABC", at(10, 6, 0), "A-1", "PK10"),
            located("3", "1234ABC", at(11, 0, 0), "A-1", "PK11"),
        ];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(50.0)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from_reading.id, "1");
        assert_eq!(events[0].to_reading.id, "2");
    }

    #[test]
    fn test_output_order_deterministic() {
        let readings = vec![
            located("1", "BBB", at(10, 0, 0), "A-1", "PK0"),
            located("2", "BBB", at(10, 6, 0), "A-1", "PK10"),
            located("3", "AAA", at(9, 0, 0), "A-1", "PK0"),
            located("4", "AAA", at(9, 6, 0), "A-1", "PK10"),
        ];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        let plates: Vec<&str> = events.iter().map(|e| e.plate.as_str()).collect();
        assert_eq!(plates, vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let readings = vec![];
        assert!(matches!(
            detect_speed_anomalies(&readings, &SpeedConfig::new(-1.0)),
            Err(CorrelatorError::InvalidThreshold { .. })
        ));

        let config = SpeedConfig::new(0.0).with_ring_road("M-30", 0.0);
        assert!(matches!(
            detect_speed_anomalies(&readings, &config),
            Err(CorrelatorError::InvalidCircumference { .. })
        ));
    }

    #[test]
    fn test_fastest_per_plate() {
        let readings = vec![
            located("1", "AAA", at(9, 0, 0), "A-1", "PK0"),
            located("2", "AAA", at(9, 6, 0), "A-1", "PK10"),
            located("3", "AAA", at(9, 12, 0), "A-1", "PK25"),
            located("4", "BBB", at(9, 0, 0), "A-1", "PK0"),
            located("5", "BBB", at(9, 6, 0), "A-1", "PK12"),
        ];
        let events = detect_speed_anomalies(&readings, &SpeedConfig::new(0.0)).unwrap();
        assert_eq!(events.len(), 3);

        let digest = fastest_per_plate(&events);
        assert_eq!(digest.len(), 2);
        // AAA's best leg is 15 km in 6 min = 150 km/h; BBB's is 120
        assert_eq!(digest[0].plate, "AAA");
        assert!((digest[0].speed_kmh - 150.0).abs() < 1e-6);
        assert_eq!(digest[1].plate, "BBB");
        assert!((digest[1].speed_kmh - 120.0).abs() < 1e-6);
    }
}
