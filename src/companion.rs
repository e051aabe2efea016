//! Companion ("convoy") vehicle detection.
//!
//! A companion vehicle repeatedly passes the same reader sites as a
//! target plate within a short time window, ahead of it, behind it, or
//! simultaneously. This module finds those plates and classifies each
//! co-occurrence, leaving review ordering and flagging policy to the
//! caller.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{CorrelatorError, Result};
use crate::Reading;

/// Temporal relation of a companion reading to its target reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Companion passed before the target
    Ahead,
    /// Companion passed after the target
    Behind,
    /// Within the configured epsilon of the target
    Simultaneous,
}

/// Which temporal side of the target to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    Ahead,
    Behind,
    Both,
}

/// Configuration for companion detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Half-width of the co-occurrence window around each target
    /// reading, in minutes
    pub window_minutes: i64,

    /// Companion plates with fewer matches than this are dropped
    pub min_occurrences: usize,

    /// Gap in seconds within which a co-occurrence counts as
    /// simultaneous rather than ahead/behind. 0 requires exact
    /// timestamp equality.
    pub simultaneous_epsilon_seconds: i64,

    /// Temporal side of the target to search. Default: both
    pub direction: DirectionFilter,
}

impl CompanionConfig {
    pub fn new(window_minutes: i64, min_occurrences: usize) -> Self {
        Self {
            window_minutes,
            min_occurrences,
            simultaneous_epsilon_seconds: 0,
            direction: DirectionFilter::Both,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.window_minutes <= 0 {
            return Err(CorrelatorError::InvalidWindow {
                parameter: "window_minutes",
                value: self.window_minutes,
            });
        }
        if self.min_occurrences == 0 {
            return Err(CorrelatorError::InvalidMinOccurrences { value: 0 });
        }
        if self.simultaneous_epsilon_seconds < 0 {
            return Err(CorrelatorError::InvalidWindow {
                parameter: "simultaneous_epsilon_seconds",
                value: self.simultaneous_epsilon_seconds,
            });
        }
        Ok(())
    }
}

/// One co-occurrence of a companion reading with a target reading at
/// the same reader site on the same calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionMatch {
    pub target_reading: Reading,
    pub companion_reading: Reading,
    pub direction: Direction,
}

/// A companion plate with all of its matches, in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionGroup {
    pub companion_plate: String,
    pub matches: Vec<CompanionMatch>,
}

/// Per-plate recurrence summary over a companion match map.
///
/// Carries the inputs for the usual flagging policies: repeated
/// presence across calendar days, or several distinct sites in one day
/// with readings spread over a minimum interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionSummary {
    pub companion_plate: String,
    pub match_count: usize,
    /// Distinct calendar dates on which the companion co-occurred
    pub distinct_days: usize,
    /// Distinct reader sites across all matches
    pub distinct_readers: usize,
    /// True when some single day saw more than two distinct readers
    /// with companion readings at least the minimum separation apart
    pub spread_criterion_met: bool,
}

/// Find vehicles that repeatedly co-occur with `target_plate`.
///
/// Cleaned readings are partitioned into target readings (matching the
/// plate) and candidates (all others). A candidate matches a target
/// reading when both share the same `reader_id` and calendar date and
/// the candidate's timestamp falls inside the window on the configured
/// side of the target. Matching is exact on site and date; widening to
/// a spatial radius is deliberately out of scope.
///
/// Returns matches keyed by companion plate, each list ordered by
/// (target, companion) timestamp; plates with fewer than
/// `min_occurrences` matches are dropped. A target plate with zero
/// readings yields an empty map, not an error.
pub fn find_companions(
    readings: &[Reading],
    target_plate: &str,
    config: &CompanionConfig,
) -> Result<HashMap<String, Vec<CompanionMatch>>> {
    config.validate()?;

    let target_plate = target_plate.trim().to_uppercase();
    let (targets, candidate_index) = partition_readings(readings, &target_plate);
    if targets.is_empty() {
        debug!("[companion] no readings for target plate {}", target_plate);
        return Ok(HashMap::new());
    }

    let mut matches: HashMap<String, Vec<CompanionMatch>> = HashMap::new();
    for target in &targets {
        for m in target_matches(target, &candidate_index, config) {
            matches
                .entry(m.companion_reading.plate.clone())
                .or_default()
                .push(m);
        }
    }

    Ok(finalize_matches(matches, config.min_occurrences))
}

/// Parallel variant of [`find_companions`]: each target reading is
/// scanned independently on the rayon pool, then matches are merged
/// and re-sorted so the result is identical to the sequential one.
#[cfg(feature = "parallel")]
pub fn find_companions_parallel(
    readings: &[Reading],
    target_plate: &str,
    config: &CompanionConfig,
) -> Result<HashMap<String, Vec<CompanionMatch>>> {
    config.validate()?;

    let target_plate = target_plate.trim().to_uppercase();
    let (targets, candidate_index) = partition_readings(readings, &target_plate);
    if targets.is_empty() {
        return Ok(HashMap::new());
    }

    let per_target: Vec<Vec<CompanionMatch>> = targets
        .par_iter()
        .map(|target| target_matches(target, &candidate_index, config))
        .collect();

    let mut matches: HashMap<String, Vec<CompanionMatch>> = HashMap::new();
    for m in per_target.into_iter().flatten() {
        matches
            .entry(m.companion_reading.plate.clone())
            .or_default()
            .push(m);
    }

    Ok(finalize_matches(matches, config.min_occurrences))
}

/// [`find_companions`] materialized as groups sorted by match count
/// descending (review priority), plate ascending as tiebreaker.
pub fn find_companion_groups(
    readings: &[Reading],
    target_plate: &str,
    config: &CompanionConfig,
) -> Result<Vec<CompanionGroup>> {
    let matches = find_companions(readings, target_plate, config)?;

    let mut groups: Vec<CompanionGroup> = matches
        .into_iter()
        .map(|(companion_plate, matches)| CompanionGroup {
            companion_plate,
            matches,
        })
        .collect();

    groups.sort_by(|a, b| {
        b.matches
            .len()
            .cmp(&a.matches.len())
            .then_with(|| a.companion_plate.cmp(&b.companion_plate))
    });

    Ok(groups)
}

/// Summarize a companion match map for flagging.
///
/// `min_separation_minutes` is the minimum spread between two companion
/// readings on one day for the multi-reader criterion. Summaries are
/// sorted by match count descending, plate ascending.
pub fn summarize_companions(
    matches: &HashMap<String, Vec<CompanionMatch>>,
    min_separation_minutes: i64,
) -> Vec<CompanionSummary> {
    let mut summaries: Vec<CompanionSummary> = matches
        .iter()
        .map(|(plate, plate_matches)| summarize_plate(plate, plate_matches, min_separation_minutes))
        .collect();

    summaries.sort_by(|a, b| {
        b.match_count
            .cmp(&a.match_count)
            .then_with(|| a.companion_plate.cmp(&b.companion_plate))
    });
    summaries
}

type CandidateIndex<'a> = HashMap<(&'a str, NaiveDate), Vec<&'a Reading>>;

fn partition_readings<'a>(
    readings: &'a [Reading],
    target_plate: &str,
) -> (Vec<&'a Reading>, CandidateIndex<'a>) {
    let mut targets = Vec::new();
    let mut index: CandidateIndex = HashMap::new();

    for reading in readings {
        if !reading.has_required_fields() {
            continue;
        }
        if reading.plate == target_plate {
            targets.push(reading);
        } else if let Some(ts) = reading.timestamp {
            index
                .entry((reading.reader_id.as_str(), ts.date_naive()))
                .or_default()
                .push(reading);
        }
    }

    (targets, index)
}

fn target_matches<'a>(
    target: &'a Reading,
    candidates: &CandidateIndex<'a>,
    config: &CompanionConfig,
) -> Vec<CompanionMatch> {
    let target_ts = match target.timestamp {
        Some(t) => t,
        None => return Vec::new(),
    };

    let window = chrono::Duration::minutes(config.window_minutes);
    let (start, end) = match config.direction {
        DirectionFilter::Ahead => (target_ts - window, target_ts),
        DirectionFilter::Behind => (target_ts, target_ts + window),
        DirectionFilter::Both => (target_ts - window, target_ts + window),
    };

    let key = (target.reader_id.as_str(), target_ts.date_naive());
    let Some(site_candidates) = candidates.get(&key) else {
        return Vec::new();
    };

    site_candidates
        .iter()
        .filter_map(|candidate| {
            let ts = candidate.timestamp?;
            if ts < start || ts > end {
                return None;
            }

            let delta = (ts - target_ts).num_seconds();
            let direction = if delta < -config.simultaneous_epsilon_seconds {
                Direction::Ahead
            } else if delta > config.simultaneous_epsilon_seconds {
                Direction::Behind
            } else {
                Direction::Simultaneous
            };

            Some(CompanionMatch {
                target_reading: target.clone(),
                companion_reading: (*candidate).clone(),
                direction,
            })
        })
        .collect()
}

fn finalize_matches(
    mut matches: HashMap<String, Vec<CompanionMatch>>,
    min_occurrences: usize,
) -> HashMap<String, Vec<CompanionMatch>> {
    matches.retain(|_, plate_matches| plate_matches.len() >= min_occurrences);
    for plate_matches in matches.values_mut() {
        plate_matches.sort_by(|a, b| {
            a.target_reading
                .timestamp
                .cmp(&b.target_reading.timestamp)
                .then_with(|| a.companion_reading.timestamp.cmp(&b.companion_reading.timestamp))
        });
    }

    debug!("[companion] {} companion plates retained", matches.len());
    matches
}

fn summarize_plate(
    plate: &str,
    plate_matches: &[CompanionMatch],
    min_separation_minutes: i64,
) -> CompanionSummary {
    let mut by_day: HashMap<NaiveDate, Vec<&CompanionMatch>> = HashMap::new();
    let mut readers: BTreeSet<&str> = BTreeSet::new();

    for m in plate_matches {
        if let Some(ts) = m.companion_reading.timestamp {
            by_day.entry(ts.date_naive()).or_default().push(m);
        }
        readers.insert(m.companion_reading.reader_id.as_str());
    }

    let min_separation = chrono::Duration::minutes(min_separation_minutes);
    let spread_criterion_met = by_day.values().any(|day_matches| {
        let day_readers: BTreeSet<&str> = day_matches
            .iter()
            .map(|m| m.companion_reading.reader_id.as_str())
            .collect();
        if day_readers.len() <= 2 {
            return false;
        }

        let times: Vec<_> = day_matches
            .iter()
            .filter_map(|m| m.companion_reading.timestamp)
            .collect();
        times
            .iter()
            .enumerate()
            .any(|(i, &a)| times[i + 1..].iter().any(|&b| (b - a).abs() >= min_separation))
    });

    CompanionSummary {
        companion_plate: plate.to_string(),
        match_count: plate_matches.len(),
        distinct_days: by_day.len(),
        distinct_readers: readers.len(),
        spread_criterion_met,
    }
}
