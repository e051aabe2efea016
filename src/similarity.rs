//! Near-duplicate filtering.
//!
//! Physical readers re-trigger on borderline detections, producing
//! bursts of almost-identical readings that share a plate and a site
//! but carry distinct ids, so exact dedup doesn't catch them. A short
//! look-back over already-accepted readings catches the burst pattern
//! without requiring global memory.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::locator::strip_lane_suffix;
use crate::Reading;

/// Configuration for the near-duplicate filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// How many already-accepted readings each candidate is compared
    /// against. Bounds cost, not correctness; whether a larger or
    /// adaptive window catches more duplicates in high-traffic
    /// corridors is an open tuning question. Default: 5
    pub lookback: usize,

    /// Maximum gap in seconds for two same-plate, same-site readings to
    /// count as one detection. Default: 5
    pub max_gap_seconds: i64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            lookback: 5,
            max_gap_seconds: 5,
        }
    }
}

/// Remove near-duplicate readings: same plate, same base reader (lane
/// suffix stripped, non-empty), timestamps within `max_gap_seconds`.
///
/// Readings are re-sorted ascending by timestamp internally. Each
/// candidate is compared against the last `lookback` accepted readings
/// only; the first match drops the candidate (never merges it).
/// Readings missing a plate or timestamp cannot match anything and are
/// appended to the output untouched.
pub fn remove_near_duplicates(readings: &[Reading], config: &SimilarityConfig) -> Vec<Reading> {
    if readings.len() <= 1 {
        return readings.to_vec();
    }

    let (mut comparable, other): (Vec<&Reading>, Vec<&Reading>) = readings
        .iter()
        .partition(|r| r.has_required_fields());
    comparable.sort_by_key(|r| r.timestamp);

    let mut accepted: Vec<&Reading> = Vec::with_capacity(comparable.len());
    let mut removed = 0usize;

    for candidate in comparable {
        let window_start = accepted.len().saturating_sub(config.lookback);
        let is_duplicate = accepted[window_start..]
            .iter()
            .any(|prior| is_near_duplicate(candidate, prior, config.max_gap_seconds));

        if is_duplicate {
            removed += 1;
            debug!(
                "[similarity] near-duplicate dropped: id={}, plate={}",
                candidate.id, candidate.plate
            );
        } else {
            accepted.push(candidate);
        }
    }

    if removed > 0 {
        debug!("[similarity] {} near-duplicates removed", removed);
    }

    accepted
        .into_iter()
        .chain(other)
        .cloned()
        .collect()
}

fn is_near_duplicate(candidate: &Reading, prior: &Reading, max_gap_seconds: i64) -> bool {
    if candidate.plate != prior.plate {
        return false;
    }

    let candidate_base = strip_lane_suffix(candidate.reader_name().unwrap_or(""));
    let prior_base = strip_lane_suffix(prior.reader_name().unwrap_or(""));
    if candidate_base.is_empty() || candidate_base != prior_base {
        return false;
    }

    match (candidate.timestamp, prior.timestamp) {
        (Some(a), Some(b)) => (a - b).num_seconds().abs() <= max_gap_seconds,
        _ => false,
    }
}
