//! Multi-lane crossing consolidation.
//!
//! A gantry with several lanes reports one physical crossing as several
//! readings, one per lane camera, within a couple of seconds. This
//! module folds those into a single consolidated event per crossing,
//! keyed by plate and base reader identity (lane suffix stripped).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::dedup::dedup_exact;
use crate::locator::{lane_token, strip_lane_suffix};
use crate::{Reading, SourceType};

/// Site name used when a reading carries no reader metadata at all.
/// Readings without a name still consolidate against each other.
pub const UNKNOWN_READER: &str = "Desconocido";

/// Output ordering of consolidated groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Most recent crossing first (investigative review default)
    NewestFirst,
    /// Chronological
    OldestFirst,
}

/// Configuration for lane consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Maximum distance in seconds between a reading and its group's
    /// anchor (the first member's timestamp, not a sliding bound).
    /// Default: 2
    pub max_gap_seconds: i64,

    /// Output ordering. Default: newest first
    pub sort: SortOrder,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_gap_seconds: 2,
            sort: SortOrder::NewestFirst,
        }
    }
}

/// One consolidated crossing event.
///
/// All members share `plate` and `base_reader_id`; consecutive members
/// in time order are within the configured gap of the group anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedGroup {
    /// Reader identity with the lane suffix stripped
    pub base_reader_id: String,
    /// Chronologically earliest member, used for display fields
    pub representative: Reading,
    /// Sorted, de-duplicated lane tokens seen across members
    pub lanes_detected: Vec<String>,
    /// All raw readings folded into this group, in time order
    pub members: Vec<Reading>,
    /// Seconds between first and last member
    pub span_seconds: i64,
}

struct OpenGroup {
    anchor: DateTime<Utc>,
    members: Vec<Reading>,
}

/// Consolidate multi-lane detections of one physical crossing.
///
/// Only LPR readings with a plate and timestamp participate. Exact
/// duplicates (repeated ids) are removed internally, so raw input is
/// accepted. The near-duplicate filter is deliberately NOT applied on
/// this branch: the multi-lane bursts it would remove are exactly what
/// consolidation folds into one event.
///
/// A reading joins an open group when plate and base reader id match
/// and its timestamp is within `max_gap_seconds` of the group's anchor;
/// otherwise it opens a new group. Single-member groups pass through
/// as groups of one.
pub fn consolidate(readings: &[Reading], config: &ConsolidationConfig) -> Vec<ConsolidatedGroup> {
    let deduplicated = dedup_exact(readings);
    let mut eligible: Vec<&Reading> = deduplicated
        .iter()
        .filter(|r| r.source == SourceType::Lpr && r.has_required_fields())
        .collect();
    eligible.sort_by_key(|r| r.timestamp);

    let mut groups: Vec<OpenGroup> = Vec::new();
    // (plate, base reader id) -> indices into `groups`
    let mut index: HashMap<(String, String), Vec<usize>> = HashMap::new();

    for reading in eligible {
        let base = strip_lane_suffix(reading.reader_name().unwrap_or(UNKNOWN_READER)).to_string();
        let timestamp = match reading.timestamp {
            Some(t) => t,
            None => continue,
        };

        let key = (reading.plate.clone(), base);
        let group_ids = index.entry(key).or_default();

        let joined = group_ids.iter().copied().find(|&i| {
            (timestamp - groups[i].anchor).num_seconds().abs() <= config.max_gap_seconds
        });

        match joined {
            Some(i) => groups[i].members.push(reading.clone()),
            None => {
                groups.push(OpenGroup {
                    anchor: timestamp,
                    members: vec![reading.clone()],
                });
                group_ids.push(groups.len() - 1);
            }
        }
    }

    let mut consolidated: Vec<ConsolidatedGroup> = groups
        .into_iter()
        .map(|group| build_group(group.members))
        .collect();

    match config.sort {
        SortOrder::NewestFirst => {
            consolidated.sort_by(|a, b| b.representative.timestamp.cmp(&a.representative.timestamp))
        }
        SortOrder::OldestFirst => {
            consolidated.sort_by(|a, b| a.representative.timestamp.cmp(&b.representative.timestamp))
        }
    }

    debug!("[consolidation] {} groups built", consolidated.len());
    consolidated
}

fn build_group(members: Vec<Reading>) -> ConsolidatedGroup {
    let representative = members[0].clone();
    let base_reader_id =
        strip_lane_suffix(representative.reader_name().unwrap_or(UNKNOWN_READER)).to_string();

    let mut lanes: Vec<String> = members
        .iter()
        .filter_map(|m| m.reader_name().and_then(lane_token))
        .map(str::to_string)
        .collect();
    lanes.sort();
    lanes.dedup();

    let span_seconds = match (members.first().and_then(|m| m.timestamp), members.last().and_then(|m| m.timestamp)) {
        (Some(first), Some(last)) => (last - first).num_seconds(),
        _ => 0,
    };

    ConsolidatedGroup {
        base_reader_id,
        representative,
        lanes_detected: lanes,
        members,
        span_seconds,
    }
}
