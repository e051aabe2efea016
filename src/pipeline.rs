//! Cleaning pipeline: exact dedup followed by near-duplicate
//! filtering, with counts for observability.
//!
//! The cleaned stream feeds the flat review and the speed and
//! companion branches; each reads it without mutating it, so they can
//! run in any order or in parallel. Lane consolidation takes the raw
//! stream instead (it deduplicates by id itself), because the
//! near-duplicate filter would remove the multi-lane bursts it folds.

use log::info;
use serde::{Deserialize, Serialize};

use crate::dedup::dedup_exact;
use crate::similarity::{remove_near_duplicates, SimilarityConfig};
use crate::Reading;

/// Counts from one cleaning run. Empty inputs and zero removals are
/// ordinary outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    /// Readings received
    pub input_count: usize,
    /// Exact duplicates (repeated ids) removed
    pub exact_duplicates_removed: usize,
    /// Near-duplicates (same plate/site, tight time window) removed
    pub near_duplicates_removed: usize,
    /// Readings kept in the cleaned stream that lack a plate or
    /// timestamp; they stay in the stream but no downstream stage
    /// will use them
    pub missing_field_count: usize,
    /// Readings in the cleaned stream
    pub output_count: usize,
}

/// Run the cleaning pipeline: exact dedup, then the near-duplicate
/// filter. Returns the cleaned stream and a report of what was
/// removed.
pub fn clean_readings(
    readings: &[Reading],
    similarity: &SimilarityConfig,
) -> (Vec<Reading>, CleaningReport) {
    let deduped = dedup_exact(readings);
    let cleaned = remove_near_duplicates(&deduped, similarity);

    let report = CleaningReport {
        input_count: readings.len(),
        exact_duplicates_removed: readings.len() - deduped.len(),
        near_duplicates_removed: deduped.len() - cleaned.len(),
        missing_field_count: cleaned.iter().filter(|r| !r.has_required_fields()).count(),
        output_count: cleaned.len(),
    };

    info!(
        "[pipeline] cleaned {} -> {} readings ({} exact, {} near duplicates removed, {} unusable)",
        report.input_count,
        report.output_count,
        report.exact_duplicates_removed,
        report.near_duplicates_removed,
        report.missing_field_count,
    );

    (cleaned, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reader;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(s: u32) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, s).single()
    }

    fn reading(id: &str, plate: &str, time: Option<DateTime<Utc>>, name: &str) -> Reading {
        Reading::new(id, plate, time, name).with_reader(Reader {
            name: Some(name.to_string()),
            road: None,
            milepost: None,
        })
    }

    #[test]
    fn test_report_counts() {
        let readings = vec![
            reading("1", "1234ABC", ts(0), "M30 C1"),
            reading("1", "1234ABC", ts(0), "M30 C1"), // exact duplicate
            reading("2", "1234ABC", ts(3), "M30 C2"), // near duplicate
            reading("3", "5678DEF", ts(4), "M30 C1"),
            reading("4", "", ts(5), "M30 C1"), // unusable downstream
        ];

        let (cleaned, report) = clean_readings(&readings, &SimilarityConfig::default());
        assert_eq!(report.input_count, 5);
        assert_eq!(report.exact_duplicates_removed, 1);
        assert_eq!(report.near_duplicates_removed, 1);
        assert_eq!(report.missing_field_count, 1);
        assert_eq!(report.output_count, 3);
        assert_eq!(cleaned.len(), 3);
    }

    #[test]
    fn test_clean_stream_is_stable() {
        let readings = vec![
            reading("1", "1234ABC", ts(0), "M30 C1"),
            reading("2", "5678DEF", ts(10), "M30 C1"),
        ];

        let (cleaned, _) = clean_readings(&readings, &SimilarityConfig::default());
        let (again, report) = clean_readings(&cleaned, &SimilarityConfig::default());
        assert_eq!(cleaned, again);
        assert_eq!(report.exact_duplicates_removed, 0);
        assert_eq!(report.near_duplicates_removed, 0);
    }

    #[test]
    fn test_empty_input() {
        let (cleaned, report) = clean_readings(&[], &SimilarityConfig::default());
        assert!(cleaned.is_empty());
        assert_eq!(report.input_count, 0);
        assert_eq!(report.output_count, 0);
    }
}
