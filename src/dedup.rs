//! Exact duplicate removal.
//!
//! Raw exports frequently contain the same detection twice (overlapping
//! file imports, retried uploads). Identity is the reading id, which is
//! unique and never reused, so the first occurrence wins.

use std::collections::HashSet;

use log::debug;

use crate::Reading;

/// Remove exact duplicate readings by unique identifier.
///
/// Later occurrences of an already-seen id are discarded; first-seen
/// order is preserved. Running the function on its own output returns
/// it unchanged.
///
/// # Example
/// ```
/// use anpr_correlator::{dedup_exact, Reading};
///
/// let readings = vec![
///     Reading::new("101", "1234ABC", None, "M30 C1"),
///     Reading::new("101", "1234ABC", None, "M30 C1"),
/// ];
/// assert_eq!(dedup_exact(&readings).len(), 1);
/// ```
pub fn dedup_exact(readings: &[Reading]) -> Vec<Reading> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(readings.len());
    let mut unique = Vec::with_capacity(readings.len());
    let mut removed = 0usize;

    for reading in readings {
        if seen.insert(reading.id.as_str()) {
            unique.push(reading.clone());
        } else {
            removed += 1;
            debug!(
                "[dedup] duplicate dropped: id={}, plate={}",
                reading.id, reading.plate
            );
        }
    }

    if removed > 0 {
        debug!("[dedup] {} duplicates removed, {} kept", removed, unique.len());
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: &str, plate: &str) -> Reading {
        Reading::new(id, plate, None, "M30 C1")
    }

    #[test]
    fn test_exact_duplicate_removed() {
        let readings = vec![reading("101", "1234ABC"), reading("101", "1234ABC")];
        let deduped = dedup_exact(&readings);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].id, "101");
    }

    #[test]
    fn test_first_seen_order_preserved() {
        let readings = vec![
            reading("3", "AAA"),
            reading("1", "BBB"),
            reading("3", "AAA"),
            reading("2", "CCC"),
            reading("1", "BBB"),
        ];
        let deduped = dedup_exact(&readings);
        let ids: Vec<&str> = deduped.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_idempotent() {
        let readings = vec![
            reading("1", "AAA"),
            reading("2", "BBB"),
            reading("1", "AAA"),
        ];
        let once = dedup_exact(&readings);
        let twice = dedup_exact(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedup_exact(&[]).is_empty());
    }
}
