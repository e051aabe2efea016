//! # ANPR Correlator
//!
//! Temporal and spatial correlation engine for ANPR/LPR plate-reading
//! streams.
//!
//! This library provides:
//! - Exact and near-duplicate removal for noisy reading streams
//! - Consolidation of multi-lane detections into single crossing events
//! - Point-to-point speed anomaly detection, ring roads included
//! - Companion ("convoy") vehicle detection around a target plate
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use anpr_correlator::{consolidate, ConsolidationConfig, Reader, Reading};
//! use chrono::{TimeZone, Utc};
//!
//! let reader = |lane: &str| Reader {
//!     name: Some(format!("A1 {lane}")),
//!     road: None,
//!     milepost: None,
//! };
//!
//! // One physical crossing, seen by two lane cameras
//! let readings = vec![
//!     Reading::new("1", "9999XYZ", Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).single(), "A1")
//!         .with_reader(reader("C1")),
//!     Reading::new("2", "9999XYZ", Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 1).single(), "A1")
//!         .with_reader(reader("C2")),
//! ];
//!
//! let groups = consolidate(&readings, &ConsolidationConfig::default());
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].lanes_detected, vec!["C1", "C2"]);
//! ```
//!
//! The engine is a pure, synchronous batch computation over in-memory
//! slices: fetching, pagination, persistence and presentation are the
//! caller's concern. The cleaned stream from [`clean_readings`] feeds
//! the flat review, speed and companion branches; lane consolidation
//! takes raw (or exact-deduplicated) readings, because the
//! near-duplicate filter would eat the very bursts it folds. All
//! outputs are immutable value records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{CorrelatorError, Result};

// Free-form reader/location string parsing
pub mod locator;

// Exact duplicate removal
pub mod dedup;
pub use dedup::dedup_exact;

// Near-duplicate filtering
pub mod similarity;
pub use similarity::{remove_near_duplicates, SimilarityConfig};

// Multi-lane crossing consolidation
pub mod consolidation;
pub use consolidation::{consolidate, ConsolidatedGroup, ConsolidationConfig, SortOrder};

// Point-to-point speed anomaly detection
pub mod speed;
#[cfg(feature = "parallel")]
pub use speed::detect_speed_anomalies_parallel;
pub use speed::{detect_speed_anomalies, fastest_per_plate, pair_speed, SpeedConfig, SpeedEvent};

// Companion ("convoy") vehicle detection
pub mod companion;
#[cfg(feature = "parallel")]
pub use companion::find_companions_parallel;
pub use companion::{
    find_companion_groups, find_companions, summarize_companions, CompanionConfig, CompanionGroup,
    CompanionMatch, CompanionSummary, Direction, DirectionFilter,
};

// Cleaning pipeline (dedup -> similarity) with observability counts
pub mod pipeline;
pub use pipeline::{clean_readings, CleaningReport};

// ============================================================================
// Core Types
// ============================================================================

/// Sensor class that produced a reading.
///
/// Only LPR readings participate in lane consolidation and speed
/// analysis; GPS readings flow through cleaning untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Lpr,
    Gps,
}

/// Optional reader-site metadata attached to a reading.
///
/// Upstream sources treat reader records as loosely shaped; every field
/// may be absent. Fallback rules are explicit at each use site rather
/// than baked into the type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reader {
    /// Site name, possibly carrying a lane suffix (e.g. `"A1 C2"`)
    pub name: Option<String>,
    /// Explicit road field (e.g. `"M-30"`), free-form
    pub road: Option<String>,
    /// Explicit milepost field (e.g. `"PK25.800"`), free-form
    pub milepost: Option<String>,
}

/// One detection event.
///
/// `plate` and `timestamp` are required for any correlation; a reading
/// missing either is excluded from every downstream computation but is
/// never mutated or deleted from the input set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Unique, stable identifier; never reused
    pub id: String,
    /// Normalized uppercase plate; empty when the source lacked one
    pub plate: String,
    /// Detection time; `None` when the upstream value failed to parse
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-form sensor identifier (may encode road, milepost and lane,
    /// e.g. `"M30-PK25.800-C3"`)
    pub reader_id: String,
    /// Optional reader-site metadata
    pub reader: Option<Reader>,
    /// Sensor class
    pub source: SourceType,
}

impl Reading {
    /// Create an LPR reading with no reader metadata. The plate is
    /// trimmed and uppercased on the way in.
    pub fn new(
        id: impl Into<String>,
        plate: &str,
        timestamp: Option<DateTime<Utc>>,
        reader_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            plate: plate.trim().to_uppercase(),
            timestamp,
            reader_id: reader_id.into(),
            reader: None,
            source: SourceType::Lpr,
        }
    }

    /// Attach reader-site metadata.
    pub fn with_reader(mut self, reader: Reader) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Override the sensor class.
    pub fn with_source(mut self, source: SourceType) -> Self {
        self.source = source;
        self
    }

    /// Whether the reading carries both fields every correlation needs.
    pub fn has_required_fields(&self) -> bool {
        !self.plate.is_empty() && self.timestamp.is_some()
    }

    /// The reader-site name from metadata, if present.
    pub fn reader_name(&self) -> Option<&str> {
        self.reader.as_ref().and_then(|r| r.name.as_deref())
    }
}

/// Canonical location produced by the locator parser: normalized road
/// code and kilometer milepost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLocation {
    /// Normalized road code, uppercase `TYPE-NUMBER` form (e.g. `M-30`)
    pub road: String,
    /// Kilometer value, always >= 0
    pub milepost_km: f64,
}

// ============================================================================
// Tests
// ============================================================================
