//! Free-form reader/location string parsing.
//!
//! Reader sites are identified by loosely formatted strings that may
//! embed a road code, a milepost marker and a lane designator in one
//! identifier (e.g. `"M30-PK25.800-C3"`), or carry them as separate
//! optional metadata fields. This module turns those strings into
//! canonical `(road, milepost)` pairs.
//!
//! Parsing is deterministic and never guesses: an input that doesn't
//! match yields `None`, so callers can distinguish "milepost 0" from
//! "unparseable". Road parsing is the one exception: an unmatched
//! non-empty string falls back to its trimmed uppercase form, because
//! road identity is only ever used for equality comparison.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{CanonicalLocation, Reading};

/// Milepost ("PK") notation: optional `PK`/`P.K.` prefix, kilometers,
/// optional fractional meters after `.`, `,` or `+`.
static MILEPOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:PK|P\.K\.)?\s*(\d+)(?:[.,+](\d+))?").unwrap());

/// Road code: leading letter group and digit group, e.g. `A1`, `M-40`.
static ROAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]+)[\s-]*(\d+)").unwrap());

/// Lane suffix on a reader name: whitespace + `C` + digits at the end.
static LANE_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+C\d+$").unwrap());

/// Bare lane token at the end of a reader name.
static LANE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"C\d+$").unwrap());

/// First letters+digits block in a combined reader identifier.
static READER_ROAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[A-Z]+\d+").unwrap());

/// `PK<number>` block in a combined reader identifier.
static READER_MILEPOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PK\s*(\d+[.,+]?\d*)").unwrap());

/// Parse a milepost string into kilometers.
///
/// The fractional part is treated as meters and right-padded to three
/// digits before conversion, so `"25+8"` means 25 km + 800 m = 25.8 km.
///
/// Returns `None` when no milepost notation is found, never a default
/// of zero for an unparseable string.
///
/// # Example
/// ```
/// use anpr_correlator::locator::parse_milepost;
///
/// assert_eq!(parse_milepost("PK25.800"), Some(25.8));
/// assert_eq!(parse_milepost("25+8"), Some(25.8));
/// assert_eq!(parse_milepost("sin datos"), None);
/// ```
pub fn parse_milepost(raw: &str) -> Option<f64> {
    let normalized = raw.trim().to_uppercase();
    if normalized.is_empty() {
        return None;
    }

    let caps = MILEPOST_RE.captures(&normalized)?;
    let kilometers: u64 = caps[1].parse().ok()?;

    let meters = match caps.get(2) {
        Some(frac) => {
            let mut digits = frac.as_str().to_string();
            while digits.len() < 3 {
                digits.push('0');
            }
            digits.parse::<f64>().ok()?
        }
        None => 0.0,
    };

    Some(kilometers as f64 + meters / 1000.0)
}

/// Normalize a road string to `TYPE-NUMBER` uppercase form.
///
/// `"A1"` and `"a 1"` both become `"A-1"`; trailing decoration is
/// dropped (`"M-40 (Madrid)"` → `"M-40"`). Input that doesn't look like
/// a road code at all is returned trimmed and uppercased as a fallback
/// equality token. Only blank input yields `None`.
pub fn parse_road(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_uppercase();
    if normalized.is_empty() {
        return None;
    }

    match ROAD_RE.captures(&normalized) {
        Some(caps) => Some(format!("{}-{}", &caps[1], &caps[2])),
        None => Some(normalized),
    }
}

/// Strip a trailing lane suffix (`" C<digits>"`) from a reader name,
/// recovering the base identity shared by all lanes of one physical
/// site. Names without a lane suffix are returned unchanged.
pub fn strip_lane_suffix(name: &str) -> &str {
    match LANE_SUFFIX_RE.find(name) {
        Some(m) => &name[..m.start()],
        None => name,
    }
}

/// Extract the lane token (`C<digits>`) from the end of a reader name,
/// if present.
pub fn lane_token(name: &str) -> Option<&str> {
    LANE_TOKEN_RE.find(name).map(|m| m.as_str())
}

/// Best-effort extraction of `(road, milepost)` raw tokens from a
/// combined reader identifier, for readings whose explicit metadata
/// fields are absent.
pub fn extract_from_reader_id(id: &str) -> (Option<String>, Option<String>) {
    let road = READER_ROAD_RE.find(id).map(|m| m.as_str().to_uppercase());
    let milepost = READER_MILEPOST_RE
        .captures(id)
        .map(|caps| caps[1].replace(',', ".").replace('+', "."));
    (road, milepost)
}

/// Resolve a reading's canonical location.
///
/// Explicit `Reader` metadata fields take precedence; missing fields
/// are filled by extraction from the combined `reader_id`. Returns
/// `None` unless both a road and a milepost resolve; downstream
/// stages treat that as "cannot compare".
pub fn resolve_location(reading: &Reading) -> Option<CanonicalLocation> {
    let meta = reading.reader.as_ref();
    let explicit_road = meta
        .and_then(|r| r.road.as_deref())
        .filter(|s| !s.trim().is_empty());
    let explicit_milepost = meta
        .and_then(|r| r.milepost.as_deref())
        .filter(|s| !s.trim().is_empty());

    let (extracted_road, extracted_milepost) =
        if explicit_road.is_none() || explicit_milepost.is_none() {
            extract_from_reader_id(&reading.reader_id)
        } else {
            (None, None)
        };

    let road_raw = explicit_road
        .map(str::to_string)
        .or(extracted_road)?;
    let milepost_raw = explicit_milepost
        .map(str::to_string)
        .or(extracted_milepost)?;

    let road = parse_road(&road_raw)?;
    let milepost_km = parse_milepost(&milepost_raw)?;

    Some(CanonicalLocation { road, milepost_km })
}
