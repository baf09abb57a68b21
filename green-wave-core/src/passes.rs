//! Pass aggregation
//!
//! A pass is one green or red evaluation recorded at a named light. For a
//! given UTC day, consecutive passes of the same color at the same light are
//! merged into a single range; a color change starts a new range.

use crate::types::{LightState, Timestamp};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A recorded pass at a traffic light
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRecord {
    pub light_identifier: String,
    pub color: LightState,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_profile: Option<Value>,
}

/// A contiguous run of one color at one light
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightRange {
    pub light_identifier: String,
    pub color: LightState,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub day: NaiveDate,
}

/// The day aggregated when none is given: yesterday in UTC, so that the
/// current, still-filling day is never summarized
pub fn previous_utc_day() -> NaiveDate {
    (Utc::now() - Duration::days(1)).date_naive()
}

/// Merge the passes recorded on `day` into per-light color ranges
///
/// Lights are emitted in identifier order and ranges in time order.
/// Records whose color is `Tracking` are not passes and are skipped.
pub fn aggregate_ranges(passes: &[PassRecord], day: NaiveDate) -> Vec<LightRange> {
    let mut by_light: BTreeMap<&str, Vec<&PassRecord>> = BTreeMap::new();
    let mut skipped = 0usize;

    for pass in passes {
        if pass.timestamp.date_naive() != day {
            continue;
        }
        if !pass.color.is_pass() {
            skipped += 1;
            continue;
        }
        by_light
            .entry(pass.light_identifier.trim())
            .or_default()
            .push(pass);
    }

    if skipped > 0 {
        log::debug!("Skipped {} non-pass records for {}", skipped, day);
    }

    let mut ranges = Vec::new();

    for (light_identifier, mut items) in by_light {
        items.sort_by_key(|pass| pass.timestamp);

        let mut current: Option<LightRange> = None;
        for pass in items {
            match current.as_mut() {
                Some(range) if range.color == pass.color => range.end_time = pass.timestamp,
                _ => {
                    if let Some(finished) = current.take() {
                        ranges.push(finished);
                    }
                    current = Some(LightRange {
                        light_identifier: light_identifier.to_string(),
                        color: pass.color,
                        start_time: pass.timestamp,
                        end_time: pass.timestamp,
                        day,
                    });
                }
            }
        }

        if let Some(finished) = current {
            ranges.push(finished);
        }
    }

    log::info!("Aggregated {} ranges for {} passes on {}", ranges.len(), passes.len(), day);
    ranges
}

/// Ranges recorded for one light, earliest first
pub fn ranges_for_light(ranges: &[LightRange], light_identifier: &str) -> Vec<LightRange> {
    let light_identifier = light_identifier.trim();
    let mut matching: Vec<LightRange> = ranges
        .iter()
        .filter(|range| range.light_identifier == light_identifier)
        .cloned()
        .collect();
    matching.sort_by_key(|range| range.start_time);
    matching
}
