use crate::chart::types::{Bar, SeriesPoint};
use std::collections::BTreeMap;
use tracing::warn;

/// Largest gap, in slots, that is padded with placeholders. Wider gaps (typically a bar time
/// sent in the wrong unit) are bridged without any.
pub const MAX_GAP_SLOTS: i64 = 10_000;

/// Placeholders strictly between `prev_time` and `next_time`, one per full timeframe slot
/// that fits before `next_time`.
fn aligned_placeholders(prev_time: i64, next_time: i64, timeframe_secs: i64) -> Vec<SeriesPoint> {
    if timeframe_secs <= 0 || next_time <= prev_time {
        return Vec::new();
    }

    let slots = next_time.saturating_sub(prev_time) / timeframe_secs - 1;
    if slots > MAX_GAP_SLOTS {
        warn!(
            prev_time,
            next_time,
            timeframe_secs,
            slots,
            max_slots = MAX_GAP_SLOTS,
            "gap too wide; skipping placeholders"
        );
        return Vec::new();
    }

    (1..=slots)
        .map(|step| SeriesPoint::Placeholder {
            time: prev_time + step * timeframe_secs,
        })
        .collect()
}

/// Deduplicate by time (later entries win), sort ascending and pad every missing aligned slot
/// between consecutive bars with a placeholder.
pub fn fill_series(bars: &[Bar], timeframe_secs: i64) -> Vec<SeriesPoint> {
    let deduped: BTreeMap<i64, Bar> = bars.iter().map(|bar| (bar.time, *bar)).collect();
    let mut output = Vec::with_capacity(deduped.len());
    let mut last_time: Option<i64> = None;

    for (time, bar) in deduped {
        if let Some(prev_time) = last_time {
            output.extend(aligned_placeholders(prev_time, time, timeframe_secs));
        }
        output.push(SeriesPoint::Bar(bar));
        last_time = Some(time);
    }

    output
}

/// Placeholders needed before appending a bar at `next_time` after `prev_time`.
pub fn gap_between(
    prev_time: Option<i64>,
    next_time: Option<i64>,
    timeframe_secs: i64,
) -> Vec<SeriesPoint> {
    let (Some(prev_time), Some(next_time)) = (prev_time, next_time) else {
        return Vec::new();
    };
    if timeframe_secs <= 0 || next_time <= prev_time.saturating_add(timeframe_secs) {
        return Vec::new();
    }

    aligned_placeholders(prev_time, next_time, timeframe_secs)
}
