use crate::chart::gaps::{fill_series, gap_between};
use crate::chart::normalize::{normalize, normalize_bars};
use crate::chart::types::{
    Bar, SeriesPoint, SeriesSnapshot, SeriesUpdate, SubscriptionKey, VolumePoint,
};
use crate::chart::wire::WireValue;
use std::collections::HashMap;
use tracing::{debug, info_span};

/// Reconciliation state of one subscription key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionState {
    recent_bars: Vec<Bar>,
    last_known_bar_time: Option<i64>,
}

impl SubscriptionState {
    pub fn recent_bars(&self) -> &[Bar] {
        &self.recent_bars
    }

    pub fn last_known_bar_time(&self) -> Option<i64> {
        self.last_known_bar_time
    }

    fn replace_recent(&mut self, points: &[SeriesPoint], capacity: usize) {
        let real: Vec<Bar> = points.iter().filter_map(SeriesPoint::as_bar).copied().collect();
        let skip = real.len().saturating_sub(capacity);
        self.recent_bars = real.into_iter().skip(skip).collect();
    }

    fn upsert_recent(&mut self, bar: Bar, capacity: usize) {
        match self
            .recent_bars
            .binary_search_by_key(&bar.time, |cached| cached.time)
        {
            Ok(index) => self.recent_bars[index] = bar,
            Err(index) => self.recent_bars.insert(index, bar),
        }

        let overflow = self.recent_bars.len().saturating_sub(capacity);
        if overflow > 0 {
            self.recent_bars.drain(..overflow);
        }
    }
}

/// Per-key reconciliation of snapshots and incremental bar updates.
///
/// Every operation is applied to the key carried by the message, never to whatever key is
/// currently on screen; a key's state is only dropped by [`SubscriptionRegistry::reset`] or
/// [`SubscriptionRegistry::clear`].
#[derive(Debug)]
pub struct SubscriptionRegistry {
    capacity: usize,
    states: HashMap<SubscriptionKey, SubscriptionState>,
}

impl SubscriptionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            states: HashMap::new(),
        }
    }

    pub fn apply_snapshot(&mut self, key: &SubscriptionKey, raw_bars: &WireValue) -> SeriesSnapshot {
        let _span = info_span!("apply_snapshot", key = %key).entered();
        let bars = normalize_bars(raw_bars);
        let points = fill_series(&bars, key.timeframe_seconds());

        let state = self.states.entry(key.clone()).or_default();
        state.replace_recent(&points, self.capacity);
        if let Some(newest) = points.iter().rev().find_map(SeriesPoint::as_bar) {
            state.last_known_bar_time = Some(newest.time);
        }

        let volumes: Vec<VolumePoint> = points
            .iter()
            .filter_map(SeriesPoint::as_bar)
            .filter_map(VolumePoint::from_bar)
            .collect();

        debug!(
            key = %key,
            accepted = bars.len(),
            points = points.len(),
            cached = state.recent_bars.len(),
            "applied series snapshot"
        );

        SeriesSnapshot {
            key: key.clone(),
            points,
            volumes,
            accepted: bars.len(),
        }
    }

    pub fn apply_update(&mut self, key: &SubscriptionKey, raw_bar: &WireValue) -> Option<SeriesUpdate> {
        let _span = info_span!("apply_update", key = %key).entered();
        let Some(bar) = normalize(raw_bar) else {
            debug!(key = %key, "dropped malformed bar update");
            return None;
        };

        let state = self.states.entry(key.clone()).or_default();
        let previous = state.last_known_bar_time;
        let mut points = gap_between(previous, Some(bar.time), key.timeframe_seconds());
        points.push(SeriesPoint::Bar(bar));

        state.last_known_bar_time = Some(previous.map_or(bar.time, |time| time.max(bar.time)));
        state.upsert_recent(bar, self.capacity);

        if previous.is_some_and(|time| bar.time < time) {
            debug!(key = %key, time = bar.time, watermark = ?previous, "late bar update forwarded");
        }

        Some(SeriesUpdate {
            key: key.clone(),
            points,
            volume: VolumePoint::from_bar(&bar),
        })
    }

    pub fn reset(&mut self, key: &SubscriptionKey) -> bool {
        self.states.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn state(&self, key: &SubscriptionKey) -> Option<&SubscriptionState> {
        self.states.get(key)
    }

    pub fn last_known_bar_time(&self, key: &SubscriptionKey) -> Option<i64> {
        self.state(key).and_then(SubscriptionState::last_known_bar_time)
    }

    pub fn recent_bars(&self, key: &SubscriptionKey) -> &[Bar] {
        self.state(key)
            .map(SubscriptionState::recent_bars)
            .unwrap_or(&[])
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.states.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(json: &str) -> WireValue {
        let mut payload = json.as_bytes().to_vec();
        simd_json::serde::from_slice(&mut payload).expect("test json should parse")
    }

    fn key() -> SubscriptionKey {
        SubscriptionKey::new("EURUSD", "1m", "preview")
    }

    fn raw_bar(time: i64, close: f64) -> String {
        format!(r#"{{"time":{time},"open":1,"high":2,"low":0.5,"close":{close},"volume":3}}"#)
    }

    fn raw_list(bars: &[(i64, f64)]) -> WireValue {
        let items: Vec<String> = bars.iter().map(|(time, close)| raw_bar(*time, *close)).collect();
        wire(&format!("[{}]", items.join(",")))
    }

    #[test]
    fn snapshot_emits_gap_filled_series_and_sets_watermark() {
        let mut registry = SubscriptionRegistry::new(800);
        let snapshot = registry.apply_snapshot(&key(), &raw_list(&[(1_000, 1.0), (1_060, 1.1), (1_240, 1.2)]));

        let times: Vec<i64> = snapshot.points.iter().map(SeriesPoint::time).collect();
        assert_eq!(times, vec![1_000, 1_060, 1_120, 1_180, 1_240]);
        assert_eq!(snapshot.volumes.len(), 3);
        assert_eq!(snapshot.accepted, 3);
        assert_eq!(registry.last_known_bar_time(&key()), Some(1_240));
        assert_eq!(registry.recent_bars(&key()).len(), 3);
    }

    #[test]
    fn empty_snapshot_keeps_watermark_unset() {
        let mut registry = SubscriptionRegistry::new(800);
        let snapshot = registry.apply_snapshot(&key(), &wire("[]"));

        assert!(snapshot.points.is_empty());
        assert!(registry.contains(&key()));
        assert_eq!(registry.last_known_bar_time(&key()), None);
    }

    #[test]
    fn repeated_snapshot_replaces_cache_with_latest_values() {
        let mut registry = SubscriptionRegistry::new(800);
        registry.apply_snapshot(&key(), &raw_list(&[(60, 1.0), (120, 1.0), (180, 1.0)]));
        registry.apply_snapshot(&key(), &raw_list(&[(120, 2.0), (180, 2.0), (180, 3.0), (240, 2.0)]));

        let cached: Vec<(i64, f64)> = registry
            .recent_bars(&key())
            .iter()
            .map(|bar| (bar.time, bar.close))
            .collect();
        assert_eq!(cached, vec![(120, 2.0), (180, 3.0), (240, 2.0)]);
        assert_eq!(registry.last_known_bar_time(&key()), Some(240));
    }

    #[test]
    fn snapshot_cache_keeps_only_most_recent_bars() {
        let mut registry = SubscriptionRegistry::new(3);
        registry.apply_snapshot(&key(), &raw_list(&[(60, 1.0), (120, 1.0), (180, 1.0), (240, 1.0), (300, 1.0)]));

        let cached: Vec<i64> = registry.recent_bars(&key()).iter().map(|bar| bar.time).collect();
        assert_eq!(cached, vec![180, 240, 300]);
    }

    #[test]
    fn update_after_huge_time_jump_skips_placeholders() {
        let mut registry = SubscriptionRegistry::new(800);
        registry.apply_snapshot(&key(), &raw_list(&[(60, 1.0)]));

        let update = registry
            .apply_update(&key(), &wire(&raw_bar(1_620_000_000_000, 1.5)))
            .expect("bar with a huge time is still valid");

        assert_eq!(update.points.len(), 1);
        assert_eq!(update.bar().map(|bar| bar.time), Some(1_620_000_000_000));
        assert_eq!(registry.last_known_bar_time(&key()), Some(1_620_000_000_000));
    }

    #[test]
    fn update_emits_placeholders_before_bar() {
        let mut registry = SubscriptionRegistry::new(800);
        registry.apply_snapshot(&key(), &raw_list(&[(1_000, 1.0), (1_060, 1.0)]));

        let update = registry
            .apply_update(&key(), &wire(&raw_bar(1_240, 1.5)))
            .expect("valid update");

        let times: Vec<i64> = update.points.iter().map(SeriesPoint::time).collect();
        assert_eq!(times, vec![1_120, 1_180, 1_240]);
        assert!(update.points[..2].iter().all(SeriesPoint::is_placeholder));
        assert_eq!(update.bar().map(|bar| bar.close), Some(1.5));
        assert!(update.volume.is_some());
        assert_eq!(registry.last_known_bar_time(&key()), Some(1_240));
    }

    #[test]
    fn first_update_creates_state_without_placeholders() {
        let mut registry = SubscriptionRegistry::new(800);
        let update = registry
            .apply_update(&key(), &wire(&raw_bar(600, 1.0)))
            .expect("valid update");

        assert_eq!(update.points.len(), 1);
        assert!(registry.contains(&key()));
        assert_eq!(registry.last_known_bar_time(&key()), Some(600));
    }

    #[test]
    fn malformed_update_is_a_no_op() {
        let mut registry = SubscriptionRegistry::new(800);
        let update = registry.apply_update(&key(), &wire(r#"{"time":0,"open":1,"high":1,"low":1,"close":1}"#));

        assert!(update.is_none());
        assert!(!registry.contains(&key()));
    }

    #[test]
    fn late_update_is_forwarded_without_regressing_watermark() {
        let mut registry = SubscriptionRegistry::new(800);
        registry.apply_snapshot(&key(), &raw_list(&[(600, 1.0), (660, 1.0)]));

        let update = registry
            .apply_update(&key(), &wire(&raw_bar(540, 4.0)))
            .expect("late update still forwarded");

        assert_eq!(update.points.len(), 1);
        assert_eq!(update.bar().map(|bar| bar.time), Some(540));
        assert_eq!(registry.last_known_bar_time(&key()), Some(660));
        let cached: Vec<i64> = registry.recent_bars(&key()).iter().map(|bar| bar.time).collect();
        assert_eq!(cached, vec![540, 600, 660]);
    }

    #[test]
    fn same_time_update_replaces_cached_bar() {
        let mut registry = SubscriptionRegistry::new(800);
        registry.apply_snapshot(&key(), &raw_list(&[(600, 1.0), (660, 1.0)]));
        let update = registry
            .apply_update(&key(), &wire(&raw_bar(660, 7.0)))
            .expect("same-slot update");

        assert_eq!(update.points.len(), 1);
        assert_eq!(registry.recent_bars(&key()).len(), 2);
        assert_eq!(registry.recent_bars(&key())[1].close, 7.0);
    }

    #[test]
    fn watermark_never_decreases_across_updates() {
        let mut registry = SubscriptionRegistry::new(800);
        let mut previous = None;

        for time in [600, 540, 900, 660, 900, 1_200, 60] {
            registry.apply_update(&key(), &wire(&raw_bar(time, 1.0)));
            let current = registry.last_known_bar_time(&key());
            assert!(current >= previous, "watermark regressed at {time}");
            previous = current;
        }
        assert_eq!(previous, Some(1_200));
    }

    #[test]
    fn update_cache_evicts_oldest_past_capacity() {
        let mut registry = SubscriptionRegistry::new(2);
        for time in [60, 120, 180] {
            registry.apply_update(&key(), &wire(&raw_bar(time, 1.0)));
        }

        let cached: Vec<i64> = registry.recent_bars(&key()).iter().map(|bar| bar.time).collect();
        assert_eq!(cached, vec![120, 180]);
    }

    #[test]
    fn keys_never_share_state() {
        let mut registry = SubscriptionRegistry::new(800);
        let other = SubscriptionKey::new("EURUSD", "5m", "preview");
        registry.apply_snapshot(&key(), &raw_list(&[(600, 1.0)]));
        registry.apply_update(&other, &wire(&raw_bar(1_500, 1.0)));

        assert_eq!(registry.last_known_bar_time(&key()), Some(600));
        assert_eq!(registry.last_known_bar_time(&other), Some(1_500));

        assert!(registry.reset(&key()));
        assert!(!registry.contains(&key()));
        assert!(registry.contains(&other));
        assert!(!registry.reset(&key()));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn update_uses_key_timeframe_for_gaps() {
        let mut registry = SubscriptionRegistry::new(800);
        let five_minute = SubscriptionKey::new("EURUSD", "5m", "preview");
        registry.apply_update(&five_minute, &wire(&raw_bar(300, 1.0)));
        let update = registry
            .apply_update(&five_minute, &wire(&raw_bar(1_200, 1.0)))
            .expect("valid update");

        let times: Vec<i64> = update.points.iter().map(SeriesPoint::time).collect();
        assert_eq!(times, vec![600, 900, 1_200]);
    }
}
