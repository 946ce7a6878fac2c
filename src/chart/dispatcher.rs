use crate::chart::freshness::FreshnessTracker;
use crate::chart::registry::SubscriptionRegistry;
use crate::chart::render::{RenderEvent, RenderSink};
use crate::chart::types::{
    ChartSessionConfig, HealthSnapshot, Notice, SeriesCleared, StatusBadge, SubscribeArgs,
    SubscriptionKey,
};
use crate::chart::wire::{
    parse_inbound_payload, text_field, BarWire, HealthWire, InboundMessage, SnapshotWire,
    WireValue,
};
use crate::error::AppError;
use tracing::{debug, info, warn};

const OHLCV_INVALID_COUNTER: &str = "ohlcv_inbound_invalid_total";
const STATUS_INVALID_COUNTER: &str = "status_invalid_total";

#[derive(Debug, Clone, Default)]
struct StatusSummary {
    badge: StatusBadge,
    degraded_count: usize,
    error_count: usize,
    ohlcv_invalid_total: Option<u64>,
    status_invalid_total: Option<u64>,
}

impl StatusSummary {
    fn apply(&mut self, health: &HealthWire) {
        self.badge = StatusBadge::from_flags(health.status_ok(), health.status_stale());
        self.degraded_count = health.degraded_count();
        self.error_count = health.error_count();
        self.ohlcv_invalid_total = health.ui_counter(OHLCV_INVALID_COUNTER);
        self.status_invalid_total = health.ui_counter(STATUS_INVALID_COUNTER);
    }
}

/// Routes decoded feed messages into the registry and freshness tracker and forwards the
/// results to a render sink.
pub struct Dispatcher<R: RenderSink> {
    config: ChartSessionConfig,
    registry: SubscriptionRegistry,
    freshness: FreshnessTracker,
    selection: Option<SubscriptionKey>,
    bars_received: u64,
    last_bar_ms: Option<i64>,
    status: StatusSummary,
    last_command: Option<String>,
    sink: R,
}

impl<R: RenderSink> Dispatcher<R> {
    pub fn new(config: ChartSessionConfig, sink: R, now_ms: i64) -> Self {
        Self {
            registry: SubscriptionRegistry::new(config.recent_bars_capacity),
            freshness: FreshnessTracker::new(now_ms),
            config,
            selection: None,
            bars_received: 0,
            last_bar_ms: None,
            status: StatusSummary::default(),
            last_command: None,
            sink,
        }
    }

    /// Decode and route one raw frame. Any well-formed JSON counts as transport activity,
    /// whatever its `type`; malformed frames leave every piece of state untouched.
    pub fn handle_frame(&mut self, payload: &mut [u8], now_ms: i64) -> bool {
        match parse_inbound_payload(payload) {
            Ok(message) => {
                self.handle_message(message, now_ms);
                true
            }
            Err(error) => {
                debug!(%error, bytes = payload.len(), "ignored undecodable frame");
                false
            }
        }
    }

    pub fn handle_message(&mut self, message: InboundMessage, now_ms: i64) {
        self.freshness.record_transport(now_ms);

        match message {
            InboundMessage::Snapshot(snapshot) => self.on_snapshot(snapshot),
            InboundMessage::Bar(update) => self.on_bar(update),
            InboundMessage::Health(health) => self.on_health(&health, now_ms),
            InboundMessage::CommandAck(ack) => {
                let description = ack.describe();
                debug!(status = %description, "command acknowledged");
                self.last_command = Some(description.clone());
                self.emit(RenderEvent::Notice(Notice {
                    message: description,
                }));
            }
            InboundMessage::Other => {}
        }
    }

    /// Select a new subscription. The caller is responsible for sending the subscribe frame
    /// for the returned key; other keys keep their state.
    pub fn subscribe(&mut self, args: SubscribeArgs) -> Result<SubscriptionKey, AppError> {
        match args.normalize(&self.config.default_mode) {
            Ok(key) => {
                info!(symbol = %key.symbol, tf = %key.tf, mode = %key.mode, "subscription selected");
                self.selection = Some(key.clone());
                Ok(key)
            }
            Err(error) => {
                self.emit(RenderEvent::Notice(Notice {
                    message: error.to_string(),
                }));
                Err(error)
            }
        }
    }

    pub fn reset(&mut self, key: &SubscriptionKey) -> bool {
        let removed = self.registry.reset(key);
        debug!(key = %key, removed, "subscription reset");
        self.emit(RenderEvent::SeriesCleared(SeriesCleared {
            key: Some(key.clone()),
        }));
        removed
    }

    pub fn clear_view(&mut self) {
        let cleared = self.registry.len();
        self.registry.clear();
        self.last_bar_ms = None;
        debug!(cleared, "chart view cleared");
        self.emit(RenderEvent::SeriesCleared(SeriesCleared { key: None }));
    }

    pub fn tick(&mut self, now_ms: i64) -> HealthSnapshot {
        let reading = self.freshness.tick(now_ms);
        let data_stale = self
            .last_bar_ms
            .is_some_and(|last_bar_ms| now_ms.saturating_sub(last_bar_ms) > self.config.data_stale_after_ms);
        let transport_warn = reading
            .transport_age_ms
            .is_some_and(|age_ms| age_ms > self.config.transport_warn_after_ms);

        let snapshot = HealthSnapshot {
            t: now_ms,
            transport_age_ms: reading.transport_age_ms,
            transport_warn,
            status_age_ms: reading.status_age_ms,
            status_badge: self.status.badge,
            data_stale,
            bars_received: self.bars_received,
            degraded_count: self.status.degraded_count,
            error_count: self.status.error_count,
            ohlcv_invalid_total: self.status.ohlcv_invalid_total,
            status_invalid_total: self.status.status_invalid_total,
            selection: self.selection.clone(),
            last_command: self.last_command.clone(),
        };

        self.emit(RenderEvent::Health(snapshot.clone()));
        snapshot
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn freshness(&self) -> &FreshnessTracker {
        &self.freshness
    }

    pub fn selection(&self) -> Option<&SubscriptionKey> {
        self.selection.as_ref()
    }

    pub fn bars_received(&self) -> u64 {
        self.bars_received
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn config(&self) -> &ChartSessionConfig {
        &self.config
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    fn on_snapshot(&mut self, snapshot: SnapshotWire) {
        let Some(key) = self.resolve_key(&snapshot.symbol, &snapshot.tf, &snapshot.mode) else {
            debug!("dropped snapshot without a resolvable subscription");
            return;
        };

        let bars = snapshot.bars.unwrap_or(WireValue::Null);
        let series = self.registry.apply_snapshot(&key, &bars);
        self.bars_received = self.bars_received.saturating_add(series.accepted as u64);
        if let Some(last) = series.points.iter().rev().find_map(|point| point.as_bar()) {
            self.last_bar_ms = Some(last.time.saturating_mul(1_000));
        }

        self.emit(RenderEvent::SeriesSnapshot(series));
    }

    fn on_bar(&mut self, update: BarWire) {
        let Some(key) = self.resolve_key(&update.symbol, &update.tf, &update.mode) else {
            debug!("dropped bar update without a resolvable subscription");
            return;
        };
        let Some(raw_bar) = update.bar else {
            debug!(key = %key, "dropped bar message without a bar");
            return;
        };
        let Some(series) = self.registry.apply_update(&key, &raw_bar) else {
            return;
        };

        self.bars_received = self.bars_received.saturating_add(1);
        if let Some(bar) = series.bar() {
            self.last_bar_ms = Some(bar.time.saturating_mul(1_000));
        }

        self.emit(RenderEvent::SeriesUpdate(series));
    }

    fn on_health(&mut self, health: &HealthWire, now_ms: i64) {
        let timestamp_ms = health.valid_status_timestamp_ms();
        if timestamp_ms.is_none() {
            debug!(status_ok = health.status_ok(), "status payload invalid; status age unknown");
        }
        self.freshness.record_status(timestamp_ms, now_ms);
        self.status.apply(health);
    }

    /// Payload fields win; anything missing falls back to the current selection, and the mode
    /// finally to the configured default.
    fn resolve_key(
        &self,
        symbol: &Option<WireValue>,
        tf: &Option<WireValue>,
        mode: &Option<WireValue>,
    ) -> Option<SubscriptionKey> {
        let selection = self.selection.as_ref();
        let symbol = text_field(symbol).or_else(|| selection.map(|key| key.symbol.clone()))?;
        let tf = text_field(tf).or_else(|| selection.map(|key| key.tf.clone()))?;
        let mode = text_field(mode)
            .or_else(|| selection.map(|key| key.mode.clone()))
            .unwrap_or_else(|| self.config.default_mode.clone());

        Some(SubscriptionKey::new(symbol, tf, mode))
    }

    fn emit(&mut self, event: RenderEvent) {
        let name = event.name();
        if let Err(error) = self.sink.emit(event) {
            warn!(%error, event = name, "failed to emit render event");
        }
    }
}
