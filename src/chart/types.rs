use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MODE: &str = "preview";
pub const DEFAULT_TIMEFRAME_SECS: i64 = 60;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_RECENT_BARS_CAPACITY: usize = 800;
pub const DEFAULT_DATA_STALE_AFTER_MS: i64 = 5_000;
pub const DEFAULT_TRANSPORT_WARN_AFTER_MS: i64 = 5_000;
pub const MIN_TICK_INTERVAL_MS: u64 = 100;
pub const MAX_TICK_INTERVAL_MS: u64 = 5_000;
pub const MIN_RECENT_BARS_CAPACITY: usize = 50;
pub const MAX_RECENT_BARS_CAPACITY: usize = 10_000;
pub const MIN_STALE_THRESHOLD_MS: i64 = 1_000;
pub const MAX_STALE_THRESHOLD_MS: i64 = 600_000;

/// Supported wire timeframe labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::H1,
        Self::H4,
        Self::D1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    pub fn duration_secs(self) -> i64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
        }
    }

    pub fn parse_str(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|timeframe| timeframe.as_str() == label)
    }
}

/// Slot duration for a wire timeframe label. Unlisted labels fall back to one minute.
pub fn timeframe_seconds(label: &str) -> i64 {
    Timeframe::parse_str(label)
        .map(Timeframe::duration_secs)
        .unwrap_or(DEFAULT_TIMEFRAME_SECS)
}

/// Identifies one independent series. The timeframe is kept as the wire label so that
/// unlisted labels never collide with a listed one in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionKey {
    pub symbol: String,
    pub tf: String,
    pub mode: String,
}

impl SubscriptionKey {
    pub fn new(symbol: impl Into<String>, tf: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tf: tf.into(),
            mode: mode.into(),
        }
    }

    pub fn timeframe_seconds(&self) -> i64 {
        timeframe_seconds(&self.tf)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.symbol, self.tf, self.mode)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

/// One entry of a renderer series: either a real bar or a time-only placeholder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SeriesPoint {
    Bar(Bar),
    Placeholder { time: i64 },
}

impl SeriesPoint {
    pub fn time(&self) -> i64 {
        match self {
            Self::Bar(bar) => bar.time,
            Self::Placeholder { time } => *time,
        }
    }

    pub fn as_bar(&self) -> Option<&Bar> {
        match self {
            Self::Bar(bar) => Some(bar),
            Self::Placeholder { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumePoint {
    pub time: i64,
    pub value: f64,
    pub up: bool,
}

impl VolumePoint {
    pub fn from_bar(bar: &Bar) -> Option<Self> {
        let value = bar.volume.filter(|volume| volume.is_finite())?;
        Some(Self {
            time: bar.time,
            value,
            up: bar.close >= bar.open,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSnapshot {
    pub key: SubscriptionKey,
    pub points: Vec<SeriesPoint>,
    pub volumes: Vec<VolumePoint>,
    pub accepted: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesUpdate {
    pub key: SubscriptionKey,
    pub points: Vec<SeriesPoint>,
    pub volume: Option<VolumePoint>,
}

impl SeriesUpdate {
    pub fn bar(&self) -> Option<&Bar> {
        self.points.last().and_then(SeriesPoint::as_bar)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesCleared {
    pub key: Option<SubscriptionKey>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusBadge {
    Ok,
    Stale,
    #[default]
    Unavailable,
}

impl StatusBadge {
    pub fn from_flags(status_ok: bool, status_stale: bool) -> Self {
        if !status_ok {
            Self::Unavailable
        } else if status_stale {
            Self::Stale
        } else {
            Self::Ok
        }
    }
}

/// Per-tick freshness report published to the renderer and the health store.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub t: i64,
    pub transport_age_ms: Option<i64>,
    pub transport_warn: bool,
    pub status_age_ms: Option<i64>,
    pub status_badge: StatusBadge,
    pub data_stale: bool,
    pub bars_received: u64,
    pub degraded_count: usize,
    pub error_count: usize,
    pub ohlcv_invalid_total: Option<u64>,
    pub status_invalid_total: Option<u64>,
    pub selection: Option<SubscriptionKey>,
    pub last_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeArgs {
    pub symbol: Option<String>,
    pub tf: Option<String>,
    pub mode: Option<String>,
}

impl SubscribeArgs {
    pub fn new(symbol: &str, tf: &str, mode: Option<&str>) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            tf: Some(tf.to_string()),
            mode: mode.map(str::to_string),
        }
    }

    pub fn normalize(self, default_mode: &str) -> Result<SubscriptionKey, AppError> {
        let symbol = trimmed(self.symbol);
        let tf = trimmed(self.tf);
        let (Some(symbol), Some(tf)) = (symbol, tf) else {
            return Err(AppError::InvalidArgument(
                "symbol and tf are required".to_string(),
            ));
        };
        let mode = trimmed(self.mode).unwrap_or_else(|| default_mode.to_string());

        Ok(SubscriptionKey { symbol, tf, mode })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartChartSessionArgs {
    pub tick_interval_ms: Option<u64>,
    pub recent_bars_capacity: Option<usize>,
    pub data_stale_after_ms: Option<i64>,
    pub transport_warn_after_ms: Option<i64>,
    pub default_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSessionConfig {
    pub tick_interval_ms: u64,
    pub recent_bars_capacity: usize,
    pub data_stale_after_ms: i64,
    pub transport_warn_after_ms: i64,
    pub default_mode: String,
}

impl Default for ChartSessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            recent_bars_capacity: DEFAULT_RECENT_BARS_CAPACITY,
            data_stale_after_ms: DEFAULT_DATA_STALE_AFTER_MS,
            transport_warn_after_ms: DEFAULT_TRANSPORT_WARN_AFTER_MS,
            default_mode: DEFAULT_MODE.to_string(),
        }
    }
}

impl StartChartSessionArgs {
    pub fn normalize(self) -> Result<ChartSessionConfig, AppError> {
        let tick_interval_ms = self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&tick_interval_ms) {
            return Err(AppError::InvalidArgument(format!(
                "tickIntervalMs must be between {MIN_TICK_INTERVAL_MS} and {MAX_TICK_INTERVAL_MS}"
            )));
        }

        let recent_bars_capacity = self
            .recent_bars_capacity
            .unwrap_or(DEFAULT_RECENT_BARS_CAPACITY);
        if !(MIN_RECENT_BARS_CAPACITY..=MAX_RECENT_BARS_CAPACITY).contains(&recent_bars_capacity) {
            return Err(AppError::InvalidArgument(format!(
                "recentBarsCapacity must be between {MIN_RECENT_BARS_CAPACITY} and {MAX_RECENT_BARS_CAPACITY}"
            )));
        }

        let data_stale_after_ms = self
            .data_stale_after_ms
            .unwrap_or(DEFAULT_DATA_STALE_AFTER_MS);
        if !(MIN_STALE_THRESHOLD_MS..=MAX_STALE_THRESHOLD_MS).contains(&data_stale_after_ms) {
            return Err(AppError::InvalidArgument(format!(
                "dataStaleAfterMs must be between {MIN_STALE_THRESHOLD_MS} and {MAX_STALE_THRESHOLD_MS}"
            )));
        }

        let transport_warn_after_ms = self
            .transport_warn_after_ms
            .unwrap_or(DEFAULT_TRANSPORT_WARN_AFTER_MS);
        if !(MIN_STALE_THRESHOLD_MS..=MAX_STALE_THRESHOLD_MS).contains(&transport_warn_after_ms) {
            return Err(AppError::InvalidArgument(format!(
                "transportWarnAfterMs must be between {MIN_STALE_THRESHOLD_MS} and {MAX_STALE_THRESHOLD_MS}"
            )));
        }

        let default_mode = trimmed(self.default_mode).unwrap_or_else(|| DEFAULT_MODE.to_string());

        Ok(ChartSessionConfig {
            tick_interval_ms,
            recent_bars_capacity,
            data_stale_after_ms,
            transport_warn_after_ms,
            default_mode,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSessionInfo {
    pub running: bool,
    pub tick_interval_ms: u64,
    pub recent_bars_capacity: usize,
    pub data_stale_after_ms: i64,
    pub transport_warn_after_ms: i64,
    pub default_mode: String,
}

impl ChartSessionInfo {
    pub fn from_config(config: &ChartSessionConfig) -> Self {
        Self {
            running: true,
            tick_interval_ms: config.tick_interval_ms,
            recent_bars_capacity: config.recent_bars_capacity,
            data_stale_after_ms: config.data_stale_after_ms,
            transport_warn_after_ms: config.transport_warn_after_ms,
            default_mode: config.default_mode.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSessionStopResult {
    pub stopped: bool,
}
