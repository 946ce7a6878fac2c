pub mod dispatcher;
pub mod freshness;
pub mod gaps;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod types;
pub mod wire;

pub const SERIES_SNAPSHOT_EVENT: &str = "series_snapshot";
pub const SERIES_UPDATE_EVENT: &str = "series_update";
pub const SERIES_CLEARED_EVENT: &str = "series_cleared";
pub const CHART_HEALTH_EVENT: &str = "health";
pub const CHART_NOTICE_EVENT: &str = "notice";
