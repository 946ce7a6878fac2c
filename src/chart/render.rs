use crate::chart::types::{HealthSnapshot, Notice, SeriesCleared, SeriesSnapshot, SeriesUpdate};
use crate::chart::{
    CHART_HEALTH_EVENT, CHART_NOTICE_EVENT, SERIES_CLEARED_EVENT, SERIES_SNAPSHOT_EVENT,
    SERIES_UPDATE_EVENT,
};
use crate::error::AppError;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RenderEvent {
    SeriesSnapshot(SeriesSnapshot),
    SeriesUpdate(SeriesUpdate),
    SeriesCleared(SeriesCleared),
    Health(HealthSnapshot),
    Notice(Notice),
}

impl RenderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SeriesSnapshot(_) => SERIES_SNAPSHOT_EVENT,
            Self::SeriesUpdate(_) => SERIES_UPDATE_EVENT,
            Self::SeriesCleared(_) => SERIES_CLEARED_EVENT,
            Self::Health(_) => CHART_HEALTH_EVENT,
            Self::Notice(_) => CHART_NOTICE_EVENT,
        }
    }
}

/// Receiver of everything the dispatcher wants drawn.
pub trait RenderSink {
    fn emit(&mut self, event: RenderEvent) -> Result<(), AppError>;
}

impl RenderSink for mpsc::UnboundedSender<RenderEvent> {
    fn emit(&mut self, event: RenderEvent) -> Result<(), AppError> {
        let name = event.name();
        self.send(event)
            .map_err(|_| AppError::RenderClosed(format!("failed to emit {name}")))
    }
}

/// Recording sink for tests; it keeps every event for the life of the session.
#[cfg(test)]
impl RenderSink for Vec<RenderEvent> {
    fn emit(&mut self, event: RenderEvent) -> Result<(), AppError> {
        self.push(event);
        Ok(())
    }
}
