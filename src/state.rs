use crate::chart::pipeline::SessionCommand;
use crate::chart::types::HealthSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ChartSessionHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
    pub commands: mpsc::UnboundedSender<SessionCommand>,
}

pub struct AppState {
    pub started_at: Instant,
    pub chart_session: Mutex<Option<ChartSessionHandle>>,
    pub chart_health: Arc<RwLock<HealthSnapshot>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chart_session: Mutex::new(None),
            chart_health: Arc::new(RwLock::new(HealthSnapshot::default())),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
