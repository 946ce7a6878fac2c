use crate::chart::pipeline::{run_chart_session, FeedConnection, SessionCommand};
use crate::chart::render::RenderSink;
use crate::chart::types::{
    ChartSessionInfo, ChartSessionStopResult, HealthSnapshot, StartChartSessionArgs,
    SubscribeArgs, SubscriptionKey,
};
use crate::error::AppError;
use crate::state::{AppState, ChartSessionHandle};
use futures_util::Stream;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartHealthResponse {
    pub running: bool,
    pub uptime_ms: u128,
    pub health: HealthSnapshot,
}

/// Start a session over an established feed, replacing any session that is already running.
pub async fn start_chart_session<S, R>(
    state: &AppState,
    args: Option<StartChartSessionArgs>,
    feed: FeedConnection<S>,
    sink: R,
) -> Result<ChartSessionInfo, AppError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
    R: RenderSink + Send + 'static,
{
    let config = args.unwrap_or_default().normalize()?;

    let existing_handle = {
        let mut session_slot = state.chart_session.lock().await;
        session_slot.take()
    };
    if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
    }

    let cancellation_token = CancellationToken::new();
    let task_token = cancellation_token.clone();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let health_store = Arc::clone(&state.chart_health);
    let runtime_config = config.clone();

    let join_handle = tokio::spawn(async move {
        run_chart_session(runtime_config, feed, command_rx, sink, health_store, task_token).await;
    });

    {
        let mut session_slot = state.chart_session.lock().await;
        *session_slot = Some(ChartSessionHandle {
            cancellation_token,
            join_handle,
            commands: command_tx,
        });
    }

    Ok(ChartSessionInfo::from_config(&config))
}

pub async fn stop_chart_session(state: &AppState) -> Result<ChartSessionStopResult, AppError> {
    let existing_handle = {
        let mut session_slot = state.chart_session.lock().await;
        session_slot.take()
    };

    let stopped = if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        handle.join_handle.await?;
        true
    } else {
        false
    };

    *state.chart_health.write() = HealthSnapshot::default();

    Ok(ChartSessionStopResult { stopped })
}

pub async fn subscribe(state: &AppState, args: SubscribeArgs) -> Result<SubscriptionKey, AppError> {
    let (reply, response) = oneshot::channel();
    send_command(state, SessionCommand::Subscribe { args, reply }).await?;
    response.await.map_err(|_| AppError::SessionNotRunning)?
}

pub async fn reset_subscription(state: &AppState, key: SubscriptionKey) -> Result<(), AppError> {
    send_command(state, SessionCommand::Reset(key)).await
}

pub async fn clear_view(state: &AppState) -> Result<(), AppError> {
    send_command(state, SessionCommand::ClearView).await
}

pub async fn chart_health(state: &AppState) -> Result<ChartHealthResponse, AppError> {
    let running = state.chart_session.lock().await.is_some();
    let health = state.chart_health.read().clone();

    Ok(ChartHealthResponse {
        running,
        uptime_ms: state.started_at.elapsed().as_millis(),
        health,
    })
}

async fn send_command(state: &AppState, command: SessionCommand) -> Result<(), AppError> {
    let session_slot = state.chart_session.lock().await;
    let handle = session_slot.as_ref().ok_or(AppError::SessionNotRunning)?;
    handle
        .commands
        .send(command)
        .map_err(|_| AppError::SessionNotRunning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::render::RenderEvent;
    use crate::chart::types::SeriesCleared;
    use futures_util::stream::{self, Pending};
    use std::time::Duration;

    type PendingFrames = Pending<Result<Message, WsError>>;

    fn idle_feed() -> (FeedConnection<PendingFrames>, mpsc::UnboundedReceiver<Message>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        (
            FeedConnection {
                frames: stream::pending(),
                outbound,
            },
            outbound_rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn session_lifecycle_round_trip() {
        let state = AppState::new();
        let (feed, mut outbound_rx) = idle_feed();
        let (render_tx, mut render_rx) = mpsc::unbounded_channel::<RenderEvent>();

        let info = start_chart_session(
            &state,
            Some(StartChartSessionArgs {
                tick_interval_ms: Some(500),
                ..StartChartSessionArgs::default()
            }),
            feed,
            render_tx,
        )
        .await
        .expect("session should start");
        assert!(info.running);
        assert_eq!(info.tick_interval_ms, 500);

        let key = subscribe(&state, SubscribeArgs::new("EURUSD", "15m", Some("live")))
            .await
            .expect("subscribe should succeed");
        assert_eq!(key, SubscriptionKey::new("EURUSD", "15m", "live"));
        assert!(outbound_rx.recv().await.is_some());

        reset_subscription(&state, key.clone())
            .await
            .expect("reset should be forwarded");
        clear_view(&state).await.expect("clear should be forwarded");
        tokio::time::sleep(Duration::from_millis(1_200)).await;

        let response = chart_health(&state).await.expect("health should be readable");
        assert!(response.running);
        assert_eq!(response.health.selection, Some(key.clone()));

        let mut cleared = Vec::new();
        while let Ok(event) = render_rx.try_recv() {
            if let RenderEvent::SeriesCleared(SeriesCleared { key }) = event {
                cleared.push(key);
            }
        }
        assert_eq!(cleared, vec![Some(key), None]);

        let stopped = stop_chart_session(&state).await.expect("stop should succeed");
        assert!(stopped.stopped);
        let again = stop_chart_session(&state).await.expect("second stop should succeed");
        assert!(!again.stopped);

        let response = chart_health(&state).await.expect("health should be readable");
        assert!(!response.running);
        assert_eq!(response.health, HealthSnapshot::default());
    }

    #[tokio::test]
    async fn commands_require_a_running_session() {
        let state = AppState::new();

        let result = subscribe(&state, SubscribeArgs::new("EURUSD", "1m", None)).await;
        assert!(matches!(result, Err(AppError::SessionNotRunning)));
        assert!(matches!(clear_view(&state).await, Err(AppError::SessionNotRunning)));
    }

    #[tokio::test]
    async fn rejects_out_of_range_config_without_spawning() {
        let state = AppState::new();
        let (feed, _outbound_rx) = idle_feed();

        let result = start_chart_session(
            &state,
            Some(StartChartSessionArgs {
                tick_interval_ms: Some(10),
                ..StartChartSessionArgs::default()
            }),
            feed,
            Vec::<RenderEvent>::new(),
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert!(state.chart_session.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn starting_again_replaces_the_running_session() {
        let state = AppState::new();
        let (first_feed, _first_outbound) = idle_feed();
        let (second_feed, mut second_outbound) = idle_feed();

        start_chart_session(&state, None, first_feed, Vec::<RenderEvent>::new())
            .await
            .expect("first session should start");
        start_chart_session(&state, None, second_feed, Vec::<RenderEvent>::new())
            .await
            .expect("second session should start");

        subscribe(&state, SubscribeArgs::new("BTCUSDT", "1h", None))
            .await
            .expect("subscribe should reach the new session");
        assert!(second_outbound.recv().await.is_some());

        stop_chart_session(&state).await.expect("stop should succeed");
    }
}
