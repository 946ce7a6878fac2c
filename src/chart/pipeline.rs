use crate::chart::dispatcher::Dispatcher;
use crate::chart::render::RenderSink;
use crate::chart::types::{ChartSessionConfig, HealthSnapshot, SubscribeArgs, SubscriptionKey};
use crate::chart::wire::encode_subscribe_frame;
use crate::error::AppError;
use futures_util::{Stream, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// An already-established feed: inbound frames plus a channel for outbound frames.
pub struct FeedConnection<S> {
    pub frames: S,
    pub outbound: mpsc::UnboundedSender<Message>,
}

pub enum SessionCommand {
    Subscribe {
        args: SubscribeArgs,
        reply: oneshot::Sender<Result<SubscriptionKey, AppError>>,
    },
    Reset(SubscriptionKey),
    ClearView,
}

/// Wall-clock milliseconds anchored once at session start and advanced by the runtime's
/// monotonic clock afterwards.
struct SessionClock {
    started_at: Instant,
    started_unix_ms: i64,
}

impl SessionClock {
    fn start() -> Self {
        Self {
            started_at: Instant::now(),
            started_unix_ms: now_unix_ms(),
        }
    }

    fn now_ms(&self) -> i64 {
        let elapsed_ms = self.started_at.elapsed().as_millis().min(i64::MAX as u128) as i64;
        self.started_unix_ms.saturating_add(elapsed_ms)
    }
}

enum FrameDirective {
    Continue,
    Closed,
}

pub async fn run_chart_session<S, R>(
    config: ChartSessionConfig,
    feed: FeedConnection<S>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    sink: R,
    health_store: Arc<RwLock<HealthSnapshot>>,
    cancel_token: CancellationToken,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
    R: RenderSink,
{
    let FeedConnection {
        mut frames,
        outbound,
    } = feed;
    let clock = SessionClock::start();
    let tick_interval_ms = config.tick_interval_ms;
    let mut dispatcher = Dispatcher::new(config, sink, clock.now_ms());

    let mut ticker = tokio::time::interval(Duration::from_millis(tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut frames_open = true;
    let mut commands_open = true;
    info!(tick_interval_ms, "chart session started");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = dispatcher.tick(clock.now_ms());
                *health_store.write() = snapshot;
            }
            command = commands.recv(), if commands_open => match command {
                Some(command) => handle_command(&mut dispatcher, command, &outbound),
                None => {
                    debug!("session command channel closed");
                    commands_open = false;
                }
            },
            frame = frames.next(), if frames_open => match frame {
                Some(Ok(message)) => {
                    if let FrameDirective::Closed = handle_frame(&mut dispatcher, message, clock.now_ms()) {
                        info!("feed sent close frame");
                        frames_open = false;
                    }
                }
                Some(Err(error)) => {
                    warn!(%error, "feed frame error; no longer reading frames");
                    frames_open = false;
                }
                None => {
                    info!("feed stream ended");
                    frames_open = false;
                }
            },
        }
    }

    info!(
        bars_received = dispatcher.bars_received(),
        "chart session stopped"
    );
}

fn handle_frame<R: RenderSink>(
    dispatcher: &mut Dispatcher<R>,
    message: Message,
    now_ms: i64,
) -> FrameDirective {
    match message {
        Message::Text(text_payload) => {
            let mut owned_payload = text_payload.into_bytes();
            dispatcher.handle_frame(owned_payload.as_mut_slice(), now_ms);
        }
        Message::Binary(mut binary_payload) => {
            dispatcher.handle_frame(binary_payload.as_mut_slice(), now_ms);
        }
        Message::Close(_) => return FrameDirective::Closed,
        _ => {}
    }
    FrameDirective::Continue
}

fn handle_command<R: RenderSink>(
    dispatcher: &mut Dispatcher<R>,
    command: SessionCommand,
    outbound: &mpsc::UnboundedSender<Message>,
) {
    match command {
        SessionCommand::Subscribe { args, reply } => {
            let result = dispatcher.subscribe(args).and_then(|key| {
                let frame = encode_subscribe_frame(&key)?;
                if outbound.send(frame).is_err() {
                    warn!(key = %key, "feed outbound channel closed; subscribe frame dropped");
                }
                Ok(key)
            });
            let _ = reply.send(result);
        }
        SessionCommand::Reset(key) => {
            dispatcher.reset(&key);
        }
        SessionCommand::ClearView => dispatcher.clear_view(),
    }
}

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
