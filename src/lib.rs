pub mod chart;
pub mod commands;
pub mod error;
pub mod state;

use tracing_subscriber::EnvFilter;

pub use chart::dispatcher::Dispatcher;
pub use chart::pipeline::{FeedConnection, SessionCommand};
pub use chart::render::{RenderEvent, RenderSink};
pub use error::AppError;
pub use state::AppState;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default `info` filter; calling
/// this more than once is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
