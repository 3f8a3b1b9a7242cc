//! Tracing setup for sitedeploy binaries.
//!
//! Filter precedence: `SITEDEPLOY_LOG`, then `RUST_LOG`, then the level the
//! caller passes in.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "SITEDEPLOY_LOG";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON, one object per event.
    Json,
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(format: LogFormat, level: Level) {
    let filter = env_filter(level);
    // Logs go to stderr so stdout stays machine-readable (JSON summaries, tokens).
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init(),
    };
    result.ok();
}
