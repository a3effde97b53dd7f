//! Logging setup for embedding binaries and tests.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a stderr subscriber at the given level.
///
/// Returns quietly if a global subscriber is already installed, so tests can
/// call it repeatedly.
pub fn init(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_from_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
