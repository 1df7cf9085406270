use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::constants::ENV_LOG_FILE;

/// Install the global subscriber: `RUST_LOG`-filtered output on stderr
/// (default `info`), plus a debug-level file layer when `GM_LOG_FILE` names
/// a path.
pub fn init_tracing() {
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    let Some(log_path) = std::env::var(ENV_LOG_FILE).ok() else {
        registry.init();
        return;
    };

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(LevelFilter::DEBUG);

            registry.with(file_layer).init();
            tracing::info!(path = %log_path, "file logging enabled");
        }
        Err(e) => {
            registry.init();
            tracing::warn!(path = %log_path, error = %e, "could not open log file");
        }
    }
}
