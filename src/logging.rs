//! Tracing setup for the binaries. The library itself only emits events.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialise logging at `warn`, overridable with RUST_LOG.
pub fn init() {
    init_with_level("warn")
}

/// Initialise logging with a default level (`error`, `warn`, `info`, `debug`, `trace`).
///
/// RUST_LOG still takes precedence. Output goes to stderr so stdout stays
/// free for snapshots. Calling this twice keeps the first subscriber.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
