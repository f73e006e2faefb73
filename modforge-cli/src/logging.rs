//! Logging setup for the `modforge` binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the log filter. `RUST_LOG` wins over the configured level.
pub fn filter(configured_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level))
}

/// Install the global subscriber, writing to stderr so reports on stdout
/// stay machine-readable.
pub fn init(configured_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter(configured_level))
        .try_init();
}
