//! Tracing initialization for binaries embedding the collector.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing.
///
/// Uses the `RUST_LOG` environment variable for filtering, defaulting to
/// `info`. Calling this more than once is harmless; later calls leave the
/// first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
        tracing::info!("tracing initialized");
    }
}
