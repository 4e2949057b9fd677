//! Logging initialization for binaries and integration tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. `RUST_LOG` overrides the
/// default filter. Calling twice panics; binaries call this once.
pub fn init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fableforge_engine=debug,fableforge_domain=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
