use std::sync::Once;

use tracing::info;
use tracing_subscriber::EnvFilter;

static TEST_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber for a service binary.
///
/// Log level defaults to `info` and can be overridden with `RUST_LOG`. Returns an
/// error if a global subscriber is already installed.
pub fn init_tracing(service_name: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()?;

    info!("tracing initialized for service '{service_name}'");

    Ok(())
}

/// Initializes tracing for tests.
///
/// Safe to call at the top of every test; only the first call installs a subscriber.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
