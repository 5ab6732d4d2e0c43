//! Telemetry helpers for structured logging.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "transfer_engine=info";

/// Initialize tracing. Embedders can install their own subscriber; this
/// helper installs a fmt subscriber filtered by `RUST_LOG` (falling back to
/// [`DEFAULT_FILTER`]) if none is set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

/// Like [`init_tracing`] but writes through the test harness capture, so
/// worker logs show up only for failing tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
