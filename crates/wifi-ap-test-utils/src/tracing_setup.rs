//! Tracing initialisation helpers for tests.
//!
//! The subscriber is initialised at most once per process, so every test
//! may call [`init_test_tracing`].

use tracing_subscriber::EnvFilter;

/// Initialise a tracing subscriber that writes to the test-harness writer
/// and respects the `RUST_LOG` environment variable (default `info`).
///
/// Subsequent calls are silently ignored.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     wifi_ap_test_utils::tracing_setup::init_test_tracing();
///     tracing::info!("visible with --nocapture");
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
