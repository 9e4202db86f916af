//! Shared helpers for the integration suites.

/// Install a fmt subscriber honoring `RUST_LOG`, once per test binary.
/// Subsequent calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
