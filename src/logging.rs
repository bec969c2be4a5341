//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "fixture_catalog=info";

/// Initialise logging from `RUST_LOG`, falling back to `fixture_catalog=info`.
/// Calling it twice is harmless.
pub fn init() {
    init_with(DEFAULT_DIRECTIVE);
}

fn init_with(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
