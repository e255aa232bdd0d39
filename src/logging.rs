//! Tracing subscriber setup for binaries embedding the engine.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins when set, otherwise `default_directive` (e.g. `architect_meta=info`).
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
