//! Diagnostic tracing for the searcher.
//!
//! Everything goes to stderr so stdout stays reserved for the JSON response.
//! Agent progress notifications and verbose agent stderr are emitted through
//! the same subscriber.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. When `verbose` is set and `RUST_LOG`
/// is unset, the default becomes `info` so agent stderr and progress show up.
///
/// # Example
/// ```bash
/// RUST_LOG=searcher=debug searcher search "tokio process groups"
/// ```
pub fn init(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
