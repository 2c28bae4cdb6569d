//! Diagnostic tracing for podslot.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`; command output
//! (slot paths, listings) goes to stdout and is unaffected.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. With `verbose`, `podslot=debug`
/// is used when `RUST_LOG` is unset.
///
/// # Example
/// ```bash
/// RUST_LOG=podslot=debug podslot allocate
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "podslot=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
