//! Diagnostic tracing
//!
//! Operator diagnostics via `RUST_LOG`, written to stderr. Per-agent log files
//! and the invocation history are product artifacts and are written regardless
//! of the filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "baton=info";

/// Initialize the global subscriber. `verbose` raises the default to debug.
///
/// ```bash
/// RUST_LOG=baton=debug baton run
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "baton=debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
