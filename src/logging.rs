//! Tracing subscriber setup for the CLI.
//!
//! Engine modules emit `tracing` events at phase boundaries; this wires
//! them to stderr. `RUST_LOG` overrides the default filter; `--verbose`
//! raises the default from warnings to debug.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init(verbose: bool) {
    let default_filter = if verbose { "tohru=debug" } else { "tohru=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
