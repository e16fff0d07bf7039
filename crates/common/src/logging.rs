//! Process-wide logging initialization.
//!
//! A single call wires up a `tracing-subscriber` formatting layer; the
//! `--debug` CLI flag forces the debug level regardless of the
//! `RUST_LOG` environment.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber.
///
/// When `debug` is `true` the default filter is `debug`; otherwise it is
/// `info`. In both cases `RUST_LOG` overrides the default when set, so an
/// operator can still dial individual module targets up or down.
pub fn init_logging(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
