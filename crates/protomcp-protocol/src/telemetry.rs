//! Tracing initialization shared by the ambient stack.
//!
//! A single `tracing_subscriber` setup so callers don't each invent their
//! own `RUST_LOG` wiring; CLIs/servers embedding this crate may install
//! their own subscriber instead and skip this entirely.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading `RUST_LOG` (default
/// `info`), writing human-readable output to stderr. Call once, at
/// process startup; calling it twice returns an error from the
/// underlying `tracing` global dispatcher, which this function swallows
/// since a second init is almost always a harmless double-setup in tests.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
