//! `tracing` subscriber setup.
//!
//! The engine only emits events through the `tracing` macros; binaries and
//! tests decide whether anything is printed by installing a subscriber here.
//! `RUST_LOG` takes precedence over the default level passed in.

use tracing_subscriber::EnvFilter;

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install a global fmt subscriber. Panics if one is already installed.
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_thread_names(true)
        .init();
}

/// Install a global fmt subscriber unless one already exists.
///
/// Returns `false` when another subscriber was installed first, which is the
/// normal case when several tests share a process.
pub fn try_init_tracing(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_thread_names(true)
        .with_test_writer()
        .try_init()
        .is_ok()
}
