//! `tracing` subscriber setup for hosts embedding the drawer engine.
//!
//! The engine itself only emits `tracing` events; installing a subscriber
//! is the host's choice. [`init_subscriber`] is the default setup.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level`. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default fails if already set
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON lines on stderr.
///
/// Intended for hosts that ship logs to a collector.
pub fn init_json_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = subscriber.try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
    }
}
