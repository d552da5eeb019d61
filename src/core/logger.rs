// Logging Setup
// One global tracing subscriber shared by the binary, library, and tests

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

// Transport crates chatter at debug; cap them at warn
const QUIET_DEPS: &[&str] = &["tungstenite", "tokio_tungstenite", "hyper", "reqwest"];

/// Install the global tracing subscriber. `RUST_LOG` wins when set;
/// otherwise `default_level` (falling back to info) applies crate-wide.
/// Calls after the first are no-ops, so tests can call this freely.
pub fn setup_logging(default_level: Option<&str>, json_format: Option<bool>) {
    INIT.call_once(|| {
        let level = default_level.unwrap_or("info").to_lowercase();
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
        for dep in QUIET_DEPS {
            filter = filter.add_directive(format!("{}=warn", dep).parse().unwrap());
        }

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);
        if json_format.unwrap_or(false) {
            builder.json().init();
        } else {
            builder.init();
        }

        tracing::info!(level = %level, "Logging initialized");
    });
}
