//! Diagnostic output for the command line tool.
//!
//! `RUST_LOG` takes precedence over the level picked from flags:
//! ```bash
//! RUST_LOG=tabcaption=trace tabcaption captions workspace.json
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: Once = Once::new();

/// Filter used when neither `RUST_LOG` nor `-v` says otherwise.
pub const DEFAULT_FILTER: &str = "warn";

/// Picks the default filter from the `-v` count and the stored `logging`
/// option. Caption engine lines are emitted under the `tabcaption` target.
pub fn filter_for(verbosity: u8, engine_logging: bool) -> String {
    let base = match verbosity {
        0 => DEFAULT_FILTER,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    if engine_logging && verbosity < 3 {
        format!("{base},tabcaption=trace")
    } else {
        base.to_string()
    }
}

/// Installs the stderr subscriber. Only the first call takes effect.
pub fn init(default_filter: &str) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(default_filter)
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_default_level() {
        assert_eq!(filter_for(0, false), "warn");
        assert_eq!(filter_for(2, false), "debug");
        assert_eq!(filter_for(7, true), "trace");
        assert_eq!(filter_for(0, true), "warn,tabcaption=trace");
    }
}
