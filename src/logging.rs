//! Logging setup.
//!
//! Compact timestamped `tracing` output on stderr, filtered by
//! `logging.level` from the config. `RUST_LOG` takes precedence:
//!
//! ```bash
//! RUST_LOG=doc_chat=debug docchat chat notes.pdf
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Install the global subscriber. Only the first call has an effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(&config.level)
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(CompactTime)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    });
}
