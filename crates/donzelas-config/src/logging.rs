//! Logging setup for the client core.
//!
//! Writes human-readable logs to stderr. Set `DONZELAS_LOG_FORMAT=json`
//! for structured JSON output instead.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize logging at the given default level.
///
/// `RUST_LOG` takes precedence over `level` when set. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init_logging(level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json_output = std::env::var("DONZELAS_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_output {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_ansi(true);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("debug");
        init_logging("info");

        // Emitting after double-init must not panic
        tracing::debug!("logging test event");
    }
}
