//! Log subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{BladecamError, Result};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level, for example
/// `RUST_LOG=bladecam_kernel_cam=debug`. Fails if a subscriber is already
/// installed or the level is not a valid filter directive.
///
/// ```no_run
/// use bladecam::{logging, LoggingConfig};
/// logging::init_logging(&LoggingConfig::default()).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            BladecamError::Config(format!("invalid log level '{}': {e}", config.level))
        })?,
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| BladecamError::Config(format!("logging already initialised: {e}")))
}

/// Debug-level logging captured by the test harness. Safe to call repeatedly.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_is_idempotent() {
        init_test();
        init_test();
        tracing::debug!("still logging");
    }
}
