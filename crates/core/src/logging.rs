//! Tracing setup for DagChain binaries.
//!
//! Filtering comes from `RUST_LOG` when it is set and from the `[logging]`
//! config section otherwise. Installing a subscriber is a once-per-process
//! operation; a second attempt is reported as a configuration error.

use crate::config::LoggingConfig;
use crate::{CoreError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber described by `config`.
///
/// ```no_run
/// use dagchain_core::{logging, Config};
///
/// let config = Config::default_config();
/// logging::init_from_config(&config.logging).unwrap();
/// tracing::info!(units = 0, "Unit store opened");
/// ```
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    };
    installed.map_err(|e| CoreError::Config(format!("logging already initialized: {e}")))
}

/// Parse the configured level, e.g. `info` or `dagchain_consensus=debug,warn`
pub fn level_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| CoreError::Config(format!("invalid logging level {level:?}: {e}")))
}
