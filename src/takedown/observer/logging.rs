use tracing_subscriber::EnvFilter;

use crate::takedown::observer::error::{ObserverError, Result};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Output goes to stderr so
/// that commands writing data to stdout stay clean.
pub fn init(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|err| ObserverError::Logging(err.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ObserverError::Logging(err.to_string()))
}
