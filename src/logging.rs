use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::error::{DashboardError, Result};

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| DashboardError::Config(err.to_string()))?;

    Ok(())
}
