// Tracing setup
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so encoded command text on stdout stays clean.
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing init: {}", e))?;
    Ok(())
}
