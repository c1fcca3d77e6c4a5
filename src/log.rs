use color_eyre::eyre::Report;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber and error reporter. Call once at startup.
pub fn init() -> Result<(), Report> {
    color_eyre::install()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(ErrorLayer::default())
        .try_init()?;
    Ok(())
}
