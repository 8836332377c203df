//! tracing setup for the CLI.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` when it is set and valid, otherwise from
/// `level` (config or `--log-level`), otherwise `info`. Output is the plain
/// fmt layer without module targets. Fails if a subscriber is already set.
pub fn init(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    Ok(())
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

