//! Tracing subscriber setup
//!
//! Pools only emit `tracing` events; whichever process embeds them calls
//! [`init_tracing`] once to decide where those events go.

use crate::pool_config::LoggingSettings;
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level plus directives
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut spec = settings.level.to_lowercase();
    if let Some(directives) = settings.directives.as_deref().filter(|d| !d.trim().is_empty()) {
        spec.push(',');
        spec.push_str(directives);
    }

    EnvFilter::try_new(&spec).with_context(|| format!("Invalid log filter '{}'", spec))
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    settings.validate()?;
    let filter = build_filter(settings)?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if settings.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
