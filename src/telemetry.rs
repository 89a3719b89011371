use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging.
///
/// `RUST_LOG` wins over the configured level. JSON output carries the current
/// span so tick numbers and agent ids travel with every event.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.log_level, e))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .try_init()
    };
    result.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("gem-swarm telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the events of one run
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one coordination tick
pub fn create_tick_span(tick: u64, correlation_id: &str) -> tracing::Span {
    tracing::info_span!("swarm_tick", tick = tick, correlation.id = correlation_id)
}

/// Span wrapping the work of one edge node
pub fn create_agent_span(agent_id: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "edge_node",
        agent.id = agent_id,
        correlation.id = correlation_id
    )
}

/// Shutdown telemetry gracefully
pub fn shutdown_telemetry() {
    // For structured logging, no explicit shutdown needed
    tracing::info!("gem-swarm telemetry shutdown complete");
}
