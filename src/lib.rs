// GEM Swarm Library - decentralized drone swarm coordination
// This exposes the core components for testing and integration

pub mod config;
pub mod edge;
pub mod observability;
pub mod shutdown;
pub mod swarm;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{init_config, SwarmConfig};
pub use edge::{EdgeNode, EdgeNodeReport, EdgeNodeSettings, EdgeStatus, MessageBus};
pub use observability::{OperationTimer, SwarmMetrics, SwarmMetricsStats};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use swarm::{
    Agent, AgentId, AgentStatus, CoordinationLoop, LoopEvent, RunOptions, SwarmContext,
    SwarmParams, SwarmStats, Target, TickReport, Vec2,
};
pub use telemetry::{generate_correlation_id, init_telemetry, shutdown_telemetry};
