// Swarm coordination engine
//
// A registry of agents advanced one discrete tick at a time. Every stage of a
// tick reads the same pre-tick snapshot and the registry commits the results
// together, so stage order never leaks into the outcome.

pub mod connectivity;
pub mod coordinator;
pub mod detection;
pub mod motion;
pub mod registry;
pub mod resilience;
pub mod types;

pub use connectivity::{ConnectivityEdge, ConnectivityGraph, ConnectivityParams};
pub use coordinator::{
    is_running, run, CoordinationLoop, LoopEvent, RunOptions, SwarmContext, SwarmParams,
    SwarmStats, TickReport, MAX_TICK_HZ, MIN_TICK_PERIOD,
};
pub use detection::{BroadcastEvent, Capture, DetectionOutcome, DetectionParams, DetectionTracker};
pub use motion::{FlockingParams, FlockingTerms, MotionModel, MotionProposal};
pub use registry::{AgentRegistry, SwarmSnapshot, TickCommit};
pub use resilience::{ResilienceMonitor, ResilienceParams, ResilienceUpdate};
pub use types::{reference_formation, Agent, AgentId, AgentStatus, Target, Vec2, WorldBounds};
