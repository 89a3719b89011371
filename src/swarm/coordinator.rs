// Coordination Loop - one discrete tick at a time, Running until told to stop
//
// Tick order: snapshot -> connectivity -> motion -> detection -> resilience -> commit.
// Stages 2-5 read the same snapshot; only the commit writes the registry.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statig::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::connectivity::{ConnectivityGraph, ConnectivityParams};
use super::detection::{Capture, DetectionParams, DetectionTracker};
use super::motion::{FlockingParams, MotionModel};
use super::registry::{AgentRegistry, TickCommit};
use super::resilience::{ResilienceMonitor, ResilienceParams};
use super::types::{reference_formation, Agent, AgentId, Vec2, WorldBounds};
use crate::config::SwarmConfig;
use crate::observability::SwarmMetrics;
use crate::shutdown::ShutdownSignal;
use crate::telemetry::{create_tick_span, generate_correlation_id};

/// Fastest pacing the loop will run at
pub const MAX_TICK_HZ: f64 = 1000.0;
/// Shortest pacing period; `interval` rejects a zero period
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Rule parameters for every tick stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwarmParams {
    pub world: WorldBounds,
    pub flocking: FlockingParams,
    pub connectivity: ConnectivityParams,
    pub detection: DetectionParams,
    pub resilience: ResilienceParams,
    pub tick_hz: f64,
}

impl Default for SwarmParams {
    fn default() -> Self {
        Self {
            world: WorldBounds::default(),
            flocking: FlockingParams::default(),
            connectivity: ConnectivityParams::default(),
            detection: DetectionParams::default(),
            resilience: ResilienceParams::default(),
            tick_hz: 60.0,
        }
    }
}

impl From<&SwarmConfig> for SwarmParams {
    fn from(config: &SwarmConfig) -> Self {
        Self {
            world: config.world,
            flocking: config.flocking,
            connectivity: config.connectivity,
            detection: config.detection,
            resilience: config.resilience,
            tick_hz: config.simulation.tick_hz,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub active_agents: usize,
    pub edges: usize,
    pub detections: u64,
    pub broadcast_credits: u64,
    pub capture: Option<Capture>,
    pub failed: Vec<AgentId>,
}

/// Run statistics
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmStats {
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub active_agents: usize,
    pub total_agents: usize,
    pub detections: u64,
    pub messages_sent: u64,
    pub captures: u64,
}

impl SwarmStats {
    /// One operator supervises every active drone
    pub fn operator_ratio(&self) -> String {
        format!("1:{}", self.active_agents)
    }
}

impl fmt::Display for SwarmStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Active Drones: {}/{}", self.active_agents, self.total_agents)?;
        writeln!(f, "Operator Ratio: {}", self.operator_ratio())?;
        writeln!(f, "Detections: {}", self.detections)?;
        writeln!(f, "Mesh Messages: {}", self.messages_sent)?;
        writeln!(f, "Captures: {}", self.captures)?;
        write!(f, "Time: {:.1}s ({} ticks)", self.elapsed_seconds, self.tick)
    }
}

/// Process-scoped swarm state, passed explicitly to the coordination loop
pub struct SwarmContext {
    params: SwarmParams,
    registry: AgentRegistry,
    motion: MotionModel,
    tracker: DetectionTracker,
    resilience: ResilienceMonitor,
    graph: ConnectivityGraph,
    formation: Vec<Agent>,
    initial_target: Option<Vec2>,
    seed: u64,
    rng: StdRng,
    metrics: Arc<SwarmMetrics>,
    tick: u64,
    correlation_id: String,
}

impl SwarmContext {
    /// Reference five-agent formation with a randomly placed first target
    pub fn init(params: SwarmParams, seed: Option<u64>) -> Self {
        Self::with_agents(params, reference_formation(), None, seed)
    }

    /// Explicit formation; the first target is placed at `target` or spawned randomly
    pub fn with_agents(
        params: SwarmParams,
        agents: Vec<Agent>,
        target: Option<Vec2>,
        seed: Option<u64>,
    ) -> Self {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tracker = DetectionTracker::new(params.detection, params.world);
        let first_target = match target {
            Some(position) => tracker.place_target(position),
            None => tracker.spawn_target(&mut rng, None),
        };
        let correlation_id = generate_correlation_id();

        info!(
            agents = agents.len(),
            seed,
            correlation_id = %correlation_id,
            "Swarm initialized"
        );

        Self {
            params,
            registry: AgentRegistry::new(agents.clone(), first_target),
            motion: MotionModel::new(params.flocking),
            tracker,
            resilience: ResilienceMonitor::new(params.resilience),
            graph: ConnectivityGraph::default(),
            formation: agents,
            initial_target: target,
            seed,
            rng,
            metrics: Arc::new(SwarmMetrics::new()),
            tick: 0,
            correlation_id,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SwarmMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn params(&self) -> &SwarmParams {
        &self.params
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Connectivity graph built by the most recent tick
    pub fn graph(&self) -> &ConnectivityGraph {
        &self.graph
    }

    pub fn metrics(&self) -> &Arc<SwarmMetrics> {
        &self.metrics
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Execute one tick and commit it
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let span = create_tick_span(self.tick, &self.correlation_id);
        let _guard = span.enter();

        let snapshot = self.registry.snapshot();
        self.graph = ConnectivityGraph::build(&snapshot, &self.params.connectivity);
        let motion = self.motion.compute(&snapshot);
        let detection = self.tracker.evaluate(&snapshot, &mut self.rng);
        let resilience = self.resilience.evaluate(&snapshot);

        let failed: Vec<AgentId> = resilience
            .iter()
            .filter(|u| u.failed())
            .map(|u| u.agent)
            .collect();
        let report = TickReport {
            tick: self.tick,
            active_agents: snapshot.active_count(),
            edges: self.graph.edge_count(),
            detections: detection.detections(),
            broadcast_credits: detection.broadcast_credits(),
            capture: detection.capture,
            failed,
        };

        self.registry.commit(
            TickCommit {
                motion,
                detection,
                resilience,
            },
            &self.params.world,
        );

        self.metrics.record_tick();
        self.metrics
            .record_detections(report.detections, report.broadcast_credits);
        if report.capture.is_some() {
            self.metrics.record_capture();
        }
        self.metrics.record_agent_failures(report.failed.len() as u64);

        debug!(
            active = report.active_agents,
            edges = report.edges,
            detections = report.detections,
            "Tick committed"
        );
        report
    }

    /// Operator action: fail a specific agent between ticks
    pub fn fail_agent(&mut self, id: AgentId) -> bool {
        let failed = self.registry.mark_failed(id);
        if failed {
            self.metrics.record_agent_failures(1);
            warn!(agent = id, "Agent failed by operator");
        }
        failed
    }

    /// Operator action: fail one active agent chosen at random
    pub fn fail_random_agent(&mut self) -> Option<AgentId> {
        let active = self.registry.active_ids();
        if active.is_empty() {
            return None;
        }
        let id = active[self.rng.random_range(0..active.len())];
        self.fail_agent(id).then_some(id)
    }

    /// Operator action: return to the initial formation with fresh counters
    pub fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.tracker.reset();
        let first_target = match self.initial_target {
            Some(position) => self.tracker.place_target(position),
            None => self.tracker.spawn_target(&mut self.rng, None),
        };
        self.registry = AgentRegistry::new(self.formation.clone(), first_target);
        self.graph = ConnectivityGraph::default();
        self.tick = 0;
        self.metrics.reset();
        info!("Swarm reset to initial formation");
    }

    pub fn stats(&self) -> SwarmStats {
        let metrics = self.metrics.get_stats();
        SwarmStats {
            tick: self.tick,
            elapsed_seconds: self.tick as f64 / self.params.tick_hz.max(f64::MIN_POSITIVE),
            active_agents: self.registry.active_ids().len(),
            total_agents: self.registry.agents().len(),
            detections: metrics.detections,
            messages_sent: metrics.messages_sent,
            captures: metrics.captures,
        }
    }

    /// End of the context lifecycle; logs and returns the final statistics
    pub fn shutdown(&self) -> SwarmStats {
        let stats = self.stats();
        self.metrics.log_stats();
        info!(
            ticks = stats.tick,
            active = stats.active_agents,
            detections = stats.detections,
            "Swarm context shut down"
        );
        stats
    }
}

/// Inputs to the coordination loop state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    Tick,
    FailAgent(AgentId),
    FailRandomAgent,
    Reset,
    Stop,
}

pub struct CoordinationLoop {
    context: SwarmContext,
    last_report: Option<TickReport>,
}

impl CoordinationLoop {
    pub fn new(context: SwarmContext) -> Self {
        Self {
            context,
            last_report: None,
        }
    }

    pub fn swarm(&self) -> &SwarmContext {
        &self.context
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }
}

#[state_machine(initial = "State::running()")]
impl CoordinationLoop {
    #[state]
    fn running(&mut self, event: &LoopEvent) -> Outcome<State> {
        match event {
            LoopEvent::Tick => {
                self.last_report = Some(self.context.tick());
                Handled
            }
            LoopEvent::FailAgent(id) => {
                if !self.context.fail_agent(*id) {
                    debug!(agent = id, "Failure injection ignored, agent not active");
                }
                Handled
            }
            LoopEvent::FailRandomAgent => {
                self.context.fail_random_agent();
                Handled
            }
            LoopEvent::Reset => {
                self.context.reset();
                self.last_report = None;
                Handled
            }
            LoopEvent::Stop => {
                info!(tick = self.context.tick_count(), "Coordination loop stopped");
                Transition(State::stopped())
            }
        }
    }

    #[state]
    fn stopped(&mut self, event: &LoopEvent) -> Outcome<State> {
        if *event != LoopEvent::Stop {
            debug!(event = ?event, "Coordination loop is stopped, event ignored");
        }
        Handled
    }
}

pub fn is_running(machine: &StateMachine<CoordinationLoop>) -> bool {
    matches!(machine.state(), State::Running { .. })
}

/// How a driven run is paced and bounded
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Wall-clock spacing between ticks; `None` runs as fast as possible
    pub tick_period: Option<Duration>,
    pub max_ticks: Option<u64>,
    /// Tick counts after which a random active agent is failed
    pub failure_schedule: Vec<u64>,
}

impl RunOptions {
    /// Pace at `tick_hz`, clamped to at most one tick per `MIN_TICK_PERIOD`
    pub fn paced(tick_hz: f64) -> Self {
        let period = Duration::try_from_secs_f64(1.0 / tick_hz).unwrap_or(MIN_TICK_PERIOD);
        Self {
            tick_period: Some(period.max(MIN_TICK_PERIOD)),
            ..Default::default()
        }
    }
}

/// Drive the loop until `shutdown` fires or `max_ticks` is reached, then stop it.
///
/// The stop signal is checked at tick boundaries only.
pub async fn run(
    machine: &mut StateMachine<CoordinationLoop>,
    mut shutdown: ShutdownSignal,
    options: &RunOptions,
) -> SwarmStats {
    let mut interval = options.tick_period.map(|period| {
        let mut interval = tokio::time::interval(period.max(MIN_TICK_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });
    let mut executed = 0u64;

    loop {
        if shutdown.is_triggered() || options.max_ticks.is_some_and(|max| executed >= max) {
            break;
        }

        match interval.as_mut() {
            Some(interval) => {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.wait() => continue,
                }
            }
            None => tokio::task::yield_now().await,
        }

        machine.handle(&LoopEvent::Tick);
        executed += 1;

        let completed = machine.inner().swarm().tick_count();
        if options.failure_schedule.contains(&completed) {
            machine.handle(&LoopEvent::FailRandomAgent);
        }
    }

    machine.handle(&LoopEvent::Stop);
    machine.inner().swarm().stats()
}
