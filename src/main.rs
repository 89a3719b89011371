use anyhow::Result;
use clap::{Parser, Subcommand};
use statig::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use gem_swarm::config::{init_config, SwarmConfig};
use gem_swarm::edge::{
    connect_bus, EdgeNode, EdgeNodeSettings, SimulatedDetector, SimulatedFlightController,
};
use gem_swarm::observability::OperationTimer;
use gem_swarm::shutdown::ShutdownCoordinator;
use gem_swarm::swarm::{self, CoordinationLoop, RunOptions, SwarmContext, SwarmParams};
use gem_swarm::telemetry::{init_telemetry, shutdown_telemetry};

#[derive(Parser)]
#[command(name = "gem-swarm")]
#[command(about = "Decentralized drone swarm coordination")]
#[command(long_about = "gem-swarm runs the swarm coordination engine headless, or a single \
                       drone's edge node that talks to the rest of the swarm over the message bus.")]
struct Cli {
    /// Configuration file (defaults to gem-swarm.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordination loop and print final statistics
    Simulate {
        /// Stop after this many ticks (runs until Ctrl-C otherwise)
        #[arg(long)]
        ticks: Option<u64>,
        /// Seed for target placement and failure injection
        #[arg(long)]
        seed: Option<u64>,
        /// Fail a random active drone after this tick (repeatable)
        #[arg(long = "fail-at", value_name = "TICK")]
        fail_at: Vec<u64>,
        /// Tick as fast as possible instead of at the configured rate
        #[arg(long)]
        fast: bool,
    },
    /// Run one drone's edge node
    Edge {
        /// Unique drone identifier, e.g. drone-1
        #[arg(long, required = true)]
        drone_id: String,
        /// Message bus address
        #[arg(long)]
        bus_url: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = init_config(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    let result = match cli.command {
        Commands::Simulate {
            ticks,
            seed,
            fail_at,
            fast,
        } => tokio::runtime::Runtime::new()?.block_on(async {
            simulate_command(config, ticks, seed, fail_at, fast).await
        }),
        Commands::Edge { drone_id, bus_url } => tokio::runtime::Runtime::new()?
            .block_on(async { edge_command(config, drone_id, bus_url).await }),
    };

    shutdown_telemetry();
    result
}

async fn simulate_command(
    config: SwarmConfig,
    ticks: Option<u64>,
    seed: Option<u64>,
    fail_at: Vec<u64>,
    fast: bool,
) -> Result<()> {
    let params = SwarmParams::from(&config);
    let seed = seed.or(config.simulation.seed);
    let context = SwarmContext::init(params, seed);

    println!("🛸 GEM swarm simulation");
    println!("   Drones: {}", context.registry().agents().len());
    println!("   Seed:   {}", context.seed());
    let rate = if fast {
        "unpaced".to_string()
    } else {
        format!("{} Hz", params.tick_hz)
    };
    println!("   Rate:   {rate}");
    println!();

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers()?;

    let pacing = if fast {
        RunOptions::default()
    } else {
        RunOptions::paced(params.tick_hz)
    };
    let options = RunOptions {
        max_ticks: ticks,
        failure_schedule: fail_at,
        ..pacing
    };

    let timer = OperationTimer::new("simulation");
    let mut machine = CoordinationLoop::new(context).state_machine();
    swarm::run(&mut machine, shutdown.signal(), &options).await;
    timer.finish();

    let stats = machine.inner().swarm().shutdown();
    println!("{stats}");
    Ok(())
}

async fn edge_command(
    config: SwarmConfig,
    drone_id: String,
    bus_url: Option<String>,
) -> Result<()> {
    let bus_url = bus_url.unwrap_or_else(|| config.edge.bus_url.clone());

    println!("🛸 GEM edge node");
    println!("   Drone ID: {drone_id}");
    println!("   Bus URL:  {bus_url}");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let bus = connect_bus(
        &bus_url,
        Duration::from_millis(config.edge.connect_timeout_ms),
    )
    .await;
    info!(bus = bus.name(), "Message bus selected");

    // No hardware drivers are linked in; both collaborators run simulated
    warn!("Flight controller hardware not available, using simulated telemetry");
    warn!("Detector hardware not available, using simulated detections");
    let seed = config.simulation.seed;
    let flight = SimulatedFlightController::new(seed);
    let detector = SimulatedDetector::new(
        config.edge.detection_probability,
        config.edge.confidence_threshold,
        seed,
    );

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers()?;

    let node = EdgeNode::new(
        drone_id,
        EdgeNodeSettings::from(&config.edge),
        bus,
        Box::new(flight),
        Box::new(detector),
    );
    let report = node.run(shutdown.signal()).await;

    println!();
    println!("Edge node stopped ({})", report.status);
    println!("   Uptime:     {:.1}s", report.uptime.as_secs_f64());
    println!("   Detections: {}", report.detections);
    println!("   Messages:   {}", report.messages_sent);
    if report.publish_failures > 0 {
        println!("   Failed publishes: {}", report.publish_failures);
    }
    Ok(())
}
