use anyhow::{ensure, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::swarm::{
    ConnectivityParams, DetectionParams, FlockingParams, ResilienceParams, WorldBounds,
    MAX_TICK_HZ,
};

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "gem-swarm.toml";

/// Main configuration structure for the swarm engine and edge nodes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SwarmConfig {
    pub world: WorldBounds,
    pub flocking: FlockingParams,
    pub connectivity: ConnectivityParams,
    pub detection: DetectionParams,
    pub resilience: ResilienceParams,
    pub simulation: SimulationConfig,
    pub edge: EdgeConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Tick cadence of the coordination loop
    pub tick_hz: f64,
    /// Fixed seed for target spawning; random when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Message bus address
    pub bus_url: String,
    pub connect_timeout_ms: u64,
    pub telemetry_interval_ms: u64,
    pub detection_interval_ms: u64,
    pub state_interval_ms: u64,
    /// Upper bound for a single best-effort publish
    pub publish_timeout_ms: u64,
    pub battery_drain_per_update: f64,
    pub low_battery_threshold: f64,
    /// Chance per detection cycle that the simulated detector reports something
    pub detection_probability: f64,
    pub confidence_threshold: f64,
    /// Simulated camera frame size
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            bus_url: "nats://localhost:4222".to_string(),
            connect_timeout_ms: 2000,
            telemetry_interval_ms: 1000, // 1 Hz
            detection_interval_ms: 100,  // 10 Hz
            state_interval_ms: 10,
            publish_timeout_ms: 250,
            battery_drain_per_update: 0.01,
            low_battery_threshold: 20.0,
            detection_probability: 0.1,
            confidence_threshold: 0.5,
            frame_width: 640,
            frame_height: 640,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl SwarmConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`path`, or gem-swarm.toml when present)
    /// 3. Environment variables (prefixed with GEM_SWARM_, nested with `__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&SwarmConfig::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("GEM_SWARM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SwarmConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the tick rules meaningless
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.world.width > 0.0 && self.world.height > 0.0,
            "world bounds must be positive (got {}x{})",
            self.world.width,
            self.world.height
        );
        ensure!(self.flocking.max_speed > 0.0, "flocking.max_speed must be positive");
        ensure!(
            self.connectivity.communication_range > 0.0,
            "connectivity.communication_range must be positive"
        );
        ensure!(
            self.detection.detection_range > 0.0 && self.detection.capture_threshold >= 0.0,
            "detection ranges must be positive"
        );
        ensure!(
            self.resilience.battery_drain_per_tick >= 0.0,
            "resilience.battery_drain_per_tick must not be negative"
        );
        ensure!(
            self.simulation.tick_hz > 0.0 && self.simulation.tick_hz <= MAX_TICK_HZ,
            "simulation.tick_hz must be within (0, {}] (got {})",
            MAX_TICK_HZ,
            self.simulation.tick_hz
        );
        ensure!(
            (0.0..=1.0).contains(&self.edge.detection_probability),
            "edge.detection_probability must be within 0..=1"
        );
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Initialize configuration (called at startup)
pub fn init_config(path: Option<&Path>) -> Result<SwarmConfig> {
    if let Err(e) = SwarmConfig::load_env_file() {
        tracing::warn!("Ignoring unreadable .env file: {}", e);
    }
    let config = SwarmConfig::load(path)?;
    tracing::info!("Configuration loaded successfully");
    Ok(config)
}
