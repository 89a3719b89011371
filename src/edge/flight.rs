use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::traits::FlightController;

/// A controller counts as connected while its last heartbeat is younger than this
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightTelemetry {
    pub lat: f64,
    pub lon: f64,
    /// Metres above sea level
    pub altitude: f64,
    /// Metres above home
    pub relative_altitude: f64,
    /// Degrees
    pub heading: u16,
    pub ground_speed: f64,
    pub air_speed: f64,
    pub battery_voltage: f64,
    pub battery_current: f64,
    pub battery_remaining_percent: u8,
    pub flight_mode: String,
    pub armed: bool,
    /// 0 = no GPS, 3 = 3D fix
    pub gps_fix: u8,
    pub satellites_visible: u8,
}

pub(crate) fn heartbeat_fresh(last_heartbeat: Option<Instant>, now: Instant) -> bool {
    last_heartbeat.is_some_and(|last| now.saturating_duration_since(last) < HEARTBEAT_TIMEOUT)
}

/// Stand-in for a real autopilot link.
///
/// Telemetry is plausible noise around Oslo. Commands only succeed while a
/// heartbeat is fresh, and nothing produces heartbeats unless
/// [`record_heartbeat`](Self::record_heartbeat) is called, so by default every
/// command is refused the way a disconnected controller refuses it.
pub struct SimulatedFlightController {
    rng: StdRng,
    last_heartbeat: Option<Instant>,
    mode: String,
    armed: bool,
}

impl SimulatedFlightController {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            rng,
            last_heartbeat: None,
            mode: "AUTO".to_string(),
            armed: true,
        }
    }

    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }
}

impl FlightController for SimulatedFlightController {
    fn get_telemetry(&mut self) -> Option<FlightTelemetry> {
        let rng = &mut self.rng;
        Some(FlightTelemetry {
            lat: 59.9139 + rng.random_range(-0.01..=0.01),
            lon: 10.7522 + rng.random_range(-0.01..=0.01),
            altitude: 100.0 + rng.random_range(-5.0..=5.0),
            relative_altitude: 50.0 + rng.random_range(-2.0..=2.0),
            heading: rng.random_range(0..360),
            ground_speed: rng.random_range(5.0..=15.0),
            air_speed: rng.random_range(5.0..=15.0),
            battery_voltage: 22.2 + rng.random_range(-0.5..=0.5),
            battery_current: 15.0 + rng.random_range(-2.0..=2.0),
            battery_remaining_percent: rng.random_range(60..=90),
            flight_mode: self.mode.clone(),
            armed: self.armed,
            gps_fix: 3,
            satellites_visible: 12,
        })
    }

    fn set_mode(&mut self, mode: &str) -> bool {
        if !self.is_connected() {
            debug!(mode, "Mode change refused, no heartbeat");
            return false;
        }
        info!(mode, "Flight mode changed");
        self.mode = mode.to_string();
        true
    }

    fn arm(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.armed = true;
        true
    }

    fn disarm(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.armed = false;
        true
    }

    fn goto_waypoint(&mut self, lat: f64, lon: f64, alt: f64) -> bool {
        if !self.is_connected() {
            return false;
        }
        info!(lat, lon, alt, "Navigating to waypoint");
        true
    }

    fn is_connected(&self) -> bool {
        heartbeat_fresh(self.last_heartbeat, Instant::now())
    }
}
