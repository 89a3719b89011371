// Edge Node - one drone's process in the distributed deployment
//
// Three independent cadences (telemetry, detection, state update) plus an
// out-of-band command queue, multiplexed in one tokio::select! loop. Commands
// only change the node's intent; publishing is best effort and bounded by a
// timeout so a dead broker never stalls the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn, Instrument};

use super::detector::Frame;
use super::messages::{
    command_topic, detection_topic, parse_command, telemetry_topic, timestamp_seconds, Command,
    DetectionMessage, EdgeStatus, TelemetryMessage, BROADCAST_COMMAND_TOPIC,
};
use super::traits::{BusMessage, Detector, FlightController, MessageBus};
use crate::config::EdgeConfig;
use crate::observability::SwarmMetrics;
use crate::shutdown::ShutdownSignal;
use crate::telemetry::{create_agent_span, generate_correlation_id};

/// Timing and thresholds for an edge node
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeNodeSettings {
    pub telemetry_interval: Duration,
    pub detection_interval: Duration,
    pub state_interval: Duration,
    pub publish_timeout: Duration,
    pub battery_drain_per_update: f64,
    pub low_battery_threshold: f64,
    pub frame: Frame,
}

impl Default for EdgeNodeSettings {
    fn default() -> Self {
        Self::from(&EdgeConfig::default())
    }
}

impl From<&EdgeConfig> for EdgeNodeSettings {
    fn from(config: &EdgeConfig) -> Self {
        Self {
            telemetry_interval: Duration::from_millis(config.telemetry_interval_ms.max(1)),
            detection_interval: Duration::from_millis(config.detection_interval_ms.max(1)),
            state_interval: Duration::from_millis(config.state_interval_ms.max(1)),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms.max(1)),
            battery_drain_per_update: config.battery_drain_per_update,
            low_battery_threshold: config.low_battery_threshold,
            frame: Frame {
                width: config.frame_width,
                height: config.frame_height,
            },
        }
    }
}

/// Final accounting of a node run
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeNodeReport {
    pub drone_id: String,
    pub status: EdgeStatus,
    pub battery: f64,
    pub detections: u64,
    pub messages_sent: u64,
    pub publish_failures: u64,
    pub uptime: Duration,
}

pub struct EdgeNode {
    drone_id: String,
    settings: EdgeNodeSettings,
    bus: Arc<dyn MessageBus>,
    flight: Box<dyn FlightController>,
    detector: Box<dyn Detector>,
    battery: f64,
    status: EdgeStatus,
    /// Last known (lat, lon, alt)
    position: (f64, f64, f64),
    formation: Option<String>,
    running: bool,
    detections: u64,
    messages_sent: u64,
    publish_failures: u64,
    metrics: Arc<SwarmMetrics>,
    started: Instant,
}

impl EdgeNode {
    pub fn new(
        drone_id: impl Into<String>,
        settings: EdgeNodeSettings,
        bus: Arc<dyn MessageBus>,
        flight: Box<dyn FlightController>,
        detector: Box<dyn Detector>,
    ) -> Self {
        Self {
            drone_id: drone_id.into(),
            settings,
            bus,
            flight,
            detector,
            battery: 100.0,
            status: EdgeStatus::Active,
            position: (0.0, 0.0, 0.0),
            formation: None,
            running: true,
            detections: 0,
            messages_sent: 0,
            publish_failures: 0,
            metrics: Arc::new(SwarmMetrics::new()),
            started: Instant::now(),
        }
    }

    pub fn with_battery(mut self, battery: f64) -> Self {
        self.battery = battery.clamp(0.0, 100.0);
        self
    }

    /// Share counters with other nodes or the ground station
    pub fn with_metrics(mut self, metrics: Arc<SwarmMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn drone_id(&self) -> &str {
        &self.drone_id
    }

    pub fn battery(&self) -> f64 {
        self.battery
    }

    pub fn status(&self) -> EdgeStatus {
        self.status
    }

    pub fn formation(&self) -> Option<&str> {
        self.formation.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn report(&self) -> EdgeNodeReport {
        EdgeNodeReport {
            drone_id: self.drone_id.clone(),
            status: self.status,
            battery: self.battery,
            detections: self.detections,
            messages_sent: self.messages_sent,
            publish_failures: self.publish_failures,
            uptime: self.started.elapsed(),
        }
    }

    /// Publish with an upper bound on how long the attempt may take.
    /// Failures are logged and counted, never returned.
    async fn publish_bounded(&mut self, topic: &str, payload: &[u8]) -> bool {
        let timeout = self.settings.publish_timeout;
        match tokio::time::timeout(timeout, self.bus.publish(topic, payload)).await {
            Ok(Ok(())) => {
                self.messages_sent += 1;
                self.metrics.record_publish();
                true
            }
            Ok(Err(e)) => {
                self.publish_failures += 1;
                self.metrics.record_publish_failure();
                error!(topic, bus = self.bus.name(), "Failed to publish: {}", e);
                false
            }
            Err(_) => {
                self.publish_failures += 1;
                self.metrics.record_publish_failure();
                error!(
                    topic,
                    timeout_ms = timeout.as_millis() as u64,
                    "Publish timed out"
                );
                false
            }
        }
    }

    pub async fn publish_telemetry(&mut self) -> bool {
        if let Some(t) = self.flight.get_telemetry() {
            self.position = (t.lat, t.lon, t.altitude);
        }
        let message = TelemetryMessage {
            agent_id: self.drone_id.clone(),
            timestamp_seconds: timestamp_seconds(),
            latitude: self.position.0,
            longitude: self.position.1,
            altitude: self.position.2,
            battery: self.battery,
            status: self.status,
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode telemetry: {}", e);
                return false;
            }
        };
        let topic = telemetry_topic(&self.drone_id);
        self.publish_bounded(&topic, &payload).await
    }

    /// Run one detection cycle; returns the number of detections published
    pub async fn run_detection(&mut self) -> usize {
        if self.status != EdgeStatus::Active {
            return 0;
        }

        let found = self.detector.detect(&self.settings.frame);
        let topic = detection_topic(&self.drone_id);
        let mut published = 0;
        for detection in found {
            let message = DetectionMessage {
                agent_id: self.drone_id.clone(),
                timestamp_seconds: timestamp_seconds(),
                object_class: detection.class_name,
                confidence: detection.confidence,
                bbox: detection.bbox,
                latitude: self.position.0,
                longitude: self.position.1,
            };
            let Ok(payload) = serde_json::to_vec(&message) else {
                continue;
            };
            if self.publish_bounded(&topic, &payload).await {
                self.detections += 1;
                self.metrics.record_detections(1, 0);
                published += 1;
                info!(
                    object = %message.object_class,
                    confidence = message.confidence,
                    "Detection published"
                );
            }
        }
        published
    }

    /// Drain the battery one step and apply the status rules
    pub fn update_state(&mut self) {
        self.battery = (self.battery - self.settings.battery_drain_per_update).max(0.0);

        if self.battery < self.settings.low_battery_threshold && self.status == EdgeStatus::Active {
            warn!(battery = self.battery, "Low battery, returning");
            self.status = EdgeStatus::Returning;
        }

        if self.battery == 0.0 {
            error!("Battery depleted, emergency");
            self.status = EdgeStatus::Emergency;
            self.running = false;
        }
    }

    /// Apply a raw command payload. Bad payloads are logged and dropped.
    pub fn handle_command(&mut self, payload: &[u8]) -> Option<Command> {
        let command = match parse_command(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Discarding command: {}", e);
                return None;
            }
        };
        info!(command = command.type_name(), "Received command");

        let accepted = match &command {
            Command::Rtl => {
                self.status = EdgeStatus::Returning;
                self.flight.return_to_launch()
            }
            Command::Loiter => {
                self.status = EdgeStatus::Loitering;
                self.flight.loiter()
            }
            Command::Waypoint { waypoint } => {
                info!(
                    lat = waypoint.lat,
                    lon = waypoint.lon,
                    alt = waypoint.alt,
                    "Navigating to waypoint"
                );
                self.flight
                    .goto_waypoint(waypoint.lat, waypoint.lon, waypoint.alt)
            }
            Command::EmergencyLand => {
                warn!("Emergency land initiated");
                self.status = EdgeStatus::Emergency;
                self.flight.emergency_land()
            }
            Command::FormationChange { formation } => {
                info!(formation = ?formation, "Changing formation");
                self.formation = formation.clone();
                true
            }
        };
        if !accepted {
            warn!(
                command = command.type_name(),
                "Flight controller did not accept command"
            );
        }
        Some(command)
    }

    async fn subscribe(&self, topic: &str) -> Option<mpsc::Receiver<BusMessage>> {
        match self.bus.subscribe(topic).await {
            Ok(rx) => {
                info!(topic, "Subscribed");
                Some(rx)
            }
            Err(e) => {
                warn!(topic, "Subscription failed, commands on it will be missed: {}", e);
                None
            }
        }
    }

    /// Run until shutdown or battery depletion
    pub async fn run(mut self, shutdown: ShutdownSignal) -> EdgeNodeReport {
        let span = create_agent_span(&self.drone_id, &generate_correlation_id());
        async move {
            self.run_loop(shutdown).await;
            self.finish().await
        }
        .instrument(span)
        .await
    }

    async fn run_loop(&mut self, mut shutdown: ShutdownSignal) {
        info!(bus = self.bus.name(), "Edge node started");
        let mut direct = self.subscribe(&command_topic(&self.drone_id)).await;
        let mut broadcast = self.subscribe(BROADCAST_COMMAND_TOPIC).await;

        let mut telemetry = ticker(self.settings.telemetry_interval);
        let mut detection = ticker(self.settings.detection_interval);
        let mut state = ticker(self.settings.state_interval);

        while self.running {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("Shutting down");
                    break;
                }
                message = next_message(&mut direct) => match message {
                    Some(message) => { self.handle_command(&message.payload); }
                    None => direct = None,
                },
                message = next_message(&mut broadcast) => match message {
                    Some(message) => { self.handle_command(&message.payload); }
                    None => broadcast = None,
                },
                _ = telemetry.tick() => { self.publish_telemetry().await; }
                _ = detection.tick() => { self.run_detection().await; }
                _ = state.tick() => self.update_state(),
            }
        }
    }

    async fn finish(self) -> EdgeNodeReport {
        if let Err(e) = self.bus.close().await {
            warn!("Bus close failed: {}", e);
        }
        let report = self.report();
        info!(
            uptime_s = report.uptime.as_secs_f64(),
            detections = report.detections,
            messages = report.messages_sent,
            status = %report.status,
            "Edge node stopped"
        );
        report
    }
}

/// Interval whose first tick is one period from now
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_message(rx: &mut Option<mpsc::Receiver<BusMessage>>) -> Option<BusMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
