//! Collaborator interfaces consumed by an edge node
//!
//! Each collaborator has a real and a simulated variant. The node is handed one
//! of them at startup and never asks which it got.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::detector::{Detection, Frame};
use super::errors::BusError;
use super::flight::FlightTelemetry;

/// Flight-controller link. Command methods report whether the controller accepted them.
pub trait FlightController: Send {
    fn get_telemetry(&mut self) -> Option<FlightTelemetry>;
    fn set_mode(&mut self, mode: &str) -> bool;
    fn arm(&mut self) -> bool;
    fn disarm(&mut self) -> bool;
    fn goto_waypoint(&mut self, lat: f64, lon: f64, alt: f64) -> bool;
    /// True iff a heartbeat arrived within the last five seconds
    fn is_connected(&self) -> bool;

    fn return_to_launch(&mut self) -> bool {
        self.set_mode("RTL")
    }

    fn emergency_land(&mut self) -> bool {
        self.set_mode("LAND")
    }

    fn loiter(&mut self) -> bool {
        self.set_mode("LOITER")
    }
}

/// Object detector run against camera frames
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Vec<Detection>;
}

/// A message delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe transport between edge nodes and the ground station
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Deliveries for `topic` arrive on the returned channel, out of band from the caller
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError>;

    async fn close(&self) -> Result<(), BusError>;
}
