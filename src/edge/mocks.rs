//! Recording collaborators for edge-node unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::detector::{Detection, Frame};
use super::errors::BusError;
use super::flight::FlightTelemetry;
use super::traits::{BusMessage, Detector, FlightController, MessageBus};

#[derive(Debug, Clone, PartialEq)]
pub enum FlightCall {
    SetMode(String),
    Arm,
    Disarm,
    Goto { lat: f64, lon: f64, alt: f64 },
}

/// Flight controller that accepts everything and records each call
#[derive(Clone, Default)]
pub struct RecordingFlightController {
    pub calls: Arc<Mutex<Vec<FlightCall>>>,
    pub telemetry: Option<FlightTelemetry>,
}

impl RecordingFlightController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telemetry(mut self, telemetry: FlightTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn recorded(&self) -> Vec<FlightCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: FlightCall) -> bool {
        self.calls.lock().unwrap().push(call);
        true
    }
}

impl FlightController for RecordingFlightController {
    fn get_telemetry(&mut self) -> Option<FlightTelemetry> {
        self.telemetry.clone()
    }

    fn set_mode(&mut self, mode: &str) -> bool {
        self.record(FlightCall::SetMode(mode.to_string()))
    }

    fn arm(&mut self) -> bool {
        self.record(FlightCall::Arm)
    }

    fn disarm(&mut self) -> bool {
        self.record(FlightCall::Disarm)
    }

    fn goto_waypoint(&mut self, lat: f64, lon: f64, alt: f64) -> bool {
        self.record(FlightCall::Goto { lat, lon, alt })
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// Detector that replays a fixed script, one entry per frame, then sees nothing
#[derive(Default)]
pub struct ScriptedDetector {
    pub script: VecDeque<Vec<Detection>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Vec<Detection> {
        self.script.pop_front().unwrap_or_default()
    }
}

/// Bus that records every publish and never delivers
#[derive(Default)]
pub struct RecordingBus {
    pub published: Mutex<Vec<BusMessage>>,
}

impl RecordingBus {
    pub fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.topic.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.published.lock().unwrap().push(BusMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// Bus whose broker is gone
pub struct FailingBus;

#[async_trait]
impl MessageBus for FailingBus {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), BusError> {
        Err(BusError::NotConnected {
            address: "nowhere:4222".to_string(),
        })
    }

    async fn subscribe(&self, _topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        Err(BusError::NotConnected {
            address: "nowhere:4222".to_string(),
        })
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// Bus whose publishes never complete
pub struct StalledBus;

#[async_trait]
impl MessageBus for StalledBus {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), BusError> {
        std::future::pending().await
    }

    async fn subscribe(&self, _topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}
