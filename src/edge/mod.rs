//! Distributed deployment: one edge node per drone
//!
//! An [`EdgeNode`] reads its flight controller and detector, publishes
//! telemetry and detections on the message bus, and reacts to commands sent
//! to it or broadcast to the whole swarm. Each collaborator comes in a real
//! and a simulated flavour behind the traits in [`traits`].

pub mod bus;
pub mod detector;
pub mod errors;
pub mod flight;
pub mod messages;
pub mod node;
pub mod traits;

#[cfg(test)]
pub mod mocks;

pub use bus::{connect_bus, parse_bus_address, LoopbackBus, NatsBus};
pub use detector::{Detection, Frame, SimulatedDetector};
pub use errors::{BusError, CommandError};
pub use flight::{FlightTelemetry, SimulatedFlightController, HEARTBEAT_TIMEOUT};
pub use messages::{
    command_topic, detection_topic, parse_command, telemetry_topic, Command, DetectionMessage,
    EdgeStatus, TelemetryMessage, Waypoint, BROADCAST_COMMAND_TOPIC,
};
pub use node::{EdgeNode, EdgeNodeReport, EdgeNodeSettings};
pub use traits::{BusMessage, Detector, FlightController, MessageBus};
