//! Bus payloads exchanged by edge nodes
//!
//! All payloads are JSON objects with camelCase keys. Commands are tagged by
//! their `type` field.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::CommandError;

pub const TELEMETRY_PREFIX: &str = "gem.telemetry";
pub const DETECTION_PREFIX: &str = "gem.detection";
pub const COMMAND_PREFIX: &str = "gem.command";
pub const BROADCAST_COMMAND_TOPIC: &str = "gem.command.broadcast";

pub fn telemetry_topic(agent_id: &str) -> String {
    format!("{TELEMETRY_PREFIX}.{agent_id}")
}

pub fn detection_topic(agent_id: &str) -> String {
    format!("{DETECTION_PREFIX}.{agent_id}")
}

pub fn command_topic(agent_id: &str) -> String {
    format!("{COMMAND_PREFIX}.{agent_id}")
}

/// Seconds since the Unix epoch, with sub-second precision
pub fn timestamp_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Operational status an edge node reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Active,
    Returning,
    Loitering,
    Emergency,
}

impl std::fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EdgeStatus::Active => "active",
            EdgeStatus::Returning => "returning",
            EdgeStatus::Loitering => "loitering",
            EdgeStatus::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMessage {
    pub agent_id: String,
    pub timestamp_seconds: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// 0..=100
    pub battery: f64,
    pub status: EdgeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionMessage {
    pub agent_id: String,
    pub timestamp_seconds: f64,
    pub object_class: String,
    /// 0..=1
    pub confidence: f64,
    /// `[x, y, width, height]` in frame pixels
    pub bbox: [f64; 4],
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
    #[serde(alias = "altitude")]
    pub alt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Rtl,
    Loiter,
    Waypoint { waypoint: Waypoint },
    EmergencyLand,
    FormationChange {
        #[serde(default)]
        formation: Option<String>,
    },
}

const KNOWN_COMMANDS: &[&str] = &[
    "rtl",
    "loiter",
    "waypoint",
    "emergency_land",
    "formation_change",
];

impl Command {
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::Rtl => "rtl",
            Command::Loiter => "loiter",
            Command::Waypoint { .. } => "waypoint",
            Command::EmergencyLand => "emergency_land",
            Command::FormationChange { .. } => "formation_change",
        }
    }

    pub fn to_payload(&self) -> Vec<u8> {
        // Serializing a plain enum of owned data cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Decode a raw command payload.
///
/// Payloads that are not JSON objects with a string `type` are `Malformed`;
/// a well-formed object with an unrecognised `type` is `UnknownType`.
pub fn parse_command(payload: &[u8]) -> Result<Command, CommandError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| CommandError::Malformed {
            message: e.to_string(),
        })?;

    let command_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| CommandError::Malformed {
            message: "missing string field 'type'".to_string(),
        })?;

    if !KNOWN_COMMANDS.contains(&command_type) {
        return Err(CommandError::UnknownType {
            command_type: command_type.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| CommandError::Malformed {
        message: e.to_string(),
    })
}
