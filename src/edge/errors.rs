use thiserror::Error;

/// Transport errors from a message bus. Always non-fatal for the node loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Message bus not connected: {address}")]
    NotConnected { address: String },
    #[error("Bus IO error: {message}")]
    Io { message: String },
    #[error("Bus operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Bus protocol error: {message}")]
    Protocol { message: String },
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        BusError::Io {
            message: err.to_string(),
        }
    }
}

/// Command payloads that could not be turned into a [`super::messages::Command`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Malformed command payload: {message}")]
    Malformed { message: String },
    #[error("Unknown command type: {command_type}")]
    UnknownType { command_type: String },
}
