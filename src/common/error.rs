//! Error types for the inspector CLI
//!
//! Error messages are designed to be actionable for tool-calling clients,
//! with enough structured context (locations, ids, counts) to drive a
//! targeted retry without re-querying state.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the inspector CLI
#[derive(Error, Debug)]
pub enum Error {
    // === Daemon/IPC Errors ===
    #[error("Daemon not running. Connect to a target with 'inspector connect <host:port>'")]
    DaemonNotRunning,

    #[error("Failed to spawn daemon: timed out waiting for socket after {0} seconds")]
    DaemonSpawnTimeout(u64),

    #[error("Failed to connect to daemon: {0}")]
    DaemonConnectionFailed(#[source] io::Error),

    #[error("Daemon communication error: {0}")]
    DaemonCommunication(String),

    // === Session Errors ===
    #[error("No session matches '{0}'. Use 'inspector sessions' to list open sessions")]
    SessionNotFound(String),

    #[error("No active session. Connect with 'inspector connect <host:port>' or select one with 'inspector use <ref>'")]
    NoActiveSession,

    #[error("Reference '{reference}' is already taken by session {holder}")]
    ReferenceConflict { reference: String, holder: String },

    #[error("Reference '{reference}' is reserved and cannot name a session")]
    ReferenceReserved { reference: String },

    // === Target Connection Errors ===
    #[error("Session is not connected to its target")]
    NotConnected,

    #[error("Target connection closed: {0}")]
    TargetClosed(String),

    #[error("No protocol transport available: {0}")]
    TransportUnavailable(String),

    // === Protocol Errors ===
    #[error("Inspection protocol error: {0}")]
    Protocol(String),

    #[error("Protocol command '{method}' failed: {message}")]
    CommandFailed { method: String, message: String },

    // === State Errors ===
    #[error("Cannot {action} while the target is {state}")]
    InvalidState { action: String, state: String },

    #[error("Cannot {action}: the target is running. Pause first or wait for a breakpoint hit")]
    NotPaused { action: String },

    // === Breakpoint Errors ===
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Breakpoint {id} not found")]
    BreakpointNotFound { id: String },

    #[error("Failed to place breakpoint at {location}: {diagnosis}")]
    PlacementFailed { location: String, diagnosis: String },

    #[error("Logpoint expressions do not resolve at {location}: [{}]{}", .failing.join(", "), format_suggestions(.suggestions))]
    ValidationFailed {
        location: String,
        failing: Vec<String>,
        suggestions: Vec<String>,
    },

    #[error("Invalid logpoint: {0}")]
    InvalidLogpoint(String),

    // === Execution-Limit State ===
    #[error(
        "Logpoint {breakpoint_id} at {location} exceeded its execution ceiling ({count} hits, ceiling {ceiling}). \
         Reset its counter with 'inspector logpoint reset {breakpoint_id}' or remove it before resuming"
    )]
    LimitExceeded {
        breakpoint_id: String,
        location: String,
        count: u32,
        ceiling: u32,
    },

    #[error("Frame {0} not found in the current pause")]
    FrameNotFound(String),

    // === Timeout Errors ===
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(". Suggestions: {}", suggestions.join("; "))
    }
}

impl Error {
    /// Create an invalid state error
    pub fn invalid_state(action: &str, state: &str) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Create a not-paused error
    pub fn not_paused(action: &str) -> Self {
        Self::NotPaused {
            action: action.to_string(),
        }
    }

    /// Create a placement failed error
    pub fn placement_failed(location: &str, diagnosis: &str) -> Self {
        Self::PlacementFailed {
            location: location.to_string(),
            diagnosis: diagnosis.to_string(),
        }
    }

    /// Create a protocol command failure
    pub fn command_failed(method: &str, message: &str) -> Self {
        Self::CommandFailed {
            method: method.to_string(),
            message: message.to_string(),
        }
    }
}

/// IPC-serializable error for daemon responses
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IpcError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for IpcError {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::DaemonNotRunning => "DAEMON_NOT_RUNNING",
            Error::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Error::NoActiveSession => "NO_ACTIVE_SESSION",
            Error::ReferenceConflict { .. } | Error::ReferenceReserved { .. } => {
                "REFERENCE_CONFLICT"
            }
            Error::NotConnected | Error::TargetClosed(_) => "NOT_CONNECTED",
            Error::NotPaused { .. } => "NOT_PAUSED",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::InvalidLocation(_) => "INVALID_LOCATION",
            Error::BreakpointNotFound { .. } => "BREAKPOINT_NOT_FOUND",
            Error::PlacementFailed { .. } => "PLACEMENT_FAILED",
            Error::ValidationFailed { .. } => "VALIDATION_FAILED",
            Error::InvalidLogpoint(_) => "INVALID_LOGPOINT",
            Error::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Error::FrameNotFound(_) => "FRAME_NOT_FOUND",
            Error::Timeout(_) => "TIMEOUT",
            Error::CommandFailed { .. } => "COMMAND_FAILED",
            _ => "INTERNAL_ERROR",
        }
        .to_string();

        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<IpcError> for Error {
    fn from(e: IpcError) -> Self {
        // Map IPC errors back to our error types where the code alone is enough
        match e.code.as_str() {
            "NO_ACTIVE_SESSION" => Error::NoActiveSession,
            "NOT_CONNECTED" => Error::NotConnected,
            "DAEMON_NOT_RUNNING" => Error::DaemonNotRunning,
            _ => Error::DaemonCommunication(e.message),
        }
    }
}
