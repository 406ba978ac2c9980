//! IPC protocol message types
//!
//! Defines the request/response format for CLI ↔ daemon communication.
//! Commands are keyed by an optional session selector (id or reference);
//! absent means the active session. Coordinates are 1-based on this
//! boundary regardless of the runtime's 0-based internals, and a
//! requested-vs-resolved difference always travels as an explicit
//! `location_differs` field.

use serde::{Deserialize, Serialize};

use crate::common::error::IpcError;
use crate::session::debug_session::RuntimeKind;
use crate::session::{
    BreakpointOutcome, BreakpointSummary, EvalOutcome, FrameSnapshot, LimitBreach, SourcePosition,
    VariableEntry,
};

/// IPC request from CLI to daemon
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for matching responses
    pub id: u64,
    /// The command to execute
    pub command: Command,
}

/// IPC response from daemon to CLI
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response corresponds to
    pub id: u64,
    /// Whether the command succeeded
    pub success: bool,
    /// Result data on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IpcError>,
}

impl Response {
    /// Create a success response
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: u64, error: IpcError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// Create a success response with no data
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            success: true,
            result: Some(serde_json::json!({})),
            error: None,
        }
    }
}

/// Commands that can be sent from CLI to daemon
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // === Session Management ===
    /// Attach to an inspection target
    Connect {
        host: String,
        port: u16,
        reference: Option<String>,
        tab_index: Option<usize>,
    },

    /// List open sessions
    Sessions,

    /// Make a session the default target
    SetActive { session: String },

    /// Close a session (active one when unspecified)
    Close { session: Option<String> },

    /// Daemon and session overview
    Status,

    // === Breakpoints ===
    /// Place a plain breakpoint
    SetBreakpoint {
        session: Option<String>,
        file: String,
        line: u32,
        column: Option<u32>,
        condition: Option<String>,
    },

    /// Place a logpoint with an execution ceiling
    SetLogpoint {
        session: Option<String>,
        file: String,
        line: u32,
        column: Option<u32>,
        template: String,
        ceiling: u32,
    },

    /// Remove a breakpoint or logpoint
    RemoveBreakpoint {
        session: Option<String>,
        id: String,
    },

    /// List placed breakpoints and logpoints
    ListBreakpoints { session: Option<String> },

    /// Zero a logpoint's execution counter on both sides
    ResetCounter {
        session: Option<String>,
        id: String,
    },

    // === Execution Control ===
    Pause { session: Option<String> },
    Resume { session: Option<String> },
    StepOver { session: Option<String> },
    StepInto { session: Option<String> },
    StepOut { session: Option<String> },

    // === State Inspection ===
    /// Call stack of the current pause
    CallStack { session: Option<String> },

    /// Variables visible from a paused frame (top frame when unspecified)
    Variables {
        session: Option<String>,
        frame_id: Option<String>,
        include_global: bool,
        filter: Option<String>,
        expand: bool,
        max_depth: u32,
    },

    /// Evaluate an expression in a paused frame
    Evaluate {
        session: Option<String>,
        expression: String,
        frame_id: Option<String>,
    },

    /// Read source text of a loaded script by line range
    Source {
        session: Option<String>,
        file: String,
        from_line: Option<u32>,
        to_line: Option<u32>,
    },

    // === Shutdown ===
    /// Shut down the daemon, closing every session
    Shutdown,
}

// === Result types for responses ===

/// A source position, 1-based
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl From<&SourcePosition> for PositionInfo {
    fn from(pos: &SourcePosition) -> Self {
        Self {
            file: pos.file.clone(),
            line: pos.line,
            column: pos.column,
        }
    }
}

impl std::fmt::Display for PositionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.column {
            Some(col) => write!(f, "{}:{}:{}", self.file, self.line, col),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// One open session
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub reference: Option<String>,
    pub host: String,
    pub port: u16,
    pub kind: RuntimeKind,
    pub state: String,
    pub tab_index: usize,
    pub active: bool,
    pub idle_secs: u64,
}

/// Placement outcome
#[derive(Debug, Serialize, Deserialize)]
pub struct BreakpointResult {
    pub id: String,
    pub requested: PositionInfo,
    pub resolved: PositionInfo,
    /// Set exactly when the runtime snapped the breakpoint elsewhere
    pub location_differs: bool,
    /// Set when the runtime reported multiple resolved locations
    pub ambiguous: bool,
}

impl From<&BreakpointOutcome> for BreakpointResult {
    fn from(outcome: &BreakpointOutcome) -> Self {
        Self {
            id: outcome.id.clone(),
            requested: (&outcome.requested).into(),
            resolved: (&outcome.resolved).into(),
            location_differs: outcome.location_differs,
            ambiguous: outcome.ambiguous,
        }
    }
}

/// Listing entry for a placed breakpoint or logpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct BreakpointListEntry {
    pub id: String,
    pub requested: PositionInfo,
    pub resolved: PositionInfo,
    pub location_differs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<u32>,
}

impl From<&BreakpointSummary> for BreakpointListEntry {
    fn from(summary: &BreakpointSummary) -> Self {
        Self {
            id: summary.id.clone(),
            requested: (&summary.requested).into(),
            resolved: (&summary.resolved).into(),
            location_differs: summary.location_differs,
            condition: summary.condition.clone(),
            template: summary.template.clone(),
            ceiling: summary.ceiling,
            execution_count: summary.execution_count,
        }
    }
}

/// Breakpoint removal outcome; the runtime-side failure, if any, is
/// reported without leaving local state inconsistent
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveResult {
    pub removed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_warning: Option<String>,
}

/// One call frame
#[derive(Debug, Serialize, Deserialize)]
pub struct FrameInfo {
    pub id: String,
    pub function: String,
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl From<&FrameSnapshot> for FrameInfo {
    fn from(frame: &FrameSnapshot) -> Self {
        Self {
            id: frame.id.clone(),
            function: frame.function_name.clone(),
            file: frame.location.file.clone(),
            line: frame.location.line,
            column: frame.location.column,
        }
    }
}

/// Execution-limit breach details attached to a pause
#[derive(Debug, Serialize, Deserialize)]
pub struct LimitBreachInfo {
    pub breakpoint_id: String,
    pub file: String,
    /// 1-based line of the logpoint
    pub line: u32,
    pub template: String,
    pub execution_count: u32,
    pub ceiling: u32,
    pub recent_logs: Vec<String>,
}

impl From<&LimitBreach> for LimitBreachInfo {
    fn from(breach: &LimitBreach) -> Self {
        Self {
            breakpoint_id: breach.breakpoint_id.clone(),
            file: breach.file.clone(),
            line: breach.line + 1,
            template: breach.template.clone(),
            execution_count: breach.execution_count,
            ceiling: breach.ceiling,
            recent_logs: breach.recent_logs.clone(),
        }
    }
}

/// Call stack response
#[derive(Debug, Serialize, Deserialize)]
pub struct CallStackResult {
    pub reason: String,
    pub frames: Vec<FrameInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_breach: Option<LimitBreachInfo>,
}

/// One variable, possibly expanded
#[derive(Debug, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub value: String,
    pub type_name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub scope: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<VariableInfo>,
}

impl From<&VariableEntry> for VariableInfo {
    fn from(entry: &VariableEntry) -> Self {
        Self {
            name: entry.name.clone(),
            value: entry.value.clone(),
            type_name: entry.type_name.clone(),
            scope: entry.scope.clone(),
            children: entry.children.iter().map(Into::into).collect(),
        }
    }
}

/// Expression evaluation result
#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateResult {
    pub value: String,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl From<&EvalOutcome> for EvaluateResult {
    fn from(outcome: &EvalOutcome) -> Self {
        Self {
            value: outcome.value.clone(),
            type_name: outcome.type_name.clone(),
            exception: outcome.exception.clone(),
        }
    }
}

/// Daemon status
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResult {
    pub daemon_running: bool,
    pub session_count: usize,
    pub active: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_round_trip_through_json() {
        let commands = vec![
            Command::Connect {
                host: "127.0.0.1".to_string(),
                port: 9229,
                reference: Some("checkout".to_string()),
                tab_index: None,
            },
            Command::SetLogpoint {
                session: None,
                file: "app.js".to_string(),
                line: 42,
                column: None,
                template: "x is {x}".to_string(),
                ceiling: 10,
            },
            Command::RemoveBreakpoint {
                session: Some("s1".to_string()),
                id: "1:41:0:app.js".to_string(),
            },
            Command::Variables {
                session: None,
                frame_id: None,
                include_global: false,
                filter: Some("cart".to_string()),
                expand: true,
                max_depth: 2,
            },
            Command::Shutdown,
        ];

        for command in commands {
            let json = serde_json::to_string(&command).unwrap();
            let back: Command = serde_json::from_str(&json).unwrap();
            assert_eq!(
                serde_json::to_string(&back).unwrap(),
                json,
                "round trip changed {}",
                json
            );
        }
    }

    #[test]
    fn response_success_and_error_shapes() {
        let ok = Response::success(3, serde_json::json!({"removed": "bp-1"}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = Response::error(
            4,
            IpcError {
                code: "NOT_PAUSED".to_string(),
                message: "Cannot evaluate".to_string(),
            },
        );
        assert!(!err.success);
        assert_eq!(err.error.unwrap().code, "NOT_PAUSED");
    }
}
