//! Inspection protocol message types
//!
//! These types cover the envelope and the Debugger/Runtime domain payloads
//! used by the debug core. Responses carry the `id` of the command they
//! answer; events have no `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Envelope ===

/// Outgoing protocol command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Response to a command, correlated by `id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

/// Error payload inside a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Unsolicited event from the target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Incoming message: a response (has `id`) or an event (does not)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    Response(CommandResponse),
    Event(EventMessage),
}

// === Debugger domain ===

/// A position inside a loaded script (0-based coordinates)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: String,
    pub line_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

/// Debugger.setBreakpointByUrl parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlParams {
    pub url: String,
    pub line_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Debugger.setBreakpointByUrl result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResult {
    pub breakpoint_id: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// Debugger.scriptParsed event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
    pub script_id: String,
    pub url: String,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
}

/// One stack entry available while paused
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: String,
    pub function_name: String,
    pub location: Location,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub scope_chain: Vec<Scope>,
}

/// A scope visible from a call frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: String,
    pub object: RemoteObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Debugger.paused event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
    pub reason: String,
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
}

/// Debugger.evaluateOnCallFrame parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrameParams {
    pub call_frame_id: String,
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
}

// === Runtime domain ===

/// A value or object reference held by the target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl RemoteObject {
    /// Human-readable rendering, preferring the primitive value
    pub fn display(&self) -> String {
        if let Some(value) = &self.value {
            match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        } else if let Some(desc) = &self.description {
            desc.clone()
        } else {
            self.object_type.clone()
        }
    }
}

/// Runtime.evaluate / Debugger.evaluateOnCallFrame result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

/// Details of an evaluation that threw
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Best-effort error message for diagnostics
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Runtime.getProperties result entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
}

/// Runtime.getProperties result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesResult {
    #[serde(default)]
    pub result: Vec<PropertyDescriptor>,
}

/// Runtime.consoleAPICalled event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalled {
    #[serde(rename = "type", default)]
    pub call_type: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
}

/// Debugger.getScriptSource result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSourceResult {
    pub script_source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_with_id_is_response() {
        let json = r#"{"id": 7, "result": {"breakpointId": "1:10:0:app.js", "locations": []}}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        match msg {
            IncomingMessage::Response(r) => {
                assert_eq!(r.id, 7);
                assert!(r.result.is_some());
            }
            _ => panic!("Expected Response"),
        }
    }

    #[test]
    fn incoming_without_id_is_event() {
        let json = r#"{"method": "Debugger.paused", "params": {"callFrames": [], "reason": "other"}}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        match msg {
            IncomingMessage::Event(e) => assert_eq!(e.method, "Debugger.paused"),
            _ => panic!("Expected Event"),
        }
    }

    #[test]
    fn paused_event_round_trips() {
        let json = r#"{
            "callFrames": [{
                "callFrameId": "frame-0",
                "functionName": "handler",
                "location": {"scriptId": "55", "lineNumber": 12, "columnNumber": 4},
                "url": "http://localhost/app.js",
                "scopeChain": []
            }],
            "reason": "breakpoint",
            "hitBreakpoints": ["1:12:0:app.js"]
        }"#;
        let paused: PausedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(paused.call_frames.len(), 1);
        assert_eq!(paused.call_frames[0].location.line_number, 12);
        assert_eq!(paused.hit_breakpoints, vec!["1:12:0:app.js"]);
    }

    #[test]
    fn remote_object_display_prefers_value() {
        let obj = RemoteObject {
            object_type: "number".to_string(),
            value: Some(serde_json::json!(42)),
            description: Some("42".to_string()),
            ..Default::default()
        };
        assert_eq!(obj.display(), "42");

        let obj = RemoteObject {
            object_type: "object".to_string(),
            description: Some("Array(3)".to_string()),
            ..Default::default()
        };
        assert_eq!(obj.display(), "Array(3)");
    }
}
