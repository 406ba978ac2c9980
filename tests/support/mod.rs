#![allow(dead_code)] // not every test crate uses every helper

//! Scripted in-memory inspection target for integration tests
//!
//! Implements [`Transport`] over channel pairs: commands sent by the client
//! are answered from a configured behavior table, and tests push events
//! (console output, pauses) through the handle as if the target emitted
//! them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use inspector::cdp::{CommandRequest, Transport};
use inspector::common::config::Config;
use inspector::common::Result;

/// How the fake target behaves
#[derive(Default)]
pub struct TargetBehavior {
    /// Answer the runtime-kind probe as a script runtime
    pub node: bool,
    /// Scripts announced after Debugger.enable: (url, end_line 0-based)
    pub scripts: Vec<(String, u32)>,
    /// Breakpoint resolution: (url, requested line 0-based) -> resolved line.
    /// Missing entries resolve to no locations.
    pub resolve: HashMap<(String, u32), u32>,
    /// Lines (0-based) where an unconditional breakpoint fires immediately
    pub hot_lines: HashSet<u32>,
    /// Expressions that resolve at a given line (0-based); everything else
    /// throws a ReferenceError
    pub vars_by_line: HashMap<u32, HashSet<String>>,
    /// Source returned by Debugger.getScriptSource
    pub script_source: String,
}

/// Mutable target state shared with the test
pub struct TargetState {
    pub behavior: TargetBehavior,
    /// Every command the client sent: (method, params)
    pub sent: Vec<(String, Value)>,
    /// Condition recorded per placed breakpoint id
    pub conditions: HashMap<String, Option<String>>,
    next_bp: u64,
}

/// Test-side handle to drive and observe the target
#[derive(Clone)]
pub struct TargetHandle {
    pub state: Arc<Mutex<TargetState>>,
    events: mpsc::UnboundedSender<String>,
}

impl TargetHandle {
    /// Number of times `method` was sent by the client
    pub fn sent_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Conditions of every placed breakpoint that carried one
    pub fn placed_conditions(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .conditions
            .values()
            .filter_map(|c| c.clone())
            .collect()
    }

    /// Emit a logpoint console line as the debuggee would
    pub fn emit_console_hit(&self, key: &str, count: u32, message: &str) {
        let frame = json!({
            "method": "Runtime.consoleAPICalled",
            "params": {
                "type": "log",
                "args": [
                    {"type": "string", "value": "__logpoint__"},
                    {"type": "string", "value": key},
                    {"type": "number", "value": count},
                    {"type": "string", "value": message},
                ],
            },
        });
        self.events.send(frame.to_string()).unwrap();
    }

    /// Emit a pause at a line with the given hit breakpoint ids
    pub fn emit_paused(&self, url: &str, line: u32, hit_breakpoints: &[&str], reason: &str) {
        let frame = json!({
            "method": "Debugger.paused",
            "params": {
                "callFrames": [call_frame(url, line)],
                "reason": reason,
                "hitBreakpoints": hit_breakpoints,
            },
        });
        self.events.send(frame.to_string()).unwrap();
    }
}

fn call_frame(url: &str, line: u32) -> Value {
    json!({
        "callFrameId": format!("frame-{}", line),
        "functionName": "handler",
        "location": {"scriptId": "1", "lineNumber": line, "columnNumber": 0},
        "url": url,
        "scopeChain": [
            {"type": "local", "object": {"type": "object", "objectId": format!("scope-{}", line)}},
            {"type": "global", "object": {"type": "object", "objectId": "scope-global"}},
        ],
    })
}

/// Transport half owned by the client under test
pub struct FakeTransport {
    state: Arc<Mutex<TargetState>>,
    to_client_tx: mpsc::UnboundedSender<String>,
    to_client_rx: mpsc::UnboundedReceiver<String>,
}

/// Build a connected fake target
pub fn fake_target(behavior: TargetBehavior) -> (Box<dyn Transport>, TargetHandle) {
    let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(TargetState {
        behavior,
        sent: Vec::new(),
        conditions: HashMap::new(),
        next_bp: 0,
    }));
    let handle = TargetHandle {
        state: Arc::clone(&state),
        events: to_client_tx.clone(),
    };
    (
        Box::new(FakeTransport {
            state,
            to_client_tx,
            to_client_rx,
        }),
        handle,
    )
}

/// Config with test-sized timeouts
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.timeouts.request_secs = 2;
    config.timeouts.validation_wait_secs = 2;
    config.timeouts.probe_wait_millis = 250;
    config.limits.log_ring_capacity = 5;
    config
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&mut self, text: &str) -> Result<()> {
        let request: CommandRequest = serde_json::from_str(text).expect("malformed command");
        let mut state = self.state.lock().unwrap();
        let params = request.params.clone().unwrap_or(Value::Null);
        state
            .sent
            .push((request.method.clone(), params.clone()));

        let mut events: Vec<Value> = Vec::new();
        let result = match request.method.as_str() {
            "Runtime.enable" => json!({}),
            "Debugger.enable" => {
                for (url, end_line) in &state.behavior.scripts {
                    events.push(json!({
                        "method": "Debugger.scriptParsed",
                        "params": {
                            "scriptId": "1",
                            "url": url,
                            "startLine": 0,
                            "endLine": end_line,
                        },
                    }));
                }
                json!({})
            }
            "Runtime.evaluate" => {
                let expression = params["expression"].as_str().unwrap_or_default();
                if expression.contains("process.versions.node") {
                    let answer = if state.behavior.node { "node" } else { "" };
                    json!({"result": {"type": "string", "value": answer}})
                } else {
                    // Counter reset and other global evaluations
                    json!({"result": {"type": "number", "value": 0}})
                }
            }
            "Debugger.setBreakpointByUrl" => {
                let url = params["url"].as_str().unwrap_or_default().to_string();
                let line = params["lineNumber"].as_u64().unwrap_or(0) as u32;
                let condition = params["condition"].as_str().map(String::from);

                state.next_bp += 1;
                let id = format!("{}:{}:{}", state.next_bp, line, url);
                state.conditions.insert(id.clone(), condition.clone());

                match state.behavior.resolve.get(&(url.clone(), line)).copied() {
                    Some(resolved) => {
                        if condition.is_none() && state.behavior.hot_lines.contains(&resolved) {
                            events.push(json!({
                                "method": "Debugger.paused",
                                "params": {
                                    "callFrames": [call_frame(&url, resolved)],
                                    "reason": "breakpoint",
                                    "hitBreakpoints": [id.clone()],
                                },
                            }));
                        }
                        json!({
                            "breakpointId": id,
                            "locations": [
                                {"scriptId": "1", "lineNumber": resolved, "columnNumber": 0}
                            ],
                        })
                    }
                    None => json!({"breakpointId": id, "locations": []}),
                }
            }
            "Debugger.removeBreakpoint" => json!({}),
            "Debugger.resume" => {
                events.push(json!({"method": "Debugger.resumed", "params": {}}));
                json!({})
            }
            "Debugger.pause" | "Debugger.stepOver" | "Debugger.stepInto" | "Debugger.stepOut" => {
                json!({})
            }
            "Debugger.evaluateOnCallFrame" => {
                let frame = params["callFrameId"].as_str().unwrap_or_default();
                let expression = params["expression"].as_str().unwrap_or_default();
                let line: u32 = frame
                    .strip_prefix("frame-")
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(0);
                let known = state
                    .behavior
                    .vars_by_line
                    .get(&line)
                    .is_some_and(|vars| vars.contains(expression));
                if known {
                    json!({"result": {"type": "number", "value": 7, "description": "7"}})
                } else {
                    json!({
                        "result": {"type": "object", "subtype": "error", "description": "ReferenceError"},
                        "exceptionDetails": {
                            "text": "Uncaught",
                            "exception": {
                                "type": "object",
                                "description": format!("ReferenceError: {} is not defined", expression),
                            },
                        },
                    })
                }
            }
            "Runtime.getProperties" => {
                let object_id = params["objectId"].as_str().unwrap_or_default();
                let line: u32 = object_id
                    .strip_prefix("scope-")
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(u32::MAX);
                let mut props: Vec<Value> = state
                    .behavior
                    .vars_by_line
                    .get(&line)
                    .map(|vars| {
                        vars.iter()
                            .map(|name| {
                                json!({
                                    "name": name,
                                    "value": {"type": "number", "value": 7, "description": "7"},
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                props.sort_by_key(|p| p["name"].as_str().unwrap_or_default().to_string());
                json!({"result": props})
            }
            "Debugger.getScriptSource" => {
                json!({"scriptSource": state.behavior.script_source})
            }
            _ => json!({}),
        };

        let response = json!({"id": request.id, "result": result});
        self.to_client_tx.send(response.to_string()).unwrap();
        for event in events {
            self.to_client_tx.send(event.to_string()).unwrap();
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.to_client_rx.recv().await)
    }
}
