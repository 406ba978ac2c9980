//! Debug session state machine
//!
//! Owns one connection to one inspection target and manages the lifecycle of
//! its breakpoints and logpoints: placement with requested-vs-resolved
//! reconciliation, logpoint expression validation, stepping, scope
//! inspection, and the execution-limit pause/resume contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::cdp::{
    CdpClient, ConsoleApiCalled, EventMessage, PausedEvent, ScriptParsed,
    SetBreakpointByUrlParams, Transport,
};
use crate::common::{config::Config, Error, Result};
use crate::sourcemap::SourceMapper;

use super::limits::{counter_key, ExecutionLimitTracker, LimitBreach};
use super::logpoint::{self, ParsedTemplate};

/// Kind of runtime on the other end of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    Browser,
    ScriptRuntime,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
            Self::ScriptRuntime => write!(f, "script-runtime"),
        }
    }
}

/// Debug session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection to the target is gone
    Disconnected,
    /// Target is executing
    Running,
    /// Target is stopped with call frames available
    Paused,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Caller-facing source position, 1-based
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
}

impl std::fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.column {
            Some(col) => write!(f, "{}:{}:{}", self.file, self.line, col),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// Where the runtime actually placed a breakpoint (0-based)
#[derive(Debug, Clone)]
pub struct ResolvedPosition {
    pub script_id: String,
    pub url: String,
    pub line: u32,
    pub column: Option<u32>,
}

/// Breakpoint variant
#[derive(Debug, Clone)]
pub enum BreakpointKind {
    Plain {
        condition: Option<String>,
    },
    Logpoint {
        template: String,
        expressions: Vec<String>,
        ceiling: u32,
    },
}

/// Stored breakpoint information
#[derive(Debug, Clone)]
struct StoredBreakpoint {
    id: String,
    kind: BreakpointKind,
    requested: SourcePosition,
    resolved: ResolvedPosition,
    location_differs: bool,
    ambiguous: bool,
}

/// Placement result reported to the caller.
///
/// `resolved` is mapped back to original-source coordinates; a difference
/// from the request is always surfaced through `location_differs`, since it
/// changes what is in scope at the paused line.
#[derive(Debug, Clone)]
pub struct BreakpointOutcome {
    pub id: String,
    pub requested: SourcePosition,
    pub resolved: SourcePosition,
    pub location_differs: bool,
    pub ambiguous: bool,
}

/// Listing entry for a placed breakpoint or logpoint
#[derive(Debug, Clone)]
pub struct BreakpointSummary {
    pub id: String,
    pub requested: SourcePosition,
    pub resolved: SourcePosition,
    pub location_differs: bool,
    pub condition: Option<String>,
    pub template: Option<String>,
    pub ceiling: Option<u32>,
    pub execution_count: Option<u32>,
}

/// Snapshot of the target while stopped
#[derive(Debug, Clone)]
pub struct PausedState {
    pub reason: String,
    pub call_frames: Vec<crate::cdp::CallFrame>,
    pub hit_breakpoints: Vec<String>,
    /// Set when the pause was forced by a logpoint crossing its ceiling
    pub limit_breach: Option<LimitBreach>,
}

/// Caller-facing call frame
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub id: String,
    pub function_name: String,
    pub location: SourcePosition,
}

/// Caller-facing variable
#[derive(Debug, Clone)]
pub struct VariableEntry {
    pub name: String,
    pub value: String,
    pub type_name: String,
    pub scope: String,
    pub children: Vec<VariableEntry>,
}

/// Result of evaluating an expression
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub value: String,
    pub type_name: String,
    pub exception: Option<String>,
}

/// Outcome of validating logpoint expressions at the resolved location
enum ValidationVerdict {
    AllResolved,
    /// The code path was not hit within the bounded wait
    Unknown,
    Failed(Vec<(String, String)>),
}

/// Debug session managing one inspection protocol connection
pub struct DebugSession {
    /// Protocol client
    client: CdpClient,
    /// Event receiver from the client
    events_rx: mpsc::UnboundedReceiver<EventMessage>,
    /// Source position translator
    mapper: Arc<dyn SourceMapper>,
    /// Configuration (timeouts, search radius, ring capacity)
    config: Config,
    /// Detected runtime kind
    kind: RuntimeKind,
    /// Whether the connection is still up
    connected: bool,
    /// Current pause snapshot; `None` while running
    paused: Option<PausedState>,
    /// All placed breakpoints by runtime id
    breakpoints: HashMap<String, StoredBreakpoint>,
    /// Execution-limit mirror for logpoints
    limits: ExecutionLimitTracker,
    /// Loaded scripts by url, for placement diagnosis and source reads
    scripts: HashMap<String, ScriptParsed>,
}

impl DebugSession {
    /// Attach over an established transport: enable the protocol domains and
    /// detect the runtime kind.
    pub async fn connect(
        transport: Box<dyn Transport>,
        mapper: Arc<dyn SourceMapper>,
        config: Config,
    ) -> Result<Self> {
        let mut client = CdpClient::new(transport, config.request_timeout());
        let events_rx = client
            .take_event_receiver()
            .ok_or_else(|| Error::Internal("event receiver already taken".to_string()))?;

        client.enable().await?;
        let kind = detect_runtime_kind(&client).await;
        tracing::info!(%kind, "attached to inspection target");

        Ok(Self {
            client,
            events_rx,
            mapper,
            limits: ExecutionLimitTracker::new(config.limits.log_ring_capacity),
            config,
            kind,
            connected: true,
            paused: None,
            breakpoints: HashMap::new(),
            scripts: HashMap::new(),
        })
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        if !self.connected || !self.client.is_alive() {
            SessionState::Disconnected
        } else if self.paused.is_some() {
            SessionState::Paused
        } else {
            SessionState::Running
        }
    }

    /// Detected runtime kind
    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    /// Current pause snapshot, if any
    pub fn paused_state(&self) -> Option<&PausedState> {
        self.paused.as_ref()
    }

    pub(crate) fn client(&self) -> &CdpClient {
        &self.client
    }

    pub(crate) fn search_config(&self) -> &Config {
        &self.config
    }

    /// Drain and apply any pending events
    pub fn process_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        if !self.client.is_alive() {
            self.connected = false;
        }
    }

    /// Handle a single event
    fn handle_event(&mut self, event: EventMessage) {
        match event.method.as_str() {
            "Debugger.paused" => match serde_json::from_value::<PausedEvent>(event.params) {
                Ok(paused) => self.on_paused(paused),
                Err(e) => tracing::warn!(error = %e, "malformed paused event"),
            },
            "Debugger.resumed" => {
                self.paused = None;
            }
            "Debugger.scriptParsed" => {
                if let Ok(script) = serde_json::from_value::<ScriptParsed>(event.params) {
                    if !script.url.is_empty() {
                        self.scripts.insert(script.url.clone(), script);
                    }
                }
            }
            "Runtime.consoleAPICalled" => {
                if let Ok(call) = serde_json::from_value::<ConsoleApiCalled>(event.params) {
                    if let Some(hit) = logpoint::parse_console_args(&call.args) {
                        tracing::debug!(key = %hit.key, count = hit.count, "logpoint hit observed");
                        self.limits.observe(&hit);
                    }
                }
            }
            _ => {}
        }
    }

    fn on_paused(&mut self, event: PausedEvent) {
        let limit_breach = event
            .hit_breakpoints
            .iter()
            .find_map(|id| self.breach_details(id));
        if let Some(breach) = &limit_breach {
            tracing::info!(
                breakpoint = %breach.breakpoint_id,
                count = breach.execution_count,
                ceiling = breach.ceiling,
                "logpoint execution ceiling crossed, target paused"
            );
        }
        self.paused = Some(PausedState {
            reason: event.reason,
            call_frames: event.call_frames,
            hit_breakpoints: event.hit_breakpoints,
            limit_breach,
        });
    }

    /// Breach info for a hit logpoint. The debuggee decided to pause, so a
    /// mirror that lags behind (lost console lines) still counts as a breach.
    fn breach_details(&self, breakpoint_id: &str) -> Option<LimitBreach> {
        if let Some(breach) = self.limits.breach_for(breakpoint_id) {
            return Some(breach);
        }
        let metadata = self.limits.get(breakpoint_id)?;
        Some(LimitBreach {
            breakpoint_id: metadata.breakpoint_id.clone(),
            file: metadata.file.clone(),
            line: metadata.line,
            template: metadata.template.clone(),
            execution_count: metadata.execution_count.max(metadata.ceiling + 1),
            ceiling: metadata.ceiling,
            recent_logs: metadata.recent_logs.iter().cloned().collect(),
        })
    }

    /// Wait until the target pauses, processing events as they arrive
    pub async fn wait_paused(&mut self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.paused.is_some() {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(timeout.as_secs()));
            }
            match tokio::time::timeout(remaining, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => {
                    self.connected = false;
                    return Err(Error::TargetClosed("event channel closed".to_string()));
                }
                Err(_) => return Err(Error::Timeout(timeout.as_secs())),
            }
        }
    }

    // === Breakpoints ===

    /// Place a plain breakpoint
    pub async fn set_breakpoint(
        &mut self,
        file: &str,
        line: u32,
        column: Option<u32>,
        condition: Option<String>,
    ) -> Result<BreakpointOutcome> {
        self.ensure_connected()?;
        self.process_events();

        let requested = SourcePosition {
            file: file.to_string(),
            line,
            column,
        };
        let runtime_pos = self.map_to_runtime(&requested)?;

        let result = self
            .client
            .set_breakpoint_by_url(SetBreakpointByUrlParams {
                url: runtime_pos.file.clone(),
                line_number: runtime_pos.line - 1,
                column_number: runtime_pos.column.map(|c| c - 1),
                condition: condition.clone(),
            })
            .await?;

        if result.locations.is_empty() {
            let _ = self.client.remove_breakpoint(&result.breakpoint_id).await;
            return Err(Error::placement_failed(
                &requested.to_string(),
                &self.diagnose_placement(&runtime_pos),
            ));
        }

        let ambiguous = result.locations.len() > 1;
        if ambiguous {
            tracing::warn!(
                location = %requested,
                count = result.locations.len(),
                "breakpoint resolved to multiple locations, using the first"
            );
        }
        let location = &result.locations[0];
        let resolved = ResolvedPosition {
            script_id: location.script_id.clone(),
            url: runtime_pos.file.clone(),
            line: location.line_number,
            column: location.column_number,
        };
        let location_differs = resolved.line != runtime_pos.line - 1;

        let stored = StoredBreakpoint {
            id: result.breakpoint_id.clone(),
            kind: BreakpointKind::Plain { condition },
            requested: requested.clone(),
            resolved: resolved.clone(),
            location_differs,
            ambiguous,
        };
        self.breakpoints.insert(stored.id.clone(), stored);

        Ok(BreakpointOutcome {
            id: result.breakpoint_id,
            resolved: self.map_to_original(&resolved.url, resolved.line, resolved.column),
            requested,
            location_differs,
            ambiguous,
        })
    }

    /// Place a logpoint: a breakpoint whose condition logs the interpolated
    /// template and only pauses once the execution ceiling is crossed.
    pub async fn set_logpoint(
        &mut self,
        file: &str,
        line: u32,
        column: Option<u32>,
        template: &str,
        ceiling: u32,
    ) -> Result<BreakpointOutcome> {
        self.ensure_connected()?;
        self.process_events();

        if ceiling == 0 {
            return Err(Error::InvalidLogpoint(
                "execution ceiling must be at least 1".to_string(),
            ));
        }
        let parsed = logpoint::parse_template(template)?;

        let requested = SourcePosition {
            file: file.to_string(),
            line,
            column,
        };
        let runtime_pos = self.map_to_runtime(&requested)?;

        let condition =
            logpoint::build_condition(&counter_key(&runtime_pos.file, runtime_pos.line - 1), ceiling, &parsed);
        let result = self
            .client
            .set_breakpoint_by_url(SetBreakpointByUrlParams {
                url: runtime_pos.file.clone(),
                line_number: runtime_pos.line - 1,
                column_number: runtime_pos.column.map(|c| c - 1),
                condition: Some(condition),
            })
            .await?;

        if result.locations.is_empty() {
            let _ = self.client.remove_breakpoint(&result.breakpoint_id).await;
            return Err(Error::placement_failed(
                &requested.to_string(),
                &self.diagnose_placement(&runtime_pos),
            ));
        }

        let ambiguous = result.locations.len() > 1;
        let mut breakpoint_id = result.breakpoint_id;
        let mut location = result.locations[0].clone();

        // The debuggee-side counter is keyed by the resolved location. If the
        // runtime snapped to a different line, re-place once with the key and
        // condition rebuilt, so the embedded key matches where execution
        // actually stops.
        if location.line_number != runtime_pos.line - 1 {
            let _ = self.client.remove_breakpoint(&breakpoint_id).await;
            let condition = logpoint::build_condition(
                &counter_key(&runtime_pos.file, location.line_number),
                ceiling,
                &parsed,
            );
            let repinned = self
                .client
                .set_breakpoint_by_url(SetBreakpointByUrlParams {
                    url: runtime_pos.file.clone(),
                    line_number: location.line_number,
                    column_number: location.column_number,
                    condition: Some(condition),
                })
                .await?;
            if repinned.locations.is_empty() {
                let _ = self.client.remove_breakpoint(&repinned.breakpoint_id).await;
                return Err(Error::placement_failed(
                    &requested.to_string(),
                    "resolved location did not re-resolve on re-placement",
                ));
            }
            breakpoint_id = repinned.breakpoint_id;
            location = repinned.locations[0].clone();
        }

        let resolved = ResolvedPosition {
            script_id: location.script_id.clone(),
            url: runtime_pos.file.clone(),
            line: location.line_number,
            column: location.column_number,
        };
        let location_differs = resolved.line != runtime_pos.line - 1;

        self.limits.register(
            &breakpoint_id,
            &resolved.url,
            resolved.line,
            template,
            ceiling,
        );
        let stored = StoredBreakpoint {
            id: breakpoint_id.clone(),
            kind: BreakpointKind::Logpoint {
                template: template.to_string(),
                expressions: parsed.expressions(),
                ceiling,
            },
            requested: requested.clone(),
            resolved: resolved.clone(),
            location_differs,
            ambiguous,
        };
        self.breakpoints.insert(breakpoint_id.clone(), stored);

        // What is in scope at the placed line can differ from what the
        // template was written against, especially after a snap. Confirm
        // every expression resolves at the actual location; tear the
        // logpoint down on failure so it is never left registered in a
        // broken state.
        if parsed.has_expressions() {
            match self.validate_expressions(&resolved, &parsed).await? {
                ValidationVerdict::AllResolved | ValidationVerdict::Unknown => {}
                ValidationVerdict::Failed(failures) => {
                    let _ = self.remove_breakpoint(&breakpoint_id).await;
                    let suggestions = self
                        .search_candidates(&runtime_pos, &parsed.expressions())
                        .await
                        .unwrap_or_default();
                    let location = self
                        .map_to_original(&resolved.url, resolved.line, resolved.column)
                        .to_string();
                    return Err(Error::ValidationFailed {
                        location,
                        failing: failures
                            .into_iter()
                            .map(|(expr, reason)| format!("{}: {}", expr, reason))
                            .collect(),
                        suggestions: suggestions.iter().map(|c| c.describe()).collect(),
                    });
                }
            }
        }

        Ok(BreakpointOutcome {
            id: breakpoint_id,
            resolved: self.map_to_original(&resolved.url, resolved.line, resolved.column),
            requested,
            location_differs,
            ambiguous,
        })
    }

    /// Evaluate each template expression once at the resolved location by
    /// briefly pausing there, then resuming. A window where the code path is
    /// never hit yields `Unknown`, not failure.
    async fn validate_expressions(
        &mut self,
        resolved: &ResolvedPosition,
        template: &ParsedTemplate,
    ) -> Result<ValidationVerdict> {
        let probe = self
            .client
            .set_breakpoint_by_url(SetBreakpointByUrlParams {
                url: resolved.url.clone(),
                line_number: resolved.line,
                column_number: resolved.column,
                condition: None,
            })
            .await?;

        let verdict = match self.wait_paused(self.config.validation_wait()).await {
            Ok(()) => {
                let ours = self
                    .paused
                    .as_ref()
                    .map(|p| p.hit_breakpoints.contains(&probe.breakpoint_id))
                    .unwrap_or(false);
                if !ours {
                    // Some other stop happened first; leave it for the caller
                    ValidationVerdict::Unknown
                } else {
                    let frame_id = self
                        .paused
                        .as_ref()
                        .and_then(|p| p.call_frames.first())
                        .map(|f| f.call_frame_id.clone());
                    let mut failures = Vec::new();
                    if let Some(frame_id) = frame_id {
                        for expr in template.expressions() {
                            match self.client.evaluate_on_call_frame(&frame_id, &expr).await {
                                Ok(eval) => {
                                    if let Some(details) = eval.exception_details {
                                        failures.push((expr, details.message()));
                                    }
                                }
                                Err(e) => failures.push((expr, e.to_string())),
                            }
                        }
                    }
                    self.resume_quiet().await?;
                    if failures.is_empty() {
                        ValidationVerdict::AllResolved
                    } else {
                        ValidationVerdict::Failed(failures)
                    }
                }
            }
            Err(Error::Timeout(_)) => ValidationVerdict::Unknown,
            Err(e) => {
                let _ = self.client.remove_breakpoint(&probe.breakpoint_id).await;
                return Err(e);
            }
        };

        let _ = self.client.remove_breakpoint(&probe.breakpoint_id).await;
        Ok(verdict)
    }

    /// Remove a breakpoint. Local state is cleaned up even when the
    /// runtime-side removal fails; the failure is returned for reporting.
    pub async fn remove_breakpoint(&mut self, id: &str) -> Result<Option<String>> {
        if self.breakpoints.remove(id).is_none() {
            return Err(Error::BreakpointNotFound { id: id.to_string() });
        }
        self.limits.unregister(id);

        match self.client.remove_breakpoint(id).await {
            Ok(()) => Ok(None),
            Err(e) => {
                tracing::warn!(breakpoint = %id, error = %e, "runtime-side breakpoint removal failed");
                Ok(Some(e.to_string()))
            }
        }
    }

    /// List all placed breakpoints and logpoints
    pub fn list_breakpoints(&self) -> Vec<BreakpointSummary> {
        let mut summaries: Vec<BreakpointSummary> = self
            .breakpoints
            .values()
            .map(|bp| {
                let (condition, template, ceiling) = match &bp.kind {
                    BreakpointKind::Plain { condition } => (condition.clone(), None, None),
                    BreakpointKind::Logpoint {
                        template, ceiling, ..
                    } => (None, Some(template.clone()), Some(*ceiling)),
                };
                BreakpointSummary {
                    id: bp.id.clone(),
                    requested: bp.requested.clone(),
                    resolved: self.map_to_original(
                        &bp.resolved.url,
                        bp.resolved.line,
                        bp.resolved.column,
                    ),
                    location_differs: bp.location_differs,
                    condition,
                    template,
                    ceiling,
                    execution_count: self.limits.get(&bp.id).map(|m| m.execution_count),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    // === Execution control ===

    /// Request a pause at the next statement
    pub async fn pause(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.process_events();
        if self.paused.is_some() {
            return Err(Error::invalid_state("pause", "already paused"));
        }
        self.client.pause().await
    }

    /// Resume execution.
    ///
    /// Refused while the pause was forced by an execution-limit breach:
    /// resuming blind would silently re-arm an already-exhausted logpoint.
    /// Reset the counter or remove the logpoint first.
    pub async fn resume(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.process_events();
        let Some(paused) = &self.paused else {
            return Err(Error::invalid_state("resume", "running"));
        };
        if let Some(breach) = &paused.limit_breach {
            return Err(Error::LimitExceeded {
                breakpoint_id: breach.breakpoint_id.clone(),
                location: self
                    .map_to_original(&breach.file, breach.line, None)
                    .to_string(),
                count: breach.execution_count,
                ceiling: breach.ceiling,
            });
        }
        self.resume_quiet().await
    }

    /// Resume without the limit-breach guard (internal plumbing for
    /// validation and location probing)
    pub(crate) async fn resume_quiet(&mut self) -> Result<()> {
        self.client.resume().await?;
        self.paused = None;
        Ok(())
    }

    pub async fn step_over(&mut self) -> Result<()> {
        self.ensure_paused("step over")?;
        self.client.step_over().await?;
        self.paused = None;
        Ok(())
    }

    pub async fn step_into(&mut self) -> Result<()> {
        self.ensure_paused("step into")?;
        self.client.step_into().await?;
        self.paused = None;
        Ok(())
    }

    pub async fn step_out(&mut self) -> Result<()> {
        self.ensure_paused("step out")?;
        self.client.step_out().await?;
        self.paused = None;
        Ok(())
    }

    /// Zero both sides of a logpoint's execution counter and clear the
    /// breach so `resume` is accepted again.
    ///
    /// Resetting only one side leaves the pair out of sync and the pause
    /// condition misfires on the very next hit, so the debuggee-side zero
    /// and the mirror zero happen in the same operation.
    pub async fn reset_counter(&mut self, breakpoint_id: &str) -> Result<()> {
        self.ensure_connected()?;
        let Some(metadata) = self.limits.get(breakpoint_id) else {
            return Err(Error::BreakpointNotFound {
                id: breakpoint_id.to_string(),
            });
        };
        let expression = logpoint::reset_expression(&metadata.key());

        self.client.evaluate(&expression, true).await?;
        self.limits.reset(breakpoint_id);

        if let Some(paused) = &mut self.paused {
            if paused
                .limit_breach
                .as_ref()
                .is_some_and(|b| b.breakpoint_id == breakpoint_id)
            {
                paused.limit_breach = None;
            }
        }
        Ok(())
    }

    // === Inspection ===

    /// Call frames of the current pause, in original-source coordinates
    pub fn get_call_stack(&self) -> Result<Vec<FrameSnapshot>> {
        let paused = self.require_paused("inspect the call stack")?;
        Ok(paused
            .call_frames
            .iter()
            .map(|frame| FrameSnapshot {
                id: frame.call_frame_id.clone(),
                function_name: if frame.function_name.is_empty() {
                    "<anonymous>".to_string()
                } else {
                    frame.function_name.clone()
                },
                location: self.map_to_original(
                    &frame.url,
                    frame.location.line_number,
                    frame.location.column_number,
                ),
            })
            .collect())
    }

    /// Variables visible from a paused call frame
    pub async fn get_variables(
        &mut self,
        frame_id: &str,
        include_global: bool,
        name_filter: Option<&str>,
        expand: bool,
        max_depth: u32,
    ) -> Result<Vec<VariableEntry>> {
        let paused = self.require_paused("list variables")?;
        let frame = paused
            .call_frames
            .iter()
            .find(|f| f.call_frame_id == frame_id)
            .ok_or_else(|| Error::FrameNotFound(frame_id.to_string()))?;
        let scope_chain = frame.scope_chain.clone();

        let mut entries = Vec::new();
        for scope in &scope_chain {
            if scope.scope_type == "global" && !include_global {
                continue;
            }
            let Some(object_id) = &scope.object.object_id else {
                continue;
            };
            let properties = self.client.get_properties(object_id).await?;
            for prop in properties.result {
                if let Some(filter) = name_filter {
                    if !prop.name.to_lowercase().contains(&filter.to_lowercase()) {
                        continue;
                    }
                }
                let Some(value) = prop.value else { continue };
                let children = match (&value.object_id, expand) {
                    (Some(child_id), true) if max_depth > 0 => {
                        self.expand_object(child_id, max_depth).await?
                    }
                    _ => Vec::new(),
                };
                entries.push(VariableEntry {
                    name: prop.name,
                    value: value.display(),
                    type_name: value.object_type.clone(),
                    scope: scope.scope_type.clone(),
                    children,
                });
            }
        }
        Ok(entries)
    }

    /// Recursively expand an object's own properties to a bounded depth
    fn expand_object<'a>(
        &'a self,
        object_id: &'a str,
        depth: u32,
    ) -> BoxFuture<'a, Result<Vec<VariableEntry>>> {
        Box::pin(async move {
            if depth == 0 {
                return Ok(Vec::new());
            }
            let properties = self.client.get_properties(object_id).await?;
            let mut entries = Vec::new();
            for prop in properties.result {
                let Some(value) = prop.value else { continue };
                let children = match &value.object_id {
                    Some(child_id) => self.expand_object(child_id, depth - 1).await?,
                    None => Vec::new(),
                };
                entries.push(VariableEntry {
                    name: prop.name,
                    value: value.display(),
                    type_name: value.object_type.clone(),
                    scope: String::new(),
                    children,
                });
            }
            Ok(entries)
        })
    }

    /// Evaluate an expression in the scope of a paused frame (top frame when
    /// none is given)
    pub async fn evaluate(
        &mut self,
        expression: &str,
        frame_id: Option<&str>,
    ) -> Result<EvalOutcome> {
        let paused = self.require_paused("evaluate an expression")?;
        let frame_id = match frame_id {
            Some(id) => {
                if !paused.call_frames.iter().any(|f| f.call_frame_id == id) {
                    return Err(Error::FrameNotFound(id.to_string()));
                }
                id.to_string()
            }
            None => paused
                .call_frames
                .first()
                .map(|f| f.call_frame_id.clone())
                .ok_or_else(|| Error::Internal("paused with no call frames".to_string()))?,
        };

        let eval = self
            .client
            .evaluate_on_call_frame(&frame_id, expression)
            .await?;
        Ok(EvalOutcome {
            value: eval.result.display(),
            type_name: eval.result.object_type.clone(),
            exception: eval.exception_details.map(|d| d.message()),
        })
    }

    /// Read source text of a loaded script by 1-based line range
    pub async fn get_script_source(
        &mut self,
        file: &str,
        from_line: Option<u32>,
        to_line: Option<u32>,
    ) -> Result<String> {
        self.ensure_connected()?;
        self.process_events();

        let runtime_file = match self.mapper.to_runtime_location(file, 1, None) {
            Some(mapped) => mapped.file,
            None => file.to_string(),
        };
        let script = self
            .scripts
            .get(&runtime_file)
            .ok_or_else(|| Error::InvalidLocation(format!("script '{}' is not loaded", file)))?;
        let source = self.client.get_script_source(&script.script_id).await?;

        let from = from_line.unwrap_or(1).max(1) as usize;
        let to = to_line.map(|l| l as usize).unwrap_or(usize::MAX);
        let selected: Vec<&str> = source
            .lines()
            .enumerate()
            .filter(|(idx, _)| (idx + 1) >= from && (idx + 1) <= to)
            .map(|(_, line)| line)
            .collect();
        Ok(selected.join("\n"))
    }

    /// Tear down the connection; breakpoint state dies with the session
    pub async fn disconnect(&mut self) {
        self.client.disconnect();
        self.connected = false;
        self.paused = None;
        self.breakpoints.clear();
    }

    // === Helpers ===

    fn ensure_connected(&self) -> Result<()> {
        if self.connected && self.client.is_alive() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn ensure_paused(&mut self, action: &str) -> Result<()> {
        self.ensure_connected()?;
        self.process_events();
        if self.paused.is_some() {
            Ok(())
        } else {
            Err(Error::not_paused(action))
        }
    }

    fn require_paused(&self, action: &str) -> Result<&PausedState> {
        self.ensure_connected()?;
        self.paused
            .as_ref()
            .ok_or_else(|| Error::not_paused(action))
    }

    /// Translate a caller position to runtime coordinates (still 1-based)
    fn map_to_runtime(&self, pos: &SourcePosition) -> Result<SourcePosition> {
        if pos.line == 0 {
            return Err(Error::InvalidLocation(
                "line numbers are 1-based".to_string(),
            ));
        }
        Ok(
            match self
                .mapper
                .to_runtime_location(&pos.file, pos.line, pos.column)
            {
                Some(mapped) => SourcePosition {
                    file: mapped.file,
                    line: mapped.line,
                    column: mapped.column,
                },
                None => pos.clone(),
            },
        )
    }

    /// Translate a 0-based runtime position back to original 1-based
    /// coordinates for the caller
    pub(crate) fn map_to_original(&self, url: &str, line: u32, column: Option<u32>) -> SourcePosition {
        let line = line + 1;
        let column = column.map(|c| c + 1);
        match self.mapper.to_original_location(url, line, column) {
            Some(mapped) => SourcePosition {
                file: mapped.file,
                line: mapped.line,
                column: mapped.column,
            },
            None => SourcePosition {
                file: url.to_string(),
                line,
                column,
            },
        }
    }

    /// Explain why the runtime reported no resolvable location
    fn diagnose_placement(&self, runtime_pos: &SourcePosition) -> String {
        if let Some(script) = self.scripts.get(&runtime_pos.file) {
            if script.end_line > 0 && runtime_pos.line - 1 > script.end_line {
                return format!(
                    "line {} is past the end of the loaded script (loaded through line {})",
                    runtime_pos.line,
                    script.end_line + 1
                );
            }
            return format!(
                "line {} has no pausable statement in the loaded script",
                runtime_pos.line
            );
        }

        let looks_like_path = runtime_pos.file.starts_with('/')
            || runtime_pos.file.chars().nth(1) == Some(':');
        let looks_like_url =
            runtime_pos.file.starts_with("http://") || runtime_pos.file.starts_with("https://");
        match self.kind {
            RuntimeKind::Browser if looks_like_path => format!(
                "script '{}' is not loaded; the target is a browser tab, so use the served URL rather than a filesystem path",
                runtime_pos.file
            ),
            RuntimeKind::ScriptRuntime if looks_like_url => format!(
                "script '{}' is not loaded; the target is a script runtime, so use a filesystem path rather than a URL",
                runtime_pos.file
            ),
            _ if self.scripts.is_empty() => format!(
                "script '{}' is not loaded and no scripts have been parsed yet; the target may still be starting",
                runtime_pos.file
            ),
            _ => format!("script '{}' is not loaded in the target", runtime_pos.file),
        }
    }
}

/// Probe for the kind of runtime behind the connection. Script runtimes
/// expose their version through the process global; browser tabs do not.
async fn detect_runtime_kind(client: &CdpClient) -> RuntimeKind {
    const PROBE: &str =
        "typeof process!=='undefined'&&process.versions&&process.versions.node?'node':''";
    match client.evaluate(PROBE, true).await {
        Ok(eval) => {
            let is_node = eval
                .result
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if is_node {
                RuntimeKind::ScriptRuntime
            } else {
                RuntimeKind::Browser
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "runtime-kind probe failed, assuming browser");
            RuntimeKind::Browser
        }
    }
}
