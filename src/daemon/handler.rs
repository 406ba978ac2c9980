//! Command handler for processing IPC requests
//!
//! Translates IPC commands into registry and session operations. The
//! registry lock is held only for lookups and bookkeeping; protocol work
//! happens on the per-session lock so sessions never block each other.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::cdp::Connector;
use crate::common::{config::Config, error::IpcError, Error, Result};
use crate::ipc::protocol::{
    BreakpointListEntry, BreakpointResult, CallStackResult, Command, EvaluateResult, FrameInfo,
    LimitBreachInfo, RemoveResult, Response, SessionInfo, StatusResult, VariableInfo,
};
use crate::session::{DebugSession, SessionId, SessionInit, SessionRegistry};
use crate::sourcemap::SourceMapper;

/// Shared state handed to every client task
#[derive(Clone)]
pub struct HandlerContext {
    pub registry: Arc<Mutex<SessionRegistry>>,
    pub connector: Arc<dyn Connector>,
    pub mapper: Arc<dyn SourceMapper>,
    pub config: Config,
}

/// Handle an IPC command
pub async fn handle_command(ctx: &HandlerContext, id: u64, command: Command) -> Response {
    match handle_command_inner(ctx, command).await {
        Ok(result) => Response::success(id, result),
        Err(e) => Response::error(id, IpcError::from(&e)),
    }
}

/// Resolve a selector (or the active session) to its id and session handle,
/// refreshing its last-activity timestamp
async fn lookup(
    ctx: &HandlerContext,
    selector: Option<&str>,
) -> Result<(SessionId, Arc<Mutex<DebugSession>>)> {
    let mut registry = ctx.registry.lock().await;
    let (id, session) = {
        let entry = registry.resolve_or_active(selector)?;
        (entry.id, Arc::clone(&entry.session))
    };
    registry.touch(id);
    Ok((id, session))
}

async fn handle_command_inner(
    ctx: &HandlerContext,
    command: Command,
) -> Result<serde_json::Value> {
    match command {
        // === Session Management ===
        Command::Connect {
            host,
            port,
            reference,
            tab_index,
        } => {
            // Fail fast on a bad reference before paying for the handshake;
            // create() re-validates under the same lock that inserts.
            let already_grouped = {
                let registry = ctx.registry.lock().await;
                if let Some(raw) = &reference {
                    registry.validate_reference(raw)?;
                }
                registry.browser_members(&host, port).is_some()
            };

            // A second session on a browser process we already hold gets a
            // fresh tab instead of re-attaching to an existing one
            let (transport, info) = if already_grouped && tab_index.is_none() {
                ctx.connector.open_tab(&host, port).await?
            } else {
                ctx.connector.connect(&host, port, tab_index).await?
            };
            let session =
                DebugSession::connect(transport, Arc::clone(&ctx.mapper), ctx.config.clone())
                    .await?;
            let kind = session.kind();

            let mut registry = ctx.registry.lock().await;
            let session_id = registry.create(SessionInit {
                reference,
                host: info.host,
                port: info.port,
                kind,
                tab_index: info.tab_index,
                session,
            })?;
            let entry = registry
                .get(session_id)
                .ok_or_else(|| Error::Internal("session vanished after create".to_string()))?;

            Ok(json!({
                "session": session_id.to_string(),
                "reference": entry.reference,
                "kind": kind,
                "active": registry.active_id() == Some(session_id),
            }))
        }

        Command::Sessions => {
            let registry = ctx.registry.lock().await;
            let active = registry.active_id();
            let mut sessions = Vec::new();
            for entry in registry.list() {
                let state = match entry.session.try_lock() {
                    Ok(session) => session.state().to_string(),
                    // A held lock means a command is in flight right now
                    Err(_) => "busy".to_string(),
                };
                sessions.push(SessionInfo {
                    id: entry.id.to_string(),
                    reference: entry.reference.clone(),
                    host: entry.host.clone(),
                    port: entry.port,
                    kind: entry.kind,
                    state,
                    tab_index: entry.tab_index,
                    active: active == Some(entry.id),
                    idle_secs: entry.idle_for().as_secs(),
                });
            }
            Ok(json!({ "sessions": sessions }))
        }

        Command::SetActive { session } => {
            let mut registry = ctx.registry.lock().await;
            let id = registry
                .resolve(&session)
                .map(|entry| entry.id)
                .ok_or_else(|| Error::SessionNotFound(session.clone()))?;
            registry.set_active(id);
            Ok(json!({ "active": id.to_string() }))
        }

        Command::Close { session } => {
            let (id, _) = lookup(ctx, session.as_deref()).await?;
            let closed = ctx.registry.lock().await.close(id).await;
            Ok(json!({ "closed": id.to_string(), "was_open": closed }))
        }

        Command::Status => {
            let registry = ctx.registry.lock().await;
            let result = StatusResult {
                daemon_running: true,
                session_count: registry.list().len(),
                active: registry.active_id().map(|id| id.to_string()),
            };
            Ok(serde_json::to_value(result)?)
        }

        // === Breakpoints ===
        Command::SetBreakpoint {
            session,
            file,
            line,
            column,
            condition,
        } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let outcome = session
                .lock()
                .await
                .set_breakpoint(&file, line, column, condition)
                .await?;
            Ok(serde_json::to_value(BreakpointResult::from(&outcome))?)
        }

        Command::SetLogpoint {
            session,
            file,
            line,
            column,
            template,
            ceiling,
        } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let outcome = session
                .lock()
                .await
                .set_logpoint(&file, line, column, &template, ceiling)
                .await?;
            Ok(serde_json::to_value(BreakpointResult::from(&outcome))?)
        }

        Command::RemoveBreakpoint { session, id } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let runtime_warning = session.lock().await.remove_breakpoint(&id).await?;
            Ok(serde_json::to_value(RemoveResult {
                removed: id,
                runtime_warning,
            })?)
        }

        Command::ListBreakpoints { session } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let summaries = session.lock().await.list_breakpoints();
            let entries: Vec<BreakpointListEntry> =
                summaries.iter().map(Into::into).collect();
            Ok(json!({ "breakpoints": entries }))
        }

        Command::ResetCounter { session, id } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            session.lock().await.reset_counter(&id).await?;
            Ok(json!({ "reset": id }))
        }

        // === Execution Control ===
        Command::Pause { session } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            session.lock().await.pause().await?;
            Ok(json!({ "status": "pausing" }))
        }

        Command::Resume { session } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            session.lock().await.resume().await?;
            Ok(json!({ "status": "running" }))
        }

        Command::StepOver { session } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            session.lock().await.step_over().await?;
            Ok(json!({ "status": "stepping" }))
        }

        Command::StepInto { session } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            session.lock().await.step_into().await?;
            Ok(json!({ "status": "stepping" }))
        }

        Command::StepOut { session } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            session.lock().await.step_out().await?;
            Ok(json!({ "status": "stepping" }))
        }

        // === State Inspection ===
        Command::CallStack { session } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let mut session = session.lock().await;
            session.process_events();
            let frames = session.get_call_stack()?;
            let paused = session
                .paused_state()
                .ok_or_else(|| Error::not_paused("inspect the call stack"))?;
            let result = CallStackResult {
                reason: paused.reason.clone(),
                frames: frames.iter().map(FrameInfo::from).collect(),
                limit_breach: paused.limit_breach.as_ref().map(LimitBreachInfo::from),
            };
            Ok(serde_json::to_value(result)?)
        }

        Command::Variables {
            session,
            frame_id,
            include_global,
            filter,
            expand,
            max_depth,
        } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let mut session = session.lock().await;
            session.process_events();
            let frame_id = match frame_id {
                Some(id) => id,
                None => session
                    .paused_state()
                    .and_then(|p| p.call_frames.first())
                    .map(|f| f.call_frame_id.clone())
                    .ok_or_else(|| Error::not_paused("list variables"))?,
            };
            let variables = session
                .get_variables(&frame_id, include_global, filter.as_deref(), expand, max_depth)
                .await?;
            let infos: Vec<VariableInfo> = variables.iter().map(Into::into).collect();
            Ok(json!({ "variables": infos }))
        }

        Command::Evaluate {
            session,
            expression,
            frame_id,
        } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let outcome = session
                .lock()
                .await
                .evaluate(&expression, frame_id.as_deref())
                .await?;
            Ok(serde_json::to_value(EvaluateResult::from(&outcome))?)
        }

        Command::Source {
            session,
            file,
            from_line,
            to_line,
        } => {
            let (_, session) = lookup(ctx, session.as_deref()).await?;
            let source = session
                .lock()
                .await
                .get_script_source(&file, from_line, to_line)
                .await?;
            Ok(json!({ "file": file, "source": source }))
        }

        // Shutdown is intercepted by the client loop in the server
        Command::Shutdown => Ok(json!({ "shutdown": true })),
    }
}
