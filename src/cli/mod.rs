//! CLI command handling
//!
//! Dispatches CLI commands to the daemon and formats output.

mod spawn;

use crate::commands::{BreakpointCommands, Commands, LogpointCommands};
use crate::common::{Error, Result};
use crate::ipc::protocol::{
    BreakpointListEntry, BreakpointResult, CallStackResult, Command, EvaluateResult, RemoveResult,
    SessionInfo, StatusResult, VariableInfo,
};
use crate::ipc::DaemonClient;

/// Parse a target string: "host:port" or a bare port on localhost
fn parse_target(target: &str) -> Result<(String, u16)> {
    if let Ok(port) = target.parse::<u16>() {
        return Ok(("127.0.0.1".to_string(), port));
    }
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidLocation(format!("expected host:port, got '{}'", target)))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::InvalidLocation(format!("invalid port in '{}'", target)))?;
    Ok((host.to_string(), port))
}

/// Parse a location string: `file:line` or `file:line:column`.
///
/// The file part may itself contain colons (URLs, Windows paths), so the
/// numeric segments are taken from the right.
pub fn parse_location(text: &str) -> Result<(String, u32, Option<u32>)> {
    let segments: Vec<&str> = text.split(':').collect();
    let numeric_tail = segments
        .iter()
        .rev()
        .take(2)
        .take_while(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .count();

    if numeric_tail == 0 || segments.len() <= numeric_tail {
        return Err(Error::InvalidLocation(format!(
            "expected file:line[:column], got '{}'",
            text
        )));
    }

    let file = segments[..segments.len() - numeric_tail].join(":");
    let parse =
        |s: &str| s.parse::<u32>().map_err(|_| {
            Error::InvalidLocation(format!("invalid line number in '{}'", text))
        });

    if numeric_tail == 2 {
        let line = parse(segments[segments.len() - 2])?;
        let column = parse(segments[segments.len() - 1])?;
        Ok((file, line, Some(column)))
    } else {
        let line = parse(segments[segments.len() - 1])?;
        Ok((file, line, None))
    }
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Daemon => {
            // Should never happen - daemon mode is handled in main
            unreachable!("Daemon command should be handled in main")
        }

        Commands::Connect {
            target,
            reference,
            tab,
        } => {
            spawn::ensure_daemon_running().await?;
            let mut client = DaemonClient::connect().await?;

            let (host, port) = parse_target(&target)?;
            let result = client
                .send_command(Command::Connect {
                    host,
                    port,
                    reference,
                    tab_index: tab,
                })
                .await?;

            let id = result["session"].as_str().unwrap_or("?").to_string();
            let kind = result["kind"].as_str().unwrap_or("?").to_string();
            match result["reference"].as_str() {
                Some(reference) => {
                    println!("Session {} ({}) attached as '{}'", id, kind, reference)
                }
                None => println!("Session {} ({}) attached", id, kind),
            }
            if result["active"].as_bool().unwrap_or(false) {
                println!("Session {} is now the active session", id);
            }

            Ok(())
        }

        Commands::Sessions => {
            let mut client = DaemonClient::connect().await?;
            let result = client.send_command(Command::Sessions).await?;
            let sessions: Vec<SessionInfo> =
                serde_json::from_value(result["sessions"].clone())?;

            if sessions.is_empty() {
                println!("No open sessions");
            } else {
                for session in &sessions {
                    let marker = if session.active { "*" } else { " " };
                    let reference = session
                        .reference
                        .as_deref()
                        .map(|r| format!(" '{}'", r))
                        .unwrap_or_default();
                    println!(
                        "{} {}{} {}:{} ({}, {}, idle {}s)",
                        marker,
                        session.id,
                        reference,
                        session.host,
                        session.port,
                        session.kind,
                        session.state,
                        session.idle_secs,
                    );
                }
            }

            Ok(())
        }

        Commands::Use { session } => {
            let mut client = DaemonClient::connect().await?;
            let result = client.send_command(Command::SetActive { session }).await?;
            println!(
                "Active session is now {}",
                result["active"].as_str().unwrap_or("?")
            );
            Ok(())
        }

        Commands::Close { session } => {
            let mut client = DaemonClient::connect().await?;
            let result = client.send_command(Command::Close { session }).await?;
            println!("Closed session {}", result["closed"].as_str().unwrap_or("?"));
            Ok(())
        }

        Commands::Status => {
            let mut client = match DaemonClient::connect().await {
                Ok(client) => client,
                Err(Error::DaemonNotRunning) => {
                    println!("Daemon: not running");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let result = client.send_command(Command::Status).await?;
            let status: StatusResult = serde_json::from_value(result)?;
            println!("Daemon: running");
            println!("Sessions: {}", status.session_count);
            match status.active {
                Some(active) => println!("Active: {}", active),
                None => println!("Active: none"),
            }
            Ok(())
        }

        Commands::Breakpoint(bp_cmd) => match bp_cmd {
            BreakpointCommands::Add {
                location,
                condition,
                session,
            } => add_breakpoint(location, condition, session).await,

            BreakpointCommands::Remove { id, session } => {
                let mut client = DaemonClient::connect().await?;
                let result = client
                    .send_command(Command::RemoveBreakpoint { session, id })
                    .await?;
                let removal: RemoveResult = serde_json::from_value(result)?;
                println!("Breakpoint {} removed", removal.removed);
                if let Some(warning) = removal.runtime_warning {
                    println!("Warning: runtime-side removal failed: {}", warning);
                }
                Ok(())
            }

            BreakpointCommands::List { session } => {
                let mut client = DaemonClient::connect().await?;
                let result = client
                    .send_command(Command::ListBreakpoints { session })
                    .await?;
                let breakpoints: Vec<BreakpointListEntry> =
                    serde_json::from_value(result["breakpoints"].clone())?;

                if breakpoints.is_empty() {
                    println!("No breakpoints set");
                } else {
                    println!("Breakpoints:");
                    for bp in &breakpoints {
                        print_breakpoint_entry(bp);
                    }
                }
                Ok(())
            }
        },

        Commands::Break {
            location,
            condition,
            session,
        } => add_breakpoint(location, condition, session).await,

        Commands::Logpoint(lp_cmd) => match lp_cmd {
            LogpointCommands::Add {
                location,
                template,
                ceiling,
                session,
            } => {
                let mut client = DaemonClient::connect().await?;
                let (file, line, column) = parse_location(&location)?;
                let result = client
                    .send_command(Command::SetLogpoint {
                        session,
                        file,
                        line,
                        column,
                        template,
                        ceiling,
                    })
                    .await?;

                let placed: BreakpointResult = serde_json::from_value(result)?;
                println!(
                    "Logpoint {} set at {} (pauses after {} hits)",
                    placed.id, placed.resolved, ceiling
                );
                print_location_warnings(&placed);
                Ok(())
            }

            LogpointCommands::Reset { id, session } => {
                let mut client = DaemonClient::connect().await?;
                let result = client
                    .send_command(Command::ResetCounter { session, id })
                    .await?;
                println!(
                    "Counter reset for {}; resume to continue logging",
                    result["reset"].as_str().unwrap_or("?")
                );
                Ok(())
            }
        },

        Commands::Pause { session } => {
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::Pause { session }).await?;
            println!("Pausing execution...");
            Ok(())
        }

        Commands::Resume { session } => {
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::Resume { session }).await?;
            println!("Resuming execution...");
            Ok(())
        }

        Commands::Next { session } => {
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::StepOver { session }).await?;
            println!("Stepping over...");
            Ok(())
        }

        Commands::Step { session } => {
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::StepInto { session }).await?;
            println!("Stepping into...");
            Ok(())
        }

        Commands::Finish { session } => {
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::StepOut { session }).await?;
            println!("Stepping out...");
            Ok(())
        }

        Commands::Backtrace { session } => {
            let mut client = DaemonClient::connect().await?;
            let result = client.send_command(Command::CallStack { session }).await?;
            let stack: CallStackResult = serde_json::from_value(result)?;

            println!("Paused ({})", stack.reason);
            for (i, frame) in stack.frames.iter().enumerate() {
                let column = frame
                    .column
                    .map(|c| format!(":{}", c))
                    .unwrap_or_default();
                println!(
                    "#{} {} at {}:{}{}",
                    i, frame.function, frame.file, frame.line, column
                );
            }
            if let Some(breach) = stack.limit_breach {
                println!(
                    "Logpoint {} exceeded its ceiling: {} hits (ceiling {})",
                    breach.breakpoint_id, breach.execution_count, breach.ceiling
                );
                for line in &breach.recent_logs {
                    println!("  | {}", line);
                }
                println!(
                    "Reset with 'inspector logpoint reset {}' or remove it, then resume",
                    breach.breakpoint_id
                );
            }
            Ok(())
        }

        Commands::Variables {
            frame,
            global,
            filter,
            expand,
            depth,
            session,
        } => {
            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::Variables {
                    session,
                    frame_id: frame,
                    include_global: global,
                    filter,
                    expand,
                    max_depth: depth,
                })
                .await?;
            let variables: Vec<VariableInfo> =
                serde_json::from_value(result["variables"].clone())?;

            if variables.is_empty() {
                println!("No variables");
            } else {
                for var in &variables {
                    print_variable(var, 0);
                }
            }
            Ok(())
        }

        Commands::Eval {
            expression,
            frame,
            session,
        } => {
            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::Evaluate {
                    session,
                    expression: expression.clone(),
                    frame_id: frame,
                })
                .await?;
            let eval: EvaluateResult = serde_json::from_value(result)?;

            match eval.exception {
                Some(exception) => println!("{} threw: {}", expression, exception),
                None => println!("{} = {} ({})", expression, eval.value, eval.type_name),
            }
            Ok(())
        }

        Commands::Source {
            file,
            from,
            to,
            session,
        } => {
            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::Source {
                    session,
                    file,
                    from_line: from,
                    to_line: to,
                })
                .await?;
            println!("{}", result["source"].as_str().unwrap_or(""));
            Ok(())
        }

        Commands::Shutdown => {
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::Shutdown).await?;
            println!("Daemon shutting down");
            Ok(())
        }
    }
}

async fn add_breakpoint(
    location: String,
    condition: Option<String>,
    session: Option<String>,
) -> Result<()> {
    let mut client = DaemonClient::connect().await?;
    let (file, line, column) = parse_location(&location)?;

    let result = client
        .send_command(Command::SetBreakpoint {
            session,
            file,
            line,
            column,
            condition,
        })
        .await?;

    let placed: BreakpointResult = serde_json::from_value(result)?;
    println!("Breakpoint {} set at {}", placed.id, placed.resolved);
    print_location_warnings(&placed);
    Ok(())
}

fn print_location_warnings(placed: &BreakpointResult) {
    if placed.location_differs {
        println!(
            "Warning: requested {} but the runtime placed it at {}; scope at the placed line may differ",
            placed.requested, placed.resolved
        );
    }
    if placed.ambiguous {
        println!("Warning: location resolved ambiguously; using the first match");
    }
}

fn print_breakpoint_entry(bp: &BreakpointListEntry) {
    let differs = if bp.location_differs {
        format!(" (requested {})", bp.requested)
    } else {
        String::new()
    };
    match (&bp.template, bp.ceiling) {
        (Some(template), Some(ceiling)) => {
            let count = bp.execution_count.unwrap_or(0);
            println!(
                "  {} logpoint at {}{} \"{}\" [{}/{} hits]",
                bp.id, bp.resolved, differs, template, count, ceiling
            );
        }
        _ => {
            let condition = bp
                .condition
                .as_deref()
                .map(|c| format!(" if {}", c))
                .unwrap_or_default();
            println!("  {} breakpoint at {}{}{}", bp.id, bp.resolved, differs, condition);
        }
    }
}

fn print_variable(var: &VariableInfo, indent: usize) {
    let pad = "  ".repeat(indent + 1);
    let type_suffix = if var.type_name.is_empty() {
        String::new()
    } else {
        format!(" ({})", var.type_name)
    };
    println!("{}{} = {}{}", pad, var.name, var.value, type_suffix);
    for child in &var.children {
        print_variable(child, indent + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_line() {
        let (file, line, column) = parse_location("src/app.js:42").unwrap();
        assert_eq!(file, "src/app.js");
        assert_eq!(line, 42);
        assert_eq!(column, None);
    }

    #[test]
    fn parses_file_line_column() {
        let (file, line, column) = parse_location("src/app.js:42:7").unwrap();
        assert_eq!(file, "src/app.js");
        assert_eq!(line, 42);
        assert_eq!(column, Some(7));
    }

    #[test]
    fn file_part_may_contain_colons() {
        let (file, line, column) = parse_location("http://localhost:8080/app.js:10").unwrap();
        assert_eq!(file, "http://localhost:8080/app.js");
        assert_eq!(line, 10);
        assert_eq!(column, None);
    }

    #[test]
    fn rejects_locations_without_a_line() {
        assert!(parse_location("app.js").is_err());
        assert!(parse_location("42").is_err());
        assert!(parse_location("app.js:").is_err());
    }

    #[test]
    fn parses_targets() {
        assert_eq!(
            parse_target("9229").unwrap(),
            ("127.0.0.1".to_string(), 9229)
        );
        assert_eq!(
            parse_target("dev.local:9222").unwrap(),
            ("dev.local".to_string(), 9222)
        );
        assert!(parse_target("no-port").is_err());
    }
}
