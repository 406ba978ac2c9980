//! Inspector CLI - debug-session management for live inspection targets
//!
//! This library manages concurrent debugging sessions against browser tabs
//! and script runtimes over a remote inspection protocol: breakpoints,
//! output-throttled logpoints, stepping, scope inspection, and expression
//! evaluation, addressed by short human-readable session references.

use std::sync::Arc;

pub mod cdp;
pub mod cli;
pub mod commands;
pub mod common;
pub mod daemon;
pub mod ipc;
pub mod session;
pub mod sourcemap;

// Re-export commonly used types
pub use common::{Error, Result};
pub use session::{DebugSession, SessionRegistry};

/// Connector used by the shipped binary.
///
/// The concrete protocol transport (WebSocket framing and handshake) is
/// supplied by the embedding distribution; without one wired in, every
/// connection attempt reports a structured diagnosis instead of hanging.
pub fn default_connector() -> Arc<dyn cdp::Connector> {
    Arc::new(cdp::UnconfiguredConnector)
}
