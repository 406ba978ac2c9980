//! Daemon mode - background process holding open inspection sessions
//!
//! The daemon is spawned automatically by CLI commands and keeps sessions
//! (and their breakpoint state) alive across CLI invocations.

mod handler;
mod server;

use std::sync::Arc;

use crate::cdp::Connector;
use crate::common::Result;

pub use handler::{handle_command, HandlerContext};

/// Run in daemon mode
///
/// This is the entry point when the binary is invoked with the hidden
/// `daemon` command. The daemon:
/// 1. Creates an IPC socket/pipe for CLI connections
/// 2. Accepts CLI commands and translates them into session operations
/// 3. Periodically reaps sessions with no tool access
/// 4. Exits on its own once idle with no open sessions
pub async fn run(connector: Arc<dyn Connector>) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting inspector daemon"
    );

    let mut daemon = server::Daemon::new(connector).await?;
    daemon.run().await
}
