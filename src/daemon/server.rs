//! Daemon server - IPC listener and main event loop

use std::sync::Arc;
use std::time::{Duration, Instant};

use interprocess::local_socket::traits::tokio::Listener as ListenerTrait;
use tokio::io::BufReader;
use tokio::sync::{mpsc, Mutex};

use crate::cdp::Connector;
use crate::common::{config::Config, paths, Result};
use crate::ipc::{
    protocol::{Command, Request, Response},
    transport,
};
use crate::session::SessionRegistry;
use crate::sourcemap::{IdentityMapper, SourceMapper};

use super::handler::{self, HandlerContext};

/// Main daemon server
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Shared state for client tasks
    ctx: HandlerContext,
    /// Last client activity, for the idle auto-exit
    last_activity: Instant,
    /// Last inactive-session sweep
    last_reap: Instant,
}

impl Daemon {
    /// Create a new daemon instance
    pub async fn new(connector: Arc<dyn Connector>) -> Result<Self> {
        let config = Config::load()?;
        let mapper: Arc<dyn SourceMapper> = Arc::new(IdentityMapper);

        let ctx = HandlerContext {
            registry: Arc::new(Mutex::new(SessionRegistry::new())),
            connector,
            mapper,
            config: config.clone(),
        };

        Ok(Self {
            config,
            ctx,
            last_activity: Instant::now(),
            last_reap: Instant::now(),
        })
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        let listener = transport::create_listener().await?;
        tracing::info!("Daemon listening on {}", paths::socket_name());

        let idle_timeout = Duration::from_secs(self.config.daemon.idle_timeout_minutes * 60);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        loop {
            if self.run_select_loop(&listener, &shutdown_tx, &mut shutdown_rx, idle_timeout).await? {
                break;
            }
        }

        // Cleanup
        tracing::info!("Cleaning up daemon resources");
        self.ctx.registry.lock().await.close_all().await;
        paths::remove_socket()?;
        tracing::info!("Daemon shutdown complete");

        Ok(())
    }

    /// Run one iteration of the select loop, returns true if should break
    #[cfg(unix)]
    async fn run_select_loop(
        &mut self,
        listener: &transport::platform::Listener,
        shutdown_tx: &mpsc::Sender<()>,
        shutdown_rx: &mut mpsc::Receiver<()>,
        idle_timeout: Duration,
    ) -> Result<bool> {
        use tokio::signal::unix::{signal, SignalKind};

        // Signal handlers are recreated each iteration to avoid lifetime issues
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                Ok(true)
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully");
                Ok(true)
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Shutdown requested by client");
                Ok(true)
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok(stream) => {
                        self.last_activity = Instant::now();
                        let ctx = self.ctx.clone();
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, ctx, shutdown_tx).await {
                                tracing::error!("Error handling client: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
                Ok(false)
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                self.periodic_tick(idle_timeout).await
            }
        }
    }

    /// Run one iteration of the select loop (Windows version)
    #[cfg(not(unix))]
    async fn run_select_loop(
        &mut self,
        listener: &transport::platform::Listener,
        shutdown_tx: &mpsc::Sender<()>,
        shutdown_rx: &mut mpsc::Receiver<()>,
        idle_timeout: Duration,
    ) -> Result<bool> {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Shutdown requested by client");
                Ok(true)
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok(stream) => {
                        self.last_activity = Instant::now();
                        let ctx = self.ctx.clone();
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, ctx, shutdown_tx).await {
                                tracing::error!("Error handling client: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
                Ok(false)
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                self.periodic_tick(idle_timeout).await
            }
        }
    }

    /// Periodic wakeup: reap inactive sessions on the configured interval
    /// and auto-exit once the daemon has been idle with no sessions.
    async fn periodic_tick(&mut self, idle_timeout: Duration) -> Result<bool> {
        let reap_interval = Duration::from_secs(self.config.registry.reap_interval_secs);
        if self.last_reap.elapsed() >= reap_interval {
            self.last_reap = Instant::now();
            let threshold =
                Duration::from_secs(self.config.registry.inactive_timeout_minutes * 60);
            let reaped = self.ctx.registry.lock().await.reap_inactive(threshold).await;
            if reaped > 0 {
                tracing::info!(count = reaped, "reaped inactive sessions");
            }
        }

        let no_sessions = self.ctx.registry.lock().await.is_empty();
        if no_sessions && self.last_activity.elapsed() > idle_timeout {
            tracing::info!("Idle timeout reached, shutting down daemon");
            return Ok(true);
        }
        Ok(false)
    }
}

/// Handle a single client connection
async fn handle_client(
    stream: transport::platform::Stream,
    ctx: HandlerContext,
    shutdown_tx: mpsc::Sender<()>,
) -> Result<()> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    // Read and process commands until client disconnects
    loop {
        let request_data = tokio::select! {
            result = transport::recv_message(&mut reader) => {
                match result {
                    Ok(data) => data,
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        tracing::debug!("Client disconnected");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading request: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(300)) => {
                tracing::debug!("Client timeout");
                break;
            }
        };

        let request: Request = match serde_json::from_slice(&request_data) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Invalid request: {}", e);
                let response = Response::error(
                    0,
                    crate::common::error::IpcError {
                        code: "INVALID_REQUEST".to_string(),
                        message: e.to_string(),
                    },
                );
                let json = serde_json::to_vec(&response)?;
                transport::send_message(&mut writer, &json).await?;
                continue;
            }
        };

        tracing::debug!("Received command: {:?}", request.command);

        if matches!(request.command, Command::Shutdown) {
            let response = Response::ok(request.id);
            let json = serde_json::to_vec(&response)?;
            transport::send_message(&mut writer, &json).await?;
            let _ = shutdown_tx.send(()).await;
            break;
        }

        let response = handler::handle_command(&ctx, request.id, request.command).await;

        let json = serde_json::to_vec(&response)?;
        transport::send_message(&mut writer, &json).await?;
    }

    Ok(())
}
