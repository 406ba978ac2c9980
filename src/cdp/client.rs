//! Protocol client for communicating with an inspection target
//!
//! Implements the request/response correlation layer on top of a
//! [`Transport`]: commands get sequential ids, responses complete pending
//! oneshot channels, and unsolicited events fan out on an mpsc channel that
//! the owning session drains.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::common::{Error, Result};

use super::transport::Transport;
use super::types::*;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<CommandResponse>>>>;

/// Client for one inspection target connection
pub struct CdpClient {
    /// Outgoing frames to the IO task
    out_tx: mpsc::UnboundedSender<String>,
    /// Pending requests waiting for responses, keyed by command id
    pending: PendingMap,
    /// Sequence number for commands
    next_id: AtomicU64,
    /// Receiver for events (given to the session)
    event_rx: Option<mpsc::UnboundedReceiver<EventMessage>>,
    /// Whether the transport is still open
    alive: Arc<AtomicBool>,
    /// Per-command round-trip timeout
    request_timeout: Duration,
    /// Background IO task
    io_task: JoinHandle<()>,
}

impl CdpClient {
    /// Create a client over an established transport and start its IO loop
    pub fn new(transport: Box<dyn Transport>, request_timeout: Duration) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let io_task = tokio::spawn(io_loop(
            transport,
            out_rx,
            event_tx,
            Arc::clone(&pending),
            Arc::clone(&alive),
        ));

        Self {
            out_tx,
            pending,
            next_id: AtomicU64::new(1),
            event_rx: Some(event_rx),
            alive,
            request_timeout,
            io_task,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<EventMessage>> {
        self.event_rx.take()
    }

    /// Whether the transport is still open
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a command and wait for its response
    pub async fn send_command(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = CommandRequest {
            id,
            method: method.to_string(),
            params,
        };
        let frame = serde_json::to_string(&request)?;
        tracing::trace!(%method, id, "protocol command");

        if self.out_tx.send(frame).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::TargetClosed("send channel closed".to_string()));
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(Error::TargetClosed(
                    "connection dropped before response".to_string(),
                ));
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(Error::Timeout(self.request_timeout.as_secs()));
            }
        };

        if let Some(err) = response.error {
            return Err(Error::command_failed(method, &err.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Send a command and parse the response into `T`
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T> {
        let result = self.send_command(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| Error::Protocol(format!("failed to parse {} response: {}", method, e)))
    }

    /// Enable the Debugger and Runtime domains (connection handshake)
    pub async fn enable(&self) -> Result<()> {
        self.send_command("Runtime.enable", None).await?;
        self.send_command("Debugger.enable", None).await?;
        Ok(())
    }

    /// Place a breakpoint by script URL
    pub async fn set_breakpoint_by_url(
        &self,
        params: SetBreakpointByUrlParams,
    ) -> Result<SetBreakpointByUrlResult> {
        self.request(
            "Debugger.setBreakpointByUrl",
            Some(serde_json::to_value(&params)?),
        )
        .await
    }

    /// Remove a breakpoint by its runtime-assigned id
    pub async fn remove_breakpoint(&self, breakpoint_id: &str) -> Result<()> {
        self.send_command(
            "Debugger.removeBreakpoint",
            Some(serde_json::json!({ "breakpointId": breakpoint_id })),
        )
        .await?;
        Ok(())
    }

    /// Request a pause at the next statement
    pub async fn pause(&self) -> Result<()> {
        self.send_command("Debugger.pause", None).await?;
        Ok(())
    }

    /// Resume execution
    pub async fn resume(&self) -> Result<()> {
        self.send_command("Debugger.resume", None).await?;
        Ok(())
    }

    /// Step over the next statement
    pub async fn step_over(&self) -> Result<()> {
        self.send_command("Debugger.stepOver", None).await?;
        Ok(())
    }

    /// Step into the next call
    pub async fn step_into(&self) -> Result<()> {
        self.send_command("Debugger.stepInto", None).await?;
        Ok(())
    }

    /// Step out of the current frame
    pub async fn step_out(&self) -> Result<()> {
        self.send_command("Debugger.stepOut", None).await?;
        Ok(())
    }

    /// Evaluate an expression in the global context
    pub async fn evaluate(&self, expression: &str, return_by_value: bool) -> Result<EvaluateResult> {
        self.request(
            "Runtime.evaluate",
            Some(serde_json::json!({
                "expression": expression,
                "returnByValue": return_by_value,
            })),
        )
        .await
    }

    /// Evaluate an expression in the scope of a paused call frame
    pub async fn evaluate_on_call_frame(
        &self,
        call_frame_id: &str,
        expression: &str,
    ) -> Result<EvaluateResult> {
        let params = EvaluateOnCallFrameParams {
            call_frame_id: call_frame_id.to_string(),
            expression: expression.to_string(),
            return_by_value: None,
        };
        self.request(
            "Debugger.evaluateOnCallFrame",
            Some(serde_json::to_value(&params)?),
        )
        .await
    }

    /// List own properties of a remote object
    pub async fn get_properties(&self, object_id: &str) -> Result<GetPropertiesResult> {
        self.request(
            "Runtime.getProperties",
            Some(serde_json::json!({
                "objectId": object_id,
                "ownProperties": true,
            })),
        )
        .await
    }

    /// Fetch the full source text of a loaded script
    pub async fn get_script_source(&self, script_id: &str) -> Result<String> {
        let result: GetScriptSourceResult = self
            .request(
                "Debugger.getScriptSource",
                Some(serde_json::json!({ "scriptId": script_id })),
            )
            .await?;
        Ok(result.script_source)
    }

    /// Tear down the connection
    pub fn disconnect(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.io_task.abort();
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.io_task.abort();
    }
}

/// One step of the IO loop
enum IoStep {
    Outgoing(Option<String>),
    Incoming(Result<Option<String>>),
}

/// Background IO loop: writes queued frames, reads incoming messages, and
/// dispatches them to pending requests or the event channel.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<EventMessage>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
) {
    loop {
        let step = tokio::select! {
            frame = out_rx.recv() => IoStep::Outgoing(frame),
            incoming = transport.recv() => IoStep::Incoming(incoming),
        };

        match step {
            IoStep::Outgoing(Some(frame)) => {
                if let Err(e) = transport.send(&frame).await {
                    tracing::warn!(error = %e, "transport send failed");
                    break;
                }
            }
            // Client dropped
            IoStep::Outgoing(None) => break,
            IoStep::Incoming(Ok(Some(text))) => dispatch(&text, &pending, &event_tx).await,
            IoStep::Incoming(Ok(None)) => {
                tracing::info!("target closed the connection");
                break;
            }
            IoStep::Incoming(Err(e)) => {
                tracing::warn!(error = %e, "transport receive failed");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Fail every in-flight request by dropping its sender
    pending.lock().await.clear();
}

async fn dispatch(
    text: &str,
    pending: &PendingMap,
    event_tx: &mpsc::UnboundedSender<EventMessage>,
) {
    match serde_json::from_str::<IncomingMessage>(text) {
        Ok(IncomingMessage::Response(response)) => {
            if let Some(tx) = pending.lock().await.remove(&response.id) {
                let _ = tx.send(response);
            } else {
                tracing::warn!(id = response.id, "response for unknown command id");
            }
        }
        Ok(IncomingMessage::Event(event)) => {
            let _ = event_tx.send(event);
        }
        Err(e) => {
            tracing::warn!(error = %e, "unparseable protocol message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Transport that answers every command from a canned script
    struct ScriptedTransport {
        incoming_rx: mpsc::UnboundedReceiver<String>,
        sent_tx: mpsc::UnboundedSender<String>,
        replies: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, text: &str) -> Result<()> {
            let request: CommandRequest = serde_json::from_str(text).unwrap();
            self.sent_tx.send(request.method.clone()).unwrap();
            // Echo a successful empty response
            self.replies
                .send(format!(r#"{{"id": {}, "result": {{}}}}"#, request.id))
                .unwrap();
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<String>> {
            Ok(self.incoming_rx.recv().await)
        }
    }

    fn scripted_client() -> (CdpClient, mpsc::UnboundedReceiver<String>) {
        let (reply_tx, incoming_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport {
            incoming_rx,
            sent_tx,
            replies: reply_tx,
        };
        (
            CdpClient::new(Box::new(transport), Duration::from_secs(2)),
            sent_rx,
        )
    }

    #[tokio::test]
    async fn commands_get_correlated_responses() {
        let (client, mut sent) = scripted_client();

        client.send_command("Debugger.enable", None).await.unwrap();
        client.send_command("Debugger.pause", None).await.unwrap();

        assert_eq!(sent.recv().await.unwrap(), "Debugger.enable");
        assert_eq!(sent.recv().await.unwrap(), "Debugger.pause");
    }

    #[tokio::test]
    async fn events_reach_the_event_channel() {
        let (reply_tx, incoming_rx) = mpsc::unbounded_channel();
        let (sent_tx, _sent_rx) = mpsc::unbounded_channel();
        let transport = ScriptedTransport {
            incoming_rx,
            sent_tx,
            replies: reply_tx.clone(),
        };
        let mut client = CdpClient::new(Box::new(transport), Duration::from_secs(2));
        let mut events = client.take_event_receiver().unwrap();

        reply_tx
            .send(r#"{"method": "Debugger.resumed", "params": {}}"#.to_string())
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.method, "Debugger.resumed");
    }

    #[tokio::test]
    async fn error_responses_become_command_failures() {
        let (reply_tx, incoming_rx) = mpsc::unbounded_channel();
        let (sent_tx, _sent_rx) = mpsc::unbounded_channel();

        struct ErrTransport {
            incoming_rx: mpsc::UnboundedReceiver<String>,
            replies: mpsc::UnboundedSender<String>,
            sent_tx: mpsc::UnboundedSender<String>,
        }

        #[async_trait]
        impl Transport for ErrTransport {
            async fn send(&mut self, text: &str) -> Result<()> {
                let request: CommandRequest = serde_json::from_str(text).unwrap();
                self.sent_tx.send(request.method.clone()).unwrap();
                self.replies
                    .send(format!(
                        r#"{{"id": {}, "error": {{"code": -32000, "message": "No script for id"}}}}"#,
                        request.id
                    ))
                    .unwrap();
                Ok(())
            }

            async fn recv(&mut self) -> Result<Option<String>> {
                Ok(self.incoming_rx.recv().await)
            }
        }

        let client = CdpClient::new(
            Box::new(ErrTransport {
                incoming_rx,
                replies: reply_tx,
                sent_tx,
            }),
            Duration::from_secs(2),
        );

        let err = client
            .send_command("Debugger.getScriptSource", None)
            .await
            .unwrap_err();
        match err {
            Error::CommandFailed { method, message } => {
                assert_eq!(method, "Debugger.getScriptSource");
                assert!(message.contains("No script"));
            }
            other => panic!("Expected CommandFailed, got {:?}", other),
        }
    }
}
