//! Transport seam for the inspection protocol
//!
//! Framing and handshake (the WebSocket layer) are not implemented here;
//! embedders supply a [`Transport`] per attached target and a [`Connector`]
//! that opens one for a `host:port`. Tests inject scripted in-memory
//! transports through the same seam.

use async_trait::async_trait;

use crate::common::{Error, Result};

/// One framed text channel to a single inspection target.
///
/// `recv` returning `Ok(None)` means the peer closed the channel.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: &str) -> Result<()>;
    async fn recv(&mut self) -> Result<Option<String>>;
}

/// Metadata about an attached target, known at connect time
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub host: String,
    pub port: u16,
    /// Tab index within the target process (browser targets)
    pub tab_index: usize,
}

/// Opens transports to inspection targets.
///
/// Browser targets share one process per `host:port`; `open_tab` asks the
/// target process for a fresh tab and connects to it.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the default (or indexed) debuggable target at `host:port`
    async fn connect(
        &self,
        host: &str,
        port: u16,
        tab_index: Option<usize>,
    ) -> Result<(Box<dyn Transport>, TargetInfo)>;

    /// Open a new tab on an already-attached browser process
    async fn open_tab(&self, host: &str, port: u16) -> Result<(Box<dyn Transport>, TargetInfo)>;
}

/// Placeholder connector for builds without a wired protocol transport.
///
/// Every call fails with a structured diagnosis instead of hanging.
pub struct UnconfiguredConnector;

#[async_trait]
impl Connector for UnconfiguredConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        _tab_index: Option<usize>,
    ) -> Result<(Box<dyn Transport>, TargetInfo)> {
        Err(Error::TransportUnavailable(format!(
            "no protocol transport is wired in for {}:{}; embed a Connector implementation",
            host, port
        )))
    }

    async fn open_tab(&self, host: &str, port: u16) -> Result<(Box<dyn Transport>, TargetInfo)> {
        Err(Error::TransportUnavailable(format!(
            "no protocol transport is wired in for {}:{}; embed a Connector implementation",
            host, port
        )))
    }
}
