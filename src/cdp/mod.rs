//! Inspection protocol client
//!
//! Client side of the remote inspection protocol spoken by browser tabs and
//! script runtimes: JSON commands correlated by id over a pluggable
//! transport, with unsolicited events fanned out to the owning session.

pub mod client;
pub mod transport;
pub mod types;

pub use client::CdpClient;
pub use transport::{Connector, TargetInfo, Transport, UnconfiguredConnector};
pub use types::*;
