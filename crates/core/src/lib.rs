//! Modem session and SMS reconciliation engine.
//!
//! This crate turns a [`ModemDriver`](smsgw_runtime::ModemDriver) into an SMS
//! gateway: it links stored fragments into logical messages, fans outgoing
//! text out to destinations, and keeps a telemetry bus up to date from a
//! background monitor.
//!
//! # Layout
//!
//! - [`codec`]: GSM 7-bit / UCS-2 text coding and part splitting
//! - [`reconciler`]: storage walk, fragment linking, deletes
//! - [`outbound`]: per-destination send fan-out
//! - [`telemetry`]: sink port and topic/payload publisher
//! - [`gateway`]: the serialized operation set used by every caller
//! - [`monitor`]: periodic status and message polling
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use smsgw::{Gateway, OutboundJob, Publisher};
//! use smsgw_runtime::{ConnectionParams, Session, SimulatedModem};
//!
//! let session = Session::connect(Box::new(SimulatedModem::new()), ConnectionParams::new("/dev/ttyUSB0")).await?;
//! session.authenticate(None).await?;
//! let gateway = Gateway::new(Arc::new(session), Arc::new(Publisher::disabled()));
//! let outcomes = gateway.send(&OutboundJob::new("+420123456789", "Hello")).await;
//! ```

pub mod codec;
pub mod gateway;
pub mod monitor;
pub mod outbound;
pub mod reconciler;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use gateway::Gateway;
pub use monitor::{Monitor, MonitorConfig, MonitorHandle, MonitorState, SeenMessageSet};
pub use outbound::OutboundJob;
pub use reconciler::DeleteReport;
pub use telemetry::{NullSink, Publisher, SinkError, TelemetrySink};

pub use smsgw_protocol as protocol;
pub use smsgw_runtime as runtime;
