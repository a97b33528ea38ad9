//! Data types for the SMS gateway.
//!
//! This crate contains the serde-serializable types exchanged between the
//! modem driver, the reconciliation engine, the HTTP surface and the
//! telemetry bus.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization and small projections
//! - **Wire-shaped**: JSON field names match what HTTP clients and telemetry
//!   subscribers already consume (`Date`, `Number`, `SignalPercent`, ...)
//! - **Driver-neutral**: Nothing here knows how a modem is actually spoken to
//!
//! Higher-level behavior (linking fragments, encoding text, polling) lives in
//! `smsgw-runtime` and `smsgw`.

pub mod message;
pub mod networks;
pub mod status;
pub mod submit;

mod serde_helpers;

pub use message::*;
pub use networks::network_name;
pub use serde_helpers::DATE_FORMAT;
pub use status::*;
pub use submit::*;
