//! Modem runtime for the SMS gateway.
//!
//! - [`ModemDriver`]: the port every modem implementation provides
//! - [`Session`]: connection and SIM security lifecycle
//! - [`DeviceGuard`]: serializes all device access
//! - [`ConnectivityTracker`]: online/offline bookkeeping
//! - [`SimulatedModem`]: in-memory driver with fault injection

pub mod driver;
pub mod error;
pub mod guard;
pub mod session;
pub mod simulated;
pub mod tracker;

pub use driver::{ConnectionParams, Cursor, ModemDriver, TransportKind};
pub use error::{DriverError, DriverErrorKind, DriverResult, Error, Result};
pub use guard::{DeviceGuard, DeviceLease};
pub use session::{Authentication, Session, SessionHealth};
pub use simulated::{Fixture, FixtureError, Op, SimulatedHandle, SimulatedModem};
pub use tracker::{ConnectivityTracker, DEFAULT_OFFLINE_TIMEOUT};
