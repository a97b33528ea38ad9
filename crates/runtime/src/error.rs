//! Error types for the modem runtime.
//!
//! Two layers:
//! - [`DriverError`]: what a [`ModemDriver`](crate::ModemDriver) raises for a
//!   single failed device call.
//! - [`Error`]: session-level outcomes, split into the fatal startup kinds and
//!   everything that is recoverable per call.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Classification of a failed driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
	/// Device is not open
	NotConnected,
	/// SIM card missing or unreadable
	NoSim,
	/// Requested storage entry does not exist
	Empty,
	/// Link did not answer in time
	Timeout,
	/// Serial or file I/O failed
	Io,
	/// Modem refused the request
	Rejected,
	/// Modem is not registered to a network
	NetworkNotRegistered,
	/// No service-center number available
	SmscUnknown,
	/// Security code was wrong or not accepted
	SecurityCode,
	/// Operation not offered by this driver
	NotSupported,
	Other,
}

impl fmt::Display for DriverErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DriverErrorKind::NotConnected => "not connected",
			DriverErrorKind::NoSim => "no SIM",
			DriverErrorKind::Empty => "empty",
			DriverErrorKind::Timeout => "timeout",
			DriverErrorKind::Io => "I/O",
			DriverErrorKind::Rejected => "rejected",
			DriverErrorKind::NetworkNotRegistered => "network not registered",
			DriverErrorKind::SmscUnknown => "SMSC unknown",
			DriverErrorKind::SecurityCode => "security code",
			DriverErrorKind::NotSupported => "not supported",
			DriverErrorKind::Other => "other",
		};
		f.write_str(name)
	}
}

/// A single failed device call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct DriverError {
	pub kind: DriverErrorKind,
	pub message: String,
}

impl DriverError {
	pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}

	pub fn io(message: impl Into<String>) -> Self {
		Self::new(DriverErrorKind::Io, message)
	}

	pub fn empty(message: impl Into<String>) -> Self {
		Self::new(DriverErrorKind::Empty, message)
	}

	pub fn is_no_sim(&self) -> bool {
		self.kind == DriverErrorKind::NoSim
	}

	/// Operator-facing explanation for failures on the send path.
	pub fn user_hint(&self) -> String {
		match self.kind {
			DriverErrorKind::Rejected | DriverErrorKind::NoSim | DriverErrorKind::NotConnected => {
				"SMS sending failed - check SIM card, network signal or device connection".into()
			}
			DriverErrorKind::NetworkNotRegistered => {
				"Network registration failed - check SIM card and signal".into()
			}
			DriverErrorKind::SmscUnknown => {
				"SMSC number not found - configure SMS center number in SIM settings".into()
			}
			_ => format!("SMS sending error: {}", self.message),
		}
	}
}

impl From<std::io::Error> for DriverError {
	fn from(err: std::io::Error) -> Self {
		let kind = match err.kind() {
			std::io::ErrorKind::TimedOut => DriverErrorKind::Timeout,
			std::io::ErrorKind::NotFound => DriverErrorKind::NotConnected,
			_ => DriverErrorKind::Io,
		};
		DriverError::new(kind, err.to_string())
	}
}

/// Session-level errors.
#[derive(Debug, Error)]
pub enum Error {
	/// The device could not be opened.
	#[error("failed to open modem at {}: {source}", path.display())]
	DeviceOpen {
		path: PathBuf,
		#[source]
		source: DriverError,
	},

	/// The SIM asks for a PIN and none is configured.
	#[error("SIM requires a PIN but none was configured")]
	PinRequired,

	/// The SIM did not accept the configured PIN.
	#[error("SIM rejected the security code: {0}")]
	SecurityCode(#[source] DriverError),

	/// PIN attempts exhausted.
	#[error("SIM is blocked; PUK entry is required")]
	SimBlocked,

	/// A manual reset did not bring the modem back.
	#[error("modem reset failed: {0}")]
	Reset(#[source] DriverError),

	#[error(transparent)]
	Driver(#[from] DriverError),
}

impl Error {
	/// Returns true for the conditions that must stop startup.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Error::DeviceOpen { .. } | Error::PinRequired | Error::SecurityCode(_) | Error::SimBlocked
		)
	}

	/// Returns the underlying driver error, when there is one.
	pub fn driver_error(&self) -> Option<&DriverError> {
		match self {
			Error::DeviceOpen { source, .. } => Some(source),
			Error::SecurityCode(err) | Error::Reset(err) | Error::Driver(err) => Some(err),
			Error::PinRequired | Error::SimBlocked => None,
		}
	}
}
