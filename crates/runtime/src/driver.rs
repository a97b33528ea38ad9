//! The driver port: typed access to one physical modem.
//!
//! Implementations translate each call into device I/O and report failures
//! as [`DriverError`]. Nothing above this trait knows about AT commands or
//! serial framing.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smsgw_protocol::{
	NetworkInfo, RawFragment, SecurityCodeKind, SecurityState, SignalQuality, StorageStatus,
	SubmitMessage,
};

use crate::error::DriverResult;

/// Link used to talk to the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
	/// Plain AT commands over a serial line
	#[default]
	At,
}

impl fmt::Display for TransportKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportKind::At => f.write_str("at"),
		}
	}
}

/// Everything a driver needs to open the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
	pub device_path: PathBuf,
	pub transport: TransportKind,
	/// Verbose device-level log file, if enabled
	pub debug_log: Option<PathBuf>,
}

impl ConnectionParams {
	pub fn new(device_path: impl Into<PathBuf>) -> Self {
		Self {
			device_path: device_path.into(),
			transport: TransportKind::default(),
			debug_log: None,
		}
	}

	pub fn with_debug_log(mut self, path: impl Into<PathBuf>) -> Self {
		self.debug_log = Some(path.into());
		self
	}
}

/// Position of a storage walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
	/// First occupied slot of the folder
	Start,
	/// First occupied slot after the given location
	After(u32),
}

/// Device operations the gateway is built on.
#[async_trait]
pub trait ModemDriver: Send {
	async fn init(&mut self, params: &ConnectionParams) -> DriverResult<()>;

	async fn deinit(&mut self) -> DriverResult<()>;

	/// Enables verbose device-level logging to `path`.
	async fn set_debug_log(&mut self, path: &Path) -> DriverResult<()>;

	async fn security_status(&mut self) -> DriverResult<SecurityState>;

	async fn enter_security_code(&mut self, kind: SecurityCodeKind, code: &str) -> DriverResult<()>;

	async fn sms_status(&mut self) -> DriverResult<StorageStatus>;

	/// Reads the next occupied slot of `folder` relative to `cursor`.
	///
	/// Fails with [`DriverErrorKind::Empty`](crate::DriverErrorKind::Empty)
	/// when no further slot exists.
	async fn next_sms(&mut self, folder: u8, cursor: Cursor) -> DriverResult<RawFragment>;

	async fn delete_sms(&mut self, folder: u8, location: u32) -> DriverResult<()>;

	/// Submits one encoded part. Returns the modem's message reference.
	async fn send_sms(&mut self, message: &SubmitMessage) -> DriverResult<u8>;

	async fn signal_quality(&mut self) -> DriverResult<SignalQuality>;

	async fn network_info(&mut self) -> DriverResult<NetworkInfo>;

	/// Restarts the modem. `hard` requests a power cycle where supported.
	async fn reset(&mut self, hard: bool) -> DriverResult<()>;
}
