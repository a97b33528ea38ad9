//! Modem session lifecycle: connect, unlock the SIM, recover, close.

use std::fmt;

use parking_lot::{Mutex, RwLock};
use smsgw_protocol::{SecurityCodeKind, SecurityState};
use tracing::{debug, info, warn};

use crate::driver::{ConnectionParams, ModemDriver};
use crate::error::{DriverError, DriverErrorKind, Error, Result};
use crate::guard::DeviceGuard;

/// Outcome of [`Session::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
	/// SIM unlocked, every operation is available
	Ready,
	/// The process keeps running; SIM-dependent calls fail one by one
	Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionHealth {
	/// Device open, SIM not checked yet
	Connected,
	Ready,
	Degraded(String),
}

impl fmt::Display for SessionHealth {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SessionHealth::Connected => f.write_str("connected"),
			SessionHealth::Ready => f.write_str("ready"),
			SessionHealth::Degraded(reason) => write!(f, "degraded: {reason}"),
		}
	}
}

/// Exclusive owner of one modem connection.
///
/// The driver lives inside the session's [`DeviceGuard`]; every device call,
/// including the session's own, goes through it.
pub struct Session {
	guard: DeviceGuard,
	params: ConnectionParams,
	pin: Mutex<Option<String>>,
	health: RwLock<SessionHealth>,
}

impl Session {
	/// Opens the device.
	///
	/// A driver that reports a missing SIM during init still yields a session,
	/// in degraded mode. Any other init failure is fatal.
	pub async fn connect(mut driver: Box<dyn ModemDriver>, params: ConnectionParams) -> Result<Self> {
		let health = match driver.init(&params).await {
			Ok(()) => SessionHealth::Connected,
			Err(err) if err.is_no_sim() => {
				warn!(
					target = "smsgw.session",
					device = %params.device_path.display(),
					error = %err,
					"modem opened without a usable SIM; continuing degraded"
				);
				SessionHealth::Degraded(format!("SIM card not available: {}", err.message))
			}
			Err(source) => {
				return Err(Error::DeviceOpen {
					path: params.device_path.clone(),
					source,
				});
			}
		};

		if let Some(log_path) = &params.debug_log {
			match driver.set_debug_log(log_path).await {
				Ok(()) => debug!(
					target = "smsgw.session",
					path = %log_path.display(),
					"device debug logging enabled"
				),
				Err(err) => warn!(
					target = "smsgw.session",
					path = %log_path.display(),
					error = %err,
					"could not enable device debug logging"
				),
			}
		}

		info!(
			target = "smsgw.session",
			device = %params.device_path.display(),
			transport = %params.transport,
			"modem connected"
		);

		Ok(Self {
			guard: DeviceGuard::new(driver),
			params,
			pin: Mutex::new(None),
			health: RwLock::new(health),
		})
	}

	/// Queries the SIM security state and enters `pin` when asked for one.
	///
	/// The PIN is remembered for [`Session::reset`].
	pub async fn authenticate(&self, pin: Option<&str>) -> Result<Authentication> {
		let pin = pin.filter(|p| !p.is_empty()).map(str::to_string);
		*self.pin.lock() = pin.clone();

		let mut lease = self.guard.lease().await;
		let state = match lease.security_status().await {
			Ok(state) => state,
			Err(err) => {
				warn!(
					target = "smsgw.session",
					error = %err,
					"security status unavailable; SMS and network operations may fail"
				);
				return Ok(self.degrade(format!("security status unavailable: {}", err.message)));
			}
		};
		debug!(target = "smsgw.session", ?state, "SIM security state");

		match state {
			SecurityState::Ready => {}
			SecurityState::PinRequired => {
				let Some(code) = pin.as_deref() else {
					return Err(Error::PinRequired);
				};
				lease
					.enter_security_code(SecurityCodeKind::Pin, code)
					.await
					.map_err(Error::SecurityCode)?;
				info!(target = "smsgw.session", "PIN accepted");
			}
			SecurityState::Blocked => return Err(Error::SimBlocked),
			SecurityState::Unknown => {
				warn!(target = "smsgw.session", "modem reported an unknown security state");
				return Ok(self.degrade("unknown SIM security state".into()));
			}
		}

		*self.health.write() = SessionHealth::Ready;
		Ok(Authentication::Ready)
	}

	/// Soft-resets the modem and unlocks the SIM again if it asks.
	pub async fn reset(&self) -> Result<()> {
		let mut lease = self.guard.lease().await;
		info!(target = "smsgw.session", "resetting modem");
		lease.reset(false).await.map_err(Error::Reset)?;

		let state = lease.security_status().await.map_err(Error::Reset)?;
		match state {
			SecurityState::Ready => {}
			SecurityState::PinRequired => {
				let pin = self.pin.lock().clone();
				let Some(code) = pin else {
					return Err(Error::Reset(DriverError::new(
						DriverErrorKind::SecurityCode,
						"SIM asks for a PIN after reset but none is configured",
					)));
				};
				lease
					.enter_security_code(SecurityCodeKind::Pin, &code)
					.await
					.map_err(Error::Reset)?;
			}
			SecurityState::Blocked => {
				return Err(Error::Reset(DriverError::new(
					DriverErrorKind::SecurityCode,
					"SIM is blocked after reset",
				)));
			}
			SecurityState::Unknown => {
				self.degrade("unknown SIM security state after reset".into());
				return Ok(());
			}
		}

		*self.health.write() = SessionHealth::Ready;
		info!(target = "smsgw.session", "modem reset complete");
		Ok(())
	}

	/// Releases the device.
	pub async fn close(&self) {
		let mut lease = self.guard.lease().await;
		match lease.deinit().await {
			Ok(()) => info!(target = "smsgw.session", "modem closed"),
			Err(err) => warn!(target = "smsgw.session", error = %err, "modem close failed"),
		}
	}

	pub fn health(&self) -> SessionHealth {
		self.health.read().clone()
	}

	pub fn guard(&self) -> &DeviceGuard {
		&self.guard
	}

	pub fn params(&self) -> &ConnectionParams {
		&self.params
	}

	fn degrade(&self, reason: String) -> Authentication {
		*self.health.write() = SessionHealth::Degraded(reason.clone());
		Authentication::Degraded { reason }
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("device", &self.params.device_path)
			.field("health", &self.health())
			.finish_non_exhaustive()
	}
}
