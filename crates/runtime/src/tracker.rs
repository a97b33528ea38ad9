//! Device reachability derived from the outcome of recent driver calls.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use smsgw_protocol::{Connectivity, DATE_FORMAT, DeviceStatus};

/// Default time without a successful call before the device counts as offline.
pub const DEFAULT_OFFLINE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Default)]
struct TrackerState {
	last_success: Option<(Instant, DateTime<Local>)>,
	consecutive_failures: u32,
	total_operations: u64,
	successful_operations: u64,
	last_error: Option<String>,
}

/// Counts driver call outcomes and reports [`DeviceStatus`].
#[derive(Debug)]
pub struct ConnectivityTracker {
	offline_timeout: Duration,
	state: Mutex<TrackerState>,
}

impl Default for ConnectivityTracker {
	fn default() -> Self {
		Self::new(DEFAULT_OFFLINE_TIMEOUT)
	}
}

impl ConnectivityTracker {
	pub fn new(offline_timeout: Duration) -> Self {
		Self {
			offline_timeout,
			state: Mutex::new(TrackerState::default()),
		}
	}

	pub fn record_success(&self) {
		let mut state = self.state.lock();
		state.last_success = Some((Instant::now(), Local::now()));
		state.consecutive_failures = 0;
		state.last_error = None;
		state.total_operations += 1;
		state.successful_operations += 1;
	}

	pub fn record_failure(&self, error: impl Into<String>) {
		let mut error = error.into();
		if error.is_empty() {
			error = "Communication failed".into();
		}
		let mut state = self.state.lock();
		state.consecutive_failures += 1;
		state.last_error = Some(error);
		state.total_operations += 1;
	}

	/// Records the outcome of `result` and passes it through.
	pub fn observe<T, E: std::fmt::Display>(&self, result: Result<T, E>) -> Result<T, E> {
		match &result {
			Ok(_) => self.record_success(),
			Err(err) => self.record_failure(err.to_string()),
		}
		result
	}

	pub fn connectivity(&self) -> Connectivity {
		let state = self.state.lock();
		self.classify(&state)
	}

	pub fn status(&self) -> DeviceStatus {
		let state = self.state.lock();
		let (last_seen, seconds_since_last_success) = match state.last_success {
			Some((at, wall)) => (
				Some(wall.format(DATE_FORMAT).to_string()),
				Some(at.elapsed().as_secs()),
			),
			None => (None, None),
		};
		DeviceStatus {
			status: self.classify(&state),
			consecutive_failures: state.consecutive_failures,
			total_operations: state.total_operations,
			successful_operations: state.successful_operations,
			last_error: state.last_error.clone(),
			last_seen,
			seconds_since_last_success,
		}
	}

	fn classify(&self, state: &TrackerState) -> Connectivity {
		match state.last_success {
			None => Connectivity::Unknown,
			Some((at, _)) if at.elapsed() > self.offline_timeout => Connectivity::Offline,
			Some(_) => Connectivity::Online,
		}
	}
}
