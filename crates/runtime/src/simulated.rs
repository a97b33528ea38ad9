//! In-memory modem with fault injection.
//!
//! [`SimulatedModem`] implements [`ModemDriver`] over a storage map and a
//! journal of every call it receives. A cloneable [`SimulatedHandle`] shares
//! the same state so tests (and the binary's simulation mode) can seed
//! storage, inject failures and inspect what the gateway did after the modem
//! itself has been moved into a [`DeviceGuard`](crate::DeviceGuard).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use smsgw_protocol::{
	NetworkInfo, NetworkState, RawFragment, SecurityCodeKind, SecurityState, SignalQuality,
	StorageStatus, SubmitMessage,
};
use thiserror::Error;
use tracing::debug;

use crate::driver::{ConnectionParams, Cursor, ModemDriver};
use crate::error::{DriverError, DriverErrorKind, DriverResult};

const SIM_CAPACITY: u32 = 30;
const PIN_ATTEMPTS: u8 = 3;

/// One call received by the simulated modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
	Init,
	Deinit,
	DebugLog,
	Security,
	EnterCode(SecurityCodeKind),
	Status,
	/// Storage read; `None` for the start of the walk
	Next(Option<u32>),
	Delete(u32),
	Send(String),
	Signal,
	Network,
	Reset(bool),
}

#[derive(Debug, Error)]
pub enum FixtureError {
	#[error("failed to read fixture {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid fixture {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

/// Seed data for a simulated modem, as stored in a JSON fixture file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
	pub messages: Vec<RawFragment>,
	pub signal: Option<SignalQuality>,
	pub network: Option<NetworkInfo>,
	pub security: Option<SecurityState>,
	/// PIN the simulated SIM accepts
	pub pin: Option<String>,
}

#[derive(Debug, Default)]
struct Faults {
	init: Option<DriverError>,
	debug_log: bool,
	security_status: bool,
	reads_before_failure: Option<usize>,
	deletes: HashSet<u32>,
	signal: bool,
	network: bool,
	send_numbers: HashSet<String>,
	send_sequences: HashSet<u8>,
	reset: bool,
}

#[derive(Debug)]
struct ModemState {
	storage: BTreeMap<u32, RawFragment>,
	storage_override: Option<StorageStatus>,
	security: SecurityState,
	pin: Option<String>,
	pin_attempts: u8,
	signal: SignalQuality,
	network: NetworkInfo,
	closed: bool,
	debug_log: Option<PathBuf>,
	journal: Vec<Op>,
	sent: Vec<SubmitMessage>,
	reads: usize,
	next_reference: u8,
	faults: Faults,
}

impl Default for ModemState {
	fn default() -> Self {
		Self {
			storage: BTreeMap::new(),
			storage_override: None,
			security: SecurityState::Ready,
			pin: None,
			pin_attempts: PIN_ATTEMPTS,
			signal: SignalQuality {
				signal_strength: -75,
				signal_percent: 65,
				bit_error_rate: -1,
			},
			network: NetworkInfo {
				network_name: String::new(),
				state: NetworkState::HomeNetwork,
				network_code: "230 01".into(),
				cid: "0A1B".into(),
				lac: "00FF".into(),
			},
			closed: false,
			debug_log: None,
			journal: Vec::new(),
			sent: Vec::new(),
			reads: 0,
			next_reference: 0,
			faults: Faults::default(),
		}
	}
}

impl ModemState {
	fn ensure_open(&self) -> DriverResult<()> {
		if self.closed {
			return Err(DriverError::new(
				DriverErrorKind::NotConnected,
				"device is not open",
			));
		}
		Ok(())
	}
}

/// In-memory [`ModemDriver`].
#[derive(Debug, Default)]
pub struct SimulatedModem {
	state: Arc<Mutex<ModemState>>,
}

impl SimulatedModem {
	pub fn new() -> Self {
		Self::default()
	}

	/// A modem whose storage holds `fragments`.
	pub fn with_fragments(fragments: impl IntoIterator<Item = RawFragment>) -> Self {
		let modem = Self::new();
		let handle = modem.handle();
		for fragment in fragments {
			handle.store(fragment);
		}
		modem
	}

	pub fn from_fixture(fixture: Fixture) -> Self {
		let modem = Self::with_fragments(fixture.messages);
		{
			let mut state = modem.state.lock();
			if let Some(signal) = fixture.signal {
				state.signal = signal;
			}
			if let Some(network) = fixture.network {
				state.network = network;
			}
			if let Some(security) = fixture.security {
				state.security = security;
			}
			state.pin = fixture.pin;
		}
		modem
	}

	/// Loads a [`Fixture`] from a JSON file.
	pub fn load(path: &Path) -> Result<Self, FixtureError> {
		let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let fixture: Fixture = serde_json::from_str(&raw).map_err(|source| FixtureError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		debug!(
			target = "smsgw.simulated",
			path = %path.display(),
			messages = fixture.messages.len(),
			"loaded modem fixture"
		);
		Ok(Self::from_fixture(fixture))
	}

	pub fn handle(&self) -> SimulatedHandle {
		SimulatedHandle {
			state: Arc::clone(&self.state),
		}
	}

	/// Records `op` after giving other tasks a chance to run.
	async fn enter(&self, op: Op) {
		tokio::task::yield_now().await;
		self.state.lock().journal.push(op);
	}
}

#[async_trait]
impl ModemDriver for SimulatedModem {
	async fn init(&mut self, params: &ConnectionParams) -> DriverResult<()> {
		self.enter(Op::Init).await;
		let mut state = self.state.lock();
		if let Some(err) = state.faults.init.clone() {
			// A missing SIM still leaves the serial link open.
			state.closed = !err.is_no_sim();
			return Err(err);
		}
		state.closed = false;
		debug!(
			target = "smsgw.simulated",
			device = %params.device_path.display(),
			transport = %params.transport,
			"simulated modem opened"
		);
		Ok(())
	}

	async fn deinit(&mut self) -> DriverResult<()> {
		self.enter(Op::Deinit).await;
		let mut state = self.state.lock();
		state.ensure_open()?;
		state.closed = true;
		Ok(())
	}

	async fn set_debug_log(&mut self, path: &Path) -> DriverResult<()> {
		self.enter(Op::DebugLog).await;
		let mut state = self.state.lock();
		if state.faults.debug_log {
			return Err(DriverError::io(format!("cannot open {}", path.display())));
		}
		state.debug_log = Some(path.to_path_buf());
		Ok(())
	}

	async fn security_status(&mut self) -> DriverResult<SecurityState> {
		self.enter(Op::Security).await;
		let state = self.state.lock();
		state.ensure_open()?;
		if state.faults.security_status {
			return Err(DriverError::new(DriverErrorKind::NoSim, "SIM not inserted"));
		}
		Ok(state.security)
	}

	async fn enter_security_code(&mut self, kind: SecurityCodeKind, code: &str) -> DriverResult<()> {
		self.enter(Op::EnterCode(kind)).await;
		let mut state = self.state.lock();
		state.ensure_open()?;
		if kind != SecurityCodeKind::Pin || state.security != SecurityState::PinRequired {
			return Err(DriverError::new(
				DriverErrorKind::SecurityCode,
				"security code not expected",
			));
		}
		if state.pin.as_deref() == Some(code) {
			state.security = SecurityState::Ready;
			state.pin_attempts = PIN_ATTEMPTS;
			return Ok(());
		}
		state.pin_attempts = state.pin_attempts.saturating_sub(1);
		if state.pin_attempts == 0 {
			state.security = SecurityState::Blocked;
		}
		Err(DriverError::new(DriverErrorKind::SecurityCode, "wrong PIN"))
	}

	async fn sms_status(&mut self) -> DriverResult<StorageStatus> {
		self.enter(Op::Status).await;
		let state = self.state.lock();
		state.ensure_open()?;
		if let Some(status) = state.storage_override {
			return Ok(status);
		}
		Ok(StorageStatus {
			sim_used: state.storage.len() as u32,
			sim_size: SIM_CAPACITY,
			..Default::default()
		})
	}

	async fn next_sms(&mut self, folder: u8, cursor: Cursor) -> DriverResult<RawFragment> {
		let after = match cursor {
			Cursor::Start => None,
			Cursor::After(location) => Some(location),
		};
		self.enter(Op::Next(after)).await;
		let mut state = self.state.lock();
		state.ensure_open()?;
		if state
			.faults
			.reads_before_failure
			.is_some_and(|limit| state.reads >= limit)
		{
			return Err(DriverError::io("read timed out on serial link"));
		}
		state.reads += 1;

		let lower = after.map_or(0, |location| location.saturating_add(1));
		state
			.storage
			.range(lower..)
			.map(|(_, fragment)| fragment)
			.find(|fragment| folder == 0 || fragment.folder == folder)
			.cloned()
			.ok_or_else(|| DriverError::empty("no more messages"))
	}

	async fn delete_sms(&mut self, _folder: u8, location: u32) -> DriverResult<()> {
		self.enter(Op::Delete(location)).await;
		let mut state = self.state.lock();
		state.ensure_open()?;
		if state.faults.deletes.contains(&location) {
			return Err(DriverError::io(format!("cannot delete location {location}")));
		}
		state
			.storage
			.remove(&location)
			.map(|_| ())
			.ok_or_else(|| DriverError::empty(format!("location {location} is empty")))
	}

	async fn send_sms(&mut self, message: &SubmitMessage) -> DriverResult<u8> {
		self.enter(Op::Send(message.number.clone())).await;
		let mut state = self.state.lock();
		state.ensure_open()?;
		if matches!(
			state.network.state,
			NetworkState::NoNetwork | NetworkState::RegistrationDenied
		) {
			return Err(DriverError::new(
				DriverErrorKind::NetworkNotRegistered,
				"not registered to a network",
			));
		}
		let sequence = message.part.concat.map_or(1, |c| c.sequence);
		if state.faults.send_numbers.contains(&message.number)
			|| state.faults.send_sequences.contains(&sequence)
		{
			return Err(DriverError::new(DriverErrorKind::Rejected, "CMS ERROR 500"));
		}
		state.sent.push(message.clone());
		let reference = state.next_reference;
		state.next_reference = state.next_reference.wrapping_add(1);
		Ok(reference)
	}

	async fn signal_quality(&mut self) -> DriverResult<SignalQuality> {
		self.enter(Op::Signal).await;
		let state = self.state.lock();
		state.ensure_open()?;
		if state.faults.signal {
			return Err(DriverError::io("signal query failed"));
		}
		Ok(state.signal)
	}

	async fn network_info(&mut self) -> DriverResult<NetworkInfo> {
		self.enter(Op::Network).await;
		let state = self.state.lock();
		state.ensure_open()?;
		if state.faults.network {
			return Err(DriverError::io("network query failed"));
		}
		Ok(state.network.clone())
	}

	async fn reset(&mut self, hard: bool) -> DriverResult<()> {
		self.enter(Op::Reset(hard)).await;
		let mut state = self.state.lock();
		state.ensure_open()?;
		if state.faults.reset {
			return Err(DriverError::new(DriverErrorKind::Timeout, "modem did not come back"));
		}
		state.security = if state.pin.is_some() {
			SecurityState::PinRequired
		} else {
			SecurityState::Ready
		};
		Ok(())
	}
}

/// Shared view of a [`SimulatedModem`]'s state.
#[derive(Debug, Clone)]
pub struct SimulatedHandle {
	state: Arc<Mutex<ModemState>>,
}

impl SimulatedHandle {
	/// Puts `fragment` into its storage location, replacing what was there.
	pub fn store(&self, fragment: RawFragment) {
		self.state.lock().storage.insert(fragment.location, fragment);
	}

	pub fn locations(&self) -> Vec<u32> {
		self.state.lock().storage.keys().copied().collect()
	}

	pub fn fragments(&self) -> Vec<RawFragment> {
		self.state.lock().storage.values().cloned().collect()
	}

	pub fn journal(&self) -> Vec<Op> {
		self.state.lock().journal.clone()
	}

	pub fn clear_journal(&self) {
		self.state.lock().journal.clear();
	}

	/// Parts accepted by `send_sms`, in submission order.
	pub fn sent(&self) -> Vec<SubmitMessage> {
		self.state.lock().sent.clone()
	}

	pub fn debug_log(&self) -> Option<PathBuf> {
		self.state.lock().debug_log.clone()
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	pub fn security(&self) -> SecurityState {
		self.state.lock().security
	}

	pub fn set_security(&self, security: SecurityState) {
		self.state.lock().security = security;
	}

	/// Sets the PIN the SIM accepts.
	pub fn set_pin(&self, pin: Option<&str>) {
		self.state.lock().pin = pin.map(str::to_string);
	}

	pub fn set_signal(&self, signal: SignalQuality) {
		self.state.lock().signal = signal;
	}

	pub fn set_network(&self, network: NetworkInfo) {
		self.state.lock().network = network;
	}

	/// Makes `sms_status` report `status` instead of the real storage count.
	pub fn set_storage_status(&self, status: StorageStatus) {
		self.state.lock().storage_override = Some(status);
	}

	pub fn fail_init(&self, kind: DriverErrorKind) {
		self.state.lock().faults.init = Some(DriverError::new(kind, "device init failed"));
	}

	pub fn fail_debug_log(&self, fail: bool) {
		self.state.lock().faults.debug_log = fail;
	}

	pub fn fail_security_status(&self, fail: bool) {
		self.state.lock().faults.security_status = fail;
	}

	/// Lets `reads` more storage reads succeed, then fails every later one.
	pub fn fail_reads_after(&self, reads: usize) {
		let mut state = self.state.lock();
		state.faults.reads_before_failure = Some(state.reads + reads);
	}

	pub fn fail_delete(&self, location: u32) {
		self.state.lock().faults.deletes.insert(location);
	}

	pub fn fail_signal(&self, fail: bool) {
		self.state.lock().faults.signal = fail;
	}

	pub fn fail_network(&self, fail: bool) {
		self.state.lock().faults.network = fail;
	}

	pub fn fail_send_to(&self, number: &str) {
		self.state.lock().faults.send_numbers.insert(number.to_string());
	}

	/// Rejects every part whose concatenation sequence is `sequence`.
	pub fn fail_send_part(&self, sequence: u8) {
		self.state.lock().faults.send_sequences.insert(sequence);
	}

	pub fn fail_reset(&self, fail: bool) {
		self.state.lock().faults.reset = fail;
	}
}
