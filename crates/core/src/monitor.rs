//! Background polling of device status and stored messages.
//!
//! The monitor runs two fixed cadences on one task: a status cycle (signal
//! and network snapshots) and an optional message cycle that forwards every
//! message it has not forwarded before. Failures are logged and the loop
//! carries on at the same cadence.
//!
//! A multi-part message whose parts have not all arrived is held back until
//! it completes or has been waiting for [`MonitorConfig::incomplete_timeout`].
//! A message is only marked as forwarded (and deleted, when configured)
//! after its publish succeeded; otherwise the next cycle tries again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use smsgw_protocol::LogicalMessage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::gateway::Gateway;

pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_SMS_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_INCOMPLETE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
	pub status_interval: Duration,
	/// `None` disables message checks
	pub sms_interval: Option<Duration>,
	/// Remove messages from storage once forwarded
	pub delete_after_publish: bool,
	/// How long a multi-part message may miss parts before it is forwarded
	/// as it is
	pub incomplete_timeout: Duration,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			status_interval: DEFAULT_STATUS_INTERVAL,
			sms_interval: Some(DEFAULT_SMS_INTERVAL),
			delete_after_publish: false,
			incomplete_timeout: DEFAULT_INCOMPLETE_TIMEOUT,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
	Idle,
	Polling,
	Publishing,
	Sleeping,
	Stopped,
}

/// What makes a stored message "the same message" across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageIdentity {
	pub locations: Vec<u32>,
	pub date: Option<NaiveDateTime>,
}

impl From<&LogicalMessage> for MessageIdentity {
	fn from(message: &LogicalMessage) -> Self {
		Self {
			locations: message.locations.clone(),
			date: message.date,
		}
	}
}

/// Messages already forwarded during this process lifetime.
#[derive(Debug, Default)]
pub struct SeenMessageSet {
	seen: HashSet<MessageIdentity>,
}

impl SeenMessageSet {
	pub fn contains(&self, message: &LogicalMessage) -> bool {
		self.seen.contains(&MessageIdentity::from(message))
	}

	/// Returns false if the message was already present.
	pub fn insert(&mut self, message: &LogicalMessage) -> bool {
		self.seen.insert(MessageIdentity::from(message))
	}

	pub fn len(&self) -> usize {
		self.seen.len()
	}

	pub fn is_empty(&self) -> bool {
		self.seen.is_empty()
	}
}

pub struct Monitor {
	gateway: Arc<Gateway>,
	config: MonitorConfig,
	seen: SeenMessageSet,
	/// Incomplete messages and when their current set of parts was first seen
	waiting: HashMap<MessageIdentity, Instant>,
	state: watch::Sender<MonitorState>,
}

impl Monitor {
	pub fn new(gateway: Arc<Gateway>, config: MonitorConfig) -> Self {
		let (state, _) = watch::channel(MonitorState::Idle);
		Self {
			gateway,
			config,
			seen: SeenMessageSet::default(),
			waiting: HashMap::new(),
			state,
		}
	}

	pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
		self.state.subscribe()
	}

	pub fn seen(&self) -> &SeenMessageSet {
		&self.seen
	}

	/// Publishes discovery configs and first snapshots.
	pub async fn publish_initial_states(&self) {
		let publisher = self.gateway.publisher();
		if !publisher.is_connected() {
			info!(target = "smsgw.monitor", "telemetry not connected; skipping initial states");
			return;
		}
		self.set_state(MonitorState::Publishing);
		publisher.publish_discovery().await;
		self.poll_status().await;
		publisher.publish_empty_sms().await;
		info!(target = "smsgw.monitor", "published initial states");
	}

	/// One status cycle. Signal and network are queried independently.
	pub async fn poll_status(&self) {
		self.set_state(MonitorState::Polling);
		match self.gateway.signal().await {
			Ok(signal) => debug!(target = "smsgw.monitor", percent = signal.signal_percent, "signal polled"),
			Err(err) => warn!(target = "smsgw.monitor", error = %err, "signal poll failed"),
		}
		match self.gateway.network().await {
			Ok(network) => debug!(target = "smsgw.monitor", network = %network.network_name, "network polled"),
			Err(err) => warn!(target = "smsgw.monitor", error = %err, "network poll failed"),
		}
		self.gateway.publish_device_status().await;
		self.set_state(MonitorState::Sleeping);
	}

	/// One message cycle. Returns how many messages were forwarded.
	///
	/// Skipped while telemetry is disconnected, so nothing is marked as
	/// forwarded (or deleted) without having been published.
	pub async fn poll_messages(&mut self) -> usize {
		if !self.gateway.publisher().is_connected() {
			debug!(target = "smsgw.monitor", "telemetry disconnected; message check skipped");
			return 0;
		}

		self.set_state(MonitorState::Polling);
		let messages = self.gateway.list().await;
		let fresh: Vec<LogicalMessage> = messages
			.into_iter()
			.filter(|message| !self.seen.contains(message))
			.collect();
		let ready = self.take_ready(fresh);

		if !ready.is_empty() {
			info!(target = "smsgw.monitor", count = ready.len(), "new messages detected");
			self.set_state(MonitorState::Publishing);
		}
		let mut forwarded = 0;
		for message in &ready {
			if let Err(err) = self.gateway.publisher().publish_sms(&message.to_record()).await {
				warn!(
					target = "smsgw.monitor",
					number = %message.number,
					error = %err,
					"message not forwarded; retrying next cycle"
				);
				continue;
			}
			self.seen.insert(message);
			forwarded += 1;
			if self.config.delete_after_publish {
				let report = self.gateway.delete_message(message).await;
				if !report.is_complete() {
					warn!(
						target = "smsgw.monitor",
						number = %message.number,
						failed = report.failed.len(),
						"could not delete forwarded message"
					);
				}
			}
		}

		self.gateway.publish_device_status().await;
		self.set_state(MonitorState::Sleeping);
		forwarded
	}

	/// Drops incomplete messages still within their grace period.
	fn take_ready(&mut self, fresh: Vec<LogicalMessage>) -> Vec<LogicalMessage> {
		let now = Instant::now();
		let timeout = self.config.incomplete_timeout;
		let mut waiting = HashMap::new();
		let ready = fresh
			.into_iter()
			.filter(|message| {
				if message.is_complete() {
					return true;
				}
				let identity = MessageIdentity::from(message);
				let since = self.waiting.get(&identity).copied().unwrap_or(now);
				if now.duration_since(since) >= timeout {
					warn!(
						target = "smsgw.monitor",
						number = %message.number,
						missing = message.missing_parts,
						"forwarding incomplete message"
					);
					return true;
				}
				debug!(
					target = "smsgw.monitor",
					number = %message.number,
					missing = message.missing_parts,
					"waiting for remaining parts"
				);
				waiting.insert(identity, since);
				false
			})
			.collect();
		self.waiting = waiting;
		ready
	}

	/// Runs the monitor on its own task until [`MonitorHandle::stop`].
	pub fn spawn(mut self) -> MonitorHandle {
		let (shutdown, mut shutdown_rx) = watch::channel(false);
		let state = self.subscribe();

		let task = tokio::spawn(async move {
			info!(
				target = "smsgw.monitor",
				status_secs = self.config.status_interval.as_secs(),
				sms_secs = self.config.sms_interval.map(|d| d.as_secs()),
				"monitor started"
			);
			self.publish_initial_states().await;

			let period = self.config.status_interval;
			let mut status_tick = tokio::time::interval_at(Instant::now() + period, period);
			status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
			let mut sms_tick = self.config.sms_interval.map(|period| {
				let mut tick = tokio::time::interval(period);
				tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
				tick
			});

			loop {
				tokio::select! {
					biased;
					changed = shutdown_rx.changed() => {
						if changed.is_err() || *shutdown_rx.borrow() {
							break;
						}
					}
					_ = status_tick.tick() => self.poll_status().await,
					_ = next_tick(&mut sms_tick) => {
						self.poll_messages().await;
					}
				}
			}

			self.set_state(MonitorState::Stopped);
			info!(target = "smsgw.monitor", "monitor stopped");
		});

		MonitorHandle {
			shutdown,
			state,
			task,
		}
	}

	fn set_state(&self, state: MonitorState) {
		self.state.send_replace(state);
	}
}

async fn next_tick(interval: &mut Option<Interval>) {
	match interval {
		Some(interval) => {
			interval.tick().await;
		}
		None => std::future::pending().await,
	}
}

/// Control handle of a spawned [`Monitor`].
pub struct MonitorHandle {
	shutdown: watch::Sender<bool>,
	state: watch::Receiver<MonitorState>,
	task: JoinHandle<()>,
}

impl MonitorHandle {
	pub fn state(&self) -> MonitorState {
		*self.state.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
		self.state.clone()
	}

	/// Signals shutdown and waits for the current cycle to finish.
	pub async fn stop(self) {
		let _ = self.shutdown.send(true);
		if let Err(err) = self.task.await {
			error!(target = "smsgw.monitor", error = %err, "monitor task failed");
		}
	}
}
