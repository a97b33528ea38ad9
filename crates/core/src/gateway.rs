//! The operation set the HTTP layer and the monitor call.
//!
//! Every operation takes one device lease for its whole duration, records
//! its outcome with the connectivity tracker, and publishes the resulting
//! device status.

use std::sync::Arc;
use std::time::Duration;

use smsgw_protocol::{
	DeviceStatus, LogicalMessage, NetworkInfo, SendOutcome, SignalQuality, SmsRecord,
};
use smsgw_runtime::{ConnectivityTracker, DriverResult, Session};
use tracing::{debug, info, warn};

use crate::outbound::{self, OutboundJob};
use crate::reconciler::{self, DeleteReport};
use crate::telemetry::Publisher;

pub struct Gateway {
	session: Arc<Session>,
	publisher: Arc<Publisher>,
	tracker: ConnectivityTracker,
	default_smsc: Option<String>,
}

impl Gateway {
	pub fn new(session: Arc<Session>, publisher: Arc<Publisher>) -> Self {
		Self {
			session,
			publisher,
			tracker: ConnectivityTracker::default(),
			default_smsc: None,
		}
	}

	/// Service-center number used when a job does not name one.
	pub fn with_default_smsc(mut self, smsc: impl Into<String>) -> Self {
		let smsc = smsc.into();
		self.default_smsc = (!smsc.trim().is_empty()).then_some(smsc);
		self
	}

	pub fn with_offline_timeout(mut self, timeout: Duration) -> Self {
		self.tracker = ConnectivityTracker::new(timeout);
		self
	}

	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	pub fn publisher(&self) -> &Arc<Publisher> {
		&self.publisher
	}

	/// All stored messages; empty when the storage walk fails.
	pub async fn list(&self) -> Vec<LogicalMessage> {
		let mut lease = self.session.guard().lease().await;
		let fetched = reconciler::try_fetch_all(lease.driver()).await;
		drop(lease);
		self.settle_fetch(fetched).await
	}

	pub async fn message(&self, index: usize) -> Option<LogicalMessage> {
		self.list().await.into_iter().nth(index)
	}

	/// Deletes the message at `index`; `None` when there is no such message.
	///
	/// The lookup and the delete happen under one lease.
	pub async fn delete(&self, index: usize) -> Option<DeleteReport> {
		let mut lease = self.session.guard().lease().await;
		let fetched = reconciler::try_fetch_all(lease.driver()).await;
		let target = fetched.as_ref().ok().and_then(|messages| messages.get(index).cloned());
		let report = match &target {
			Some(message) => Some(reconciler::delete_one(lease.driver(), message).await),
			None => None,
		};
		drop(lease);

		self.settle_fetch(fetched).await;
		let report = report?;
		self.settle_delete(&report).await;
		info!(
			target = "smsgw.reconciler",
			index,
			deleted = report.deleted.len(),
			failed = report.failed.len(),
			"message deleted"
		);
		Some(report)
	}

	/// Deletes exactly the locations of `message`.
	pub async fn delete_message(&self, message: &LogicalMessage) -> DeleteReport {
		let mut lease = self.session.guard().lease().await;
		let report = reconciler::delete_one(lease.driver(), message).await;
		drop(lease);
		self.settle_delete(&report).await;
		report
	}

	/// Removes and returns the first stored message.
	///
	/// Returns the placeholder record, with nothing deleted or published, when
	/// storage is empty.
	pub async fn pop_first(&self) -> SmsRecord {
		let mut lease = self.session.guard().lease().await;
		let fetched = reconciler::try_fetch_all(lease.driver()).await;
		let first = fetched.as_ref().ok().and_then(|messages| messages.first().cloned());
		let report = match &first {
			Some(message) => Some(reconciler::delete_one(lease.driver(), message).await),
			None => None,
		};
		drop(lease);

		self.settle_fetch(fetched).await;
		let (Some(message), Some(report)) = (first, report) else {
			debug!(target = "smsgw.reconciler", "no message to pop");
			return SmsRecord::placeholder();
		};
		self.settle_delete(&report).await;

		let record = message.to_record();
		if !record.text.is_empty() {
			if let Err(err) = self.publisher.publish_sms(&record).await {
				debug!(target = "smsgw.telemetry", error = %err, "popped message not published");
			}
		}
		record
	}

	/// Sends `job`, falling back to the configured service center.
	pub async fn send(&self, job: &OutboundJob) -> Vec<SendOutcome> {
		let mut job = job.clone();
		if job.smsc.as_deref().is_none_or(|s| s.trim().is_empty()) {
			job.smsc = self.default_smsc.clone();
		}

		let mut lease = self.session.guard().lease().await;
		let outcomes = outbound::send(lease.driver(), &job).await;
		drop(lease);

		for outcome in &outcomes {
			match outcome {
				SendOutcome::Accepted { .. } => self.tracker.record_success(),
				SendOutcome::Rejected { error, .. } => self.tracker.record_failure(format!("send: {error}")),
			}
			self.publisher.publish_send_status(outcome, &job.text).await;
		}
		self.publish_device_status().await;
		outcomes
	}

	pub async fn signal(&self) -> DriverResult<SignalQuality> {
		let result = self
			.session
			.guard()
			.with_exclusive_access(|driver| Box::pin(async move { driver.signal_quality().await }))
			.await;
		let signal = self.settle("signal", result).await?;
		self.publisher.publish_signal(&signal).await;
		Ok(signal)
	}

	/// Network registration with the operator name filled in.
	pub async fn network(&self) -> DriverResult<NetworkInfo> {
		let result = self
			.session
			.guard()
			.with_exclusive_access(|driver| Box::pin(async move { driver.network_info().await }))
			.await;
		let network = self.settle("network", result).await?.resolve_name();
		self.publisher.publish_network(&network).await;
		Ok(network)
	}

	pub async fn reset(&self) -> smsgw_runtime::Result<()> {
		let result = self.session.reset().await;
		self.settle("reset", result).await
	}

	pub fn device_status(&self) -> DeviceStatus {
		self.tracker.status()
	}

	pub async fn publish_device_status(&self) {
		self.publisher.publish_device_status(&self.tracker.status()).await;
	}

	async fn settle<T, E: std::fmt::Display>(&self, operation: &str, result: Result<T, E>) -> Result<T, E> {
		match &result {
			Ok(_) => self.tracker.record_success(),
			Err(err) => self.tracker.record_failure(format!("{operation}: {err}")),
		}
		self.publish_device_status().await;
		result
	}

	async fn settle_fetch(&self, fetched: DriverResult<Vec<LogicalMessage>>) -> Vec<LogicalMessage> {
		match self.settle("fetch", fetched).await {
			Ok(messages) => messages,
			Err(err) => {
				warn!(target = "smsgw.reconciler", error = %err, "message fetch aborted");
				Vec::new()
			}
		}
	}

	async fn settle_delete(&self, report: &DeleteReport) {
		for _ in &report.deleted {
			self.tracker.record_success();
		}
		for (location, err) in &report.failed {
			self.tracker.record_failure(format!("delete {location}: {err}"));
		}
		self.publish_device_status().await;
	}
}

impl std::fmt::Debug for Gateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Gateway")
			.field("session", &self.session)
			.field("publisher", &self.publisher)
			.finish_non_exhaustive()
	}
}
