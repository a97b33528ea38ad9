//! Test doubles for the telemetry port.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::telemetry::{SinkError, TelemetrySink};

/// One captured publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
	pub topic: String,
	pub payload: Value,
	pub retain: bool,
}

/// Sink that records what it is asked to publish.
#[derive(Debug, Default)]
pub struct RecordingSink {
	connected: AtomicBool,
	fail: AtomicBool,
	published: Mutex<Vec<Published>>,
}

impl RecordingSink {
	/// A sink that starts disconnected.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn connected() -> Self {
		let sink = Self::default();
		sink.connected.store(true, Ordering::SeqCst);
		sink
	}

	pub fn published(&self) -> Vec<Published> {
		self.published.lock().clone()
	}

	/// Captured publishes whose topic ends with `suffix`.
	pub fn on_topic(&self, suffix: &str) -> Vec<Published> {
		self.published
			.lock()
			.iter()
			.filter(|p| p.topic.ends_with(suffix))
			.cloned()
			.collect()
	}

	pub fn clear(&self) {
		self.published.lock().clear();
	}

	/// Makes every later publish fail.
	pub fn fail_publishes(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}
}

#[async_trait]
impl TelemetrySink for RecordingSink {
	async fn connect(&self) -> Result<(), SinkError> {
		self.connected.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn disconnect(&self) -> Result<(), SinkError> {
		self.connected.store(false, Ordering::SeqCst);
		Ok(())
	}

	async fn publish(&self, topic: &str, payload: &Value, retain: bool) -> Result<(), SinkError> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(SinkError::Publish {
				topic: topic.to_string(),
				message: "broker unavailable".into(),
			});
		}
		self.published.lock().push(Published {
			topic: topic.to_string(),
			payload: payload.clone(),
			retain,
		});
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}
}
