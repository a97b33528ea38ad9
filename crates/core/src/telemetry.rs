//! Telemetry bus port and the publisher that shapes gateway state for it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use smsgw_protocol::{
	Connectivity, DATE_FORMAT, DeviceStatus, NetworkInfo, SendOutcome, SignalQuality, SmsRecord,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default prefix of every state topic.
pub const DEFAULT_TOPIC_PREFIX: &str = "homeassistant/sensor/sms_gateway";

const DISCOVERY_PREFIX: &str = "homeassistant";

#[derive(Debug, Error)]
pub enum SinkError {
	#[error("telemetry connect failed: {0}")]
	Connect(String),
	#[error("publish to {topic} failed: {message}")]
	Publish { topic: String, message: String },
	#[error("telemetry not connected")]
	NotConnected,
	#[error("payload serialization failed: {0}")]
	Serialize(#[from] serde_json::Error),
}

/// Wire transport for telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
	async fn connect(&self) -> Result<(), SinkError>;

	async fn disconnect(&self) -> Result<(), SinkError>;

	/// Publishes `payload` as JSON on `topic`.
	async fn publish(&self, topic: &str, payload: &Value, retain: bool) -> Result<(), SinkError>;

	fn is_connected(&self) -> bool;
}

/// Sink for deployments without a telemetry bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl TelemetrySink for NullSink {
	async fn connect(&self) -> Result<(), SinkError> {
		Ok(())
	}

	async fn disconnect(&self) -> Result<(), SinkError> {
		Ok(())
	}

	async fn publish(&self, _topic: &str, _payload: &Value, _retain: bool) -> Result<(), SinkError> {
		Ok(())
	}

	fn is_connected(&self) -> bool {
		false
	}
}

/// Formats gateway state into topics and payloads.
///
/// Every publish is skipped silently while the sink is disconnected, and
/// sink failures are logged, never returned.
pub struct Publisher {
	sink: Arc<dyn TelemetrySink>,
	prefix: String,
	last_connectivity: Mutex<Option<Connectivity>>,
}

impl Publisher {
	pub fn new(sink: Arc<dyn TelemetrySink>, prefix: impl Into<String>) -> Self {
		Self {
			sink,
			prefix: prefix.into().trim_end_matches('/').to_string(),
			last_connectivity: Mutex::new(None),
		}
	}

	/// A publisher whose every publish is a no-op.
	pub fn disabled() -> Self {
		Self::new(Arc::new(NullSink), DEFAULT_TOPIC_PREFIX)
	}

	pub fn sink(&self) -> &Arc<dyn TelemetrySink> {
		&self.sink
	}

	pub fn is_connected(&self) -> bool {
		self.sink.is_connected()
	}

	pub fn topic(&self, leaf: &str) -> String {
		format!("{}/{leaf}", self.prefix)
	}

	pub async fn publish_signal(&self, signal: &SignalQuality) {
		self.emit_serialized(&self.topic("signal/state"), signal, true).await;
	}

	pub async fn publish_network(&self, network: &NetworkInfo) {
		self.emit_serialized(&self.topic("network/state"), network, true).await;
	}

	/// Publishes a received message, stamped with the publish time.
	///
	/// Unlike the status publishes this reports failure, including a
	/// disconnected sink, so callers can hold on to the message.
	pub async fn publish_sms(&self, record: &SmsRecord) -> Result<(), SinkError> {
		let mut payload = serde_json::to_value(record)?;
		payload["timestamp"] = Value::String(now());
		self.try_emit(&self.topic("sms/state"), &payload, false).await
	}

	/// Resets the last-message sensor to an empty record.
	pub async fn publish_empty_sms(&self) {
		let payload = json!({"Date": "", "Number": "", "State": "", "Text": "", "timestamp": ""});
		self.emit(&self.topic("sms/state"), &payload, true).await;
	}

	/// Reports the result of sending `text` to one destination.
	pub async fn publish_send_status(&self, outcome: &SendOutcome, text: &str) {
		let payload = match outcome {
			SendOutcome::Accepted { number, .. } => json!({
				"status": "success",
				"number": number,
				"text": text,
				"timestamp": now(),
			}),
			SendOutcome::Rejected { number, error } => json!({
				"status": "error",
				"error": error,
				"number": number,
				"text": text,
				"timestamp": now(),
			}),
		};
		self.emit(&self.topic("send_status"), &payload, false).await;
	}

	pub async fn publish_device_status(&self, status: &DeviceStatus) {
		if !self.is_connected() {
			return;
		}
		self.emit_serialized(&self.topic("device_status/state"), status, true).await;

		let previous = self.last_connectivity.lock().replace(status.status);
		if previous.is_some_and(|previous| previous != status.status) {
			match status.status {
				Connectivity::Online => info!(
					target = "smsgw.telemetry",
					failures = status.consecutive_failures,
					"modem online"
				),
				Connectivity::Offline => warn!(
					target = "smsgw.telemetry",
					silent_secs = status.seconds_since_last_success.unwrap_or_default(),
					"modem offline"
				),
				Connectivity::Unknown => info!(target = "smsgw.telemetry", "modem status unknown"),
			}
		}
	}

	/// Publishes auto-discovery configs for every gateway sensor.
	pub async fn publish_discovery(&self) {
		if !self.is_connected() {
			return;
		}
		let sensors = [
			(
				"signal",
				json!({
					"name": "GSM Signal Strength",
					"state_topic": self.topic("signal/state"),
					"value_template": "{{ value_json.SignalPercent }}",
					"unit_of_measurement": "%",
					"icon": "mdi:signal-cellular-3",
				}),
			),
			(
				"network",
				json!({
					"name": "GSM Network",
					"state_topic": self.topic("network/state"),
					"value_template": "{{ value_json.NetworkName }}",
					"icon": "mdi:network",
				}),
			),
			(
				"last_sms",
				json!({
					"name": "Last SMS Received",
					"state_topic": self.topic("sms/state"),
					"value_template": "{{ value_json.Text }}",
					"json_attributes_topic": self.topic("sms/state"),
					"icon": "mdi:message-text",
				}),
			),
			(
				"send_status",
				json!({
					"name": "SMS Send Status",
					"state_topic": self.topic("send_status"),
					"value_template": "{{ value_json.status }}",
					"json_attributes_topic": self.topic("send_status"),
					"icon": "mdi:send",
				}),
			),
			(
				"modem_status",
				json!({
					"name": "Modem Status",
					"state_topic": self.topic("device_status/state"),
					"value_template": "{{ value_json.status }}",
					"json_attributes_topic": self.topic("device_status/state"),
					"icon": "mdi:connection",
				}),
			),
		];

		for (id, mut config) in sensors {
			config["unique_id"] = Value::String(format!("sms_gateway_{id}"));
			config["device"] = device_block();
			let topic = format!("{DISCOVERY_PREFIX}/sensor/sms_gateway_{id}/config");
			self.emit(&topic, &config, true).await;
		}
		info!(target = "smsgw.telemetry", "published discovery configs");
	}

	async fn emit_serialized<T: Serialize>(&self, topic: &str, payload: &T, retain: bool) {
		match serde_json::to_value(payload) {
			Ok(value) => self.emit(topic, &value, retain).await,
			Err(err) => warn!(target = "smsgw.telemetry", topic, error = %err, "cannot serialize payload"),
		}
	}

	async fn emit(&self, topic: &str, payload: &Value, retain: bool) {
		match self.try_emit(topic, payload, retain).await {
			Ok(()) | Err(SinkError::NotConnected) => {}
			Err(err) => warn!(target = "smsgw.telemetry", topic, error = %err, "publish failed"),
		}
	}

	async fn try_emit(&self, topic: &str, payload: &Value, retain: bool) -> Result<(), SinkError> {
		if !self.sink.is_connected() {
			return Err(SinkError::NotConnected);
		}
		self.sink.publish(topic, payload, retain).await?;
		debug!(target = "smsgw.telemetry", topic, retain, "published");
		Ok(())
	}
}

impl std::fmt::Debug for Publisher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Publisher")
			.field("prefix", &self.prefix)
			.field("connected", &self.is_connected())
			.finish_non_exhaustive()
	}
}

fn device_block() -> Value {
	json!({
		"identifiers": ["sms_gateway"],
		"name": "SMS Gateway",
		"model": "GSM Modem",
		"manufacturer": "smsgw",
	})
}

fn now() -> String {
	Local::now().format(DATE_FORMAT).to_string()
}
