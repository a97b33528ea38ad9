//! Concrete telemetry sinks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};
use smsgw::{SinkError, TelemetrySink};
use tracing::{debug, info};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts every publish as `{topic, payload, retain}` to an HTTP endpoint.
#[derive(Debug)]
pub struct WebhookSink {
	client: reqwest::Client,
	endpoint: String,
	connected: AtomicBool,
}

impl WebhookSink {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			endpoint: endpoint.into(),
			connected: AtomicBool::new(false),
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}
}

#[async_trait]
impl TelemetrySink for WebhookSink {
	async fn connect(&self) -> Result<(), SinkError> {
		let url = Url::parse(&self.endpoint)
			.map_err(|err| SinkError::Connect(format!("{}: {err}", self.endpoint)))?;
		if !matches!(url.scheme(), "http" | "https") {
			return Err(SinkError::Connect(format!("unsupported scheme {}", url.scheme())));
		}
		self.connected.store(true, Ordering::SeqCst);
		info!(target = "smsgw.telemetry", endpoint = %self.endpoint, "webhook sink ready");
		Ok(())
	}

	async fn disconnect(&self) -> Result<(), SinkError> {
		self.connected.store(false, Ordering::SeqCst);
		Ok(())
	}

	async fn publish(&self, topic: &str, payload: &Value, retain: bool) -> Result<(), SinkError> {
		let publish_error = |message: String| SinkError::Publish {
			topic: topic.to_string(),
			message,
		};
		self.client
			.post(&self.endpoint)
			.timeout(WEBHOOK_TIMEOUT)
			.json(&json!({ "topic": topic, "payload": payload, "retain": retain }))
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(|err| publish_error(err.to_string()))?;
		debug!(target = "smsgw.telemetry", topic, "webhook delivered");
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}
}

/// Writes every publish to the log; used when telemetry is enabled without
/// an endpoint.
#[derive(Debug, Default)]
pub struct LogSink {
	connected: AtomicBool,
}

impl LogSink {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl TelemetrySink for LogSink {
	async fn connect(&self) -> Result<(), SinkError> {
		self.connected.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn disconnect(&self) -> Result<(), SinkError> {
		self.connected.store(false, Ordering::SeqCst);
		Ok(())
	}

	async fn publish(&self, topic: &str, payload: &Value, retain: bool) -> Result<(), SinkError> {
		info!(target = "smsgw.telemetry", topic, retain, payload = %payload, "publish");
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn webhook_rejects_bad_endpoints() {
		let sink = WebhookSink::new("not a url");
		assert!(matches!(sink.connect().await, Err(SinkError::Connect(_))));
		assert!(!sink.is_connected());

		let sink = WebhookSink::new("ftp://example.com/hook");
		assert!(sink.connect().await.is_err());
	}

	#[tokio::test]
	async fn webhook_connects_to_http_endpoint() {
		let sink = WebhookSink::new("http://127.0.0.1:9/hook");
		sink.connect().await.unwrap();
		assert!(sink.is_connected());
		sink.disconnect().await.unwrap();
		assert!(!sink.is_connected());
	}

	#[tokio::test]
	async fn log_sink_tracks_connection() {
		let sink = LogSink::new();
		assert!(!sink.is_connected());
		sink.connect().await.unwrap();
		sink.publish("t", &json!({"a": 1}), true).await.unwrap();
		assert!(sink.is_connected());
	}
}
