//! Gateway options file.
//!
//! The options file is a flat JSON object. Any string value may be a
//! `!secret <name>` directive; directives are resolved on the raw JSON before
//! it is deserialized, so numeric and boolean options also accept the string
//! a secret resolves to. A blank numeric or boolean option (typically a
//! secret that could not be resolved) keeps its default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use smsgw::MonitorConfig;
use smsgw::telemetry::DEFAULT_TOPIC_PREFIX;
use smsgw_runtime::ConnectionParams;
use thiserror::Error;
use tracing::{info, warn};

use crate::secrets::SecretResolver;

pub const DEFAULT_CONFIG_PATH: &str = "/data/options.json";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read options file {path}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid options file {path}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	pub device_path: String,
	pub pin: String,
	#[serde(deserialize_with = "lenient")]
	pub port: u16,
	pub bind_address: String,
	pub username: String,
	pub password: String,
	#[serde(alias = "mqtt_enabled", deserialize_with = "lenient")]
	pub telemetry_enabled: bool,
	/// Webhook receiving every telemetry publish
	pub telemetry_endpoint: Option<String>,
	#[serde(alias = "mqtt_topic_prefix")]
	pub telemetry_topic_prefix: String,
	#[serde(deserialize_with = "lenient")]
	pub sms_monitoring_enabled: bool,
	/// Seconds between message checks
	#[serde(deserialize_with = "lenient")]
	pub sms_check_interval: u64,
	/// Seconds between signal/network snapshots
	#[serde(deserialize_with = "lenient")]
	pub status_interval: u64,
	#[serde(deserialize_with = "lenient")]
	pub delete_after_publish: bool,
	/// Service center used when a send request names none
	pub smsc_number: String,
	#[serde(deserialize_with = "lenient")]
	pub debug: bool,
	pub debug_log_path: PathBuf,
	pub simulation_fixture: Option<PathBuf>,
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			device_path: "/dev/ttyUSB0".into(),
			pin: String::new(),
			port: 5000,
			bind_address: "0.0.0.0".into(),
			username: "admin".into(),
			password: "password".into(),
			telemetry_enabled: false,
			telemetry_endpoint: None,
			telemetry_topic_prefix: DEFAULT_TOPIC_PREFIX.into(),
			sms_monitoring_enabled: true,
			sms_check_interval: 60,
			status_interval: 300,
			delete_after_publish: false,
			smsc_number: String::new(),
			debug: false,
			debug_log_path: "/data/gammu-debug.log".into(),
			simulation_fixture: None,
		}
	}
}

impl GatewayConfig {
	/// Loads `path`, falling back to defaults when the file does not exist.
	pub fn load(path: &Path, secrets: &SecretResolver) -> Result<Self, ConfigError> {
		let contents = match std::fs::read_to_string(path) {
			Ok(contents) => contents,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				info!(target = "smsgw.config", path = %path.display(), "options file not found; using defaults");
				return Ok(Self::default());
			}
			Err(source) => {
				return Err(ConfigError::Read {
					path: path.to_path_buf(),
					source,
				});
			}
		};
		Self::from_json(&contents, secrets).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn from_json(contents: &str, secrets: &SecretResolver) -> Result<Self, serde_json::Error> {
		let mut raw: serde_json::Value = serde_json::from_str(contents)?;
		secrets.resolve_json(&mut raw);
		drop_blank_scalars(&mut raw);
		serde_json::from_value(raw)
	}

	/// The SIM PIN, if one is configured.
	pub fn pin(&self) -> Option<&str> {
		Some(self.pin.trim()).filter(|pin| !pin.is_empty())
	}

	pub fn connection_params(&self) -> ConnectionParams {
		let params = ConnectionParams::new(&self.device_path);
		if self.debug {
			params.with_debug_log(&self.debug_log_path)
		} else {
			params
		}
	}

	pub fn monitor_config(&self) -> MonitorConfig {
		MonitorConfig {
			status_interval: Duration::from_secs(self.status_interval.max(1)),
			sms_interval: self
				.sms_monitoring_enabled
				.then(|| Duration::from_secs(self.sms_check_interval.max(1))),
			delete_after_publish: self.delete_after_publish,
			..MonitorConfig::default()
		}
	}

	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.bind_address, self.port)
	}
}

/// Whether the options file at `path` turns on debug logging.
///
/// Read before logging is installed, so it ignores secrets and never fails.
pub fn debug_requested(path: &Path) -> bool {
	let Ok(contents) = std::fs::read_to_string(path) else {
		return false;
	};
	let Ok(raw) = serde_json::from_str::<serde_json::Value>(&contents) else {
		return false;
	};
	match &raw["debug"] {
		serde_json::Value::Bool(debug) => *debug,
		serde_json::Value::String(debug) => debug.trim().eq_ignore_ascii_case("true"),
		_ => false,
	}
}

/// Removes blank strings given for options whose default is a number or a
/// boolean, so those options fall back to their defaults.
fn drop_blank_scalars(raw: &mut serde_json::Value) {
	let serde_json::Value::Object(options) = raw else {
		return;
	};
	let Ok(serde_json::Value::Object(defaults)) = serde_json::to_value(GatewayConfig::default()) else {
		return;
	};
	options.retain(|key, value| {
		let blank = value.as_str().is_some_and(|text| text.trim().is_empty());
		let scalar = defaults
			.get(key)
			.or_else(|| legacy_name(key).and_then(|name| defaults.get(name)))
			.is_some_and(|default| default.is_number() || default.is_boolean());
		if blank && scalar {
			warn!(target = "smsgw.config", option = %key, "blank value; using default");
		}
		!(blank && scalar)
	});
}

fn legacy_name(key: &str) -> Option<&'static str> {
	match key {
		"mqtt_enabled" => Some("telemetry_enabled"),
		_ => None,
	}
}

/// Accepts either the native JSON type or a string that parses as it. A
/// blank string yields the type's default.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + FromStr + Deserialize<'de>,
	T::Err: fmt::Display,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Lenient<T> {
		Native(T),
		Text(String),
	}

	match Lenient::<T>::deserialize(deserializer)? {
		Lenient::Native(value) => Ok(value),
		Lenient::Text(text) if text.trim().is_empty() => Ok(T::default()),
		Lenient::Text(text) => text.trim().parse().map_err(de::Error::custom),
	}
}
