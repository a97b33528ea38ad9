//! Device status snapshots: security, storage, radio and connectivity.

use serde::{Deserialize, Serialize};

/// SIM security state as reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityState {
	/// No code needed
	Ready,
	/// PIN must be entered before SIM-dependent operations work
	PinRequired,
	/// PIN attempts exhausted; PUK entry needed
	Blocked,
	/// Not queried yet, or the modem reported something unrecognized
	#[default]
	Unknown,
}

/// Kind of security code submitted to the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityCodeKind {
	Pin,
	Puk,
}

/// Storage occupancy counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageStatus {
	#[serde(rename = "SIMUsed")]
	pub sim_used: u32,
	#[serde(rename = "SIMSize")]
	pub sim_size: u32,
	pub phone_used: u32,
	pub phone_size: u32,
	pub templates_used: u32,
}

impl StorageStatus {
	/// Number of fragments a full storage walk is expected to return.
	pub fn total_used(&self) -> u32 {
		self.sim_used + self.phone_used + self.templates_used
	}
}

/// Radio signal snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalQuality {
	/// Signal strength in dBm
	#[serde(rename = "SignalStrength")]
	pub signal_strength: i32,
	#[serde(rename = "SignalPercent")]
	pub signal_percent: i32,
	/// -1 when the modem does not report it
	#[serde(rename = "BitErrorRate")]
	pub bit_error_rate: i32,
}

/// Network registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkState {
	HomeNetwork,
	RoamingNetwork,
	RequestingNetwork,
	RegistrationDenied,
	NoNetwork,
	#[default]
	Unknown,
}

/// Network registration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
	/// Operator name resolved from [`NetworkInfo::network_code`]
	#[serde(rename = "NetworkName", default)]
	pub network_name: String,
	#[serde(rename = "State", default)]
	pub state: NetworkState,
	/// MCC and MNC separated by a space, e.g. `230 01`
	#[serde(rename = "NetworkCode", default)]
	pub network_code: String,
	#[serde(rename = "CID", default)]
	pub cid: String,
	#[serde(rename = "LAC", default)]
	pub lac: String,
}

impl NetworkInfo {
	/// Fills [`NetworkInfo::network_name`] from the static operator table.
	pub fn resolve_name(mut self) -> Self {
		self.network_name = crate::networks::network_name(&self.network_code)
			.unwrap_or("Unknown")
			.to_string();
		self
	}
}

/// Coarse reachability of the modem, derived from recent driver calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
	Online,
	Offline,
	#[default]
	Unknown,
}

/// Connectivity report published to telemetry and served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceStatus {
	pub status: Connectivity,
	pub consecutive_failures: u32,
	pub total_operations: u64,
	pub successful_operations: u64,
	pub last_error: Option<String>,
	/// Local time of the last successful call
	pub last_seen: Option<String>,
	pub seconds_since_last_success: Option<u64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_total_used_sums_all_memories() {
		let status = StorageStatus {
			sim_used: 3,
			sim_size: 30,
			phone_used: 2,
			phone_size: 100,
			templates_used: 1,
		};
		assert_eq!(status.total_used(), 6);
	}

	#[test]
	fn test_network_name_resolution() {
		let info = NetworkInfo {
			network_code: "230 01".into(),
			state: NetworkState::HomeNetwork,
			..Default::default()
		}
		.resolve_name();
		assert_eq!(info.network_name, "T-Mobile CZ");

		let unknown = NetworkInfo {
			network_code: "999 99".into(),
			..Default::default()
		}
		.resolve_name();
		assert_eq!(unknown.network_name, "Unknown");
	}

	#[test]
	fn test_signal_wire_shape() {
		let json = serde_json::to_value(SignalQuality {
			signal_strength: -75,
			signal_percent: 65,
			bit_error_rate: -1,
		})
		.unwrap();
		assert_eq!(json["SignalStrength"], -75);
		assert_eq!(json["SignalPercent"], 65);
		assert_eq!(json["BitErrorRate"], -1);
	}
}
