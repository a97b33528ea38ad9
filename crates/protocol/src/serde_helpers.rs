//! Serde adapters for modem timestamps and binary user data.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serializer};

/// Timestamp layout used by modems and by every JSON surface of the gateway.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub mod opt_datetime {
	use super::*;

	pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(dt) => serializer.serialize_str(&dt.format(DATE_FORMAT).to_string()),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw: Option<String> = Option::deserialize(deserializer)?;
		match raw.as_deref().map(str::trim) {
			None | Some("") => Ok(None),
			Some(s) => NaiveDateTime::parse_from_str(s, DATE_FORMAT)
				.or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
				.map(Some)
				.map_err(serde::de::Error::custom),
		}
	}
}

pub mod opt_base64 {
	use super::*;

	pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw: Option<String> = Option::deserialize(deserializer)?;
		raw.map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
			.transpose()
	}
}
