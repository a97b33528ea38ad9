//! Outbound message types: encoded parts and per-destination send outcomes.

use serde::{Deserialize, Serialize};

use crate::message::{Coding, ConcatInfo};

/// Storage slot holding the default service-center number.
pub const DEFAULT_SMSC_LOCATION: u8 = 1;

/// Where the modem should take the service-center address from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmscTarget {
	/// Explicit service-center number
	Number(String),
	/// Number stored in the given SMSC slot of the SIM
	Location(u8),
}

impl Default for SmscTarget {
	fn default() -> Self {
		SmscTarget::Location(DEFAULT_SMSC_LOCATION)
	}
}

/// One protocol-level payload produced by encoding a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPart {
	pub coding: Coding,
	/// Text carried by this part
	pub text: String,
	/// Present on every part of a multi-part message
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub concat: Option<ConcatInfo>,
	/// Message class, `None` for the modem default
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub class: Option<u8>,
}

impl SubmitPart {
	/// Binds this part to a destination and service center.
	pub fn addressed(&self, number: &str, smsc: SmscTarget) -> SubmitMessage {
		SubmitMessage {
			number: number.to_string(),
			smsc,
			part: self.clone(),
		}
	}
}

/// A fully addressed part, ready for the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitMessage {
	pub number: String,
	pub smsc: SmscTarget,
	#[serde(flatten)]
	pub part: SubmitPart,
}

/// Result of sending one job to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
	/// Every part was accepted; references are the modem's message references
	Accepted { number: String, references: Vec<u8> },
	/// A part was rejected or the destination was unusable
	Rejected { number: String, error: String },
}

impl SendOutcome {
	pub fn number(&self) -> &str {
		match self {
			SendOutcome::Accepted { number, .. } | SendOutcome::Rejected { number, .. } => number,
		}
	}

	pub fn is_accepted(&self) -> bool {
		matches!(self, SendOutcome::Accepted { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_smsc_is_first_slot() {
		assert_eq!(SmscTarget::default(), SmscTarget::Location(1));
	}

	#[test]
	fn test_outcome_serialization_is_tagged() {
		let ok = SendOutcome::Accepted {
			number: "+1111".into(),
			references: vec![4],
		};
		let json = serde_json::to_value(&ok).unwrap();
		assert_eq!(json["outcome"], "accepted");
		assert_eq!(json["number"], "+1111");
		assert_eq!(json["references"][0], 4);
		assert!(ok.is_accepted());

		let err = SendOutcome::Rejected {
			number: "+2222".into(),
			error: "no network".into(),
		};
		assert_eq!(err.number(), "+2222");
		assert!(!err.is_accepted());
	}
}
