//! Outbound send fan-out.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use smsgw_protocol::{SendOutcome, SmscTarget};
use smsgw_runtime::ModemDriver;
use tracing::{info, warn};

use crate::codec;

static FORMATTING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-.()/]").unwrap());
static DESTINATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[0-9]{1,20}$").unwrap());

/// Dialable form of `destination`: separators and brackets removed.
///
/// `None` when what remains is not a phone number.
pub fn normalize_destination(destination: &str) -> Option<String> {
	let dialable = FORMATTING.replace_all(destination, "");
	DESTINATION.is_match(&dialable).then(|| dialable.into_owned())
}

/// One send request, possibly for several destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundJob {
	/// Comma-separated destination numbers
	pub number: String,
	pub text: String,
	/// Service-center number; the SIM's first SMSC slot when absent
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub smsc: Option<String>,
	/// `Some(true)` forces UCS-2; otherwise coding follows the text
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unicode: Option<bool>,
}

impl OutboundJob {
	pub fn new(number: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			number: number.into(),
			text: text.into(),
			..Default::default()
		}
	}

	pub fn with_smsc(mut self, smsc: impl Into<String>) -> Self {
		self.smsc = Some(smsc.into());
		self
	}

	pub fn with_unicode(mut self, unicode: bool) -> Self {
		self.unicode = Some(unicode);
		self
	}

	/// Destinations in input order, trimmed.
	pub fn destinations(&self) -> impl Iterator<Item = &str> {
		self.number.split(',').map(str::trim)
	}

	fn smsc_target(&self) -> SmscTarget {
		match self.smsc.as_deref().map(str::trim) {
			Some(number) if !number.is_empty() => SmscTarget::Number(number.to_string()),
			_ => SmscTarget::default(),
		}
	}
}

/// Sends `job` to each destination independently.
///
/// Outcomes are in destination order. A rejected part stops that
/// destination; the remaining destinations are still attempted.
pub async fn send(driver: &mut dyn ModemDriver, job: &OutboundJob) -> Vec<SendOutcome> {
	let force_unicode = job.unicode.unwrap_or(false);
	let smsc = job.smsc_target();
	let mut outcomes = Vec::new();

	for destination in job.destinations() {
		let Some(dialable) = normalize_destination(destination) else {
			warn!(target = "smsgw.send", destination, "invalid destination number");
			outcomes.push(SendOutcome::Rejected {
				number: destination.to_string(),
				error: format!("invalid destination number '{destination}'"),
			});
			continue;
		};

		let parts = match codec::encode(&job.text, force_unicode) {
			Ok(parts) => parts,
			Err(err) => {
				outcomes.push(SendOutcome::Rejected {
					number: destination.to_string(),
					error: err.to_string(),
				});
				continue;
			}
		};

		let mut references = Vec::with_capacity(parts.len());
		let mut rejection = None;
		for part in &parts {
			match driver.send_sms(&part.addressed(&dialable, smsc.clone())).await {
				Ok(reference) => references.push(reference),
				Err(err) => {
					rejection = Some(err);
					break;
				}
			}
		}

		let outcome = match rejection {
			None => {
				info!(
					target = "smsgw.send",
					destination,
					parts = parts.len(),
					"message sent"
				);
				SendOutcome::Accepted {
					number: destination.to_string(),
					references,
				}
			}
			Some(err) => {
				warn!(
					target = "smsgw.send",
					destination,
					sent_parts = references.len(),
					error = %err,
					"message rejected"
				);
				SendOutcome::Rejected {
					number: destination.to_string(),
					error: err.user_hint(),
				}
			}
		};
		outcomes.push(outcome);
	}

	outcomes
}

#[cfg(test)]
mod tests {
	use smsgw_protocol::{Coding, NetworkInfo, NetworkState};
	use smsgw_runtime::{Op, SimulatedModem};

	use super::*;

	#[tokio::test]
	async fn test_fans_out_per_destination() {
		let mut modem = SimulatedModem::new();
		let handle = modem.handle();

		let job = OutboundJob::new("+1111, +2222", "0123456789");
		let outcomes = send(&mut modem, &job).await;

		assert_eq!(outcomes.len(), 2);
		assert_eq!(outcomes[0].number(), "+1111");
		assert_eq!(outcomes[1].number(), "+2222");
		assert!(outcomes.iter().all(SendOutcome::is_accepted));

		let sent = handle.sent();
		assert_eq!(sent.len(), 2);
		assert!(sent.iter().all(|m| m.part.coding == Coding::Gsm7 && m.part.concat.is_none()));
		assert!(sent.iter().all(|m| m.smsc == SmscTarget::Location(1)));
	}

	#[tokio::test]
	async fn test_cyrillic_selects_unicode() {
		let mut modem = SimulatedModem::new();
		let handle = modem.handle();

		send(&mut modem, &OutboundJob::new("+1111", "Привет")).await;
		assert_eq!(handle.sent()[0].part.coding, Coding::Unicode);
	}

	#[tokio::test]
	async fn test_smsc_override() {
		let mut modem = SimulatedModem::new();
		let handle = modem.handle();

		let job = OutboundJob::new("+1111", "hi").with_smsc(" +420603052000 ");
		send(&mut modem, &job).await;
		assert_eq!(handle.sent()[0].smsc, SmscTarget::Number("+420603052000".into()));
	}

	#[tokio::test]
	async fn test_rejection_is_per_destination() {
		let mut modem = SimulatedModem::new();
		let handle = modem.handle();
		handle.fail_send_to("+2222");

		let job = OutboundJob::new("+1111,+2222,+3333", "hello");
		let outcomes = send(&mut modem, &job).await;

		assert!(outcomes[0].is_accepted());
		assert!(!outcomes[1].is_accepted());
		assert!(outcomes[2].is_accepted());
		assert_eq!(handle.sent().len(), 2);
	}

	#[tokio::test]
	async fn test_rejected_part_stops_destination() {
		let mut modem = SimulatedModem::new();
		let handle = modem.handle();
		handle.fail_send_part(2);

		let job = OutboundJob::new("+1111", "x".repeat(400));
		let outcomes = send(&mut modem, &job).await;

		assert!(!outcomes[0].is_accepted());
		assert_eq!(
			handle.journal(),
			vec![Op::Send("+1111".into()), Op::Send("+1111".into())]
		);
	}

	#[tokio::test]
	async fn test_empty_destination_skips_driver() {
		let mut modem = SimulatedModem::new();
		let handle = modem.handle();

		let outcomes = send(&mut modem, &OutboundJob::new("+1111,,", "hello")).await;
		assert_eq!(outcomes.len(), 3);
		assert!(outcomes[0].is_accepted());
		assert!(!outcomes[1].is_accepted());
		assert!(!outcomes[2].is_accepted());
		assert_eq!(handle.journal().len(), 1);
	}

	#[test]
	fn test_destination_formatting_is_stripped() {
		assert_eq!(normalize_destination("+1 (555) 123-4567").as_deref(), Some("+15551234567"));
		assert_eq!(normalize_destination("+420.123.456").as_deref(), Some("+420123456"));
		assert_eq!(normalize_destination("0800/123 456").as_deref(), Some("0800123456"));
		assert_eq!(normalize_destination(""), None);
		assert_eq!(normalize_destination("call me"), None);
		assert_eq!(normalize_destination("+"), None);
	}

	#[tokio::test]
	async fn test_formatted_numbers_reach_driver() {
		let mut modem = SimulatedModem::new();
		let handle = modem.handle();

		let job = OutboundJob::new("+1 (555) 123-4567, +420.123.456", "hello");
		let outcomes = send(&mut modem, &job).await;

		assert!(outcomes.iter().all(SendOutcome::is_accepted));
		assert_eq!(outcomes[0].number(), "+1 (555) 123-4567");
		let numbers: Vec<String> = handle.sent().into_iter().map(|m| m.number).collect();
		assert_eq!(numbers, vec!["+15551234567", "+420123456"]);
	}

	#[tokio::test]
	async fn test_unregistered_network_hint() {
		let mut modem = SimulatedModem::new();
		modem.handle().set_network(NetworkInfo {
			state: NetworkState::NoNetwork,
			..Default::default()
		});

		let outcomes = send(&mut modem, &OutboundJob::new("+1111", "hello")).await;
		match &outcomes[0] {
			SendOutcome::Rejected { error, .. } => {
				assert!(error.contains("Network registration failed"))
			}
			other => panic!("unexpected outcome {other:?}"),
		}
	}
}
