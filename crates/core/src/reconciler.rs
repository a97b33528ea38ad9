//! Storage walk and multi-part message linking.
//!
//! Callers pass the driver from a held [`DeviceLease`](smsgw_runtime::DeviceLease)
//! so a fetch and a following delete see the same storage.

use indexmap::IndexMap;
use smsgw_protocol::{DEFAULT_FOLDER, LogicalMessage, RawFragment};
use smsgw_runtime::{Cursor, DriverError, DriverResult, ModemDriver};
use tracing::{debug, warn};

use crate::codec;

/// Reads every stored fragment and links them into logical messages.
///
/// The walk stops after as many fragments as the storage counters report.
/// Any failed read aborts the whole fetch.
pub async fn try_fetch_all(driver: &mut dyn ModemDriver) -> DriverResult<Vec<LogicalMessage>> {
	let status = driver.sms_status().await?;
	let expected = status.total_used() as usize;

	let mut fragments = Vec::with_capacity(expected);
	let mut cursor = Cursor::Start;
	while fragments.len() < expected {
		let fragment = driver.next_sms(DEFAULT_FOLDER, cursor).await?;
		cursor = Cursor::After(fragment.location);
		fragments.push(fragment);
	}

	let messages = link(fragments);
	debug!(
		target = "smsgw.reconciler",
		fragments = expected,
		messages = messages.len(),
		"storage walk complete"
	);
	Ok(messages)
}

/// Like [`try_fetch_all`], but a failed walk yields no messages.
pub async fn fetch_all(driver: &mut dyn ModemDriver) -> Vec<LogicalMessage> {
	match try_fetch_all(driver).await {
		Ok(messages) => messages,
		Err(err) => {
			warn!(target = "smsgw.reconciler", error = %err, "message fetch aborted");
			Vec::new()
		}
	}
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum GroupKey {
	Concat {
		number: String,
		reference: u16,
		total: u8,
	},
	Single(usize),
}

/// Groups fragments into logical messages.
///
/// Messages come out in the order their first fragment was read; parts of
/// one message are ordered by sequence number. Groups with missing parts are
/// still returned.
pub fn link(fragments: Vec<RawFragment>) -> Vec<LogicalMessage> {
	let mut groups: IndexMap<GroupKey, Vec<RawFragment>> = IndexMap::new();
	for (index, fragment) in fragments.into_iter().enumerate() {
		let key = match fragment.concat {
			Some(concat) if concat.total > 1 => GroupKey::Concat {
				number: fragment.number.clone(),
				reference: concat.reference,
				total: concat.total,
			},
			_ => GroupKey::Single(index),
		};
		groups.entry(key).or_default().push(fragment);
	}

	groups.into_values().filter_map(assemble).collect()
}

fn assemble(mut parts: Vec<RawFragment>) -> Option<LogicalMessage> {
	parts.sort_by_key(|part| part.concat.map_or(0, |c| c.sequence));
	let first = parts.first()?;

	let missing_parts = first
		.concat
		.map_or(0, |c| usize::from(c.total).saturating_sub(parts.len()));
	if let Some(concat) = first.concat.filter(|c| usize::from(c.total) != parts.len()) {
		debug!(
			target = "smsgw.reconciler",
			number = %first.number,
			reference = concat.reference,
			present = parts.len(),
			total = concat.total,
			"incomplete multi-part message"
		);
	}

	let text = match parts.iter().map(codec::decode_fragment).collect::<Result<Vec<_>, _>>() {
		Ok(decoded) => decoded.concat(),
		Err(err) => {
			debug!(
				target = "smsgw.reconciler",
				location = first.location,
				error = %err,
				"payload not decodable; using modem text"
			);
			first.text.clone()
		}
	};

	Some(LogicalMessage {
		locations: parts.iter().map(|part| part.location).collect(),
		number: first.number.clone(),
		date: first.date_time,
		state: first.state,
		text,
		missing_parts: u8::try_from(missing_parts).unwrap_or(u8::MAX),
	})
}

/// Result of deleting one logical message.
#[derive(Debug, Default)]
pub struct DeleteReport {
	pub deleted: Vec<u32>,
	pub failed: Vec<(u32, DriverError)>,
}

impl DeleteReport {
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty()
	}
}

/// Deletes every storage location of `message`.
///
/// Each location is attempted even when an earlier one fails.
pub async fn delete_one(driver: &mut dyn ModemDriver, message: &LogicalMessage) -> DeleteReport {
	let mut report = DeleteReport::default();
	for &location in &message.locations {
		match driver.delete_sms(DEFAULT_FOLDER, location).await {
			Ok(()) => report.deleted.push(location),
			Err(err) => {
				warn!(
					target = "smsgw.reconciler",
					location,
					error = %err,
					"failed to delete stored fragment"
				);
				report.failed.push((location, err));
			}
		}
	}
	report
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;
	use smsgw_protocol::{Coding, ConcatInfo, MessageState};
	use smsgw_runtime::{Op, SimulatedModem};

	use super::*;

	fn part(location: u32, number: &str, reference: u16, total: u8, sequence: u8, text: &str) -> RawFragment {
		RawFragment::text(location, number, text).with_concat(ConcatInfo::new(reference, total, sequence))
	}

	#[test]
	fn test_link_groups_and_orders_parts() {
		let fragments = vec![
			part(1, "+111", 7, 3, 2, "lo "),
			RawFragment::text(2, "+222", "single"),
			part(3, "+111", 7, 3, 1, "Hel"),
			part(4, "+333", 7, 2, 1, "other "),
			part(5, "+111", 7, 3, 3, "world"),
			part(6, "+333", 7, 2, 2, "sender"),
		];

		let messages = link(fragments);
		assert_eq!(messages.len(), 3);

		assert_eq!(messages[0].number, "+111");
		assert_eq!(messages[0].text, "Hello world");
		assert_eq!(messages[0].locations, vec![3, 1, 5]);
		assert!(messages[0].is_complete());

		assert_eq!(messages[1].text, "single");
		assert_eq!(messages[1].locations, vec![2]);

		assert_eq!(messages[2].text, "other sender");
		assert_eq!(messages[2].locations, vec![4, 6]);

		let mut all: Vec<u32> = messages.iter().flat_map(|m| m.locations.clone()).collect();
		all.sort_unstable();
		assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
	}

	#[test]
	fn test_same_reference_different_total_stays_apart() {
		let messages = link(vec![part(1, "+1", 9, 2, 1, "a"), part(2, "+1", 9, 3, 1, "b")]);
		assert_eq!(messages.len(), 2);
	}

	#[test]
	fn test_incomplete_group_is_emitted() {
		let messages = link(vec![part(8, "+1", 1, 3, 2, "middle")]);
		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].text, "middle");
		assert_eq!(messages[0].locations, vec![8]);
		assert_eq!(messages[0].missing_parts, 2);
		assert!(!messages[0].is_complete());
	}

	#[test]
	fn test_first_part_supplies_metadata() {
		let early = NaiveDate::from_ymd_opt(2025, 1, 19)
			.unwrap()
			.and_hms_opt(14, 30, 0)
			.unwrap();
		let late = early + chrono::Duration::seconds(5);
		let messages = link(vec![
			part(2, "+1", 3, 2, 2, "b").with_date(late).with_state(MessageState::Read),
			part(1, "+1", 3, 2, 1, "a").with_date(early).with_state(MessageState::Unread),
		]);
		assert_eq!(messages[0].date, Some(early));
		assert_eq!(messages[0].state, MessageState::Unread);
	}

	#[test]
	fn test_undecodable_group_falls_back_to_first_text() {
		let messages = link(vec![
			part(1, "+1", 4, 2, 1, "modem one").with_user_data(Coding::Unicode, vec![0x00, 0x41]),
			part(2, "+1", 4, 2, 2, "modem two").with_user_data(Coding::Unicode, vec![0x00]),
		]);
		assert_eq!(messages[0].text, "modem one");
	}

	#[test]
	fn test_structured_payload_wins_over_text() {
		let messages = link(vec![
			RawFragment::text(1, "+1", "?????").with_user_data(Coding::Gsm7, vec![0x48, 0x65, 0x6C, 0x6C, 0x6F]),
		]);
		assert_eq!(messages[0].text, "Hello");
	}

	#[tokio::test]
	async fn test_fetch_all_walks_storage() {
		let mut modem = SimulatedModem::with_fragments([
			part(2, "+1", 5, 2, 2, "there"),
			part(5, "+1", 5, 2, 1, "hi "),
			RawFragment::text(9, "+2", "solo"),
		]);
		let handle = modem.handle();

		let messages = fetch_all(&mut modem).await;
		assert_eq!(messages.len(), 2);
		assert_eq!(messages[0].text, "hi there");
		assert_eq!(messages[1].text, "solo");
		assert_eq!(
			handle.journal(),
			vec![Op::Status, Op::Next(None), Op::Next(Some(2)), Op::Next(Some(5))]
		);
	}

	#[tokio::test]
	async fn test_read_failure_mid_walk_yields_nothing() {
		let mut modem = SimulatedModem::with_fragments([
			RawFragment::text(1, "+1", "a"),
			RawFragment::text(2, "+1", "b"),
			RawFragment::text(3, "+1", "c"),
		]);
		modem.handle().fail_reads_after(2);

		assert!(fetch_all(&mut modem).await.is_empty());
		assert!(try_fetch_all(&mut modem).await.is_err());
	}

	#[tokio::test]
	async fn test_empty_storage() {
		let mut modem = SimulatedModem::new();
		assert!(fetch_all(&mut modem).await.is_empty());
	}

	#[tokio::test]
	async fn test_delete_continues_past_failure() {
		let mut modem = SimulatedModem::with_fragments([
			part(1, "+1", 6, 3, 1, "a"),
			part(2, "+1", 6, 3, 2, "b"),
			part(3, "+1", 6, 3, 3, "c"),
		]);
		let handle = modem.handle();
		handle.fail_delete(2);

		let message = fetch_all(&mut modem).await.remove(0);
		handle.clear_journal();

		let report = delete_one(&mut modem, &message).await;
		assert_eq!(handle.journal(), vec![Op::Delete(1), Op::Delete(2), Op::Delete(3)]);
		assert_eq!(report.deleted, vec![1, 3]);
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].0, 2);
		assert!(!report.is_complete());
		assert_eq!(handle.locations(), vec![2]);
	}
}
