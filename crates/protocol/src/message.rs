//! Stored message types: raw storage fragments and the logical messages
//! assembled from them.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::serde_helpers::{DATE_FORMAT, opt_base64, opt_datetime};

/// Storage folder holding every message when folders are not distinguished.
pub const DEFAULT_FOLDER: u8 = 0;

/// Storage state tag of a message slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageState {
	/// Received, not read yet
	#[default]
	#[serde(rename = "UnRead")]
	Unread,
	/// Received and read
	Read,
	/// Outgoing, already sent
	Sent,
	/// Outgoing draft, not sent
	#[serde(rename = "UnSent")]
	Unsent,
}

impl MessageState {
	pub fn as_str(&self) -> &'static str {
		match self {
			MessageState::Unread => "UnRead",
			MessageState::Read => "Read",
			MessageState::Sent => "Sent",
			MessageState::Unsent => "UnSent",
		}
	}
}

impl fmt::Display for MessageState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Data coding scheme of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coding {
	/// GSM 03.38 default alphabet, 7 bits per character
	#[default]
	Gsm7,
	/// UCS-2 (UTF-16 big endian)
	Unicode,
	/// Raw 8-bit data, no text
	EightBit,
}

/// Concatenation metadata from the user data header of one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcatInfo {
	/// Reference number shared by all parts of one long message
	pub reference: u16,
	/// Total number of parts
	pub total: u8,
	/// 1-based position of this part
	pub sequence: u8,
}

impl ConcatInfo {
	pub fn new(reference: u16, total: u8, sequence: u8) -> Self {
		Self {
			reference,
			total,
			sequence,
		}
	}
}

/// Content of one physical storage slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFragment {
	/// Location, unique within `folder`
	pub location: u32,
	#[serde(default)]
	pub folder: u8,
	/// Sender (inbound) or recipient (outbound) number
	#[serde(default)]
	pub number: String,
	#[serde(default, with = "opt_datetime", skip_serializing_if = "Option::is_none")]
	pub date_time: Option<NaiveDateTime>,
	#[serde(default)]
	pub state: MessageState,
	#[serde(default)]
	pub coding: Coding,
	/// Text as rendered by the modem, used verbatim when decoding fails
	#[serde(default)]
	pub text: String,
	/// Structured payload: GSM septets (one per byte), UCS-2 bytes, or 8-bit data
	#[serde(default, with = "opt_base64", skip_serializing_if = "Option::is_none")]
	pub user_data: Option<Vec<u8>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub concat: Option<ConcatInfo>,
}

impl RawFragment {
	/// A single-part text fragment.
	pub fn text(location: u32, number: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			location,
			folder: DEFAULT_FOLDER,
			number: number.into(),
			date_time: None,
			state: MessageState::Unread,
			coding: Coding::Gsm7,
			text: text.into(),
			user_data: None,
			concat: None,
		}
	}

	pub fn with_concat(mut self, concat: ConcatInfo) -> Self {
		self.concat = Some(concat);
		self
	}

	pub fn with_date(mut self, date_time: NaiveDateTime) -> Self {
		self.date_time = Some(date_time);
		self
	}

	pub fn with_state(mut self, state: MessageState) -> Self {
		self.state = state;
		self
	}

	pub fn with_user_data(mut self, coding: Coding, user_data: Vec<u8>) -> Self {
		self.coding = coding;
		self.user_data = Some(user_data);
		self
	}

	/// Returns true when this fragment is one part of a multi-part message.
	pub fn is_multipart(&self) -> bool {
		self.concat.is_some_and(|c| c.total > 1)
	}
}

/// A user-visible message assembled from one or more fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalMessage {
	/// Source locations ordered by sequence position; never empty
	pub locations: Vec<u32>,
	pub number: String,
	/// Timestamp of the first fragment
	#[serde(default, with = "opt_datetime", skip_serializing_if = "Option::is_none")]
	pub date: Option<NaiveDateTime>,
	pub state: MessageState,
	pub text: String,
	/// Parts of a multi-part message not yet in storage
	#[serde(default, skip_serializing_if = "is_zero")]
	pub missing_parts: u8,
}

fn is_zero(value: &u8) -> bool {
	*value == 0
}

impl LogicalMessage {
	pub fn is_complete(&self) -> bool {
		self.missing_parts == 0
	}

	/// Date rendered the way every JSON surface shows it (empty when unknown).
	pub fn date_string(&self) -> String {
		self.date
			.map(|d| d.format(DATE_FORMAT).to_string())
			.unwrap_or_default()
	}

	pub fn to_record(&self) -> SmsRecord {
		SmsRecord {
			date: self.date_string(),
			number: self.number.clone(),
			state: self.state.as_str().to_string(),
			text: self.text.clone(),
		}
	}
}

/// Public projection of a [`LogicalMessage`]: storage locations are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRecord {
	#[serde(rename = "Date")]
	pub date: String,
	#[serde(rename = "Number")]
	pub number: String,
	#[serde(rename = "State")]
	pub state: String,
	#[serde(rename = "Text")]
	pub text: String,
}

impl SmsRecord {
	/// Record returned when there is nothing to return; every field is empty.
	pub fn placeholder() -> Self {
		Self::default()
	}

	pub fn is_placeholder(&self) -> bool {
		self == &Self::default()
	}
}

impl From<&LogicalMessage> for SmsRecord {
	fn from(message: &LogicalMessage) -> Self {
		message.to_record()
	}
}
