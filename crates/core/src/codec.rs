//! Text coding for stored and outgoing messages.
//!
//! Outgoing text is split into parts that fit one SMS each; stored fragments
//! are decoded from their structured payload when the modem provides one.
//!
//! Part capacity:
//!
//! | coding  | single part | per part when concatenated |
//! |---------|-------------|----------------------------|
//! | GSM 7   | 160 septets | 153 septets                |
//! | UCS-2   | 70 units    | 67 units                   |

use std::sync::atomic::{AtomicU8, Ordering};

use smsgw_protocol::{Coding, ConcatInfo, RawFragment, SubmitPart};
use thiserror::Error;

pub const GSM_SINGLE_SEPTETS: usize = 160;
pub const GSM_PART_SEPTETS: usize = 153;
pub const UCS2_SINGLE_UNITS: usize = 70;
pub const UCS2_PART_UNITS: usize = 67;

/// Concatenation metadata carries the part count in one byte.
pub const MAX_PARTS: usize = 255;

const ESCAPE: u8 = 0x1B;

/// GSM 03.38 default alphabet, indexed by septet. Slot 0x1B is the escape.
static GSM_BASIC: [char; 128] = [
	'@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
	'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1B}', 'Æ', 'æ', 'ß', 'É',
	' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
	'0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
	'¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
	'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
	'¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
	'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

/// GSM 03.38 extension table: septet following the escape, and its character.
static GSM_EXTENSION: [(u8, char); 10] = [
	(0x0A, '\u{0C}'),
	(0x14, '^'),
	(0x28, '{'),
	(0x29, '}'),
	(0x2F, '\\'),
	(0x3C, '['),
	(0x3D, '~'),
	(0x3E, ']'),
	(0x40, '|'),
	(0x65, '€'),
];

static NEXT_REFERENCE: AtomicU8 = AtomicU8::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
	#[error("septet {0:#04x} is outside the GSM alphabet")]
	InvalidSeptet(u8),
	#[error("escape septet at end of payload")]
	DanglingEscape,
	#[error("UCS-2 payload has odd length {0}")]
	OddLength(usize),
	#[error("UCS-2 payload contains an unpaired surrogate")]
	UnpairedSurrogate,
	#[error("text needs {parts} parts, more than the {MAX_PARTS} a message can carry")]
	TooLong { parts: usize },
}

/// Returns true when `text` contains any character above U+007F.
pub fn requires_unicode(text: &str) -> bool {
	!text.is_ascii()
}

/// Number of septets `c` occupies in GSM 7-bit coding.
///
/// Characters outside both tables are substituted by the modem and cost one.
pub fn gsm_septets(c: char) -> usize {
	if GSM_EXTENSION.iter().any(|(_, ext)| *ext == c) {
		2
	} else {
		1
	}
}

fn cost(c: char, coding: Coding) -> usize {
	match coding {
		Coding::Gsm7 => gsm_septets(c),
		Coding::Unicode | Coding::EightBit => c.len_utf16(),
	}
}

/// Splits `text` into parts for sending.
///
/// Unicode coding is used when `force_unicode` is set or the text needs it.
/// Parts of a multi-part message share one concatenation reference.
pub fn encode(text: &str, force_unicode: bool) -> Result<Vec<SubmitPart>, CodecError> {
	let coding = if force_unicode || requires_unicode(text) {
		Coding::Unicode
	} else {
		Coding::Gsm7
	};
	let (single, per_part) = match coding {
		Coding::Gsm7 => (GSM_SINGLE_SEPTETS, GSM_PART_SEPTETS),
		Coding::Unicode | Coding::EightBit => (UCS2_SINGLE_UNITS, UCS2_PART_UNITS),
	};

	let total: usize = text.chars().map(|c| cost(c, coding)).sum();
	if total <= single {
		return Ok(vec![SubmitPart {
			coding,
			text: text.to_string(),
			concat: None,
			class: None,
		}]);
	}

	let chunks = split(text, coding, per_part);
	let count = u8::try_from(chunks.len()).map_err(|_| CodecError::TooLong { parts: chunks.len() })?;
	let reference = u16::from(NEXT_REFERENCE.fetch_add(1, Ordering::Relaxed));

	Ok(chunks
		.into_iter()
		.zip(1..=count)
		.map(|(chunk, sequence)| SubmitPart {
			coding,
			text: chunk,
			concat: Some(ConcatInfo::new(reference, count, sequence)),
			class: None,
		})
		.collect())
}

/// Greedy split on character boundaries, so escapes and surrogate pairs stay whole.
fn split(text: &str, coding: Coding, limit: usize) -> Vec<String> {
	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut used = 0;
	for c in text.chars() {
		let size = cost(c, coding);
		if used + size > limit {
			chunks.push(std::mem::take(&mut current));
			used = 0;
		}
		current.push(c);
		used += size;
	}
	if !current.is_empty() {
		chunks.push(current);
	}
	chunks
}

/// Text carried by one stored fragment.
///
/// Fragments without a structured payload yield the modem's rendering.
pub fn decode_fragment(fragment: &RawFragment) -> Result<String, CodecError> {
	match (&fragment.user_data, fragment.coding) {
		(None, _) => Ok(fragment.text.clone()),
		(Some(data), Coding::Gsm7) => decode_gsm(data),
		(Some(data), Coding::Unicode) => decode_ucs2(data),
		(Some(_), Coding::EightBit) => Ok(String::new()),
	}
}

/// Decodes unpacked GSM septets, one per byte.
pub fn decode_gsm(septets: &[u8]) -> Result<String, CodecError> {
	let mut out = String::with_capacity(septets.len());
	let mut iter = septets.iter().copied();
	while let Some(septet) = iter.next() {
		let septet = basic_index(septet)?;
		if septet != ESCAPE {
			out.push(GSM_BASIC[usize::from(septet)]);
			continue;
		}
		let next = basic_index(iter.next().ok_or(CodecError::DanglingEscape)?)?;
		let c = GSM_EXTENSION
			.iter()
			.find(|(code, _)| *code == next)
			.map(|(_, c)| *c)
			.unwrap_or(GSM_BASIC[usize::from(next)]);
		out.push(c);
	}
	Ok(out)
}

fn basic_index(septet: u8) -> Result<u8, CodecError> {
	if septet > 0x7F {
		Err(CodecError::InvalidSeptet(septet))
	} else {
		Ok(septet)
	}
}

/// Decodes UTF-16BE code units.
pub fn decode_ucs2(bytes: &[u8]) -> Result<String, CodecError> {
	if bytes.len() % 2 != 0 {
		return Err(CodecError::OddLength(bytes.len()));
	}
	let units = bytes.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
	char::decode_utf16(units)
		.collect::<Result<String, _>>()
		.map_err(|_| CodecError::UnpairedSurrogate)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_requires_unicode() {
		assert!(!requires_unicode(""));
		assert!(!requires_unicode("Hello World! 123 {}[]"));
		assert!(requires_unicode("Привет"));
		assert!(requires_unicode("café"));
		assert!(requires_unicode("\u{80}"));
		assert!(!requires_unicode("\u{7F}"));
	}

	#[test]
	fn test_short_text_is_one_part() {
		let parts = encode("0123456789", false).unwrap();
		assert_eq!(parts.len(), 1);
		assert_eq!(parts[0].coding, Coding::Gsm7);
		assert_eq!(parts[0].concat, None);
	}

	#[test]
	fn test_empty_text_is_one_empty_part() {
		let parts = encode("", false).unwrap();
		assert_eq!(parts.len(), 1);
		assert_eq!(parts[0].text, "");
	}

	#[test]
	fn test_gsm_boundaries() {
		let exact = "a".repeat(160);
		assert_eq!(encode(&exact, false).unwrap().len(), 1);

		let over = "a".repeat(161);
		let parts = encode(&over, false).unwrap();
		assert_eq!(parts.len(), 2);
		assert_eq!(parts[0].text.len(), 153);
		assert_eq!(parts[1].text.len(), 8);

		let reference = parts[0].concat.unwrap().reference;
		for (i, part) in parts.iter().enumerate() {
			let concat = part.concat.unwrap();
			assert_eq!(concat.reference, reference);
			assert_eq!(concat.total, 2);
			assert_eq!(usize::from(concat.sequence), i + 1);
		}
	}

	#[test]
	fn test_ucs2_boundaries() {
		let exact = "ж".repeat(70);
		let parts = encode(&exact, false).unwrap();
		assert_eq!(parts.len(), 1);
		assert_eq!(parts[0].coding, Coding::Unicode);

		let over = "ж".repeat(71);
		let parts = encode(&over, false).unwrap();
		assert_eq!(parts.len(), 2);
		assert_eq!(parts[0].text.chars().count(), 67);
		assert_eq!(parts[1].text.chars().count(), 4);
	}

	#[test]
	fn test_force_unicode_on_ascii() {
		let parts = encode("plain", true).unwrap();
		assert_eq!(parts[0].coding, Coding::Unicode);
	}

	#[test]
	fn test_extension_chars_count_double_and_stay_whole() {
		assert_eq!(gsm_septets('€'), 2);
		assert_eq!(gsm_septets('a'), 1);

		let eighty = "{".repeat(80);
		assert_eq!(encode(&eighty, false).unwrap().len(), 1);

		// 152 plain septets leave one septet, too few for the escape pair.
		let text = format!("{}[", "a".repeat(152));
		let parts = encode(&format!("{text}{}", "b".repeat(10)), false).unwrap();
		assert_eq!(parts.len(), 2);
		assert_eq!(parts[0].text, "a".repeat(152));
		assert!(parts[1].text.starts_with('['));
	}

	#[test]
	fn test_surrogate_pairs_are_not_split() {
		let text = format!("{}😀", "ж".repeat(66));
		let parts = encode(&format!("{text}{}", "ж".repeat(5)), false).unwrap();
		assert_eq!(parts.len(), 2);
		assert_eq!(parts[0].text, "ж".repeat(66));
		assert!(parts[1].text.starts_with('😀'));
	}

	#[test]
	fn test_decode_gsm_with_extension() {
		let septets = [0x48, 0x69, 0x20, ESCAPE, 0x65, 0x00];
		assert_eq!(decode_gsm(&septets).unwrap(), "Hi €@");
	}

	#[test]
	fn test_decode_gsm_errors() {
		assert_eq!(decode_gsm(&[0x41, 0x80]), Err(CodecError::InvalidSeptet(0x80)));
		assert_eq!(decode_gsm(&[0x41, ESCAPE]), Err(CodecError::DanglingEscape));
	}

	#[test]
	fn test_decode_ucs2() {
		let bytes = [0x04, 0x1F, 0x04, 0x40, 0x04, 0x38, 0x04, 0x32, 0x04, 0x35, 0x04, 0x42];
		assert_eq!(decode_ucs2(&bytes).unwrap(), "Привет");
		assert_eq!(decode_ucs2(&[0x00]), Err(CodecError::OddLength(1)));
		assert_eq!(decode_ucs2(&[0xD8, 0x3D]), Err(CodecError::UnpairedSurrogate));
	}

	#[test]
	fn test_decode_fragment_by_coding() {
		let plain = RawFragment::text(1, "+1", "as rendered");
		assert_eq!(decode_fragment(&plain).unwrap(), "as rendered");

		let binary = RawFragment::text(2, "+1", "ignored").with_user_data(Coding::EightBit, vec![1, 2, 3]);
		assert_eq!(decode_fragment(&binary).unwrap(), "");
	}
}
