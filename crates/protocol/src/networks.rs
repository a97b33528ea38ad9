//! Static MCC/MNC to operator name table.
//!
//! Codes are written as `"MCC MNC"`. Lookups accept the compact form
//! (`"23001"`) as well.

static NETWORKS: &[(&str, &str)] = &[
	("202 01", "Cosmote"),
	("202 05", "Vodafone GR"),
	("202 10", "Wind GR"),
	("204 04", "Vodafone NL"),
	("204 08", "KPN"),
	("204 16", "T-Mobile NL"),
	("206 01", "Proximus"),
	("206 10", "Orange BE"),
	("206 20", "Base"),
	("208 01", "Orange F"),
	("208 10", "SFR"),
	("208 15", "Free"),
	("208 20", "Bouygues Telecom"),
	("214 01", "Vodafone ES"),
	("214 03", "Orange ES"),
	("214 07", "Movistar"),
	("216 01", "Yettel HU"),
	("216 30", "Telekom HU"),
	("216 70", "Vodafone HU"),
	("222 01", "TIM"),
	("222 10", "Vodafone IT"),
	("222 88", "Wind Tre"),
	("226 01", "Vodafone RO"),
	("226 10", "Orange RO"),
	("228 01", "Swisscom"),
	("228 02", "Sunrise"),
	("228 03", "Salt"),
	("230 01", "T-Mobile CZ"),
	("230 02", "O2 CZ"),
	("230 03", "Vodafone CZ"),
	("230 04", "Nordic Telecom"),
	("231 01", "Orange SK"),
	("231 02", "Telekom SK"),
	("231 03", "4ka"),
	("231 06", "O2 SK"),
	("232 01", "A1 AT"),
	("232 03", "Magenta AT"),
	("232 05", "Drei AT"),
	("234 10", "O2 UK"),
	("234 15", "Vodafone UK"),
	("234 20", "Three UK"),
	("234 30", "EE"),
	("238 01", "TDC"),
	("238 02", "Telenor DK"),
	("240 01", "Telia SE"),
	("240 07", "Tele2 SE"),
	("242 01", "Telenor NO"),
	("242 02", "Telia NO"),
	("244 05", "Elisa"),
	("244 91", "Telia FI"),
	("250 01", "MTS"),
	("250 02", "MegaFon"),
	("250 99", "Beeline"),
	("255 01", "Vodafone UA"),
	("255 03", "Kyivstar"),
	("255 06", "lifecell"),
	("260 01", "Plus"),
	("260 02", "T-Mobile PL"),
	("260 03", "Orange PL"),
	("260 06", "Play"),
	("262 01", "Telekom DE"),
	("262 02", "Vodafone DE"),
	("262 03", "O2 DE"),
	("268 01", "Vodafone PT"),
	("268 03", "NOS"),
	("268 06", "MEO"),
	("272 01", "Vodafone IE"),
	("272 02", "Three IE"),
	("284 01", "A1 BG"),
	("284 03", "Vivacom"),
	("284 05", "Yettel BG"),
	("293 40", "A1 SI"),
	("293 41", "Telekom Slovenije"),
	("302 220", "Telus"),
	("302 610", "Bell"),
	("302 720", "Rogers"),
	("310 260", "T-Mobile US"),
	("310 410", "AT&T"),
	("311 480", "Verizon"),
	("404 10", "Airtel"),
	("405 857", "Jio"),
	("440 10", "NTT docomo"),
	("450 05", "SK Telecom"),
	("505 01", "Telstra"),
	("505 02", "Optus"),
	("505 03", "Vodafone AU"),
];

/// Looks up the operator name for a network code.
pub fn network_name(code: &str) -> Option<&'static str> {
	let wanted = normalize(code)?;
	NETWORKS
		.iter()
		.find(|(known, _)| normalize(known).as_deref() == Some(wanted.as_str()))
		.map(|(_, name)| *name)
}

/// Rewrites `"23001"` / `"230-01"` / `"230 01"` into `"230 01"`.
fn normalize(code: &str) -> Option<String> {
	let digits: String = code.chars().filter(char::is_ascii_digit).collect();
	if digits.len() < 5 || digits.len() > 6 {
		return None;
	}
	let (mcc, mnc) = digits.split_at(3);
	Some(format!("{mcc} {mnc}"))
}
