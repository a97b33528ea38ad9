//! `!secret <name>` resolution against YAML secrets files.
//!
//! Secrets files are read lazily, the first time a directive is seen. When
//! several files define the same name the last one wins. A name that is
//! missing (or defined without a value) resolves to the empty string and is
//! warned about once per resolver.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde_json::Value;
use serde_yaml::Value as YamlValue;
use tracing::{debug, info, warn};

/// Searched in order before any explicitly configured file.
pub const DEFAULT_SECRET_FILES: [&str; 4] = [
	"/config/secrets.yaml",
	"/config/secrets.yml",
	"/data/secrets.yaml",
	"/data/secrets.yml",
];

const DIRECTIVE: &str = "!secret";

pub struct SecretResolver {
	files: Vec<PathBuf>,
	secrets: OnceLock<HashMap<String, YamlValue>>,
	warned: Mutex<HashSet<String>>,
}

impl SecretResolver {
	/// Resolver over exactly `files`, in override order.
	pub fn new(files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
		Self {
			files: files.into_iter().map(Into::into).collect(),
			secrets: OnceLock::new(),
			warned: Mutex::new(HashSet::new()),
		}
	}

	/// The default locations followed by `extra`.
	pub fn with_default_files(extra: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
		let mut files: Vec<PathBuf> = DEFAULT_SECRET_FILES.iter().map(PathBuf::from).collect();
		files.extend(extra.into_iter().map(Into::into));
		Self::new(files)
	}

	pub fn files(&self) -> &[PathBuf] {
		&self.files
	}

	/// Returns the resolved value when `raw` is a `!secret` directive.
	pub fn resolve_directive(&self, raw: &str) -> Option<String> {
		let mut parts = raw.trim().splitn(2, char::is_whitespace);
		let head = parts.next()?;
		if !head.eq_ignore_ascii_case(DIRECTIVE) {
			return None;
		}
		let name = parts.next().map(str::trim).unwrap_or_default();
		if name.is_empty() {
			warn!(target = "smsgw.config", value = raw, "secret directive without a name");
			return Some(String::new());
		}
		Some(self.resolve(name))
	}

	/// Value of secret `name`, or "" when it is missing or empty.
	pub fn resolve(&self, name: &str) -> String {
		match self.secrets().get(name) {
			None => {
				self.warn_once(name, "secret not found in any secrets file");
				String::new()
			}
			Some(YamlValue::Null) => {
				self.warn_once(name, "secret is defined but empty");
				String::new()
			}
			Some(YamlValue::String(value)) => value.clone(),
			Some(YamlValue::Bool(value)) => value.to_string(),
			Some(YamlValue::Number(value)) => value.to_string(),
			Some(other) => {
				self.warn_once(name, "secret is not a scalar; using its YAML text");
				serde_yaml::to_string(other)
					.map(|text| text.trim_end().to_string())
					.unwrap_or_default()
			}
		}
	}

	/// Replaces every directive string inside `value`, recursively.
	pub fn resolve_json(&self, value: &mut Value) {
		match value {
			Value::String(raw) => {
				if let Some(resolved) = self.resolve_directive(raw) {
					*raw = resolved;
				}
			}
			Value::Array(items) => items.iter_mut().for_each(|item| self.resolve_json(item)),
			Value::Object(map) => map.values_mut().for_each(|item| self.resolve_json(item)),
			_ => {}
		}
	}

	fn secrets(&self) -> &HashMap<String, YamlValue> {
		self.secrets.get_or_init(|| {
			let mut merged = HashMap::new();
			for path in &self.files {
				merged.extend(load_file(path));
			}
			debug!(target = "smsgw.config", count = merged.len(), "secrets loaded");
			merged
		})
	}

	fn warn_once(&self, name: &str, message: &str) {
		if self.warned.lock().insert(name.to_string()) {
			warn!(target = "smsgw.config", secret = name, "{message}");
		}
	}
}

impl Default for SecretResolver {
	fn default() -> Self {
		Self::with_default_files(Vec::<PathBuf>::new())
	}
}

impl std::fmt::Debug for SecretResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SecretResolver")
			.field("files", &self.files)
			.field("loaded", &self.secrets.get().is_some())
			.finish()
	}
}

fn load_file(path: &Path) -> Vec<(String, YamlValue)> {
	let contents = match std::fs::read_to_string(path) {
		Ok(contents) => contents,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
		Err(err) => {
			warn!(target = "smsgw.config", path = %path.display(), error = %err, "cannot read secrets file");
			return Vec::new();
		}
	};

	let mapping = match serde_yaml::from_str::<YamlValue>(&contents) {
		Ok(YamlValue::Mapping(mapping)) => mapping,
		Ok(YamlValue::Null) => return Vec::new(),
		Ok(_) => {
			warn!(target = "smsgw.config", path = %path.display(), "secrets file is not a mapping; skipped");
			return Vec::new();
		}
		Err(err) => {
			warn!(target = "smsgw.config", path = %path.display(), error = %err, "invalid secrets file; skipped");
			return Vec::new();
		}
	};

	info!(target = "smsgw.config", path = %path.display(), "using secrets file");
	mapping
		.into_iter()
		.filter_map(|(key, value)| match key {
			YamlValue::String(key) => Some((key, value)),
			_ => None,
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn resolver_with(yaml: &str) -> (SecretResolver, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("secrets.yaml");
		std::fs::write(&path, yaml).unwrap();
		(SecretResolver::new([path]), dir)
	}

	#[test]
	fn plain_strings_are_not_directives() {
		let (resolver, _dir) = resolver_with("a: b\n");
		assert_eq!(resolver.resolve_directive("password"), None);
		assert_eq!(resolver.resolve_directive("!secretive"), None);
	}

	#[test]
	fn directive_is_case_insensitive_and_trimmed() {
		let (resolver, _dir) = resolver_with("modem_pin: '1234'\n");
		assert_eq!(resolver.resolve_directive("  !SECRET   modem_pin "), Some("1234".into()));
	}

	#[test]
	fn scalars_become_strings() {
		let (resolver, _dir) = resolver_with("port: 5000\nratio: 1.5\nflag: true\nempty:\n");
		assert_eq!(resolver.resolve("port"), "5000");
		assert_eq!(resolver.resolve("ratio"), "1.5");
		assert_eq!(resolver.resolve("flag"), "true");
		assert_eq!(resolver.resolve("empty"), "");
	}

	#[test]
	fn directive_without_name_is_empty() {
		let (resolver, _dir) = resolver_with("a: b\n");
		assert_eq!(resolver.resolve_directive("!secret"), Some(String::new()));
	}

	#[test]
	fn non_mapping_file_is_skipped() {
		let (resolver, _dir) = resolver_with("- one\n- two\n");
		assert_eq!(resolver.resolve("one"), "");
	}

	#[test]
	fn resolves_nested_json() {
		let (resolver, _dir) = resolver_with("user: alice\n");
		let mut value = serde_json::json!({
			"username": "!secret user",
			"nested": { "list": ["!secret user", 3] },
			"plain": "x",
		});
		resolver.resolve_json(&mut value);
		assert_eq!(value["username"], "alice");
		assert_eq!(value["nested"]["list"][0], "alice");
		assert_eq!(value["nested"]["list"][1], 3);
		assert_eq!(value["plain"], "x");
	}
}
