use std::collections::BTreeMap;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use derive_more::Deref;
use serde::Deserialize;

use crate::ComposedError;
use crate::ComposedResult;
use crate::Segment;
use crate::Value;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["composed.toml", ".composed.toml", ".config/composed.toml"];

/// Separator between the segments of a flattened variable name.
pub const NAME_SEPARATOR: char = '.';

/// How inline `[variables]` are named in error messages.
const INLINE_SOURCE: &str = "[variables]";

/// Configuration loaded from a `composed.toml` file.
///
/// ```toml
/// [variables]
/// name = "Rocket"
/// fuel = 3.0
/// armed = true
///
/// [[sources]]
/// path = "vars.json"
///
/// [[sources]]
/// path = "stage"
/// format = "toml"
/// namespace = "stage"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ComposedConfig {
	/// Inline variables. Nested tables are flattened into dotted names.
	#[serde(default)]
	pub variables: BTreeMap<String, toml::Value>,
	/// Variable files, applied in order. Later files override earlier ones
	/// and inline `variables` override every file.
	#[serde(default)]
	pub sources: Vec<VariableSource>,
}

/// A file of variables listed under `[[sources]]`.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct VariableSource {
	/// Path relative to the project root.
	pub path: PathBuf,
	/// Explicit format. Defaults to the file extension.
	#[serde(default)]
	pub format: Option<String>,
	/// Prefix for every variable read from the file, e.g. `pkg` turns
	/// `version` into `pkg.version`.
	#[serde(default)]
	pub namespace: Option<String>,
}

impl VariableSource {
	/// The lowercase format name used to parse this source.
	pub fn resolved_format(&self) -> String {
		self.format
			.as_deref()
			.map(str::trim)
			.filter(|format| !format.is_empty())
			.or_else(|| self.path.extension().and_then(|ext| ext.to_str()))
			.unwrap_or("text")
			.to_ascii_lowercase()
	}
}

/// One variable assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
	pub name: String,
	pub value: Value,
}

/// An ordered list of assignments where each name appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct VariableSet(Vec<Assignment>);

impl VariableSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Assign `value` to `name`, replacing any earlier assignment to the same
	/// name whatever its type.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		let name = name.into();
		let value = value.into();

		if let Some(index) = self.0.iter().position(|assignment| assignment.name == name) {
			let previous = self.0.remove(index);
			if previous.value.segment() != value.segment() {
				tracing::warn!(
					name = %name,
					from = %previous.value.segment(),
					to = %value.segment(),
					"variable redefined with a different type"
				);
			}
		}

		self.0.push(Assignment { name, value });
	}

	/// Apply every assignment of `other` on top of this set.
	pub fn merge(&mut self, other: VariableSet) {
		for assignment in other.0 {
			self.insert(assignment.name, assignment.value);
		}
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.0
			.iter()
			.find(|assignment| assignment.name == name)
			.map(|assignment| &assignment.value)
	}

	/// Whether `name` is assigned a value of `segment`'s type.
	pub fn contains(&self, segment: Segment, name: &str) -> bool {
		self.get(name).is_some_and(|value| value.segment() == segment)
	}
}

impl FromIterator<Assignment> for VariableSet {
	fn from_iter<T: IntoIterator<Item = Assignment>>(iter: T) -> Self {
		let mut set = Self::new();
		for assignment in iter {
			set.insert(assignment.name, assignment.value);
		}
		set
	}
}

impl ComposedConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> ComposedResult<Option<ComposedConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		Self::parse(&content).map(Some)
	}

	pub fn parse(content: &str) -> ComposedResult<ComposedConfig> {
		toml::from_str(content).map_err(|e| ComposedError::ConfigParse(e.to_string()))
	}

	/// Files whose modification should trigger a reload: the sources, resolved
	/// against `root`.
	pub fn source_paths(&self, root: &Path) -> Vec<PathBuf> {
		self.sources
			.iter()
			.map(|source| root.join(&source.path))
			.collect()
	}

	/// Sources that live outside `root`, which a recursive watch of `root`
	/// does not cover. Both sides are normalized lexically, so
	/// `../shared/vars.json` counts as outside.
	pub fn external_source_paths(&self, root: &Path) -> Vec<PathBuf> {
		let root = normalize_path(root);
		self.source_paths(&root)
			.iter()
			.map(|path| normalize_path(path))
			.filter(|path| !path.starts_with(&root))
			.collect()
	}

	/// Read every source and the inline variables into one set.
	pub fn load_variables(&self, root: &Path) -> ComposedResult<VariableSet> {
		let mut variables = VariableSet::new();

		for source in &self.sources {
			variables.merge(load_source(root, source)?);
		}

		let mut inline = VariableSet::new();
		for (name, value) in &self.variables {
			let value = toml_to_json(value.clone(), INLINE_SOURCE)?;
			flatten_value(name, value, INLINE_SOURCE, &mut inline)?;
		}
		variables.merge(inline);

		Ok(variables)
	}
}

/// Parse `name=value` as written on the command line. `true` and `false`
/// become booleans, finite numbers become numbers and anything else is text.
pub fn parse_assignment(input: &str) -> ComposedResult<Assignment> {
	let Some((name, raw)) = input.split_once('=') else {
		return Err(ComposedError::InvalidAssignment(input.to_string()));
	};

	let name = name.trim();
	if name.is_empty() {
		return Err(ComposedError::InvalidAssignment(input.to_string()));
	}

	let value = match raw {
		"true" => Value::Bool(true),
		"false" => Value::Bool(false),
		_ => {
			raw.parse::<f64>()
				.ok()
				.filter(|number| number.is_finite())
				.map_or_else(|| Value::Text(raw.to_string()), Value::Number)
		}
	};

	Ok(Assignment {
		name: name.to_string(),
		value,
	})
}

fn load_source(root: &Path, source: &VariableSource) -> ComposedResult<VariableSet> {
	let path_display = source.path.display().to_string();
	let abs_path = root.join(&source.path);
	let format = source.resolved_format();

	tracing::debug!(path = %path_display, %format, "loading variable source");

	let content = std::fs::read_to_string(&abs_path).map_err(|e| {
		ComposedError::VariableFile {
			path: path_display.clone(),
			reason: e.to_string(),
		}
	})?;
	let value = parse_variable_file(&content, &format, &path_display)?;

	// A file that is not a table needs a name to live under.
	let prefix = match (&source.namespace, &value) {
		(Some(namespace), _) => namespace.clone(),
		(None, serde_json::Value::Object(_)) => String::new(),
		(None, _) => {
			source
				.path
				.file_stem()
				.and_then(|stem| stem.to_str())
				.unwrap_or_default()
				.to_string()
		}
	};

	let mut variables = VariableSet::new();
	flatten_value(&prefix, value, &path_display, &mut variables)?;
	Ok(variables)
}

/// Parse a variable file's content into a `serde_json::Value` based on its
/// format.
fn parse_variable_file(
	content: &str,
	format: &str,
	path_display: &str,
) -> ComposedResult<serde_json::Value> {
	match format {
		// Trailing line breaks are an artifact of the file, not part of the value.
		"text" | "string" | "raw" | "txt" => {
			Ok(serde_json::Value::String(
				content.trim_end_matches(['\n', '\r']).to_string(),
			))
		}
		"json" => {
			serde_json::from_str(content).map_err(|e| {
				ComposedError::VariableFile {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})
		}
		"toml" => {
			let toml_value: toml::Value = toml::from_str(content).map_err(|e| {
				ComposedError::VariableFile {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})?;
			toml_to_json(toml_value, path_display)
		}
		"yaml" | "yml" => {
			serde_yaml_ng::from_str(content).map_err(|e| {
				ComposedError::VariableFile {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})
		}
		other => Err(ComposedError::UnsupportedFormat(other.to_string())),
	}
}

/// Convert a `toml::Value` to a `serde_json::Value`.
fn toml_to_json(value: toml::Value, path_display: &str) -> ComposedResult<serde_json::Value> {
	let json = match value {
		toml::Value::String(s) => serde_json::Value::String(s),
		toml::Value::Integer(i) => serde_json::Value::Number(i.into()),
		toml::Value::Float(f) => {
			serde_json::Value::Number(serde_json::Number::from_f64(f).ok_or_else(|| {
				ComposedError::VariableFile {
					path: path_display.to_string(),
					reason: format!("`{f}` is not a finite number"),
				}
			})?)
		}
		toml::Value::Boolean(b) => serde_json::Value::Bool(b),
		toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
		toml::Value::Array(arr) => {
			let items: ComposedResult<Vec<serde_json::Value>> = arr
				.into_iter()
				.map(|v| toml_to_json(v, path_display))
				.collect();
			serde_json::Value::Array(items?)
		}
		toml::Value::Table(table) => {
			let mut map = serde_json::Map::new();
			for (k, v) in table {
				map.insert(k, toml_to_json(v, path_display)?);
			}
			serde_json::Value::Object(map)
		}
	};

	Ok(json)
}

/// Store every scalar in `value` under its dotted path below `prefix`.
fn flatten_value(
	prefix: &str,
	value: serde_json::Value,
	path_display: &str,
	variables: &mut VariableSet,
) -> ComposedResult<()> {
	match value {
		serde_json::Value::Object(map) => {
			for (key, child) in map {
				let name = if prefix.is_empty() {
					key
				} else {
					format!("{prefix}{NAME_SEPARATOR}{key}")
				};
				flatten_value(&name, child, path_display, variables)?;
			}
		}
		serde_json::Value::Array(_) => {
			return Err(ComposedError::UnsupportedValue {
				name: qualified_name(prefix, path_display),
				kind: "array".to_string(),
			});
		}
		scalar if prefix.is_empty() => {
			return Err(ComposedError::UnsupportedValue {
				name: path_display.to_string(),
				kind: format!("unnamed {}", json_kind(&scalar)),
			});
		}
		serde_json::Value::Null => variables.insert(prefix, Value::Text(String::new())),
		serde_json::Value::Bool(flag) => variables.insert(prefix, Value::Bool(flag)),
		serde_json::Value::String(text) => variables.insert(prefix, Value::Text(text)),
		serde_json::Value::Number(number) => {
			let Some(number) = number.as_f64() else {
				return Err(ComposedError::UnsupportedValue {
					name: qualified_name(prefix, path_display),
					kind: "number".to_string(),
				});
			};
			variables.insert(prefix, Value::Number(number));
		}
	}

	Ok(())
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
	let mut normalized = PathBuf::new();

	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				match normalized.components().next_back() {
					Some(Component::Normal(_)) => {
						normalized.pop();
					}
					// `..` at the filesystem root stays at the root.
					Some(Component::RootDir | Component::Prefix(_)) => {}
					_ => normalized.push(".."),
				}
			}
			other => normalized.push(other),
		}
	}

	normalized
}

fn qualified_name(prefix: &str, path_display: &str) -> String {
	format!("{prefix} ({path_display})")
}

fn json_kind(value: &serde_json::Value) -> &'static str {
	match value {
		serde_json::Value::Null => "null",
		serde_json::Value::Bool(_) => "bool",
		serde_json::Value::Number(_) => "number",
		serde_json::Value::String(_) => "string",
		serde_json::Value::Array(_) => "array",
		serde_json::Value::Object(_) => "table",
	}
}
