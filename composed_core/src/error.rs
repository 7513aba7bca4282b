use miette::Diagnostic;
use thiserror::Error;

/// Failures of the loading layers around the engine. Composing a value never
/// produces one of these: unresolvable references degrade to text instead.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ComposedError {
	#[error(transparent)]
	#[diagnostic(code(composed::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(composed::config_parse),
		help("check that composed.toml is valid TOML with [variables] and/or [[sources]] entries")
	)]
	ConfigParse(String),

	#[error("failed to load variable file `{path}`: {reason}")]
	#[diagnostic(code(composed::variable_file))]
	VariableFile { path: String, reason: String },

	#[error("unsupported variable file format: `{0}`")]
	#[diagnostic(
		code(composed::unsupported_format),
		help("supported formats: text, json, toml, yaml, yml")
	)]
	UnsupportedFormat(String),

	#[error("variable `{name}` holds an unsupported {kind} value")]
	#[diagnostic(
		code(composed::unsupported_value),
		help("variables must be strings, numbers or booleans; nest tables to group them")
	)]
	UnsupportedValue { name: String, kind: String },

	#[error("invalid variable assignment: `{0}`")]
	#[diagnostic(
		code(composed::invalid_assignment),
		help("assignments take the form `name=value`")
	)]
	InvalidAssignment(String),
}

pub type ComposedResult<T> = Result<T, ComposedError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
