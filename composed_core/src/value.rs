use std::fmt::Display;

/// Magnitudes at or above this are printed in `E` notation.
const SCIENTIFIC_FROM: f64 = 1e15;
/// Non-zero magnitudes below this are printed in `E` notation.
const SCIENTIFIC_BELOW: f64 = 1e-4;

/// A typed partition of the variable registry. The same name can exist in
/// every segment at once; each segment is its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
	/// Text variables.
	String,
	/// Floating point variables.
	Number,
	/// Boolean variables.
	Bool,
}

impl Segment {
	/// Every segment, in resolution priority order.
	pub const ALL: [Segment; 3] = [Segment::String, Segment::Number, Segment::Bool];

	pub fn as_str(self) -> &'static str {
		match self {
			Segment::String => "string",
			Segment::Number => "number",
			Segment::Bool => "bool",
		}
	}
}

impl Display for Segment {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The value stored for a variable.
#[derive(Debug, Clone)]
pub enum Value {
	Text(String),
	Number(f64),
	Bool(bool),
}

impl Eq for Value {}
impl PartialEq for Value {
	/// Numbers compare by bit pattern so that a stored `NaN` equals itself and
	/// `0.0` differs from `-0.0`, matching what [`Value::to_text`] prints.
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Text(value), Value::Text(other_value)) => value == other_value,
			(Value::Number(value), Value::Number(other_value)) => {
				value.to_bits() == other_value.to_bits()
			}
			(Value::Bool(value), Value::Bool(other_value)) => value == other_value,
			_ => false,
		}
	}
}

impl Value {
	/// The segment this value is stored in.
	pub fn segment(&self) -> Segment {
		match self {
			Value::Text(_) => Segment::String,
			Value::Number(_) => Segment::Number,
			Value::Bool(_) => Segment::Bool,
		}
	}

	/// The canonical text substituted into templates.
	pub fn to_text(&self) -> String {
		match self {
			Value::Text(text) => text.clone(),
			Value::Number(number) => format_number(*number),
			Value::Bool(flag) => format_bool(*flag).to_string(),
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Text(text) => f.write_str(text),
			Value::Number(number) => f.write_str(&format_number(*number)),
			Value::Bool(flag) => f.write_str(format_bool(*flag)),
		}
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Text(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::Text(value)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Number(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

/// Format a number in general notation: the shortest text that parses back
/// to the same `f64`, with no trailing zeros. Very large and very small
/// magnitudes switch to `E` notation (`1E+15`, `2.5E-07`).
pub fn format_number(value: f64) -> String {
	if value.is_nan() {
		return "NaN".to_string();
	}

	if value.is_infinite() {
		return if value.is_sign_positive() {
			"Infinity".to_string()
		} else {
			"-Infinity".to_string()
		};
	}

	let magnitude = value.abs();
	if magnitude != 0.0 && !(SCIENTIFIC_BELOW..SCIENTIFIC_FROM).contains(&magnitude) {
		return format_scientific(value);
	}

	value.to_string()
}

fn format_scientific(value: f64) -> String {
	// `{:E}` already produces the shortest round-trip mantissa, e.g. `2.5E-7`.
	let formatted = format!("{value:E}");
	let Some((mantissa, exponent)) = formatted.split_once('E') else {
		return formatted;
	};

	let (sign, digits) = match exponent.strip_prefix('-') {
		Some(digits) => ('-', digits),
		None => ('+', exponent),
	};

	format!("{mantissa}E{sign}{digits:0>2}")
}

/// Booleans always print as `True` / `False`, independent of locale.
pub fn format_bool(value: bool) -> &'static str {
	if value { "True" } else { "False" }
}
