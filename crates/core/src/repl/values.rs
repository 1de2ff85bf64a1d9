//! Type tags for values printed by a line-oriented debugger.
//!
//! The debugger prints values as text only, so the tag is guessed from the
//! lexical shape of the printed value.

use stepwise_protocol::{ValueType, Variable};

pub fn infer_value_type(raw: &str) -> ValueType {
	let value = raw.trim();
	match value {
		"null" => ValueType::Null,
		"true" | "false" => ValueType::Boolean,
		_ if is_number(value) => ValueType::Number,
		_ if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') => ValueType::String,
		_ if value.contains('@') => ValueType::Object,
		_ => ValueType::Unknown,
	}
}

/// Captured variable with the printed text kept verbatim.
pub fn variable_from_text(raw: &str) -> Variable {
	let value = raw.trim();
	Variable::new(value, infer_value_type(value))
}

fn is_number(value: &str) -> bool {
	// `f64` parsing also accepts words like "inf" and "NaN" that a
	// debugger would never print for a numeric local.
	value.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
		&& value.parse::<f64>().is_ok()
}
