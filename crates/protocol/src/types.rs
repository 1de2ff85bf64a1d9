//! Backend-neutral value types shared by every debugger backend.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse type tag attached to a captured variable.
///
/// The inspector reports these directly; line-oriented debuggers only allow
/// them to be guessed from the printed text, hence [`ValueType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
	Undefined,
	Null,
	Boolean,
	Number,
	Bigint,
	String,
	Symbol,
	Function,
	Object,
	Unknown,
}

impl ValueType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ValueType::Undefined => "undefined",
			ValueType::Null => "null",
			ValueType::Boolean => "boolean",
			ValueType::Number => "number",
			ValueType::Bigint => "bigint",
			ValueType::String => "string",
			ValueType::Symbol => "symbol",
			ValueType::Function => "function",
			ValueType::Object => "object",
			ValueType::Unknown => "unknown",
		}
	}
}

impl fmt::Display for ValueType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single captured variable: its display text and type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
	/// Value rendered for display (strings keep their quotes).
	pub value: String,
	/// Type tag for the value.
	#[serde(rename = "type")]
	pub value_type: ValueType,
}

impl Variable {
	pub fn new(value: impl Into<String>, value_type: ValueType) -> Self {
		Self {
			value: value.into(),
			value_type,
		}
	}
}

/// Variables materialized at one pause, keyed by name.
pub type Variables = BTreeMap<String, Variable>;
