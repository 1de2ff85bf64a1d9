//! Display formatting for mirrored values.

use serde_json::Value;

use crate::runtime::RemoteObject;
use crate::types::{ValueType, Variable};

/// Renders a mirrored value for a variable view.
///
/// `undefined` and `null` render as their literal words, strings are quoted,
/// numbers and booleans render raw, and everything without an inline value
/// falls back to the inspector's description (or a bracketed placeholder).
pub fn format_remote_object(object: &RemoteObject) -> String {
	match value_type_of(object) {
		ValueType::Undefined => "undefined".to_string(),
		ValueType::Null => "null".to_string(),
		ValueType::String => match &object.value {
			Some(Value::String(s)) => format!("\"{s}\""),
			Some(other) => format!("\"{other}\""),
			None => describe(object, "\"\""),
		},
		ValueType::Number | ValueType::Boolean | ValueType::Bigint => {
			if let Some(raw) = &object.unserializable_value {
				return raw.clone();
			}
			match &object.value {
				Some(value) => value.to_string(),
				None => describe(object, "[primitive]"),
			}
		}
		ValueType::Function => describe(object, "[function]"),
		ValueType::Symbol => describe(object, "[symbol]"),
		ValueType::Object => describe(object, "[object]"),
		ValueType::Unknown => describe(object, "[unknown]"),
	}
}

/// Maps the inspector's `type`/`subtype` pair onto a [`ValueType`].
pub fn value_type_of(object: &RemoteObject) -> ValueType {
	match object.object_type.as_str() {
		"undefined" => ValueType::Undefined,
		"string" => ValueType::String,
		"number" => ValueType::Number,
		"boolean" => ValueType::Boolean,
		"bigint" => ValueType::Bigint,
		"symbol" => ValueType::Symbol,
		"function" => ValueType::Function,
		"object" if object.subtype.as_deref() == Some("null") => ValueType::Null,
		"object" if matches!(object.value, Some(Value::Null)) && object.object_id.is_none() => {
			ValueType::Null
		}
		"object" => ValueType::Object,
		_ => ValueType::Unknown,
	}
}

impl From<&RemoteObject> for Variable {
	fn from(object: &RemoteObject) -> Self {
		Variable::new(format_remote_object(object), value_type_of(object))
	}
}

fn describe(object: &RemoteObject, placeholder: &str) -> String {
	object
		.description
		.clone()
		.unwrap_or_else(|| placeholder.to_string())
}
