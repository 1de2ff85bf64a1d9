//! `Runtime` domain types: mirrored values and property enumeration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mirror object referencing an original JavaScript value.
///
/// Primitive values travel inline in `value`; values JSON cannot carry
/// (`NaN`, `-0`, bigints) arrive as `unserializableValue`; everything else is
/// a handle (`objectId`) plus a human-readable `description`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	/// Object type (`object`, `function`, `undefined`, `string`, `number`,
	/// `boolean`, `symbol`, `bigint`).
	#[serde(rename = "type")]
	pub object_type: String,
	/// Object subtype hint, e.g. `null`, `array`, `regexp`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subtype: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub class_name: Option<String>,
	/// Remote object value for primitives.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unserializable_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Handle for non-primitive values, usable with `Runtime.getProperties`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object_id: Option<String>,
}

impl RemoteObject {
	/// Builds a primitive mirror, mostly useful for simulated backends.
	pub fn primitive(object_type: &str, value: Value) -> Self {
		Self {
			object_type: object_type.to_string(),
			value: Some(value),
			..Default::default()
		}
	}
}

/// Object property descriptor as returned by `Runtime.getProperties`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
	pub name: String,
	/// Property value; absent for accessor properties.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<RemoteObject>,
	#[serde(default)]
	pub writable: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub get: Option<RemoteObject>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub set: Option<RemoteObject>,
	#[serde(default)]
	pub configurable: bool,
	#[serde(default)]
	pub enumerable: bool,
	#[serde(default)]
	pub is_own: bool,
}

impl PropertyDescriptor {
	/// Engine-internal bookkeeping that should never reach a variable view.
	pub fn is_internal(&self) -> bool {
		self.name.starts_with("__")
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesParams {
	pub object_id: String,
	pub own_properties: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesResult {
	#[serde(default)]
	pub result: Vec<PropertyDescriptor>,
	/// Engine internal slots (`[[Scopes]]` and friends); never folded into a snapshot.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub internal_properties: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception_details: Option<ExceptionDetails>,
}

/// Payload of `Runtime.consoleAPICalled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalledEvent {
	/// Console method: `log`, `warn`, `error`, ...
	#[serde(rename = "type")]
	pub call_type: String,
	#[serde(default)]
	pub args: Vec<RemoteObject>,
	#[serde(default)]
	pub execution_context_id: i64,
	#[serde(default)]
	pub timestamp: f64,
}

/// Payload of `Runtime.exceptionThrown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrownEvent {
	#[serde(default)]
	pub timestamp: f64,
	pub exception_details: ExceptionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub line_number: u32,
	#[serde(default)]
	pub column_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
	/// Best single-line description: the thrown value's description when
	/// present, otherwise the inspector's summary text.
	pub fn message(&self) -> String {
		self.exception
			.as_ref()
			.and_then(|e| e.description.clone())
			.unwrap_or_else(|| self.text.clone())
	}
}
