//! `Debugger` domain types: pause events, call frames, scopes, breakpoints.

use serde::{Deserialize, Serialize};

use crate::runtime::RemoteObject;

/// Location in a parsed script. Line and column numbers are 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
	pub script_id: String,
	pub line_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column_number: Option<u32>,
}

impl Location {
	/// Line number as editors count it.
	pub fn one_based_line(&self) -> u32 {
		self.line_number + 1
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeType {
	Global,
	Local,
	With,
	Closure,
	Catch,
	Block,
	Script,
	Eval,
	Module,
	#[serde(other)]
	Other,
}

impl ScopeType {
	/// Scopes whose bindings make up a variable snapshot.
	pub fn is_snapshot_scope(&self) -> bool {
		matches!(self, ScopeType::Local | ScopeType::Global)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
	#[serde(rename = "type")]
	pub scope_type: ScopeType,
	/// Object whose properties are the scope's bindings.
	pub object: RemoteObject,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
	pub call_frame_id: String,
	#[serde(default)]
	pub function_name: String,
	pub location: Location,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub scope_chain: Vec<Scope>,
}

/// Payload of `Debugger.paused`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
	#[serde(default)]
	pub call_frames: Vec<CallFrame>,
	pub reason: String,
	#[serde(default)]
	pub hit_breakpoints: Vec<String>,
}

impl PausedEvent {
	pub fn top_frame(&self) -> Option<&CallFrame> {
		self.call_frames.first()
	}

	pub fn pause_reason(&self) -> PauseReason {
		PauseReason::from_reason(&self.reason)
	}
}

/// What a pause means to a session listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
	/// Execution reached a user breakpoint.
	Breakpoint,
	/// Execution stopped after a step (the inspector reports `other` or `ambiguous`).
	Step,
	/// Any other pause (exceptions, `debugger` statements, OOM, ...): no high-level event.
	Internal,
}

impl PauseReason {
	pub fn from_reason(reason: &str) -> Self {
		match reason {
			"breakpoint" => PauseReason::Breakpoint,
			"other" | "ambiguous" => PauseReason::Step,
			_ => PauseReason::Internal,
		}
	}
}

/// Payload of `Debugger.scriptParsed` (only the fields a session needs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedEvent {
	pub script_id: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub start_line: u32,
	#[serde(default)]
	pub end_line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlParams {
	/// 0-based line.
	pub line_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url_regex: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResult {
	pub breakpoint_id: String,
	#[serde(default)]
	pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSourceResult {
	pub script_source: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pause_reason_mapping() {
		assert_eq!(PauseReason::from_reason("breakpoint"), PauseReason::Breakpoint);
		assert_eq!(PauseReason::from_reason("other"), PauseReason::Step);
		assert_eq!(PauseReason::from_reason("ambiguous"), PauseReason::Step);
		assert_eq!(PauseReason::from_reason("exception"), PauseReason::Internal);
		assert_eq!(PauseReason::from_reason("Break on start"), PauseReason::Internal);
	}

	#[test]
	fn paused_event_parses_scope_chain() {
		let json = serde_json::json!({
			"reason": "breakpoint",
			"hitBreakpoints": ["1:1:0:.*loop.js$"],
			"callFrames": [{
				"callFrameId": "cf-0",
				"functionName": "",
				"url": "file:///tmp/loop.js",
				"location": {"scriptId": "42", "lineNumber": 1, "columnNumber": 2},
				"scopeChain": [
					{"type": "local", "object": {"type": "object", "objectId": "scope-local"}},
					{"type": "wasm-expression-stack", "object": {"type": "object"}},
					{"type": "global", "object": {"type": "object", "objectId": "scope-global"}}
				]
			}]
		});

		let event: PausedEvent = serde_json::from_value(json).unwrap();
		let frame = event.top_frame().unwrap();
		assert_eq!(frame.location.one_based_line(), 2);
		assert_eq!(event.pause_reason(), PauseReason::Breakpoint);

		let kinds: Vec<ScopeType> = frame.scope_chain.iter().map(|s| s.scope_type).collect();
		assert_eq!(kinds, vec![ScopeType::Local, ScopeType::Other, ScopeType::Global]);
		assert_eq!(
			frame.scope_chain.iter().filter(|s| s.scope_type.is_snapshot_scope()).count(),
			2
		);
	}

	#[test]
	fn set_breakpoint_params_skip_absent_fields() {
		let params = SetBreakpointByUrlParams {
			line_number: 4,
			url: None,
			url_regex: Some(".*main\\.js$".to_string()),
			column_number: Some(0),
		};
		let json = serde_json::to_value(&params).unwrap();
		assert_eq!(
			json,
			serde_json::json!({"lineNumber": 4, "urlRegex": ".*main\\.js$", "columnNumber": 0})
		);
	}
}
