//! JSON-line records written to stdout.

use std::io::Write;

use serde::Serialize;
use serde_json::{Value, json};
use stepwise::{BackendKind, ExecutionState, LineClass, SessionEvent, SessionId, Variables};

#[derive(Debug, Serialize)]
#[serde(tag = "record", rename_all = "camelCase")]
pub enum Record<'a> {
	#[serde(rename_all = "camelCase")]
	Session {
		id: SessionId,
		backend: BackendKind,
		entry: &'a str,
		state: ExecutionState,
		#[serde(skip_serializing_if = "Option::is_none")]
		pid: Option<u32>,
	},
	Command {
		command: &'a str,
		ok: bool,
		#[serde(skip_serializing_if = "Option::is_none")]
		line: Option<u32>,
	},
	Event {
		session: SessionId,
		#[serde(flatten)]
		event: &'a SessionEvent,
	},
	Variables {
		session: SessionId,
		variables: &'a Variables,
	},
	Classified {
		line: &'a str,
		class: Value,
	},
}

pub fn print_record(record: &Record<'_>) -> anyhow::Result<()> {
	let line = serde_json::to_string(record)?;
	let mut stdout = std::io::stdout().lock();
	writeln!(stdout, "{line}")?;
	stdout.flush()?;
	Ok(())
}

/// JSON form of a classified debugger line.
pub fn line_class_json(class: &LineClass) -> Value {
	match class {
		LineClass::Landing { reason, line } => json!({
			"type": "landing",
			"reason": format!("{reason:?}").to_lowercase(),
			"line": line,
		}),
		LineClass::Assignment { name, value } => json!({"type": "assignment", "name": name, "value": value}),
		LineClass::Exit => json!({"type": "exit"}),
		LineClass::Error(message) => json!({"type": "error", "message": message}),
		LineClass::InitMarker => json!({"type": "initMarker"}),
		LineClass::Blank => json!({"type": "blank"}),
		LineClass::Output(text) => json!({"type": "output", "text": text}),
	}
}
