//! Inspector event handling.
//!
//! One task per session drains the connection's event channel in arrival
//! order. Pause handling awaits its `Runtime.getProperties` replies inline;
//! replies are routed by the connection independently of this channel, so
//! a pause is fully materialized before the next event is looked at.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stepwise_protocol::{
	CallFrame, ConsoleApiCalledEvent, ExceptionThrownEvent, GetPropertiesParams, GetPropertiesResult, PausedEvent,
	RemoteObject, ScopeType, ScriptParsedEvent, Variable, Variables, methods,
};
use stepwise_runtime::{Connection, Event, EventReceiver, Result};
use tokio::sync::oneshot;

use crate::events::OutputKind;
use crate::session::{ExecutionState, SessionShared};

pub(crate) struct EventPump {
	pub connection: Arc<Connection>,
	pub shared: Arc<SessionShared>,
	/// File name of the user's script, used to spot its `scriptParsed`.
	pub script_name: String,
	pub script_tx: Option<oneshot::Sender<ScriptParsedEvent>>,
}

impl EventPump {
	pub async fn run(mut self, mut events: EventReceiver) {
		while let Some(event) = events.recv().await {
			self.handle(event).await;
		}
		tracing::debug!(session = %self.shared.id(), "Inspector event stream ended");
		self.shared.finish("Debugger disconnected");
	}

	async fn handle(&mut self, event: Event) {
		match event.method.as_str() {
			methods::EVENT_PAUSED => {
				if let Some(paused) = decode::<PausedEvent>(&event) {
					self.on_paused(paused).await;
				}
			}
			methods::EVENT_RESUMED => {
				self.shared.transition(ExecutionState::Running);
			}
			methods::EVENT_SCRIPT_PARSED => {
				if let Some(script) = decode::<ScriptParsedEvent>(&event) {
					self.on_script_parsed(script);
				}
			}
			methods::EVENT_CONSOLE_API_CALLED => {
				if let Some(call) = decode::<ConsoleApiCalledEvent>(&event) {
					let message = call.args.iter().map(console_text).collect::<Vec<_>>().join(" ");
					self.shared.emit_output(OutputKind::Console, message);
				}
			}
			methods::EVENT_EXCEPTION_THROWN => {
				if let Some(thrown) = decode::<ExceptionThrownEvent>(&event) {
					self.shared.emit_output(OutputKind::Error, thrown.exception_details.message());
				}
			}
			methods::EVENT_CONTEXT_DESTROYED => {
				self.shared.finish("Program finished");
			}
			other => tracing::trace!(method = other, "Ignoring inspector event"),
		}
	}

	fn on_script_parsed(&mut self, script: ScriptParsedEvent) {
		if !is_user_script(&script.url, &self.script_name) {
			return;
		}
		if let Some(tx) = self.script_tx.take() {
			tracing::debug!(script_id = %script.script_id, url = %script.url, "User script parsed");
			let _ = tx.send(script);
		}
	}

	async fn on_paused(&self, paused: PausedEvent) {
		let Some(frame) = paused.top_frame() else {
			tracing::warn!(reason = %paused.reason, "Pause without call frames");
			return;
		};
		let line = frame.location.one_based_line();
		let variables = match self.collect_variables(frame).await {
			Ok(variables) => variables,
			Err(e) => {
				tracing::warn!(line, error = %e, "Pause recorded without variables");
				self.shared
					.emit_output(OutputKind::Error, format!("Failed to read variables at line {line}: {e}"));
				Variables::new()
			}
		};
		self.shared.record_pause(line, paused.pause_reason(), variables);
	}

	/// Fetches local and global scope bindings concurrently and folds them
	/// into one snapshot. A scope that fails is read once more; if it fails
	/// again the whole snapshot fails, never a partial one.
	async fn collect_variables(&self, frame: &CallFrame) -> Result<Variables> {
		let scopes: Vec<(ScopeType, String)> = frame
			.scope_chain
			.iter()
			.filter(|scope| scope.scope_type.is_snapshot_scope())
			.filter_map(|scope| scope.object.object_id.clone().map(|id| (scope.scope_type, id)))
			.collect();

		let fetches = scopes.iter().map(|(_, object_id)| self.get_properties(object_id));
		let results = join_all(fetches).await;

		let mut fetched = Vec::with_capacity(results.len());
		for ((scope_type, object_id), result) in scopes.into_iter().zip(results) {
			let properties = match result {
				Ok(properties) => properties,
				Err(e) => {
					tracing::debug!(%object_id, error = %e, "Retrying scope read");
					self.get_properties(&object_id).await?
				}
			};
			fetched.push((scope_type, properties));
		}
		Ok(fold_scopes(fetched))
	}

	async fn get_properties(&self, object_id: &str) -> Result<GetPropertiesResult> {
		let params = serde_json::to_value(GetPropertiesParams {
			object_id: object_id.to_string(),
			own_properties: true,
		})?;
		let result = self
			.connection
			.send_message(methods::RUNTIME_GET_PROPERTIES, params)
			.await?;
		Ok(serde_json::from_value(result)?)
	}
}

fn decode<T: DeserializeOwned>(event: &Event) -> Option<T> {
	match serde_json::from_value(event.params.clone()) {
		Ok(value) => Some(value),
		Err(e) => {
			tracing::warn!(method = %event.method, error = %e, "Discarding malformed event");
			None
		}
	}
}

/// Builds a snapshot from scope properties. Local bindings shadow globals.
pub(crate) fn fold_scopes(scopes: Vec<(ScopeType, GetPropertiesResult)>) -> Variables {
	let mut variables = Variables::new();
	let (locals, others): (Vec<_>, Vec<_>) = scopes
		.into_iter()
		.partition(|(scope_type, _)| *scope_type == ScopeType::Local);

	for (_, properties) in locals.into_iter().chain(others) {
		for property in properties.result {
			if property.is_internal() {
				continue;
			}
			// Accessor-only properties carry no value.
			let Some(value) = property.value.as_ref() else {
				continue;
			};
			variables
				.entry(property.name)
				.or_insert_with(|| Variable::from(value));
		}
	}
	variables
}

/// Console arguments print like the console does: strings unquoted.
fn console_text(arg: &RemoteObject) -> String {
	match (&arg.object_type[..], &arg.value) {
		("string", Some(Value::String(text))) => text.clone(),
		_ => stepwise_protocol::format_remote_object(arg),
	}
}

/// Matches script URLs (`file:///...`, plain paths or bare names) ending in `name`.
pub(crate) fn is_user_script(url: &str, name: &str) -> bool {
	if name.is_empty() {
		return false;
	}
	url == name || url.ends_with(&format!("/{name}")) || url.ends_with(&format!("\\{name}"))
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use stepwise_protocol::{PropertyDescriptor, ValueType};

	use super::*;

	fn property(name: &str, value: RemoteObject) -> PropertyDescriptor {
		PropertyDescriptor {
			name: name.to_string(),
			value: Some(value),
			..Default::default()
		}
	}

	fn properties(items: Vec<PropertyDescriptor>) -> GetPropertiesResult {
		GetPropertiesResult {
			result: items,
			..Default::default()
		}
	}

	#[test]
	fn local_scope_wins_on_clash() {
		let global = properties(vec![
			property("total", RemoteObject::primitive("number", json!(100))),
			property("setTimeout", RemoteObject {
				object_type: "function".to_string(),
				description: Some("function setTimeout() { [native code] }".to_string()),
				object_id: Some("g1".to_string()),
				..Default::default()
			}),
		]);
		let local = properties(vec![property("total", RemoteObject::primitive("number", json!(3)))]);

		let variables = fold_scopes(vec![(ScopeType::Global, global), (ScopeType::Local, local)]);
		assert_eq!(variables["total"].value, "3");
		assert_eq!(variables["setTimeout"].value_type, ValueType::Function);
	}

	#[test]
	fn internal_and_accessor_properties_are_skipped() {
		let local = properties(vec![
			property("__proto__", RemoteObject::primitive("object", json!(null))),
			PropertyDescriptor {
				name: "getter".to_string(),
				get: Some(RemoteObject::default()),
				..Default::default()
			},
			property("name", RemoteObject::primitive("string", json!("abc"))),
		]);

		let variables = fold_scopes(vec![(ScopeType::Local, local)]);
		assert_eq!(variables.len(), 1);
		assert_eq!(variables["name"], Variable::new("\"abc\"", ValueType::String));
	}

	#[test]
	fn user_script_matching() {
		assert!(is_user_script("file:///tmp/work/loop.js", "loop.js"));
		assert!(is_user_script("/tmp/work/loop.js", "loop.js"));
		assert!(is_user_script("loop.js", "loop.js"));
		assert!(is_user_script("C:\\work\\loop.js", "loop.js"));
		assert!(!is_user_script("file:///tmp/work/myloop.js", "loop.js"));
		assert!(!is_user_script("node:internal/main/run_main_module", "loop.js"));
	}

	#[test]
	fn console_strings_are_unquoted() {
		assert_eq!(console_text(&RemoteObject::primitive("string", json!("hi"))), "hi");
		assert_eq!(console_text(&RemoteObject::primitive("number", json!(2))), "2");
	}
}
