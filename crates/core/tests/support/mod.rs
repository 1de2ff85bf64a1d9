//! Simulated debugger backends for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use stepwise::{EventStream, ReplIo, SessionEvent, StepwiseConfig, TransportParts};
use stepwise_runtime::PipeTransport;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

/// What a simulated inspector sends back for one request.
pub enum Outgoing {
	Reply(Value),
	Error(i64, String),
	Event(&'static str, Value),
	/// Leaves the request unanswered.
	Silence,
	/// Closes the connection after everything before it was written.
	HangUp,
}

/// Behaviour of a simulated inspector.
pub trait Peer: Send + 'static {
	fn on_request(&mut self, method: &str, params: &Value) -> Vec<Outgoing>;
}

/// Handle on a running simulated inspector.
pub struct SimulatedInspector {
	requests: Arc<Mutex<Vec<(String, Value)>>>,
	push: mpsc::UnboundedSender<Value>,
}

impl SimulatedInspector {
	/// Starts `peer` behind a newline-delimited JSON transport.
	pub fn spawn<P: Peer>(mut peer: P) -> (TransportParts, Self) {
		let (client_writer, peer_reader) = tokio::io::duplex(64 * 1024);
		let (mut peer_writer, client_reader) = tokio::io::duplex(64 * 1024);
		let (transport, message_rx) = PipeTransport::new(client_writer, client_reader);

		let requests = Arc::new(Mutex::new(Vec::new()));
		let (push, mut pushed) = mpsc::unbounded_channel::<Value>();

		let log = Arc::clone(&requests);
		tokio::spawn(async move {
			let mut lines = BufReader::new(peer_reader).lines();
			loop {
				tokio::select! {
					line = lines.next_line() => {
						let Ok(Some(line)) = line else { return };
						let Ok(request) = serde_json::from_str::<Value>(&line) else { continue };
						let id = request["id"].clone();
						let method = request["method"].as_str().unwrap_or_default().to_string();
						let params = request.get("params").cloned().unwrap_or(Value::Null);
						log.lock().push((method.clone(), params.clone()));

						for outgoing in peer.on_request(&method, &params) {
							let message = match outgoing {
								Outgoing::Reply(result) => json!({"id": id, "result": result}),
								Outgoing::Error(code, message) => {
									json!({"id": id, "error": {"code": code, "message": message}})
								}
								Outgoing::Event(method, params) => json!({"method": method, "params": params}),
								Outgoing::Silence => continue,
								Outgoing::HangUp => return,
							};
							if write_message(&mut peer_writer, &message).await.is_err() {
								return;
							}
						}
					}
					Some(message) = pushed.recv() => {
						if write_message(&mut peer_writer, &message).await.is_err() {
							return;
						}
					}
				}
			}
		});

		(transport.into_transport_parts(message_rx), Self { requests, push })
	}

	/// Sends an unsolicited event.
	pub fn push_event(&self, method: &str, params: Value) {
		let _ = self.push.send(json!({"method": method, "params": params}));
	}

	pub fn requests(&self) -> Vec<(String, Value)> {
		self.requests.lock().clone()
	}

	pub fn methods(&self) -> Vec<String> {
		self.requests.lock().iter().map(|(method, _)| method.clone()).collect()
	}

	pub fn count(&self, method: &str) -> usize {
		self.requests.lock().iter().filter(|(m, _)| m == method).count()
	}
}

async fn write_message(writer: &mut DuplexStream, message: &Value) -> std::io::Result<()> {
	let mut line = message.to_string();
	line.push('\n');
	writer.write_all(line.as_bytes()).await?;
	writer.flush().await
}

pub const LOOP_SOURCE: &str = "for (let i = 0; i < 3; i++) {\n  console.log(i);\n}\n";
pub const LOOP_URL: &str = "file:///work/loop.js";
const LOOP_SCRIPT_ID: &str = "42";

/// The inspector side of `node --inspect-brk loop.js` running [`LOOP_SOURCE`].
///
/// Only a breakpoint on line 2 stops the loop; steps advance one line.
pub struct LoopProgram {
	pub(crate) iterations: u32,
	/// Value of `i` at the current pause, if inside the loop.
	pub(crate) current: Option<u32>,
	pub(crate) line: u32,
	pub(crate) breakpoints: Vec<u32>,
	/// Parse the script only once released, like some runtimes do.
	pub late_parse: bool,
	pub reject_breakpoints: bool,
	/// Never answer `Debugger.stepInto`.
	pub hang_step_into: bool,
	/// Local scope reads to reject once inside the loop.
	pub failing_local_reads: u32,
}

impl Default for LoopProgram {
	fn default() -> Self {
		Self {
			iterations: 3,
			current: None,
			line: 0,
			breakpoints: Vec::new(),
			late_parse: false,
			reject_breakpoints: false,
			hang_step_into: false,
			failing_local_reads: 0,
		}
	}
}

impl LoopProgram {
	fn script_parsed(&self) -> Vec<Outgoing> {
		vec![
			Outgoing::Event(
				"Debugger.scriptParsed",
				json!({"scriptId": "7", "url": "node:internal/main/run_main_module", "startLine": 0, "endLine": 40}),
			),
			Outgoing::Event(
				"Debugger.scriptParsed",
				json!({"scriptId": LOOP_SCRIPT_ID, "url": LOOP_URL, "startLine": 0, "endLine": 3}),
			),
		]
	}

	fn pause(&mut self, reason: &str, line: u32) -> Outgoing {
		self.line = line;
		Outgoing::Event("Debugger.paused", paused(reason, line))
	}

	fn local_properties(&self) -> Value {
		let i = match self.current {
			Some(i) => json!({"type": "number", "value": i, "description": i.to_string()}),
			None => json!({"type": "undefined"}),
		};
		json!({"result": [
			{"name": "i", "value": i, "writable": true, "configurable": true, "enumerable": true, "isOwn": true},
		]})
	}

	fn global_properties(&self) -> Value {
		json!({"result": [
			{"name": "i", "value": {"type": "string", "value": "shadowed"}},
			{"name": "__proto__", "value": {"type": "object", "objectId": "proto"}},
			{"name": "label", "value": {"type": "string", "value": "loop"}},
			{"name": "clock", "get": {"type": "function", "objectId": "getter"}},
		]})
	}

	/// Runs from the current position to the next breakpoint or to exit.
	fn run(&mut self) -> Vec<Outgoing> {
		let mut out = vec![Outgoing::Reply(json!({})), Outgoing::Event("Debugger.resumed", json!({}))];
		let next = match self.current {
			Some(i) => {
				out.push(console_log(i));
				i + 1
			}
			None => 0,
		};

		if self.breakpoints.contains(&1) && next < self.iterations {
			self.current = Some(next);
			out.push(self.pause("breakpoint", 1));
			return out;
		}
		for i in next..self.iterations {
			out.push(console_log(i));
		}
		out.push(Outgoing::Event(
			"Runtime.executionContextDestroyed",
			json!({"executionContextId": 1}),
		));
		out.push(Outgoing::HangUp);
		out
	}

	fn step(&mut self) -> Vec<Outgoing> {
		let line = self.line + 1;
		vec![
			Outgoing::Reply(json!({})),
			Outgoing::Event("Debugger.resumed", json!({})),
			self.pause("other", line),
		]
	}
}

impl Peer for LoopProgram {
	fn on_request(&mut self, method: &str, params: &Value) -> Vec<Outgoing> {
		match method {
			"Debugger.enable" => {
				let mut out = vec![Outgoing::Reply(json!({"debuggerId": "sim"}))];
				if !self.late_parse {
					out.extend(self.script_parsed());
				}
				out
			}
			"Runtime.enable" => vec![
				Outgoing::Reply(json!({})),
				Outgoing::Event(
					"Runtime.executionContextCreated",
					json!({"context": {"id": 1, "origin": "", "name": "main"}}),
				),
			],
			"Debugger.getScriptSource" => vec![Outgoing::Reply(json!({"scriptSource": LOOP_SOURCE}))],
			"Runtime.runIfWaitingForDebugger" => {
				let mut out = vec![Outgoing::Reply(json!({}))];
				if self.late_parse {
					out.extend(self.script_parsed());
				}
				out.push(self.pause("Break on start", 0));
				out
			}
			"Runtime.getProperties" => match params["objectId"].as_str() {
				Some("scope:local") if self.current.is_some() && self.failing_local_reads > 0 => {
					self.failing_local_reads -= 1;
					vec![Outgoing::Error(-32000, "Could not find object with given id".to_string())]
				}
				Some("scope:local") => vec![Outgoing::Reply(self.local_properties())],
				Some("scope:global") => vec![Outgoing::Reply(self.global_properties())],
				_ => vec![Outgoing::Error(-32000, "Could not find object with given id".to_string())],
			},
			"Debugger.setBreakpointByUrl" => {
				if self.reject_breakpoints {
					return vec![Outgoing::Error(
						-32000,
						"Breakpoint at specified location already exists.".to_string(),
					)];
				}
				let line = params["lineNumber"].as_u64().unwrap_or_default() as u32;
				self.breakpoints.push(line);
				let regex = params["urlRegex"].as_str().unwrap_or_default();
				vec![Outgoing::Reply(json!({
					"breakpointId": format!("1:{line}:0:{regex}"),
					"locations": [{"scriptId": LOOP_SCRIPT_ID, "lineNumber": line, "columnNumber": 2}],
				}))]
			}
			"Debugger.resume" => self.run(),
			"Debugger.stepOver" => self.step(),
			"Debugger.stepInto" if self.hang_step_into => vec![Outgoing::Silence],
			"Debugger.stepInto" => self.step(),
			_ => vec![Outgoing::Reply(json!({}))],
		}
	}
}

/// `Debugger.paused` params with one frame in the loop script.
pub fn paused(reason: &str, line: u32) -> Value {
	json!({
		"reason": reason,
		"hitBreakpoints": [],
		"callFrames": [{
			"callFrameId": "cf-0",
			"functionName": "",
			"location": {"scriptId": LOOP_SCRIPT_ID, "lineNumber": line, "columnNumber": 2},
			"url": LOOP_URL,
			"scopeChain": [
				{"type": "local", "object": {"type": "object", "objectId": "scope:local"}},
				{"type": "block", "object": {"type": "object", "objectId": "scope:block"}},
				{"type": "global", "object": {"type": "object", "objectId": "scope:global"}},
			],
		}],
	})
}

fn console_log(i: u32) -> Outgoing {
	Outgoing::Event(
		"Runtime.consoleAPICalled",
		json!({
			"type": "log",
			"args": [{"type": "number", "value": i, "description": i.to_string()}],
			"executionContextId": 1,
			"timestamp": 0.0,
		}),
	)
}

/// Config with short deadlines so failure paths finish quickly.
pub fn test_config() -> StepwiseConfig {
	let mut config = StepwiseConfig::default();
	config.inspector.request_timeout_ms = 1000;
	config.inspector.script_parsed_timeout_ms = 500;
	config.inspector.first_pause_timeout_ms = 1000;
	config.repl.settle_ms = 100;
	config.repl.init_timeout_ms = 500;
	config.repl.quit_grace_ms = 10;
	config
}

/// Next event that is not program output, or `None` on timeout.
pub async fn next_debug_event(events: &mut EventStream<SessionEvent>) -> Option<SessionEvent> {
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			match events.recv().await? {
				SessionEvent::Output { .. } => continue,
				event => return Some(event),
			}
		}
	})
	.await
	.ok()
	.flatten()
}

/// Scripted stand-in for `jdb` behind [`ReplIo::from_streams`].
pub struct SimulatedJdb {
	commands: Arc<Mutex<Vec<String>>>,
}

impl SimulatedJdb {
	/// Answers each command with the lines `script` returns. A returned
	/// line equal to [`JDB_HANG_UP`] closes the debugger's output.
	pub fn spawn<F>(script: F) -> (ReplIo, Self)
	where
		F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
	{
		let (writer, reader) = tokio::io::duplex(4096);
		let (lines_tx, lines_rx) = mpsc::unbounded_channel();
		let commands = Arc::new(Mutex::new(Vec::new()));

		let log = Arc::clone(&commands);
		let _ = lines_tx.send("Initializing jdb ...".to_string());
		tokio::spawn(async move {
			let mut input = BufReader::new(reader).lines();
			while let Ok(Some(command)) = input.next_line().await {
				log.lock().push(command.clone());
				for line in script(&command) {
					if line == JDB_HANG_UP || lines_tx.send(line).is_err() {
						return;
					}
				}
			}
		});

		(ReplIo::from_streams(writer, lines_rx), Self { commands })
	}

	pub fn commands(&self) -> Vec<String> {
		self.commands.lock().clone()
	}
}

pub const JDB_HANG_UP: &str = "<hang-up>";

/// jdb on a `Counter` class whose loop prints `tick N` and pauses on line 5.
pub fn counter_jdb() -> impl Fn(&str) -> Vec<String> + Send + Sync + 'static {
	let state = Mutex::new(0u32);
	move |command| {
		let mut count = state.lock();
		match command {
			"stop in Counter.main" => vec!["Deferring breakpoint Counter.main.".into()],
			"run" => vec![
				"run Counter".into(),
				"VM Started: Set deferred breakpoint Counter.main".into(),
				r#"Breakpoint hit: "thread=main", Counter.main(), line=3 bci=0"#.into(),
				"main[1] ".into(),
			],
			"stop at Counter:5" => vec!["Set breakpoint Counter:5".into(), "main[1] ".into()],
			"stop at Counter:40" => vec!["Unable to set breakpoint Counter:40 : No code at line 40 in Counter".into()],
			"cont" if *count < 3 => {
				let line = format!(r#"Breakpoint hit: "thread=main", Counter.main(), line=5 bci={}"#, 4 + *count);
				let out = vec!["> ".into(), format!("tick {}", *count), line, "main[1] ".into()];
				*count += 1;
				out
			}
			"cont" => vec!["> ".into(), "The application exited".into(), JDB_HANG_UP.into()],
			"next" => vec![r#"Step completed: "thread=main", Counter.main(), line=6 bci=20"#.into()],
			"step" => vec![r#"Step completed: "thread=main", Counter.tick(), line=11 bci=0"#.into()],
			"locals" => vec![
				"Method arguments:".into(),
				"args = instance of java.lang.String[0] (id=421)".into(),
				"Local variables:".into(),
				format!("count = {}", *count),
				"name = \"counter\"".into(),
				"main[1] ".into(),
			],
			"quit" => vec![JDB_HANG_UP.into()],
			_ => Vec::new(),
		}
	}
}
