// Copyright 2024 Paul Adamson
// Licensed under the Apache License, Version 2.0

//! Inspector-protocol backend.
//!
//! Drives a Node.js runtime started with `--inspect-brk` over its WebSocket
//! inspector endpoint. Start-up sequence:
//!
//! 1. Launch the runtime and read the endpoint from its stderr announcement
//! 2. Connect, then `Debugger.enable` and `Runtime.enable`
//! 3. Wait for the user script's `Debugger.scriptParsed` and load its source
//! 4. `Runtime.runIfWaitingForDebugger`, then wait for the pause at entry
//!
//! Any failure tears down the connection and the process before returning.

mod pump;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use stepwise_protocol::{
	GetScriptSourceResult, ScriptParsedEvent, SetBreakpointByUrlParams, SetBreakpointByUrlResult, methods,
};
use stepwise_runtime::{
	Connection, Error, InspectorLaunch, InspectorProcess, Result, TransportParts, WebSocketTransport,
	resolve_executable,
};
use tokio::sync::{Mutex as TokioMutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use self::pump::EventPump;
use crate::config::InspectorConfig;
use crate::events::{EventWaiter, OutputKind, SessionEvent};
use crate::session::SessionShared;

/// Runtime chatter on stderr that is about the inspector, not the program.
const INSPECTOR_NOTICES: &[&str] = &[
	"Debugger attached.",
	"Waiting for the debugger to disconnect...",
	"For help, see: https://nodejs.org/en/docs/inspector",
	"Debugger ending on ws://",
	"Debugger listening on ws://",
];

/// The user script as the inspector knows it.
#[derive(Debug, Clone)]
struct ScriptIdentity {
	script_id: String,
	url: String,
	line_count: usize,
}

pub(crate) struct InspectorBackend {
	connection: Arc<Connection>,
	shared: Arc<SessionShared>,
	script_name: String,
	script: Mutex<Option<ScriptIdentity>>,
	process: TokioMutex<Option<InspectorProcess>>,
	pid: Option<u32>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	/// Serializes breakpoint creation so a line is never requested twice.
	breakpoint_lock: TokioMutex<()>,
	stopped: AtomicBool,
}

impl InspectorBackend {
	/// Launches the runtime on `source` and attaches to it.
	pub async fn start(source: &Path, config: &InspectorConfig, shared: Arc<SessionShared>) -> Result<Self> {
		let node = resolve_executable(&config.node)?;
		let script_name = source
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.ok_or_else(|| Error::Unsupported(source.display().to_string()))?;

		let launch = InspectorLaunch {
			node,
			script: source.to_path_buf(),
			extra_args: config.extra_args.clone(),
			host: config.host.clone(),
			port: config.port,
			endpoint_timeout: config.endpoint_timeout(),
		};
		let mut process = InspectorProcess::launch(&launch).await?;
		let url = process.endpoint.ws_url();

		let forwarders: Vec<JoinHandle<()>> = [
			(process.take_stdout(), OutputKind::Stdout),
			(process.take_stderr(), OutputKind::Stderr),
		]
		.into_iter()
		.filter_map(|(lines, kind)| lines.map(|lines| spawn_output_forwarder(lines, kind, Arc::clone(&shared))))
		.collect();

		let (transport, message_rx) = match WebSocketTransport::connect(&url).await {
			Ok(connected) => connected,
			Err(e) => {
				process.kill().await;
				forwarders.iter().for_each(JoinHandle::abort);
				return Err(e);
			}
		};
		tracing::debug!(session = %shared.id(), %url, "Connected to inspector");

		let backend = Self::attach(
			transport.into_transport_parts(message_rx),
			script_name,
			config,
			shared,
			Some(process),
		)
		.await;
		match backend {
			Ok(backend) => {
				backend.tasks.lock().extend(forwarders);
				Ok(backend)
			}
			Err(e) => {
				forwarders.iter().for_each(JoinHandle::abort);
				Err(e)
			}
		}
	}

	/// Runs the start-up handshake over an established transport.
	///
	/// On failure everything is torn down, including `process`.
	pub async fn attach(
		parts: TransportParts,
		script_name: String,
		config: &InspectorConfig,
		shared: Arc<SessionShared>,
		process: Option<InspectorProcess>,
	) -> Result<Self> {
		let (connection, events) = Connection::new(parts);
		let connection = Arc::new(connection.with_request_timeout(config.request_timeout()));

		let runner = Arc::clone(&connection);
		let run_task = tokio::spawn(async move { runner.run().await });

		let (script_tx, script_rx) = oneshot::channel();
		let first_pause = shared
			.events()
			.register_waiter(|event| matches!(event, SessionEvent::VariablesUpdated { .. }));
		let pump = EventPump {
			connection: Arc::clone(&connection),
			shared: Arc::clone(&shared),
			script_name: script_name.clone(),
			script_tx: Some(script_tx),
		};
		let pump_task = tokio::spawn(pump.run(events));

		let backend = Self {
			connection,
			shared,
			script_name,
			script: Mutex::new(None),
			pid: process.as_ref().and_then(InspectorProcess::pid),
			process: TokioMutex::new(process),
			tasks: Mutex::new(vec![run_task, pump_task]),
			breakpoint_lock: TokioMutex::new(()),
			stopped: AtomicBool::new(false),
		};

		match backend
			.handshake(script_rx, EventWaiter::new(first_pause, config.first_pause_timeout()), config)
			.await
		{
			Ok(()) => Ok(backend),
			Err(e) => {
				tracing::warn!(session = %backend.shared.id(), error = %e, "Inspector start-up failed");
				backend.stop().await;
				Err(e)
			}
		}
	}

	async fn handshake(
		&self,
		mut script_rx: oneshot::Receiver<ScriptParsedEvent>,
		first_pause: EventWaiter<SessionEvent>,
		config: &InspectorConfig,
	) -> Result<()> {
		self.connection.send_message(methods::DEBUGGER_ENABLE, json!({})).await?;
		self.connection.send_message(methods::RUNTIME_ENABLE, json!({})).await?;

		// Some runtimes only parse the entry script once released, so a
		// missing scriptParsed here is retried after the first pause.
		let parsed = match tokio::time::timeout(config.script_parsed_timeout(), &mut script_rx).await {
			Ok(Ok(script)) => Some(script),
			Ok(Err(_)) => return Err(Error::ChannelClosed),
			Err(_) => {
				tracing::debug!(script = %self.script_name, "Script not parsed before release");
				None
			}
		};
		if let Some(script) = &parsed {
			self.load_script(script).await?;
		}

		self.connection
			.send_message(methods::RUNTIME_RUN_IF_WAITING, json!({}))
			.await?;
		first_pause.wait().await.map_err(|e| match e {
			Error::Timeout(_) => Error::Timeout("waiting for the pause at entry".to_string()),
			other => other,
		})?;

		if parsed.is_none() {
			let script = tokio::time::timeout(config.script_parsed_timeout(), script_rx)
				.await
				.map_err(|_| Error::Timeout(format!("waiting for {} to be parsed", self.script_name)))?
				.map_err(|_| Error::ChannelClosed)?;
			self.load_script(&script).await?;
		}
		Ok(())
	}

	async fn load_script(&self, script: &ScriptParsedEvent) -> Result<()> {
		let result = self
			.connection
			.send_message(methods::DEBUGGER_GET_SCRIPT_SOURCE, json!({"scriptId": script.script_id}))
			.await?;
		let source: GetScriptSourceResult = serde_json::from_value(result)?;
		let identity = ScriptIdentity {
			script_id: script.script_id.clone(),
			url: script.url.clone(),
			line_count: source.script_source.lines().count(),
		};
		tracing::debug!(
			script_id = %identity.script_id,
			url = %identity.url,
			lines = identity.line_count,
			"Script identified"
		);
		*self.script.lock() = Some(identity);
		Ok(())
	}

	pub fn script_name(&self) -> &str {
		&self.script_name
	}

	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	pub async fn pending_requests(&self) -> usize {
		self.connection.pending_count().await
	}

	pub async fn set_breakpoint(&self, line: u32) -> bool {
		let _guard = self.breakpoint_lock.lock().await;
		if self.shared.has_breakpoint(line) {
			return true;
		}
		let line_count = self.script.lock().as_ref().map(|script| script.line_count);
		if line_count.is_some_and(|count| line as usize > count) {
			tracing::warn!(line, ?line_count, "Breakpoint past end of script");
			return false;
		}

		let params = SetBreakpointByUrlParams {
			line_number: line - 1,
			url: None,
			url_regex: Some(format!(".*{}$", regex::escape(&self.script_name))),
			column_number: Some(0),
		};
		let result = async {
			let params = serde_json::to_value(params)?;
			let reply = self
				.connection
				.send_message(methods::DEBUGGER_SET_BREAKPOINT_BY_URL, params)
				.await?;
			Ok::<_, Error>(serde_json::from_value::<SetBreakpointByUrlResult>(reply)?)
		}
		.await;

		match result {
			Ok(reply) => {
				tracing::debug!(line, breakpoint_id = %reply.breakpoint_id, "Breakpoint set");
				self.shared.record_breakpoint(line, reply.breakpoint_id);
				true
			}
			Err(e) => {
				tracing::warn!(line, error = %e, "Failed to set breakpoint");
				false
			}
		}
	}

	pub async fn resume(&self) -> bool {
		self.command(methods::DEBUGGER_RESUME).await
	}

	pub async fn step_over(&self) -> bool {
		self.command(methods::DEBUGGER_STEP_OVER).await
	}

	pub async fn step_into(&self) -> bool {
		self.command(methods::DEBUGGER_STEP_INTO).await
	}

	async fn command(&self, method: &str) -> bool {
		match self.connection.send_message(method, Value::Null).await {
			Ok(_) => true,
			Err(e) => {
				tracing::warn!(session = %self.shared.id(), method, error = %e, "Command failed");
				false
			}
		}
	}

	/// Closes the connection, then kills the runtime. Idempotent.
	pub async fn stop(&self) {
		if self.stopped.swap(true, Ordering::SeqCst) {
			return;
		}
		self.shared.terminate();

		if let Err(e) = self.connection.close().await {
			tracing::debug!(error = %e, "Connection already closed");
		}
		if let Some(mut process) = self.process.lock().await.take() {
			process.kill().await;
		}
		for task in self.tasks.lock().drain(..) {
			task.abort();
		}
		tracing::info!(session = %self.shared.id(), "Inspector session stopped");
	}
}

fn spawn_output_forwarder(
	mut lines: mpsc::UnboundedReceiver<String>,
	kind: OutputKind,
	shared: Arc<SessionShared>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(line) = lines.recv().await {
			if kind == OutputKind::Stderr && INSPECTOR_NOTICES.iter().any(|notice| line.starts_with(notice)) {
				tracing::trace!(%line, "Inspector notice");
				continue;
			}
			shared.emit_output(kind, line);
		}
	})
}

