//! Debug sessions.
//!
//! A [`DebugSession`] drives one debuggee through one backend. Both backends
//! offer the same operations and report through the same [`SessionEvent`]s:
//!
//! | Operation          | Inspector backend                | REPL backend            |
//! |--------------------|----------------------------------|-------------------------|
//! | `set_breakpoint`   | `Debugger.setBreakpointByUrl`    | `stop at Entry:line`    |
//! | `resume`           | `Debugger.resume`                | `cont`                  |
//! | `step_over`        | `Debugger.stepOver`              | `next`                  |
//! | `step_into`        | `Debugger.stepInto`              | `step`                  |
//! | `stop`             | close socket, kill runtime       | `quit`, kill debugger   |
//!
//! Only starting can fail with an error. Every other operation logs its
//! failure and reports `false`, and once a session is terminated every
//! operation is a no-op.

mod shared;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepwise_protocol::Variables;
use stepwise_runtime::{Error, Result, TransportParts};
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

pub(crate) use self::shared::SessionShared;
use crate::config::StepwiseConfig;
use crate::events::{EventStream, EventWaiter, SessionEvent, Subscription};
use crate::inspector::InspectorBackend;
use crate::repl::{ReplBackend, ReplIo};

/// Opaque session identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl FromStr for SessionId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| Error::NotFound(format!("session {s}")))
	}
}

/// Which family of debugger backs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
	/// Structured request/response protocol with asynchronous events (V8 inspector).
	MessageProtocol,
	/// Line-oriented interactive debugger over standard streams (jdb).
	Repl,
}

impl BackendKind {
	/// Picks the backend from a source file's extension.
	///
	/// # Errors
	///
	/// Returns `Error::Unsupported` for any extension other than
	/// `.js`, `.mjs`, `.cjs` and `.java`.
	pub fn from_path(path: &Path) -> Result<Self> {
		let ext = path
			.extension()
			.and_then(|e| e.to_str())
			.map(str::to_ascii_lowercase)
			.unwrap_or_default();
		match ext.as_str() {
			"js" | "mjs" | "cjs" => Ok(BackendKind::MessageProtocol),
			"java" => Ok(BackendKind::Repl),
			_ => Err(Error::Unsupported(path.display().to_string())),
		}
	}
}

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionState {
	Starting,
	Running,
	Paused,
	Terminated,
}

impl ExecutionState {
	/// Only `Running` and `Paused` may alternate; everything else moves forward.
	pub fn can_transition_to(self, next: ExecutionState) -> bool {
		use ExecutionState::*;
		matches!(
			(self, next),
			(Starting, Running | Paused | Terminated) | (Running, Paused | Terminated) | (Paused, Running | Terminated)
		)
	}
}

/// The backend a session was started with. Chosen once, never swapped.
pub(crate) enum Backend {
	Inspector(InspectorBackend),
	Repl(ReplBackend),
}

impl Backend {
	fn kind(&self) -> BackendKind {
		match self {
			Backend::Inspector(_) => BackendKind::MessageProtocol,
			Backend::Repl(_) => BackendKind::Repl,
		}
	}

	async fn set_breakpoint(&self, line: u32) -> bool {
		match self {
			Backend::Inspector(b) => b.set_breakpoint(line).await,
			Backend::Repl(b) => b.set_breakpoint(line).await,
		}
	}

	async fn resume(&self) -> bool {
		match self {
			Backend::Inspector(b) => b.resume().await,
			Backend::Repl(b) => b.resume().await,
		}
	}

	async fn step_over(&self) -> bool {
		match self {
			Backend::Inspector(b) => b.step_over().await,
			Backend::Repl(b) => b.step_over().await,
		}
	}

	async fn step_into(&self) -> bool {
		match self {
			Backend::Inspector(b) => b.step_into().await,
			Backend::Repl(b) => b.step_into().await,
		}
	}

	async fn stop(&self) {
		match self {
			Backend::Inspector(b) => b.stop().await,
			Backend::Repl(b) => b.stop().await,
		}
	}

	fn pid(&self) -> Option<u32> {
		match self {
			Backend::Inspector(b) => b.pid(),
			Backend::Repl(b) => b.pid(),
		}
	}

	async fn has_outstanding_commands(&self) -> bool {
		match self {
			Backend::Inspector(b) => b.pending_requests().await > 0,
			Backend::Repl(b) => b.is_in_flight(),
		}
	}

	fn entry(&self) -> &str {
		match self {
			Backend::Inspector(b) => b.script_name(),
			Backend::Repl(b) => b.entry(),
		}
	}
}

/// One debuggee under control.
pub struct DebugSession {
	id: SessionId,
	backend: Backend,
	shared: Arc<SessionShared>,
}

impl DebugSession {
	/// Starts a session for `source`, picking the backend from its extension.
	///
	/// Returns once the debuggee is halted at entry (or running, if the REPL
	/// backend saw no landing). Anything created before a failure is torn
	/// down before the error is returned.
	///
	/// # Errors
	///
	/// - `Error::Unsupported` for unknown source types
	/// - `Error::ToolNotFound` if `node`, `javac` or `jdb` is missing
	/// - `Error::CompileFailed` with compiler output (REPL backend)
	/// - `Error::ConnectionFailed`, `Error::Timeout` or `Error::ProcessExited`
	///   if the debugger cannot be reached
	pub async fn start(source: impl AsRef<Path>, entry: Option<&str>, config: &StepwiseConfig) -> Result<Self> {
		let source = source.as_ref();
		let kind = BackendKind::from_path(source)?;
		Self::start_with_kind(kind, source, entry, config).await
	}

	/// Like [`start`](Self::start) with an explicit backend.
	pub async fn start_with_kind(
		kind: BackendKind,
		source: impl AsRef<Path>,
		entry: Option<&str>,
		config: &StepwiseConfig,
	) -> Result<Self> {
		let source = absolute_source(source.as_ref())?;
		let shared = Arc::new(SessionShared::new(SessionId::new()));
		tracing::info!(session = %shared.id(), ?kind, source = %source.display(), "Starting session");

		let backend = match kind {
			BackendKind::MessageProtocol => {
				Backend::Inspector(InspectorBackend::start(&source, &config.inspector, Arc::clone(&shared)).await?)
			}
			BackendKind::Repl => {
				Backend::Repl(ReplBackend::start(&source, entry, &config.repl, Arc::clone(&shared)).await?)
			}
		};
		Ok(Self::from_parts(backend, shared))
	}

	/// Attaches to an inspector that is already listening on `parts`, for
	/// the script whose file name is `script_name`.
	pub async fn attach_inspector(parts: TransportParts, script_name: &str, config: &StepwiseConfig) -> Result<Self> {
		let shared = Arc::new(SessionShared::new(SessionId::new()));
		let backend = InspectorBackend::attach(
			parts,
			script_name.to_string(),
			&config.inspector,
			Arc::clone(&shared),
			None,
		)
		.await?;
		Ok(Self::from_parts(Backend::Inspector(backend), shared))
	}

	/// Attaches to a line-oriented debugger already running for `entry`.
	pub async fn attach_repl(io: ReplIo, entry: &str, config: &StepwiseConfig) -> Result<Self> {
		let shared = Arc::new(SessionShared::new(SessionId::new()));
		let backend = ReplBackend::attach(io, entry.to_string(), &config.repl, Arc::clone(&shared)).await?;
		Ok(Self::from_parts(Backend::Repl(backend), shared))
	}

	fn from_parts(backend: Backend, shared: Arc<SessionShared>) -> Self {
		let id = shared.id();
		tracing::info!(session = %id, kind = ?backend.kind(), state = ?shared.state(), "Session started");
		Self { id, backend, shared }
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn kind(&self) -> BackendKind {
		self.backend.kind()
	}

	/// Script file name (inspector) or entry class (REPL).
	pub fn entry(&self) -> &str {
		self.backend.entry()
	}

	pub fn pid(&self) -> Option<u32> {
		self.backend.pid()
	}

	pub fn state(&self) -> ExecutionState {
		self.shared.state()
	}

	pub fn is_terminated(&self) -> bool {
		self.shared.is_terminated()
	}

	/// Whether a request awaits its reply (inspector) or a command owns
	/// its settle window (REPL).
	pub async fn has_outstanding_commands(&self) -> bool {
		self.backend.has_outstanding_commands().await
	}

	/// 1-based line of the most recent pause.
	pub fn current_line(&self) -> Option<u32> {
		self.shared.current_line()
	}

	/// Lines with a breakpoint, ascending.
	pub fn breakpoints(&self) -> Vec<u32> {
		self.shared.breakpoints().into_keys().collect()
	}

	/// Sets a breakpoint on a 1-based line. Setting it again succeeds
	/// without creating a second one.
	pub async fn set_breakpoint(&self, line: u32) -> bool {
		if self.shared.is_terminated() || line == 0 {
			return false;
		}
		if self.shared.has_breakpoint(line) {
			return true;
		}
		self.backend.set_breakpoint(line).await
	}

	/// Continues execution until the next breakpoint or exit.
	pub async fn resume(&self) -> bool {
		if self.shared.is_terminated() {
			return false;
		}
		self.backend.resume().await
	}

	pub async fn step_over(&self) -> bool {
		if self.shared.is_terminated() {
			return false;
		}
		self.backend.step_over().await
	}

	pub async fn step_into(&self) -> bool {
		if self.shared.is_terminated() {
			return false;
		}
		self.backend.step_into().await
	}

	/// Snapshot materialized at the most recent pause. Never fetches.
	pub fn get_variables(&self) -> Variables {
		self.shared.variables()
	}

	/// Tears the session down. Safe to call any number of times.
	pub async fn stop(&self) {
		self.backend.stop().await;
	}

	/// Resolves once the session has terminated, by stop or on its own.
	pub async fn wait_terminated(&self) {
		self.shared.wait_terminated().await;
	}

	/// Stream of every event emitted from now on.
	pub fn subscribe(&self) -> EventStream<SessionEvent> {
		EventStream::new(self.shared.events().subscribe())
	}

	/// Runs `handler` for every event until the returned [`Subscription`] is dropped.
	pub fn on_event<F>(&self, handler: F) -> Subscription
	where
		F: Fn(SessionEvent) + Send + Sync + 'static,
	{
		let mut rx = self.shared.events().subscribe();
		let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					result = rx.recv() => {
						match result {
							Ok(event) => handler(event),
							Err(broadcast::error::RecvError::Lagged(n)) => {
								tracing::warn!(dropped = n, "Session listener lagged");
							}
							Err(broadcast::error::RecvError::Closed) => break,
						}
					}
					_ = &mut cancel_rx => break,
				}
			}
		});

		Subscription::new(cancel_tx)
	}

	/// Waits for the first event matching `predicate`.
	///
	/// # Errors
	///
	/// `Error::Timeout` if nothing matched in time, `Error::ChannelClosed`
	/// if the session terminated first.
	pub async fn wait_for_event<F>(&self, predicate: F, timeout: Duration) -> Result<SessionEvent>
	where
		F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
	{
		let rx = self.shared.events().register_waiter(predicate);
		if self.shared.is_terminated() {
			return Err(Error::ChannelClosed);
		}
		EventWaiter::new(rx, timeout).wait().await
	}
}

impl fmt::Debug for DebugSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DebugSession")
			.field("id", &self.id)
			.field("kind", &self.kind())
			.field("state", &self.state())
			.finish()
	}
}

fn absolute_source(source: &Path) -> Result<PathBuf> {
	if !source.is_file() {
		return Err(Error::NotFound(source.display().to_string()));
	}
	Ok(std::path::absolute(source)?)
}
