//! State a backend shares with the session facade.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use stepwise_protocol::{PauseReason, Variables};
use tokio::sync::watch;

use super::{ExecutionState, SessionId};
use crate::events::{EventBus, OutputKind, SessionEvent};

/// Line and variables captured at one pause. Always replaced as a unit.
#[derive(Debug, Clone, Default)]
struct PauseSnapshot {
	line: Option<u32>,
	variables: Variables,
}

/// Session state written by a backend's background tasks and read by callers.
pub(crate) struct SessionShared {
	id: SessionId,
	state: watch::Sender<ExecutionState>,
	snapshot: Mutex<PauseSnapshot>,
	/// Source line to backend breakpoint identity.
	breakpoints: Mutex<BTreeMap<u32, String>>,
	events: EventBus<SessionEvent>,
}

impl SessionShared {
	pub fn new(id: SessionId) -> Self {
		let (state, _) = watch::channel(ExecutionState::Starting);
		Self {
			id,
			state,
			snapshot: Mutex::new(PauseSnapshot::default()),
			breakpoints: Mutex::new(BTreeMap::new()),
			events: EventBus::default(),
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn events(&self) -> &EventBus<SessionEvent> {
		&self.events
	}

	pub fn state(&self) -> ExecutionState {
		*self.state.borrow()
	}

	pub fn is_terminated(&self) -> bool {
		self.state() == ExecutionState::Terminated
	}

	/// Moves to `next` if the lifecycle allows it. Returns whether the state changed.
	pub fn transition(&self, next: ExecutionState) -> bool {
		let changed = self.state.send_if_modified(|current| {
			if current.can_transition_to(next) {
				*current = next;
				true
			} else {
				false
			}
		});
		if changed {
			tracing::debug!(session = %self.id, state = ?next, "Session state changed");
		}
		changed
	}

	/// Marks the session terminated and fails outstanding event waiters.
	/// Returns false if it already was.
	pub fn terminate(&self) -> bool {
		let changed = self.transition(ExecutionState::Terminated);
		if changed {
			self.events.close_waiters();
		}
		changed
	}

	/// Resolves once the session is terminated.
	pub async fn wait_terminated(&self) {
		let mut rx = self.state.subscribe();
		let _ = rx.wait_for(|state| *state == ExecutionState::Terminated).await;
	}

	/// Replaces the snapshot with one completed pause, then tells listeners.
	///
	/// The landing event (if the reason has one) is emitted before
	/// `VariablesUpdated`, and both carry the same snapshot.
	pub fn record_pause(&self, line: u32, reason: PauseReason, variables: Variables) {
		{
			let mut snapshot = self.snapshot.lock();
			snapshot.line = Some(line);
			snapshot.variables = variables.clone();
		}
		self.transition(ExecutionState::Paused);
		tracing::debug!(session = %self.id, line, ?reason, count = variables.len(), "Paused");

		match reason {
			PauseReason::Breakpoint => self.events.emit(SessionEvent::BreakpointHit {
				line,
				variables: variables.clone(),
			}),
			PauseReason::Step => self.events.emit(SessionEvent::StepComplete {
				line,
				variables: variables.clone(),
			}),
			PauseReason::Internal => {}
		}
		self.events.emit(SessionEvent::VariablesUpdated { variables });
	}

	pub fn emit_output(&self, kind: OutputKind, message: impl Into<String>) {
		self.events.emit(SessionEvent::output(kind, message));
	}

	/// Emits the exit notice and terminates, unless already terminated.
	pub fn finish(&self, message: impl Into<String>) {
		if self.is_terminated() {
			return;
		}
		self.emit_output(OutputKind::Exit, message);
		self.terminate();
	}

	pub fn variables(&self) -> Variables {
		self.snapshot.lock().variables.clone()
	}

	pub fn current_line(&self) -> Option<u32> {
		self.snapshot.lock().line
	}

	pub fn has_breakpoint(&self, line: u32) -> bool {
		self.breakpoints.lock().contains_key(&line)
	}

	pub fn record_breakpoint(&self, line: u32, id: String) {
		self.breakpoints.lock().entry(line).or_insert(id);
	}

	pub fn breakpoints(&self) -> BTreeMap<u32, String> {
		self.breakpoints.lock().clone()
	}
}
