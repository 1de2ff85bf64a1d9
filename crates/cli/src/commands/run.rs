use std::time::Duration;

use anyhow::Context;
use stepwise::{DebugSession, EventStream, SessionEvent, SessionId, SessionRegistry, StepwiseConfig};
use tokio::time::Instant;

use crate::cli::RunArgs;
use crate::output::{Record, print_record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
	Continue,
	StepOver,
	StepInto,
}

impl Action {
	fn name(self) -> &'static str {
		match self {
			Action::Continue => "continue",
			Action::StepOver => "stepOver",
			Action::StepInto => "stepInto",
		}
	}

	async fn perform(self, session: &DebugSession) -> bool {
		match self {
			Action::Continue => session.resume().await,
			Action::StepOver => session.step_over().await,
			Action::StepInto => session.step_into().await,
		}
	}
}

/// Continues first, then steps over, then steps into.
fn action_script(args: &RunArgs) -> Vec<Action> {
	std::iter::repeat_n(Action::Continue, args.continues as usize)
		.chain(std::iter::repeat_n(Action::StepOver, args.step_over as usize))
		.chain(std::iter::repeat_n(Action::StepInto, args.step_into as usize))
		.collect()
}

pub async fn execute(args: RunArgs, config: StepwiseConfig) -> anyhow::Result<()> {
	let registry = SessionRegistry::new(config);
	let id = registry
		.create(&args.source, args.entry.as_deref(), args.backend.map(Into::into))
		.await
		.with_context(|| format!("failed to start a session for {}", args.source.display()))?;
	let session = registry.get(id)?;
	let mut events = session.subscribe();

	print_record(&Record::Session {
		id,
		backend: session.kind(),
		entry: session.entry(),
		state: session.state(),
		pid: session.pid(),
	})?;

	let outcome = drive(&session, &mut events, &args).await;

	if registry.stop(id).await.is_err() {
		tracing::debug!(session = %id, "Session already removed");
	}
	flush_events(id, &mut events)?;
	outcome
}

async fn drive(session: &DebugSession, events: &mut EventStream<SessionEvent>, args: &RunArgs) -> anyhow::Result<()> {
	let id = session.id();
	for &line in &args.breakpoints {
		let ok = session.set_breakpoint(line).await;
		print_record(&Record::Command {
			command: "setBreakpoint",
			ok,
			line: Some(line),
		})?;
	}
	flush_events(id, events)?;

	let wait = Duration::from_millis(args.wait_ms);
	for action in action_script(args) {
		if session.is_terminated() {
			tracing::info!(session = %id, action = action.name(), "Program finished, skipping remaining actions");
			break;
		}
		let ok = action.perform(session).await;
		let landed = if ok { next_landing(id, events, wait).await? } else { None };
		print_record(&Record::Command {
			command: action.name(),
			ok,
			line: landed,
		})?;
	}

	print_record(&Record::Variables {
		session: id,
		variables: &session.get_variables(),
	})?;
	Ok(())
}

/// Prints events until a landing (its line is returned), the program's
/// exit or the deadline.
async fn next_landing(
	id: SessionId,
	events: &mut EventStream<SessionEvent>,
	wait: Duration,
) -> anyhow::Result<Option<u32>> {
	let deadline = Instant::now() + wait;
	loop {
		let event = match tokio::time::timeout_at(deadline, events.recv()).await {
			Ok(Some(event)) => event,
			Ok(None) => return Ok(None),
			Err(_) => {
				tracing::warn!(session = %id, ?wait, "No landing in time");
				return Ok(None);
			}
		};
		print_record(&Record::Event {
			session: id,
			event: &event,
		})?;
		if let Some(line) = event.line() {
			// The snapshot that goes with the landing follows right after it.
			if let Ok(Some(update)) = tokio::time::timeout_at(deadline, events.recv()).await {
				print_record(&Record::Event {
					session: id,
					event: &update,
				})?;
			}
			return Ok(Some(line));
		}
		if event.is_exit() {
			return Ok(None);
		}
	}
}

fn flush_events(id: SessionId, events: &mut EventStream<SessionEvent>) -> anyhow::Result<()> {
	while let Some(event) = events.try_recv() {
		print_record(&Record::Event {
			session: id,
			event: &event,
		})?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	fn args(continues: u32, step_over: u32, step_into: u32) -> RunArgs {
		RunArgs {
			source: PathBuf::from("loop.js"),
			entry: None,
			backend: None,
			breakpoints: vec![2],
			continues,
			step_over,
			step_into,
			wait_ms: 1000,
		}
	}

	#[test]
	fn script_runs_continues_then_steps() {
		assert_eq!(
			action_script(&args(2, 1, 1)),
			[Action::Continue, Action::Continue, Action::StepOver, Action::StepInto]
		);
		assert!(action_script(&args(0, 0, 0)).is_empty());
	}
}
