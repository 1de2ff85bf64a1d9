//! Serialized command queue for a line-oriented debugger.
//!
//! One actor task owns the debugger's stdin, the FIFO of pending commands
//! and the merged output lines. At most one command is in flight: a command
//! is written, owns the debugger for the settle window, and only then does
//! the next command get written.
//!
//! A landing (breakpoint hit or completed step) seen during a command's
//! window is materialized once that window has elapsed: `locals` is written,
//! the assignments echoed during its own window become the new snapshot,
//! the landing events are emitted, and only then is the landing command
//! completed. A landing seen while idle puts a `locals` dump at the head of
//! the queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use stepwise_protocol::{PauseReason, Variables};
use stepwise_runtime::{Error, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::classifier::{LineClass, LineClassifier};
use super::values::variable_from_text;
use crate::events::OutputKind;
use crate::session::{ExecutionState, SessionShared};

const DUMP_LOCALS: &str = "locals";

/// How a command's settle window ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommandOutcome {
	/// Landing materialized for this command, if any.
	pub landed: Option<PauseReason>,
	/// First error line seen during the command's window.
	pub error: Option<String>,
}

impl CommandOutcome {
	pub fn succeeded(&self) -> bool {
		self.error.is_none()
	}
}

pub(crate) struct QueuedCommand {
	text: String,
	/// Writing this command lets the debuggee run.
	resumes: bool,
	done: oneshot::Sender<CommandOutcome>,
}

#[derive(Debug, Clone, Copy)]
struct Landing {
	reason: PauseReason,
	line: u32,
}

enum Pending {
	User(QueuedCommand),
	DumpLocals(Landing),
}

enum Phase {
	Idle,
	InFlight {
		command: QueuedCommand,
		deadline: Instant,
		landing: Option<Landing>,
		error: Option<String>,
	},
	Dumping {
		deadline: Instant,
		landing: Landing,
		captured: Variables,
		owner: Option<QueuedCommand>,
		error: Option<String>,
	},
}

impl Phase {
	fn deadline(&self) -> Option<Instant> {
		match self {
			Phase::Idle => None,
			Phase::InFlight { deadline, .. } | Phase::Dumping { deadline, .. } => Some(*deadline),
		}
	}
}

/// Caller side of the queue.
pub(crate) struct CommandQueue {
	tx: mpsc::UnboundedSender<QueuedCommand>,
	stop_tx: Mutex<Option<oneshot::Sender<()>>>,
	in_flight: Arc<AtomicBool>,
}

impl CommandQueue {
	/// Creates the queue and the actor that must be spawned to drive it.
	pub fn new<W>(
		writer: W,
		lines: mpsc::UnboundedReceiver<String>,
		classifier: Arc<dyn LineClassifier>,
		shared: Arc<SessionShared>,
		settle: Duration,
		init_tx: oneshot::Sender<()>,
	) -> (Self, QueueActor<W>)
	where
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (tx, commands) = mpsc::unbounded_channel();
		let (stop_tx, stop_rx) = oneshot::channel();
		let in_flight = Arc::new(AtomicBool::new(false));

		let actor = QueueActor {
			writer,
			lines,
			commands,
			stop_rx,
			classifier,
			shared,
			settle,
			in_flight: Arc::clone(&in_flight),
			pending: VecDeque::new(),
			phase: Phase::Idle,
			init_tx: Some(init_tx),
			exited: false,
		};
		let queue = Self {
			tx,
			stop_tx: Mutex::new(Some(stop_tx)),
			in_flight,
		};
		(queue, actor)
	}

	/// Queues `text` and waits for its settle window (and any landing) to
	/// complete. `None` if the queue shut down first.
	pub async fn execute(&self, text: impl Into<String>, resumes: bool) -> Option<CommandOutcome> {
		let (done, rx) = oneshot::channel();
		self.tx
			.send(QueuedCommand {
				text: text.into(),
				resumes,
				done,
			})
			.ok()?;
		rx.await.ok()
	}

	/// Whether a command currently owns the debugger.
	pub fn is_in_flight(&self) -> bool {
		self.in_flight.load(Ordering::SeqCst)
	}

	/// Writes `quit` ahead of anything queued and ends the actor. Queued and
	/// in-flight commands resolve as failed.
	pub fn shutdown(&self) {
		if let Some(tx) = self.stop_tx.lock().take() {
			let _ = tx.send(());
		}
	}
}

pub(crate) struct QueueActor<W> {
	writer: W,
	lines: mpsc::UnboundedReceiver<String>,
	commands: mpsc::UnboundedReceiver<QueuedCommand>,
	stop_rx: oneshot::Receiver<()>,
	classifier: Arc<dyn LineClassifier>,
	shared: Arc<SessionShared>,
	settle: Duration,
	in_flight: Arc<AtomicBool>,
	pending: VecDeque<Pending>,
	phase: Phase,
	init_tx: Option<oneshot::Sender<()>>,
	/// The debuggee reported its own exit.
	exited: bool,
}

impl<W> QueueActor<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	pub async fn run(mut self) {
		loop {
			if matches!(self.phase, Phase::Idle) {
				self.dispatch_next().await;
			}
			let deadline = self.phase.deadline();

			tokio::select! {
				biased;
				_ = &mut self.stop_rx => {
					self.quit().await;
					break;
				}
				line = self.lines.recv() => match line {
					Some(line) => self.on_line(&line),
					None => {
						self.on_debugger_gone();
						break;
					}
				},
				command = self.commands.recv() => match command {
					Some(command) => self.pending.push_back(Pending::User(command)),
					None => {
						self.quit().await;
						break;
					}
				},
				_ = sleep_until_some(deadline), if deadline.is_some() => {
					self.on_settled().await;
				}
			}
		}
		self.in_flight.store(false, Ordering::SeqCst);
		tracing::debug!(session = %self.shared.id(), "Command queue finished");
	}

	/// Writes the next pending command, skipping ones that cannot be written.
	async fn dispatch_next(&mut self) {
		while let Some(next) = self.pending.pop_front() {
			match next {
				Pending::User(command) => {
					if command.done.is_closed() {
						tracing::debug!(command = %command.text, "Dropping abandoned command");
						continue;
					}
					if let Err(e) = self.write(&command.text).await {
						tracing::warn!(command = %command.text, error = %e, "Failed to write command");
						let _ = command.done.send(CommandOutcome {
							landed: None,
							error: Some(e.to_string()),
						});
						continue;
					}
					if command.resumes {
						self.shared.transition(ExecutionState::Running);
					}
					self.phase = Phase::InFlight {
						command,
						deadline: Instant::now() + self.settle,
						landing: None,
						error: None,
					};
					self.in_flight.store(true, Ordering::SeqCst);
					return;
				}
				Pending::DumpLocals(landing) => {
					if self.begin_dump(landing, None, None).await {
						return;
					}
				}
			}
		}
	}

	/// Writes `locals` for `landing`. On write failure the landing is
	/// recorded with an empty snapshot and `owner` completed right away.
	async fn begin_dump(&mut self, landing: Landing, owner: Option<QueuedCommand>, error: Option<String>) -> bool {
		match self.write(DUMP_LOCALS).await {
			Ok(()) => {
				self.phase = Phase::Dumping {
					deadline: Instant::now() + self.settle,
					landing,
					captured: Variables::new(),
					owner,
					error,
				};
				self.in_flight.store(true, Ordering::SeqCst);
				true
			}
			Err(e) => {
				tracing::warn!(error = %e, "Failed to request locals");
				self.shared.record_pause(landing.line, landing.reason, Variables::new());
				if let Some(owner) = owner {
					let _ = owner.done.send(CommandOutcome {
						landed: Some(landing.reason),
						error,
					});
				}
				self.phase = Phase::Idle;
				self.in_flight.store(false, Ordering::SeqCst);
				false
			}
		}
	}

	async fn on_settled(&mut self) {
		match std::mem::replace(&mut self.phase, Phase::Idle) {
			Phase::Idle => {}
			Phase::InFlight {
				command,
				landing: Some(landing),
				error,
				..
			} => {
				self.begin_dump(landing, Some(command), error).await;
			}
			Phase::InFlight {
				command,
				landing: None,
				error,
				..
			} => {
				tracing::trace!(command = %command.text, "Command settled");
				let _ = command.done.send(CommandOutcome { landed: None, error });
				self.in_flight.store(false, Ordering::SeqCst);
			}
			Phase::Dumping {
				landing,
				captured,
				owner,
				error,
				..
			} => {
				self.shared.record_pause(landing.line, landing.reason, captured);
				if let Some(owner) = owner {
					let _ = owner.done.send(CommandOutcome {
						landed: Some(landing.reason),
						error,
					});
				}
				self.in_flight.store(false, Ordering::SeqCst);
			}
		}
	}

	fn on_line(&mut self, raw: &str) {
		match self.classifier.classify(raw) {
			LineClass::Landing { reason, line } => {
				let landing = Landing { reason, line };
				match &mut self.phase {
					Phase::InFlight { landing: slot, .. } => *slot = Some(landing),
					Phase::Dumping { .. } | Phase::Idle => {
						tracing::debug!(line, "Landing outside a command window");
						self.pending.push_front(Pending::DumpLocals(landing));
					}
				}
			}
			LineClass::Assignment { name, value } => match &mut self.phase {
				Phase::Dumping { captured, .. } => {
					captured.insert(name, variable_from_text(&value));
				}
				_ => self.shared.emit_output(OutputKind::Stdout, format!("{name} = {value}")),
			},
			LineClass::Exit => {
				self.exited = true;
				self.shared.finish("The application exited");
			}
			LineClass::Error(message) => {
				match &mut self.phase {
					Phase::InFlight { error, .. } | Phase::Dumping { error, .. } => {
						error.get_or_insert_with(|| message.clone());
					}
					Phase::Idle => {}
				}
				self.shared.emit_output(OutputKind::Error, message);
			}
			LineClass::InitMarker => {
				if let Some(tx) = self.init_tx.take() {
					let _ = tx.send(());
				}
			}
			LineClass::Blank => {}
			LineClass::Output(text) => {
				// Headers such as "Local variables:" belong to the dump.
				if !matches!(self.phase, Phase::Dumping { .. }) {
					self.shared.emit_output(OutputKind::Stdout, text);
				}
			}
		}
	}

	/// The debugger's output closed: it exited or was killed.
	fn on_debugger_gone(&mut self) {
		let error = (!self.exited).then(|| "debugger exited".to_string());
		match std::mem::replace(&mut self.phase, Phase::Idle) {
			Phase::InFlight { command, .. } => {
				let _ = command.done.send(CommandOutcome {
					landed: None,
					error: error.clone(),
				});
			}
			Phase::Dumping { owner: Some(owner), .. } => {
				let _ = owner.done.send(CommandOutcome {
					landed: None,
					error: error.clone(),
				});
			}
			Phase::Dumping { owner: None, .. } | Phase::Idle => {}
		}
		self.pending.clear();
		if !self.exited {
			tracing::info!(session = %self.shared.id(), "Debugger exited");
		}
		self.shared.finish("Debugger exited");
	}

	async fn quit(&mut self) {
		tracing::debug!(session = %self.shared.id(), "Stopping command queue");
		if let Err(e) = self.write("quit").await {
			tracing::debug!(error = %e, "quit not delivered");
		}
		self.phase = Phase::Idle;
		self.pending.clear();
	}

	async fn write(&mut self, command: &str) -> Result<()> {
		tracing::debug!(session = %self.shared.id(), command, "Writing command");
		let mut line = String::with_capacity(command.len() + 1);
		line.push_str(command);
		line.push('\n');
		self.writer.write_all(line.as_bytes()).await.map_err(Error::Io)?;
		self.writer.flush().await.map_err(Error::Io)?;
		Ok(())
	}
}

async fn sleep_until_some(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
