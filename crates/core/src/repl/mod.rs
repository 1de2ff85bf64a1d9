//! REPL debugger backend.
//!
//! Drives `jdb` over its standard streams. There are no structured replies:
//! commands are serialized through a single-in-flight [queue](queue) with a
//! fixed settle window, and output lines are interpreted by a
//! [`LineClassifier`].
//!
//! Start-up is two-phase: `javac -g` must succeed (otherwise the compiler
//! output is returned as `Error::CompileFailed`), then `jdb` is launched,
//! `stop in <Entry>.main` and `run` are issued, and start returns once `run`
//! has settled.

mod classifier;
mod queue;
mod toolchain;
mod values;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use stepwise_runtime::{Error, Result, kill_child, resolve_executable, spawn_line_forwarder};
use tokio::io::AsyncWrite;
use tokio::process::Child;
use tokio::sync::{Mutex as TokioMutex, mpsc, oneshot};
use tokio::task::JoinHandle;

pub use self::classifier::{JdbClassifier, LineClass, LineClassifier};
use self::queue::{CommandOutcome, CommandQueue};
pub use self::values::{infer_value_type, variable_from_text};
use crate::config::ReplConfig;
use crate::session::SessionShared;

/// Standard streams of a running line-oriented debugger.
///
/// Built from a spawned process with [`from_child`](Self::from_child), or
/// from arbitrary streams (a simulated debugger in tests).
pub struct ReplIo {
	writer: Box<dyn AsyncWrite + Send + Unpin>,
	lines: mpsc::UnboundedReceiver<String>,
	readers: Vec<JoinHandle<()>>,
	child: Option<Child>,
}

impl ReplIo {
	/// Takes over a debugger process; stdout and stderr are merged line by line.
	///
	/// # Errors
	///
	/// Returns `Error::LaunchFailed` if any stream was not piped.
	pub fn from_child(mut child: Child) -> Result<Self> {
		let (Some(stdin), Some(stdout), Some(stderr)) = (child.stdin.take(), child.stdout.take(), child.stderr.take())
		else {
			return Err(Error::LaunchFailed("debugger streams were not piped".to_string()));
		};
		let (tx, lines) = mpsc::unbounded_channel();
		let readers = vec![
			spawn_line_forwarder(stdout, "stdout", tx.clone()),
			spawn_line_forwarder(stderr, "stderr", tx),
		];
		Ok(Self {
			writer: Box::new(stdin),
			lines,
			readers,
			child: Some(child),
		})
	}

	/// Uses `writer` for commands and `lines` as the debugger's output.
	pub fn from_streams<W>(writer: W, lines: mpsc::UnboundedReceiver<String>) -> Self
	where
		W: AsyncWrite + Send + Unpin + 'static,
	{
		Self {
			writer: Box::new(writer),
			lines,
			readers: Vec::new(),
			child: None,
		}
	}
}

pub(crate) struct ReplBackend {
	queue: CommandQueue,
	shared: Arc<SessionShared>,
	entry: String,
	child: TokioMutex<Option<Child>>,
	pid: Option<u32>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	quit_grace: Duration,
	/// Serializes breakpoint creation so a line is never requested twice.
	breakpoint_lock: TokioMutex<()>,
	stopped: AtomicBool,
}

impl ReplBackend {
	/// Compiles `source`, launches the debugger and runs to the entry breakpoint.
	pub async fn start(
		source: &Path,
		entry: Option<&str>,
		config: &ReplConfig,
		shared: Arc<SessionShared>,
	) -> Result<Self> {
		let javac = resolve_executable(&config.javac)?;
		let jdb = resolve_executable(&config.jdb)?;

		let entry = match entry {
			Some(entry) => entry.to_string(),
			None => source
				.file_stem()
				.map(|stem| stem.to_string_lossy().into_owned())
				.ok_or_else(|| Error::Unsupported(source.display().to_string()))?,
		};
		let class_dir = class_dir_for(source, config);
		tokio::fs::create_dir_all(&class_dir).await?;

		toolchain::compile(&javac, source, &class_dir).await?;
		let child = toolchain::spawn_jdb(&jdb, &class_dir, &entry)?;
		tracing::debug!(session = %shared.id(), pid = ?child.id(), %entry, "Debugger launched");

		Self::attach(ReplIo::from_child(child)?, entry, config, shared).await
	}

	/// Takes over a debugger whose program has not been started yet.
	pub async fn attach(io: ReplIo, entry: String, config: &ReplConfig, shared: Arc<SessionShared>) -> Result<Self> {
		let (init_tx, init_rx) = oneshot::channel();
		let (queue, actor) = CommandQueue::new(
			io.writer,
			io.lines,
			Arc::new(JdbClassifier),
			Arc::clone(&shared),
			config.settle_delay(),
			init_tx,
		);

		let mut tasks = io.readers;
		tasks.push(tokio::spawn(actor.run()));

		let backend = Self {
			queue,
			shared,
			entry,
			pid: io.child.as_ref().and_then(Child::id),
			child: TokioMutex::new(io.child),
			tasks: Mutex::new(tasks),
			quit_grace: config.quit_grace(),
			breakpoint_lock: TokioMutex::new(()),
			stopped: AtomicBool::new(false),
		};

		match backend.run_to_entry(init_rx, config.init_timeout()).await {
			Ok(()) => Ok(backend),
			Err(e) => {
				tracing::warn!(session = %backend.shared.id(), error = %e, "Debugger start-up failed");
				backend.stop().await;
				Err(e)
			}
		}
	}

	async fn run_to_entry(&self, init_rx: oneshot::Receiver<()>, init_timeout: Duration) -> Result<()> {
		match tokio::time::timeout(init_timeout, init_rx).await {
			Ok(Ok(())) => tracing::debug!("Debugger initialized"),
			Ok(Err(_)) => return Err(Error::ProcessExited("debugger exited during start-up".to_string())),
			Err(_) => tracing::warn!(?init_timeout, "No initialization marker, proceeding anyway"),
		}

		let stop_in = format!("stop in {}.main", self.entry);
		self.queue
			.execute(stop_in, false)
			.await
			.ok_or_else(|| Error::ProcessExited("debugger exited during start-up".to_string()))?;

		let run = self
			.queue
			.execute("run", true)
			.await
			.ok_or_else(|| Error::ProcessExited("debugger exited during start-up".to_string()))?;
		if let Some(error) = run.error {
			return Err(Error::ProcessExited(error));
		}
		tracing::debug!(landed = ?run.landed, state = ?self.shared.state(), "Program started");
		Ok(())
	}

	pub fn entry(&self) -> &str {
		&self.entry
	}

	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	pub fn is_in_flight(&self) -> bool {
		self.queue.is_in_flight()
	}

	pub async fn set_breakpoint(&self, line: u32) -> bool {
		let _guard = self.breakpoint_lock.lock().await;
		if self.shared.has_breakpoint(line) {
			return true;
		}
		let location = format!("{}:{}", self.entry, line);
		match self.queue.execute(format!("stop at {location}"), false).await {
			Some(outcome) if outcome.succeeded() => {
				self.shared.record_breakpoint(line, location);
				true
			}
			Some(CommandOutcome { error, .. }) => {
				tracing::warn!(line, error = ?error, "Breakpoint rejected");
				false
			}
			None => false,
		}
	}

	pub async fn resume(&self) -> bool {
		self.command("cont").await
	}

	pub async fn step_over(&self) -> bool {
		self.command("next").await
	}

	pub async fn step_into(&self) -> bool {
		self.command("step").await
	}

	async fn command(&self, text: &str) -> bool {
		match self.queue.execute(text, true).await {
			Some(outcome) if outcome.succeeded() => true,
			Some(outcome) => {
				tracing::warn!(command = text, error = ?outcome.error, "Command failed");
				false
			}
			None => {
				tracing::warn!(command = text, "Command queue closed");
				false
			}
		}
	}

	/// Writes `quit`, waits the grace delay, then kills the debugger. Idempotent.
	pub async fn stop(&self) {
		if self.stopped.swap(true, Ordering::SeqCst) {
			return;
		}
		self.shared.terminate();
		self.queue.shutdown();
		tokio::time::sleep(self.quit_grace).await;

		if let Some(mut child) = self.child.lock().await.take() {
			kill_child(&mut child, Duration::from_millis(500)).await;
		}
		for task in self.tasks.lock().drain(..) {
			task.abort();
		}
		tracing::info!(session = %self.shared.id(), "REPL session stopped");
	}
}

fn class_dir_for(source: &Path, config: &ReplConfig) -> PathBuf {
	config.class_dir.clone().unwrap_or_else(|| {
		source
			.parent()
			.filter(|dir| !dir.as_os_str().is_empty())
			.map(Path::to_path_buf)
			.unwrap_or_else(|| PathBuf::from("."))
	})
}
