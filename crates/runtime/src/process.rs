//! Inspector process management
//!
//! Launches a Node.js runtime paused on its first statement with the
//! inspector listening, and discovers where it is listening. The endpoint
//! is only known once the runtime prints its announcement on stderr:
//!
//! ```text
//! Debugger listening on ws://127.0.0.1:40123/6e1c1d7e-2c0f-4c52-9b53-0f3f7c1b5d2a
//! ```
//!
//! so launching waits for that line (bounded) before handing the process back.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::lines::spawn_line_reader;

static ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"Debugger listening on ws://(\[[^\]]+\]|[^\s:/]+):(\d+)(/\S*)")
		.expect("announcement pattern is valid")
});

/// Where a paused runtime's inspector is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorEndpoint {
	pub host: String,
	pub port: u16,
	/// Path component including the leading slash (the target id).
	pub path: String,
}

impl InspectorEndpoint {
	/// Extracts the endpoint from a runtime's stderr announcement line.
	pub fn parse_announcement(line: &str) -> Option<Self> {
		let captures = ANNOUNCEMENT.captures(line)?;
		Some(Self {
			host: captures[1].to_string(),
			port: captures[2].parse().ok()?,
			path: captures[3].to_string(),
		})
	}

	pub fn ws_url(&self) -> String {
		format!("ws://{}:{}{}", self.host, self.port, self.path)
	}
}

/// How to launch an inspectable runtime.
#[derive(Debug, Clone)]
pub struct InspectorLaunch {
	/// Resolved runtime executable.
	pub node: PathBuf,
	/// Script to run.
	pub script: PathBuf,
	/// Extra runtime flags placed before the script.
	pub extra_args: Vec<String>,
	pub host: String,
	/// Inspector port; 0 lets the runtime pick one.
	pub port: u16,
	/// How long to wait for the endpoint announcement.
	pub endpoint_timeout: Duration,
}

/// A runtime process paused at entry with its discovered endpoint.
#[derive(Debug)]
pub struct InspectorProcess {
	/// The runtime child process.
	pub process: Child,
	pub endpoint: InspectorEndpoint,
	stdout: Option<mpsc::UnboundedReceiver<String>>,
	stderr: Option<mpsc::UnboundedReceiver<String>>,
}

impl InspectorProcess {
	/// Launch the runtime and wait for its endpoint announcement.
	///
	/// # Errors
	///
	/// Returns `Error::LaunchFailed` if the process cannot be spawned,
	/// `Error::ProcessExited` if it exits before announcing (stderr is
	/// included), and `Error::ConnectionFailed` if no announcement arrives
	/// within `endpoint_timeout`. The process is killed in both failure cases.
	pub async fn launch(options: &InspectorLaunch) -> Result<Self> {
		let mut cmd = Command::new(&options.node);
		cmd.arg(format!("--inspect-brk={}:{}", options.host, options.port))
			.args(&options.extra_args)
			.arg(&options.script)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		if let Some(dir) = options.script.parent().filter(|d| !d.as_os_str().is_empty()) {
			cmd.current_dir(dir);
		}

		let mut child = cmd.spawn().map_err(|e| {
			Error::LaunchFailed(format!("{}: {}", options.node.display(), e))
		})?;

		let stdout = child.stdout.take().map(|out| spawn_line_reader(out, "stdout").0);
		let Some(stderr) = child.stderr.take() else {
			kill_child(&mut child, Duration::from_millis(500)).await;
			return Err(Error::LaunchFailed("runtime stderr was not captured".to_string()));
		};
		let (mut stderr, _) = spawn_line_reader(stderr, "stderr");

		let mut preamble = Vec::new();
		let waited = tokio::time::timeout(options.endpoint_timeout, async {
			while let Some(line) = stderr.recv().await {
				if let Some(endpoint) = InspectorEndpoint::parse_announcement(&line) {
					return Some(endpoint);
				}
				preamble.push(line);
			}
			None
		})
		.await;

		match waited {
			Ok(Some(endpoint)) => {
				tracing::debug!(url = %endpoint.ws_url(), pid = ?child.id(), "Inspector endpoint announced");
				Ok(Self {
					process: child,
					endpoint,
					stdout,
					stderr: Some(stderr),
				})
			}
			Ok(None) => {
				kill_child(&mut child, Duration::from_millis(500)).await;
				Err(Error::ProcessExited(format!(
					"runtime exited before announcing a debugger endpoint: {}",
					preamble.join("\n")
				)))
			}
			Err(_) => {
				kill_child(&mut child, Duration::from_millis(500)).await;
				Err(Error::ConnectionFailed(format!(
					"no debugger endpoint announced within {}ms",
					options.endpoint_timeout.as_millis()
				)))
			}
		}
	}

	pub fn pid(&self) -> Option<u32> {
		self.process.id()
	}

	/// Takes the program's stdout line stream (once).
	pub fn take_stdout(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
		self.stdout.take()
	}

	/// Takes the remaining stderr line stream (once), positioned after the announcement.
	pub fn take_stderr(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
		self.stderr.take()
	}

	/// Force kill the runtime. Killing an exited process is not an error.
	pub async fn kill(&mut self) {
		kill_child(&mut self.process, Duration::from_millis(500)).await;
	}
}

/// Kills a child and reaps it, waiting at most `wait` for the exit status.
pub async fn kill_child(child: &mut Child, wait: Duration) {
	#[cfg(windows)]
	{
		drop(child.stdin.take());
		drop(child.stdout.take());
		drop(child.stderr.take());
	}

	if let Err(e) = child.start_kill() {
		tracing::debug!(error = %e, "kill failed (process likely already exited)");
	}
	let _ = tokio::time::timeout(wait, child.wait()).await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_announcement() {
		let line = "Debugger listening on ws://127.0.0.1:40123/6e1c1d7e-2c0f-4c52-9b53-0f3f7c1b5d2a";
		let endpoint = InspectorEndpoint::parse_announcement(line).unwrap();
		assert_eq!(endpoint.host, "127.0.0.1");
		assert_eq!(endpoint.port, 40123);
		assert_eq!(endpoint.path, "/6e1c1d7e-2c0f-4c52-9b53-0f3f7c1b5d2a");
		assert_eq!(endpoint.ws_url(), line.trim_start_matches("Debugger listening on "));
	}

	#[test]
	fn test_parse_announcement_ipv6_host() {
		let endpoint =
			InspectorEndpoint::parse_announcement("Debugger listening on ws://[::1]:9229/abc").unwrap();
		assert_eq!(endpoint.host, "[::1]");
		assert_eq!(endpoint.port, 9229);
		assert_eq!(endpoint.ws_url(), "ws://[::1]:9229/abc");
	}

	#[test]
	fn test_unrelated_lines_do_not_match() {
		assert!(InspectorEndpoint::parse_announcement("For help, see: https://nodejs.org/en/docs/inspector").is_none());
		assert!(InspectorEndpoint::parse_announcement("Debugger attached.").is_none());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_launch_reports_early_exit() {
		let dir = tempfile::tempdir().unwrap();
		let fake_node = dir.path().join("fake-node");
		std::fs::write(&fake_node, "#!/bin/sh\necho 'node: bad option' >&2\nexit 9\n").unwrap();
		use std::os::unix::fs::PermissionsExt;
		std::fs::set_permissions(&fake_node, std::fs::Permissions::from_mode(0o755)).unwrap();

		let options = InspectorLaunch {
			node: fake_node,
			script: dir.path().join("main.js"),
			extra_args: Vec::new(),
			host: "127.0.0.1".to_string(),
			port: 0,
			endpoint_timeout: Duration::from_secs(5),
		};

		match InspectorProcess::launch(&options).await {
			Err(Error::ProcessExited(msg)) => assert!(msg.contains("bad option")),
			other => panic!("Expected ProcessExited, got {:?}", other.map(|p| p.endpoint)),
		}
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_launch_times_out_without_announcement() {
		let dir = tempfile::tempdir().unwrap();
		let fake_node = dir.path().join("silent-node");
		std::fs::write(&fake_node, "#!/bin/sh\nsleep 5\n").unwrap();
		use std::os::unix::fs::PermissionsExt;
		std::fs::set_permissions(&fake_node, std::fs::Permissions::from_mode(0o755)).unwrap();

		let options = InspectorLaunch {
			node: fake_node,
			script: dir.path().join("main.js"),
			extra_args: Vec::new(),
			host: "127.0.0.1".to_string(),
			port: 0,
			endpoint_timeout: Duration::from_millis(100),
		};

		let result = InspectorProcess::launch(&options).await;
		assert!(matches!(result, Err(Error::ConnectionFailed(_))));
	}
}
