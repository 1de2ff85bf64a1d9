//! Compile and launch steps for the REPL backend.

use std::path::Path;
use std::process::Stdio;

use stepwise_runtime::{Error, Result};
use tokio::process::{Child, Command};

/// Compiles `source` with debug info into `class_dir`.
///
/// # Errors
///
/// `Error::CompileFailed` carrying stdout followed by stderr when the
/// compiler exits non-zero, `Error::LaunchFailed` if it cannot be spawned.
pub async fn compile(javac: &Path, source: &Path, class_dir: &Path) -> Result<()> {
	let output = Command::new(javac)
		.arg("-g")
		.arg("-d")
		.arg(class_dir)
		.arg(source)
		.stdin(Stdio::null())
		.output()
		.await
		.map_err(|e| Error::LaunchFailed(format!("{}: {}", javac.display(), e)))?;

	if output.status.success() {
		tracing::debug!(source = %source.display(), class_dir = %class_dir.display(), "Compiled");
		return Ok(());
	}

	let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
	diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
	tracing::debug!(status = ?output.status.code(), "Compilation failed");
	Err(Error::CompileFailed { diagnostics })
}

/// Spawns the debugger on `entry` with every stream piped.
pub fn spawn_jdb(jdb: &Path, class_dir: &Path, entry: &str) -> Result<Child> {
	Command::new(jdb)
		.arg("-classpath")
		.arg(class_dir)
		.arg(entry)
		.current_dir(class_dir)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true)
		.spawn()
		.map_err(|e| Error::LaunchFailed(format!("{}: {}", jdb.display(), e)))
}
