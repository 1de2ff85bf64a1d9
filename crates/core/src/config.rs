//! Session configuration.
//!
//! Defaults cover a normal local setup; a JSON file can override any subset
//! of fields, and a handful of environment variables override the file:
//!
//! | Variable             | Field                 |
//! |----------------------|-----------------------|
//! | `STEPWISE_NODE`      | `inspector.node`      |
//! | `STEPWISE_JAVAC`     | `repl.javac`          |
//! | `STEPWISE_JDB`       | `repl.jdb`            |
//! | `STEPWISE_SETTLE_MS` | `repl.settle_ms`      |
//!
//! Durations are stored as milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepwise_runtime::{Error, Result};

pub const ENV_NODE: &str = "STEPWISE_NODE";
pub const ENV_JAVAC: &str = "STEPWISE_JAVAC";
pub const ENV_JDB: &str = "STEPWISE_JDB";
pub const ENV_SETTLE_MS: &str = "STEPWISE_SETTLE_MS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepwiseConfig {
	pub inspector: InspectorConfig,
	pub repl: ReplConfig,
}

/// Settings for the inspector-protocol backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
	/// Runtime executable name or path.
	pub node: String,
	/// Extra runtime flags placed before the script.
	pub extra_args: Vec<String>,
	pub host: String,
	/// 0 lets the runtime choose a free port.
	pub port: u16,
	/// Bound on waiting for the `Debugger listening on` announcement.
	pub endpoint_timeout_ms: u64,
	/// Deadline of each protocol request.
	pub request_timeout_ms: u64,
	/// Bound on waiting for the user script's `Debugger.scriptParsed`.
	pub script_parsed_timeout_ms: u64,
	/// Bound on waiting for the pause at entry.
	pub first_pause_timeout_ms: u64,
}

impl Default for InspectorConfig {
	fn default() -> Self {
		Self {
			node: "node".to_string(),
			extra_args: Vec::new(),
			host: "127.0.0.1".to_string(),
			port: 0,
			endpoint_timeout_ms: 3000,
			request_timeout_ms: 5000,
			script_parsed_timeout_ms: 2000,
			first_pause_timeout_ms: 3000,
		}
	}
}

impl InspectorConfig {
	pub fn endpoint_timeout(&self) -> Duration {
		Duration::from_millis(self.endpoint_timeout_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	pub fn script_parsed_timeout(&self) -> Duration {
		Duration::from_millis(self.script_parsed_timeout_ms)
	}

	pub fn first_pause_timeout(&self) -> Duration {
		Duration::from_millis(self.first_pause_timeout_ms)
	}
}

/// Settings for the line-oriented REPL backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
	pub javac: String,
	pub jdb: String,
	/// Where compiled classes go; the source file's directory when unset.
	pub class_dir: Option<PathBuf>,
	/// Time a command owns the debugger before the next one is written.
	pub settle_ms: u64,
	/// Bound on waiting for the `Initializing jdb` marker.
	pub init_timeout_ms: u64,
	/// Pause between writing `quit` and killing the process.
	pub quit_grace_ms: u64,
}

impl Default for ReplConfig {
	fn default() -> Self {
		Self {
			javac: "javac".to_string(),
			jdb: "jdb".to_string(),
			class_dir: None,
			settle_ms: 500,
			init_timeout_ms: 3000,
			quit_grace_ms: 300,
		}
	}
}

impl ReplConfig {
	pub fn settle_delay(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}

	pub fn init_timeout(&self) -> Duration {
		Duration::from_millis(self.init_timeout_ms)
	}

	pub fn quit_grace(&self) -> Duration {
		Duration::from_millis(self.quit_grace_ms)
	}
}

impl StepwiseConfig {
	/// Loads a JSON config file; missing fields keep their defaults.
	///
	/// # Errors
	///
	/// Returns `Error::Io` if the file cannot be read and `Error::Json` if it
	/// is not a valid config document.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let text = std::fs::read_to_string(path.as_ref())?;
		let config = serde_json::from_str(&text)?;
		Ok(config)
	}

	/// Applies overrides from the process environment.
	///
	/// # Errors
	///
	/// Returns `Error::InvalidConfig` if `STEPWISE_SETTLE_MS` is not an integer.
	pub fn with_env_overrides(self) -> Result<Self> {
		self.with_overrides_from(|key| std::env::var(key).ok())
	}

	/// Applies overrides looked up through `lookup` (the environment in
	/// production, a map in tests).
	pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(node) = lookup(ENV_NODE) {
			self.inspector.node = node;
		}
		if let Some(javac) = lookup(ENV_JAVAC) {
			self.repl.javac = javac;
		}
		if let Some(jdb) = lookup(ENV_JDB) {
			self.repl.jdb = jdb;
		}
		if let Some(settle) = lookup(ENV_SETTLE_MS) {
			self.repl.settle_ms = settle
				.trim()
				.parse()
				.map_err(|_| Error::InvalidConfig(format!("{ENV_SETTLE_MS} must be milliseconds, got {settle:?}")))?;
		}
		Ok(self)
	}
}
