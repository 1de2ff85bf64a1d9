//! Error types for the debugger runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a debugger backend.
#[derive(Debug, Error)]
pub enum Error {
	/// A required executable (node, javac, jdb) could not be located.
	#[error("Executable not found: {0}. Check that it is installed and on PATH.")]
	ToolNotFound(String),

	/// Failed to spawn a backend process.
	#[error("Failed to launch {0}")]
	LaunchFailed(String),

	/// Failed to reach the debugger endpoint.
	#[error("Failed to connect to debugger: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (pipe or WebSocket I/O).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Malformed or unexpected protocol traffic.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error reply sent by the debugger for a specific request.
	#[error("Debugger error {code}: {message}")]
	Remote {
		/// Protocol error code (JSON-RPC style, e.g. -32000)
		code: i64,
		/// Human-readable error message
		message: String,
	},

	/// A request or wait exceeded its deadline.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The backing process is gone.
	#[error("Process exited: {0}")]
	ProcessExited(String),

	/// The compile step exited with a non-zero status.
	#[error("Compilation failed:\n{diagnostics}")]
	CompileFailed {
		/// Captured compiler output (stdout followed by stderr).
		diagnostics: String,
	},

	/// Unknown session or breakpoint.
	#[error("Not found: {0}")]
	NotFound(String),

	/// No backend handles the requested source.
	#[error("Unsupported source: {0}")]
	Unsupported(String),

	/// A configuration value could not be used.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	/// Channel closed before a reply arrived.
	#[error("Connection closed before a reply arrived")]
	ChannelClosed,

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the error means the backend is no longer reachable.
	pub fn is_disconnected(&self) -> bool {
		matches!(
			self,
			Error::ChannelClosed | Error::ProcessExited(_) | Error::TransportError(_)
		)
	}

	/// Returns the compiler output if this is a compile failure.
	pub fn diagnostics(&self) -> Option<&str> {
		match self {
			Error::CompileFailed { diagnostics } => Some(diagnostics),
			_ => None,
		}
	}
}
