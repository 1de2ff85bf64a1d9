use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default filter directives for a `-v` count. `RUST_LOG` takes precedence.
pub fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error",
		// Session lifecycle, without per-request connection chatter.
		1 => "info,stepwise_runtime=warn",
		_ => "debug",
	}
}

/// Installs a compact stderr subscriber; stdout is reserved for JSON lines.
pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_ansi(std::io::stderr().is_terminal())
		.with_target(verbosity > 1)
		.compact()
		.init();
}
