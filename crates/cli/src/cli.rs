use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand, ValueEnum};
use stepwise::BackendKind;

fn help_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "stepwise")]
#[command(about = "Drive node and jdb debug sessions from the command line")]
#[command(version)]
#[command(styles = help_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// JSON configuration file (tool paths, timeouts, settle delay)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Start a session and run a fixed script of debugger actions
	Run(RunArgs),

	/// Classify jdb output lines read from stdin
	Classify,

	/// Print the effective configuration
	Config,
}

/// Backend override for sources whose extension does not say.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliBackend {
	/// V8 inspector (`node --inspect-brk`)
	Inspector,
	/// Line-oriented debugger (`jdb`)
	Repl,
}

impl From<CliBackend> for BackendKind {
	fn from(backend: CliBackend) -> Self {
		match backend {
			CliBackend::Inspector => BackendKind::MessageProtocol,
			CliBackend::Repl => BackendKind::Repl,
		}
	}
}

#[derive(Args, Debug)]
pub struct RunArgs {
	/// Program to debug (.js, .mjs, .cjs or .java)
	pub source: PathBuf,

	/// Entry class for Java sources (defaults to the file stem)
	#[arg(long, value_name = "CLASS")]
	pub entry: Option<String>,

	/// Backend to use instead of inferring it from the extension
	#[arg(long, value_enum)]
	pub backend: Option<CliBackend>,

	/// 1-based line to break on (repeatable)
	#[arg(short = 'b', long = "break", value_name = "LINE")]
	pub breakpoints: Vec<u32>,

	/// Number of times to continue
	#[arg(long = "continue", value_name = "N", default_value_t = 0)]
	pub continues: u32,

	/// Number of step-over commands after continuing
	#[arg(long, value_name = "N", default_value_t = 0)]
	pub step_over: u32,

	/// Number of step-into commands after stepping over
	#[arg(long, value_name = "N", default_value_t = 0)]
	pub step_into: u32,

	/// How long to wait for each landing before moving on
	#[arg(long, value_name = "MS", default_value_t = 10_000)]
	pub wait_ms: u64,
}
