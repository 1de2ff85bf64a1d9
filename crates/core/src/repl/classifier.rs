//! Output line classification for line-oriented debuggers.
//!
//! A REPL debugger never correlates output with the command that caused
//! it, so every line is classified on its own by shape. The strategy is a
//! trait so that a drifting tool version (or another debugger) only needs a
//! new classifier, not a new session state machine.

use std::sync::LazyLock;

use regex::Regex;
use stepwise_protocol::PauseReason;

/// What a single debugger output line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
	/// Execution stopped at `line` (1-based); `reason` is `Breakpoint` or `Step`.
	Landing { reason: PauseReason, line: u32 },
	/// `name = value`, meaningful only while locals are being dumped.
	Assignment { name: String, value: String },
	/// The debuggee finished.
	Exit,
	/// The debugger rejected a command or the program failed.
	Error(String),
	/// The debugger is ready for commands.
	InitMarker,
	/// Nothing but a prompt.
	Blank,
	/// Anything else, with prompts stripped.
	Output(String),
}

/// Strategy turning one raw output line into a [`LineClass`].
pub trait LineClassifier: Send + Sync {
	fn classify(&self, line: &str) -> LineClass;
}

static PROMPT: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^(?:>\s*|[\w$.\-]+\[\d+\]\s*)+").expect("prompt pattern is valid"));
static BREAKPOINT_HIT: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"Breakpoint hit:.*\bline=([\d,]+)").expect("breakpoint pattern is valid"));
static STEP_COMPLETED: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"Step completed:.*\bline=([\d,]+)").expect("step pattern is valid"));
static ASSIGNMENT: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^([A-Za-z_$][\w$]*) = (.*)$").expect("assignment pattern is valid"));

/// Classifier for `jdb` output.
///
/// ```text
/// main[1] Breakpoint hit: "thread=main", Main.main(), line=4 bci=2
/// main[1] Step completed: "thread=main", Main.main(), line=5 bci=9
/// i = 3
/// The application exited
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JdbClassifier;

impl JdbClassifier {
	/// Removes leading `> ` and `thread[n] ` prompts, possibly repeated.
	pub fn strip_prompt(line: &str) -> &str {
		let line = line.trim_end();
		match PROMPT.find(line) {
			Some(prompt) => &line[prompt.end()..],
			None => line,
		}
	}
}

impl LineClassifier for JdbClassifier {
	fn classify(&self, raw: &str) -> LineClass {
		let line = Self::strip_prompt(raw).trim_start();
		if line.is_empty() {
			return LineClass::Blank;
		}

		if let Some(n) = capture_line(&BREAKPOINT_HIT, line) {
			return LineClass::Landing {
				reason: PauseReason::Breakpoint,
				line: n,
			};
		}
		if let Some(n) = capture_line(&STEP_COMPLETED, line) {
			return LineClass::Landing {
				reason: PauseReason::Step,
				line: n,
			};
		}
		if line.starts_with("The application exited") {
			return LineClass::Exit;
		}
		if line.starts_with("Exception occurred")
			|| line.starts_with("Unable to set")
			|| line.starts_with("Error:")
			|| line.contains("is not a valid line number")
		{
			return LineClass::Error(line.to_string());
		}
		if line.starts_with("Initializing jdb") {
			return LineClass::InitMarker;
		}
		if let Some(captures) = ASSIGNMENT.captures(line) {
			return LineClass::Assignment {
				name: captures[1].to_string(),
				value: captures[2].to_string(),
			};
		}
		LineClass::Output(line.to_string())
	}
}

fn capture_line(pattern: &Regex, line: &str) -> Option<u32> {
	let captures = pattern.captures(line)?;
	captures[1].replace(',', "").parse().ok()
}
