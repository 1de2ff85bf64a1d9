//! Debugger toolchain lookup
//!
//! Resolves the executables a backend needs (`node`, `javac`, `jdb`) before
//! anything is spawned, so a missing tool surfaces as a clear error instead
//! of an opaque spawn failure halfway through session start.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Resolve a configured program name or path to an executable path.
///
/// Lookup order:
/// 1. A value containing a path separator is taken as a path and must exist
/// 2. Otherwise the name is searched on `PATH`
///
/// # Errors
///
/// Returns `Error::ToolNotFound` if the program cannot be located.
pub fn resolve_executable(program: &str) -> Result<PathBuf> {
	if program.is_empty() {
		return Err(Error::ToolNotFound("<empty>".to_string()));
	}

	let as_path = Path::new(program);
	if as_path.components().count() > 1 {
		if as_path.exists() {
			debug!(program, "Using explicit executable path");
			return Ok(as_path.to_path_buf());
		}
		return Err(Error::ToolNotFound(program.to_string()));
	}

	match which::which(program) {
		Ok(path) => {
			debug!(program, path = %path.display(), "Resolved executable on PATH");
			Ok(path)
		}
		Err(_) => Err(Error::ToolNotFound(program.to_string())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_missing_program_is_tool_not_found() {
		let result = resolve_executable("stepwise-definitely-not-installed-tool");
		assert!(matches!(result, Err(Error::ToolNotFound(_))));
	}

	#[test]
	fn test_missing_explicit_path_is_tool_not_found() {
		let result = resolve_executable("/nonexistent/dir/node");
		assert!(matches!(result, Err(Error::ToolNotFound(_))));
	}

	#[test]
	fn test_explicit_path_is_returned_as_is() {
		let dir = tempfile::tempdir().unwrap();
		let fake = dir.path().join("fake-node");
		std::fs::write(&fake, b"").unwrap();

		let resolved = resolve_executable(fake.to_str().unwrap()).unwrap();
		assert_eq!(resolved, fake);
	}

	#[test]
	fn test_empty_program_rejected() {
		assert!(matches!(resolve_executable(""), Err(Error::ToolNotFound(_))));
	}
}
