//! Session registry.
//!
//! Owns every live [`DebugSession`] by id. An entry is removed when it is
//! stopped through the registry or when its session terminates on its own
//! (the debuggee exited or its debugger went away).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use serde::Serialize;
use stepwise_runtime::{Error, Result};

use crate::config::StepwiseConfig;
use crate::session::{BackendKind, DebugSession, SessionId};

/// What the registry records about a session when it is created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
	pub id: SessionId,
	pub kind: BackendKind,
	pub source: PathBuf,
	/// Script file name or entry class.
	pub entry: String,
	pub pid: Option<u32>,
	pub created_at: SystemTime,
}

struct RegistryEntry {
	session: Arc<DebugSession>,
	metadata: SessionMetadata,
}

/// Creates, looks up and tears down sessions.
pub struct SessionRegistry {
	sessions: Arc<DashMap<SessionId, RegistryEntry>>,
	config: StepwiseConfig,
}

impl Default for SessionRegistry {
	fn default() -> Self {
		Self::new(StepwiseConfig::default())
	}
}

impl SessionRegistry {
	pub fn new(config: StepwiseConfig) -> Self {
		Self {
			sessions: Arc::new(DashMap::new()),
			config,
		}
	}

	pub fn config(&self) -> &StepwiseConfig {
		&self.config
	}

	/// Starts a session for `source` and registers it.
	///
	/// The backend is `kind` when given, otherwise inferred from the
	/// source's extension.
	///
	/// # Errors
	///
	/// Whatever [`DebugSession::start_with_kind`] fails with; nothing is
	/// registered in that case.
	pub async fn create(
		&self,
		source: impl AsRef<Path>,
		entry: Option<&str>,
		kind: Option<BackendKind>,
	) -> Result<SessionId> {
		let source = source.as_ref();
		let kind = match kind {
			Some(kind) => kind,
			None => BackendKind::from_path(source)?,
		};
		let session = DebugSession::start_with_kind(kind, source, entry, &self.config).await?;
		Ok(self.register(session, source))
	}

	/// Takes ownership of an already started session.
	///
	/// Must be called from within a Tokio runtime: a watcher task removes
	/// the entry once the session terminates.
	pub fn register(&self, session: DebugSession, source: impl Into<PathBuf>) -> SessionId {
		let id = session.id();
		let metadata = SessionMetadata {
			id,
			kind: session.kind(),
			source: source.into(),
			entry: session.entry().to_string(),
			pid: session.pid(),
			created_at: SystemTime::now(),
		};
		let session = Arc::new(session);
		self.sessions.insert(
			id,
			RegistryEntry {
				session: Arc::clone(&session),
				metadata,
			},
		);
		tracing::debug!(session = %id, live = self.sessions.len(), "Session registered");

		let sessions = Arc::downgrade(&self.sessions);
		tokio::spawn(async move {
			session.wait_terminated().await;
			if let Some(sessions) = sessions.upgrade() {
				if sessions.remove(&id).is_some() {
					tracing::info!(session = %id, "Session terminated, removed from registry");
				}
			}
			// Releases whatever the backend still holds.
			session.stop().await;
		});

		id
	}

	/// # Errors
	///
	/// `Error::NotFound` for an unknown (or already removed) id.
	pub fn get(&self, id: SessionId) -> Result<Arc<DebugSession>> {
		self.sessions
			.get(&id)
			.map(|entry| Arc::clone(&entry.session))
			.ok_or_else(|| not_found(id))
	}

	/// # Errors
	///
	/// `Error::NotFound` for an unknown id.
	pub fn metadata(&self, id: SessionId) -> Result<SessionMetadata> {
		self.sessions
			.get(&id)
			.map(|entry| entry.metadata.clone())
			.ok_or_else(|| not_found(id))
	}

	/// Metadata of every live session, oldest first.
	pub fn list(&self) -> Vec<SessionMetadata> {
		let mut all: Vec<_> = self.sessions.iter().map(|entry| entry.metadata.clone()).collect();
		all.sort_by_key(|metadata| metadata.created_at);
		all
	}

	/// Removes the session and tears it down.
	///
	/// # Errors
	///
	/// `Error::NotFound` if no session has this id. Stopping the session
	/// itself never fails.
	pub async fn stop(&self, id: SessionId) -> Result<()> {
		let (_, entry) = self.sessions.remove(&id).ok_or_else(|| not_found(id))?;
		entry.session.stop().await;
		tracing::info!(session = %id, "Session stopped");
		Ok(())
	}

	/// Drops entries whose session already terminated. Returns how many.
	pub fn reap(&self) -> usize {
		let before = self.sessions.len();
		self.sessions.retain(|_, entry| !entry.session.is_terminated());
		before.saturating_sub(self.sessions.len())
	}

	pub async fn stop_all(&self) {
		let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
		for id in ids {
			// Entries can vanish concurrently through their watcher.
			let _ = self.stop(id).await;
		}
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}

fn not_found(id: SessionId) -> Error {
	Error::NotFound(format!("session {id}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn unknown_ids_are_not_found() {
		let registry = SessionRegistry::default();
		let id = SessionId::new();

		assert!(matches!(registry.get(id), Err(Error::NotFound(_))));
		assert!(matches!(registry.metadata(id), Err(Error::NotFound(_))));
		assert!(matches!(registry.stop(id).await, Err(Error::NotFound(_))));
		assert!(registry.is_empty());
	}

	#[tokio::test]
	async fn failed_create_registers_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let script = dir.path().join("build.sh");
		std::fs::write(&script, "echo hi\n").unwrap();

		let registry = SessionRegistry::default();
		let err = registry.create(&script, None, None).await.unwrap_err();
		assert!(matches!(err, Error::Unsupported(_)));

		let err = registry
			.create(dir.path().join("missing.js"), None, None)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
		assert_eq!(registry.len(), 0);
	}

	#[tokio::test]
	async fn explicit_kind_skips_extension_inference() {
		let dir = tempfile::tempdir().unwrap();
		let script = dir.path().join("program.txt");
		std::fs::write(&script, "console.log(1)\n").unwrap();

		let mut config = StepwiseConfig::default();
		config.inspector.node = "stepwise-no-such-node".to_string();
		let registry = SessionRegistry::new(config);

		// Gets past extension checks and fails on the missing runtime instead.
		let err = registry
			.create(&script, None, Some(BackendKind::MessageProtocol))
			.await
			.unwrap_err();
		assert!(matches!(err, Error::ToolNotFound(_)));
		assert!(registry.is_empty());
	}
}
