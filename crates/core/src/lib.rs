//! stepwise: uniform debug sessions over heterogeneous debugger backends
//!
//! A [`DebugSession`] sets breakpoints, resumes, steps and reports variable
//! snapshots the same way whether the program runs under the V8 inspector
//! (`node --inspect-brk`, JSON over WebSocket) or under `jdb` (line-oriented
//! text over standard streams).
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use stepwise::{SessionEvent, SessionRegistry, StepwiseConfig};
//!
//! #[tokio::main]
//! async fn main() -> stepwise::Result<()> {
//!     let registry = SessionRegistry::new(StepwiseConfig::default().with_env_overrides()?);
//!     let id = registry.create("loop.js", None, None).await?;
//!     let session = registry.get(id)?;
//!
//!     session.set_breakpoint(2).await;
//!     let mut events = session.subscribe();
//!     session.resume().await;
//!     while let Some(event) = events.recv().await {
//!         if let SessionEvent::VariablesUpdated { variables } = &event {
//!             println!("{variables:?}");
//!             break;
//!         }
//!     }
//!
//!     registry.stop(id).await
//! }
//! ```
//!
//! # Main Types
//!
//! - [`SessionRegistry`] - Creates sessions by source type and tracks them by id
//! - [`DebugSession`] - Operations and events for one debuggee
//! - [`SessionEvent`] - `breakpointHit`, `stepComplete`, `variablesUpdated`, `output`
//! - [`StepwiseConfig`] - Tool paths and timing, from defaults, a JSON file or the environment
//! - [`LineClassifier`] - Interpretation of a line-oriented debugger's output

pub mod config;
pub mod events;
mod inspector;
pub mod registry;
pub mod repl;
pub mod session;

pub use config::{InspectorConfig, ReplConfig, StepwiseConfig};
pub use events::{EventStream, EventWaiter, OutputKind, SessionEvent, Subscription};
pub use registry::{SessionMetadata, SessionRegistry};
pub use repl::{JdbClassifier, LineClass, LineClassifier, ReplIo};
pub use session::{BackendKind, DebugSession, ExecutionState, SessionId};
pub use stepwise_protocol::{PauseReason, ValueType, Variable, Variables};
pub use stepwise_runtime::{Error, Result, TransportParts};
