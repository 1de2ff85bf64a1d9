//! Wire types for the V8 inspector debugging protocol.
//!
//! Only the slice of the `Debugger` and `Runtime` domains that a
//! breakpoint/step/variables session needs is modelled here. Everything else
//! the inspector sends is passed around as raw [`serde_json::Value`] by the
//! runtime crate.
//!
//! # Main Types
//!
//! - [`RemoteObject`] - A mirrored JavaScript value, with [`format_remote_object`]
//! - [`PausedEvent`] - Payload of `Debugger.paused`
//! - [`PauseReason`] - Maps a pause reason to the high-level event it produces
//! - [`Variable`] / [`Variables`] - Backend-neutral variable snapshot entries

pub mod debugger;
pub mod format;
pub mod methods;
pub mod runtime;
pub mod types;

pub use debugger::{
	CallFrame, GetScriptSourceResult, Location, PauseReason, PausedEvent, Scope,
	ScopeType, ScriptParsedEvent, SetBreakpointByUrlParams, SetBreakpointByUrlResult,
};
pub use format::{format_remote_object, value_type_of};
pub use runtime::{
	ConsoleApiCalledEvent, ExceptionDetails, ExceptionThrownEvent, GetPropertiesParams,
	GetPropertiesResult, PropertyDescriptor, RemoteObject,
};
pub use types::{ValueType, Variable, Variables};
