//! Stepwise Runtime - Debugger process lifecycle, transports, and correlation
//!
//! This crate provides the low-level plumbing shared by the debug-session
//! backends:
//!
//! - **Toolchain lookup**: Locating `node`, `javac` and `jdb` before spawning
//! - **Process management**: Launching an inspectable runtime and discovering its endpoint
//! - **Transport**: Bidirectional JSON messages over WebSocket or newline-delimited pipes
//! - **Connection**: Request/response correlation by id, deadlines, and event forwarding
//! - **Line pumps**: Turning child process output into line channels
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   stepwise   │  Sessions, adapters, registry
//! └──────┬───────┘
//!        │ Connection::send_message / EventReceiver
//! ┌──────▼───────┐
//! │   runtime    │  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  id correlation, pending table
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket / pipe
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Process│  │  --inspect-brk launch
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod driver;
pub mod error;
pub mod lines;
pub mod process;
pub mod transport;

pub use connection::{Connection, Event, EventReceiver, Message, Request, Response};
pub use driver::resolve_executable;
pub use error::{Error, Result};
pub use lines::{spawn_line_forwarder, spawn_line_reader};
pub use process::{InspectorEndpoint, InspectorLaunch, InspectorProcess, kill_child};
pub use transport::{
	PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts, TransportReceiver,
	WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender,
};
