//! Request/response correlation for the inspector protocol.
//!
//! This module implements the correlation layer on top of a transport.
//! It handles:
//! - Generating unique, increasing request ids
//! - Recording each outstanding request with its deadline
//! - Correlating replies with pending requests by id
//! - Forwarding id-less messages to the owner as events
//!
//! # Message Flow
//!
//! 1. Caller invokes `send_message()` with a method and params
//! 2. Connection allocates an id and parks a oneshot sender in the pending table
//! 3. Request is serialized and queued for the writer task
//! 4. Caller awaits the oneshot receiver, bounded by the request deadline
//! 5. Message loop receives the reply and resolves the matching entry
//!
//! Replies may arrive in any order; only the id matters.


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex as ParkingLotMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Default deadline for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol request message sent to the debugger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request id for correlating the reply
	pub id: u64,
	/// Method name to invoke, e.g. `Debugger.resume`
	pub method: String,
	/// Method parameters as a JSON object
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub params: Value,
}

/// Reply to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request id this reply correlates to
	pub id: u64,
	/// Success result (mutually exclusive with error)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
}

/// Protocol error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	#[serde(default)]
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// Asynchronous notification from the debugger (no id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	/// Event method name, e.g. `Debugger.paused`
	pub method: String,
	/// Event parameters as a JSON object
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Reply message (has `id` field)
	Response(Response),
	/// Event message (no `id` field)
	Event(Event),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}

/// One outstanding request.
struct PendingRequest {
	method: String,
	deadline: Instant,
	tx: oneshot::Sender<Result<Value>>,
}

/// Pending requests keyed by request id.
type CallbackMap = Arc<TokioMutex<HashMap<u64, PendingRequest>>>;

/// Receiving end for events demultiplexed by the connection.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

enum Outbound {
	Message(Value),
	Close,
}

/// RAII guard ensuring callback cleanup when a request future is dropped.
struct CancelGuard {
	id: u64,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u64, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		let id = self.id;
		let callbacks = Arc::clone(&self.callbacks);

		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				if callbacks.lock().await.remove(&id).is_some() {
					tracing::debug!(id, "CancelGuard: removed orphaned callback");
				}
			});
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// JSON message connection to a debugger.
///
/// Manages request/reply correlation and event forwarding.
/// Uses increasing request ids and oneshot channels for correlation.
pub struct Connection {
	/// Next request id (atomic for concurrent senders)
	last_id: AtomicU64,
	/// Deadline applied to each request
	request_timeout: Duration,
	/// Pending request table keyed by id
	callbacks: CallbackMap,
	/// Channel for sending outbound messages to the writer task
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	/// Transport sender (taken by run() to start writer task)
	transport_sender: TokioMutex<Option<Box<dyn Transport>>>,
	/// Receiver half of transport (taken by run() to start reader task)
	transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
	/// Decoded inbound messages produced by the reader
	message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Outbound queue consumed by the writer task
	outbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
	/// Event sink; dropped when the connection ends so the owner sees EOF
	event_tx: ParkingLotMutex<Option<mpsc::UnboundedSender<Event>>>,
	/// Abort handle of the reader task, used by close()
	reader_abort: ParkingLotMutex<Option<AbortHandle>>,
	closed: AtomicBool,
}

impl Connection {
	/// Creates a connection over the given transport and returns it with
	/// the receiver for id-less messages.
	pub fn new(parts: TransportParts) -> (Self, EventReceiver) {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (event_tx, event_rx) = mpsc::unbounded_channel();

		let connection = Self {
			last_id: AtomicU64::new(1),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			callbacks: Arc::new(TokioMutex::new(HashMap::new())),
			outbound_tx,
			transport_sender: TokioMutex::new(Some(sender)),
			transport_receiver: TokioMutex::new(Some(receiver)),
			message_rx: TokioMutex::new(Some(message_rx)),
			outbound_rx: TokioMutex::new(Some(outbound_rx)),
			event_tx: ParkingLotMutex::new(Some(event_tx)),
			reader_abort: ParkingLotMutex::new(None),
			closed: AtomicBool::new(false),
		};

		(connection, event_rx)
	}

	/// Overrides the per-request deadline.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// Sends a request and awaits its reply.
	///
	/// Fails with [`Error::Timeout`] when no reply arrives before the
	/// deadline (only this request is affected) and with
	/// [`Error::ChannelClosed`] when the connection goes away first.
	pub async fn send_message(&self, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let deadline = Instant::now() + self.request_timeout;

		tracing::debug!(id, method, "Sending request");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().await.insert(
			id,
			PendingRequest {
				method: method.to_string(),
				deadline,
				tx,
			},
		);

		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		// close() may have drained the table between the check above and the insert.
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let request = Request {
			id,
			method: method.to_string(),
			params,
		};
		let request_value = serde_json::to_value(&request)?;

		if self.outbound_tx.send(Outbound::Message(request_value)).is_err() {
			tracing::error!("Failed to queue message: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		match tokio::time::timeout_at(deadline, ResponseFuture { rx, guard }).await {
			Ok(result) => result,
			Err(_) => {
				self.callbacks.lock().await.remove(&id);
				tracing::warn!(id, method, "Request timed out");
				Err(Error::Timeout(format!(
					"{method} (id={id}) got no reply within {}ms",
					self.request_timeout.as_millis()
				)))
			}
		}
	}

	/// Number of requests still awaiting a reply.
	pub async fn pending_count(&self) -> usize {
		self.callbacks.lock().await.len()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Closes the connection. Every pending request fails with
	/// [`Error::ChannelClosed`]; closing an already-closed connection is a no-op.
	pub async fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		tracing::debug!("Closing connection");
		let _ = self.outbound_tx.send(Outbound::Close);
		self.fail_pending().await;

		if let Some(abort) = self.reader_abort.lock().take() {
			abort.abort();
		}
		Ok(())
	}

	async fn fail_pending(&self) {
		let drained: Vec<(u64, PendingRequest)> = self.callbacks.lock().await.drain().collect();
		for (id, pending) in drained {
			tracing::debug!(id, method = %pending.method, "Failing pending request");
			let _ = pending.tx.send(Err(Error::ChannelClosed));
		}
	}

	/// Run the message dispatch loop.
	///
	/// Returns when the transport reaches EOF or the connection is closed.
	/// On return every pending request has been failed and the event
	/// receiver observes end-of-stream.
	pub async fn run(self: &Arc<Self>) {
		let (Some(mut transport_receiver), Some(mut transport_sender), Some(mut outbound_rx)) = (
			self.transport_receiver.lock().await.take(),
			self.transport_sender.lock().await.take(),
			self.outbound_rx.lock().await.take(),
		) else {
			tracing::error!("Connection::run called more than once");
			return;
		};

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!("Transport read error: {}", e);
			}
		});
		*self.reader_abort.lock() = Some(reader_handle.abort_handle());
		if self.is_closed() {
			reader_handle.abort();
		}

		let writer_handle = tokio::spawn(async move {
			while let Some(outbound) = outbound_rx.recv().await {
				match outbound {
					Outbound::Message(message) => {
						if let Err(e) = transport_sender.send(message).await {
							tracing::error!("Transport write error: {}", e);
							break;
						}
					}
					Outbound::Close => {
						if let Err(e) = transport_sender.close().await {
							tracing::debug!("Transport close error (ignored): {}", e);
						}
						break;
					}
				}
			}
		});

		let message_rx = self.message_rx.lock().await.take();
		if let Some(mut message_rx) = message_rx {
			while let Some(message_value) = message_rx.recv().await {
				match serde_json::from_value::<Message>(message_value) {
					Ok(message) => {
						if let Err(e) = self.dispatch_internal(message).await {
							tracing::warn!("Error dispatching message: {}", e);
						}
					}
					Err(e) => {
						tracing::warn!("Failed to parse message: {}", e);
					}
				}
			}
		}

		self.closed.store(true, Ordering::SeqCst);
		self.fail_pending().await;
		self.event_tx.lock().take();
		let _ = self.outbound_tx.send(Outbound::Close);

		let _ = reader_handle.await;
		let _ = writer_handle.await;
		tracing::debug!("Connection loop finished");
	}

	/// Dispatch an incoming message (test-only public version)
	#[cfg(test)]
	pub async fn dispatch(&self, message: Message) -> Result<()> {
		self.dispatch_internal(message).await
	}

	async fn dispatch_internal(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let pending = self
					.callbacks
					.lock()
					.await
					.remove(&response.id)
					.ok_or_else(|| {
						Error::ProtocolError(format!(
							"Cannot find request to respond: id={}",
							response.id
						))
					})?;

				if Instant::now() > pending.deadline {
					tracing::debug!(id = response.id, method = %pending.method, "Reply arrived after deadline");
				}

				let result = if let Some(error) = response.error {
					Err(parse_protocol_error(error))
				} else {
					Ok(response.result.unwrap_or(Value::Null))
				};

				let _ = pending.tx.send(result);
				Ok(())
			}
			Message::Event(event) => {
				tracing::trace!(method = %event.method, "Event");
				if let Some(tx) = self.event_tx.lock().as_ref() {
					if tx.send(event).is_err() {
						tracing::debug!("Event receiver dropped");
					}
				}
				Ok(())
			}
			Message::Unknown(value) => {
				tracing::debug!(
					"Unknown message type (forward-compatible, ignored): {}",
					serde_json::to_string(&value)
						.unwrap_or_else(|_| "<serialization failed>".to_string())
				);
				Ok(())
			}
		}
	}
}

/// Converts an [`ErrorPayload`] into [`Error::Remote`].
fn parse_protocol_error(error: ErrorPayload) -> Error {
	Error::Remote {
		code: error.code,
		message: error.message,
	}
}
