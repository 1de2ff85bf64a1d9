// Copyright 2024 Paul Adamson
// Licensed under the Apache License, Version 2.0

//! Session event vocabulary and delivery.
//!
//! Every backend reports what happened to the debuggee through the same four
//! events ([`SessionEvent`]). Delivery is per session:
//!
//! - [`EventBus`] - Internal dispatcher combining a broadcast channel with predicate waiters
//! - [`EventStream`] - Wrapper around [`broadcast::Receiver`] that tolerates lag
//! - [`EventWaiter`] - One-shot capture of the first matching event, with timeout
//! - [`Subscription`] - RAII handle for callback listeners
//!
//! Dropping a [`Subscription`] stops its callback; nothing is shared between
//! sessions, so a listener only ever sees events of the session it was
//! registered on.
//!
//! [`broadcast::Receiver`]: tokio::sync::broadcast::Receiver

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use stepwise_protocol::Variables;
use stepwise_runtime::{Error, Result};
use tokio::sync::{broadcast, oneshot};

/// Where an [`SessionEvent::Output`] line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
	/// Program standard output.
	Stdout,
	/// Program standard error.
	Stderr,
	/// `console.*` calls reported by the inspector.
	Console,
	/// Uncaught exceptions and debugger-reported errors.
	Error,
	/// The program finished.
	Exit,
}

/// Something observable happened in a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
	/// Execution stopped at a user breakpoint.
	BreakpointHit { line: u32, variables: Variables },
	/// A step finished.
	StepComplete { line: u32, variables: Variables },
	/// A new variable snapshot replaced the previous one.
	VariablesUpdated { variables: Variables },
	/// Program or debugger output.
	Output { kind: OutputKind, message: String },
}

impl SessionEvent {
	pub fn output(kind: OutputKind, message: impl Into<String>) -> Self {
		SessionEvent::Output {
			kind,
			message: message.into(),
		}
	}

	/// Line of a landing event (`BreakpointHit` or `StepComplete`).
	pub fn line(&self) -> Option<u32> {
		match self {
			SessionEvent::BreakpointHit { line, .. } | SessionEvent::StepComplete { line, .. } => Some(*line),
			_ => None,
		}
	}

	/// Snapshot carried by the event, if any.
	pub fn variables(&self) -> Option<&Variables> {
		match self {
			SessionEvent::BreakpointHit { variables, .. }
			| SessionEvent::StepComplete { variables, .. }
			| SessionEvent::VariablesUpdated { variables } => Some(variables),
			SessionEvent::Output { .. } => None,
		}
	}

	pub fn is_exit(&self) -> bool {
		matches!(
			self,
			SessionEvent::Output {
				kind: OutputKind::Exit,
				..
			}
		)
	}
}

/// RAII handle that cancels a session listener when dropped.
///
/// Returned by [`DebugSession::on_event`]. The task that invokes the callback
/// ends when this handle is dropped or [`unsubscribe`](Self::unsubscribe) is
/// called.
///
/// [`DebugSession::on_event`]: crate::DebugSession::on_event
pub struct Subscription {
	cancel_tx: Option<oneshot::Sender<()>>,
}

impl Subscription {
	pub(crate) fn new(cancel_tx: oneshot::Sender<()>) -> Self {
		Self {
			cancel_tx: Some(cancel_tx),
		}
	}

	/// Explicitly cancels the subscription, equivalent to dropping it.
	pub fn unsubscribe(mut self) {
		if let Some(tx) = self.cancel_tx.take() {
			let _ = tx.send(());
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(tx) = self.cancel_tx.take() {
			let _ = tx.send(());
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.cancel_tx.is_some())
			.finish()
	}
}

struct WaiterEntry<E> {
	predicate: Box<dyn Fn(&E) -> bool + Send + Sync>,
	complete_tx: oneshot::Sender<E>,
}

/// Per-session event dispatcher.
///
/// Waiters are checked first during [`emit`](Self::emit), so `wait_for_event`
/// callers get their event even when broadcast receivers are lagging.
pub(crate) struct EventBus<E: Clone + Send + 'static> {
	tx: broadcast::Sender<E>,
	waiters: Mutex<Vec<WaiterEntry<E>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity);
		Self {
			tx,
			waiters: Mutex::new(Vec::new()),
		}
	}

	/// Emits an event to matching waiters, then to all subscribers.
	pub fn emit(&self, event: E) {
		{
			let mut waiters = self.waiters.lock();
			let mut i = 0;
			while i < waiters.len() {
				if (waiters[i].predicate)(&event) {
					let entry = waiters.swap_remove(i);
					let _ = entry.complete_tx.send(event.clone());
				} else {
					i += 1;
				}
			}
		}
		let _ = self.tx.send(event);
	}

	/// Events emitted before subscribing are not received.
	pub fn subscribe(&self) -> broadcast::Receiver<E> {
		self.tx.subscribe()
	}

	/// Registers a waiter that receives the first matching event and is then removed.
	pub fn register_waiter<F>(&self, predicate: F) -> oneshot::Receiver<E>
	where
		F: Fn(&E) -> bool + Send + Sync + 'static,
	{
		let (complete_tx, complete_rx) = oneshot::channel();
		self.waiters.lock().push(WaiterEntry {
			predicate: Box::new(predicate),
			complete_tx,
		});
		complete_rx
	}

	/// Drops every waiter, failing them with `ChannelClosed`.
	pub fn close_waiters(&self) {
		self.waiters.lock().clear();
	}

	#[cfg(test)]
	pub fn waiter_count(&self) -> usize {
		self.waiters.lock().len()
	}
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
	fn default() -> Self {
		Self::new(256)
	}
}

/// Wrapper around [`broadcast::Receiver`] with automatic lag handling.
///
/// [`RecvError::Lagged`] is logged and skipped instead of ending the loop.
///
/// ```ignore
/// let mut stream = session.subscribe();
/// while let Some(event) = stream.recv().await {
///     println!("{event:?}");
/// }
/// ```
///
/// [`broadcast::Receiver`]: tokio::sync::broadcast::Receiver
/// [`RecvError::Lagged`]: tokio::sync::broadcast::error::RecvError::Lagged
pub struct EventStream<E: Clone + Send + 'static> {
	rx: broadcast::Receiver<E>,
}

impl<E: Clone + Send + 'static> EventStream<E> {
	pub(crate) fn new(rx: broadcast::Receiver<E>) -> Self {
		Self { rx }
	}

	/// Receives the next event; `None` once the session is gone.
	pub async fn recv(&mut self) -> Option<E> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "Event stream lagged, dropped events");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Receives an event if one is immediately available.
	pub fn try_recv(&mut self) -> Option<E> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(broadcast::error::TryRecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "Event stream lagged, dropped events");
				}
				Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => return None,
			}
		}
	}
}

/// One-shot event waiter with timeout support.
///
/// Use [`wait()`](Self::wait) for the configured timeout or `.await` it directly.
pub struct EventWaiter<E> {
	rx: oneshot::Receiver<E>,
	timeout: Duration,
}

impl<E: Send + 'static> EventWaiter<E> {
	pub(crate) fn new(rx: oneshot::Receiver<E>, timeout: Duration) -> Self {
		Self { rx, timeout }
	}

	/// # Errors
	///
	/// - [`Error::Timeout`] if no matching event arrives in time
	/// - [`Error::ChannelClosed`] if the session stopped first
	pub async fn wait(self) -> Result<E> {
		tokio::time::timeout(self.timeout, self.rx)
			.await
			.map_err(|_| Error::Timeout("Timeout waiting for event".to_string()))?
			.map_err(|_| Error::ChannelClosed)
	}
}

impl<E: Send + 'static> Future for EventWaiter<E> {
	type Output = Result<E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(Ok(event)) => Poll::Ready(Ok(event)),
			Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ChannelClosed)),
			Poll::Pending => Poll::Pending,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use stepwise_protocol::{ValueType, Variable};

	use super::*;

	fn hit(line: u32) -> SessionEvent {
		SessionEvent::BreakpointHit {
			line,
			variables: Variables::new(),
		}
	}

	#[tokio::test]
	async fn event_bus_broadcast() {
		let bus: EventBus<SessionEvent> = EventBus::new(16);

		let mut rx1 = bus.subscribe();
		let mut rx2 = bus.subscribe();

		bus.emit(hit(2));

		assert_eq!(rx1.recv().await.unwrap().line(), Some(2));
		assert_eq!(rx2.recv().await.unwrap().line(), Some(2));
	}

	#[tokio::test]
	async fn waiter_receives_first_matching_event_only() {
		let bus: EventBus<SessionEvent> = EventBus::new(16);

		let waiter = bus.register_waiter(|e| e.is_exit());
		bus.emit(hit(1));
		assert_eq!(bus.waiter_count(), 1);

		bus.emit(SessionEvent::output(OutputKind::Exit, "done"));
		assert_eq!(bus.waiter_count(), 0);
		assert!(waiter.await.unwrap().is_exit());
	}

	#[tokio::test]
	async fn closed_waiters_fail_with_channel_closed() {
		let bus: EventBus<SessionEvent> = EventBus::new(16);
		let rx = bus.register_waiter(|_| true);
		bus.close_waiters();

		let result = EventWaiter::new(rx, Duration::from_secs(1)).wait().await;
		assert!(matches!(result, Err(Error::ChannelClosed)));
	}

	#[tokio::test]
	async fn event_stream_receives_events() {
		let bus = Arc::new(EventBus::<SessionEvent>::new(16));
		let mut stream = EventStream::new(bus.subscribe());

		let emitter = Arc::clone(&bus);
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(10)).await;
			emitter.emit(SessionEvent::output(OutputKind::Stdout, "hello"));
		});

		let event = stream.recv().await.unwrap();
		assert_eq!(event, SessionEvent::output(OutputKind::Stdout, "hello"));
	}

	#[tokio::test]
	async fn event_stream_survives_lag() {
		let bus: EventBus<SessionEvent> = EventBus::new(2);
		let mut stream = EventStream::new(bus.subscribe());

		for line in 1..=5 {
			bus.emit(hit(line));
		}

		assert_eq!(stream.try_recv().and_then(|e| e.line()), Some(4));
		assert_eq!(stream.try_recv().and_then(|e| e.line()), Some(5));
		assert!(stream.try_recv().is_none());
	}

	#[tokio::test]
	async fn event_waiter_timeout() {
		let (_tx, rx) = oneshot::channel::<SessionEvent>();
		let waiter = EventWaiter::new(rx, Duration::from_millis(10));

		assert!(matches!(waiter.wait().await, Err(Error::Timeout(_))));
	}

	#[tokio::test]
	async fn subscription_cancels_on_drop() {
		let (tx, mut rx) = oneshot::channel::<()>();
		drop(Subscription::new(tx));

		let result = rx.try_recv();
		assert!(result.is_ok() || result == Err(oneshot::error::TryRecvError::Closed));
	}

	#[test]
	fn events_serialize_with_type_tag() {
		let mut variables = Variables::new();
		variables.insert("i".to_string(), Variable::new("0", ValueType::Number));
		let json = serde_json::to_value(SessionEvent::StepComplete { line: 3, variables }).unwrap();
		assert_eq!(
			json,
			serde_json::json!({
				"type": "stepComplete",
				"line": 3,
				"variables": {"i": {"value": "0", "type": "number"}}
			})
		);

		let json = serde_json::to_value(SessionEvent::output(OutputKind::Console, "hi")).unwrap();
		assert_eq!(json, serde_json::json!({"type": "output", "kind": "console", "message": "hi"}));
	}
}
