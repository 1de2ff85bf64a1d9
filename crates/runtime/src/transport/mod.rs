//! Message transports for the inspector connection.
//!
//! A transport moves whole JSON messages; it knows nothing about ids or
//! events. Two implementations exist:
//!
//! - [`WebSocketTransport`] - text frames over a WebSocket, used against a
//!   live `node --inspect-brk` endpoint
//! - [`PipeTransport`] - newline-delimited JSON over any async byte stream,
//!   used for stdio-speaking backends and simulated peers
//!
//! Both split into a sending half ([`Transport`]) and a reading half
//! ([`TransportReceiver`]) that forwards decoded messages into an unbounded
//! channel. Undecodable frames are logged and dropped.

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// Boxed future returned by transport halves.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Sends one JSON message.
	fn send(&mut self, message: Value) -> TransportFuture<'_>;

	/// Closes the outbound direction. Closing twice is not an error.
	fn close(&mut self) -> TransportFuture<'_>;
}

/// Reading half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until the peer closes, forwarding each decoded message.
	fn run(&mut self) -> TransportFuture<'_>;
}

/// Both halves of a transport plus the channel the reader feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

fn decode(raw: &str) -> Option<Value> {
	match serde_json::from_str::<Value>(raw) {
		Ok(value) => Some(value),
		Err(e) => {
			tracing::warn!(error = %e, "Discarding undecodable message");
			None
		}
	}
}

/// Newline-delimited JSON over a pair of byte streams.
pub struct PipeTransport<W, R> {
	sender: PipeTransportSender<W>,
	receiver: PipeTransportReceiver<R>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport writing to `writer` and reading from `reader`.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let transport = Self {
			sender: PipeTransportSender { writer },
			receiver: PipeTransportReceiver {
				reader: BufReader::new(reader),
				message_tx,
			},
		};
		(transport, message_rx)
	}

	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(self.sender, self.receiver)
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		TransportParts {
			sender: Box::new(self.sender),
			receiver: Box::new(self.receiver),
			message_rx,
		}
	}

	/// Runs the reading half in place.
	pub async fn run(&mut self) -> Result<()> {
		self.receiver.read_loop().await
	}
}

pub struct PipeTransportSender<W> {
	writer: W,
}

impl<W> PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	pub async fn send(&mut self, message: Value) -> Result<()> {
		let mut line = serde_json::to_string(&message)?;
		line.push('\n');
		self.writer
			.write_all(line.as_bytes())
			.await
			.map_err(|e| Error::TransportError(format!("Failed to write message: {e}")))?;
		self.writer
			.flush()
			.await
			.map_err(|e| Error::TransportError(format!("Failed to flush message: {e}")))
	}
}

impl<W> Transport for PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	fn send(&mut self, message: Value) -> TransportFuture<'_> {
		Box::pin(PipeTransportSender::send(self, message))
	}

	fn close(&mut self) -> TransportFuture<'_> {
		Box::pin(async move {
			// A peer that already hung up is as closed as it gets.
			let _ = self.writer.shutdown().await;
			Ok(())
		})
	}
}

pub struct PipeTransportReceiver<R> {
	reader: BufReader<R>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	async fn read_loop(&mut self) -> Result<()> {
		let mut line = String::new();
		loop {
			line.clear();
			let read = self
				.reader
				.read_line(&mut line)
				.await
				.map_err(|e| Error::TransportError(format!("Failed to read message: {e}")))?;
			if read == 0 {
				return Ok(());
			}

			let trimmed = line.trim();
			if trimmed.is_empty() {
				continue;
			}

			if let Some(value) = decode(trimmed) {
				if self.message_tx.send(value).is_err() {
					return Ok(());
				}
			}
		}
	}
}

impl<R> TransportReceiver for PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(&mut self) -> TransportFuture<'_> {
		Box::pin(self.read_loop())
	}
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON text frames over a WebSocket.
pub struct WebSocketTransport {
	sender: WebSocketTransportSender,
	receiver: WebSocketTransportReceiver,
}

impl WebSocketTransport {
	/// Opens a WebSocket to `url` (e.g. `ws://127.0.0.1:9229/<uuid>`).
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		let (stream, _response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		tracing::debug!(%url, "WebSocket connected");

		let (sink, source) = stream.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		Ok((
			Self {
				sender: WebSocketTransportSender { sink },
				receiver: WebSocketTransportReceiver { source, message_tx },
			},
			message_rx,
		))
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		TransportParts {
			sender: Box::new(self.sender),
			receiver: Box::new(self.receiver),
			message_rx,
		}
	}
}

pub struct WebSocketTransportSender {
	sink: SplitSink<WsStream, WsMessage>,
}

impl Transport for WebSocketTransportSender {
	fn send(&mut self, message: Value) -> TransportFuture<'_> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink
				.send(WsMessage::Text(text))
				.await
				.map_err(|e| Error::TransportError(e.to_string()))
		})
	}

	fn close(&mut self) -> TransportFuture<'_> {
		Box::pin(async move {
			match self.sink.close().await {
				Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
				Err(e) => Err(Error::TransportError(e.to_string())),
			}
		})
	}
}

pub struct WebSocketTransportReceiver {
	source: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketTransportReceiver {
	fn run(&mut self) -> TransportFuture<'_> {
		Box::pin(async move {
			while let Some(frame) = self.source.next().await {
				let value = match frame {
					Ok(WsMessage::Text(text)) => decode(&text),
					Ok(WsMessage::Binary(bytes)) => decode(&String::from_utf8_lossy(&bytes)),
					Ok(WsMessage::Close(_)) => break,
					Ok(_) => None,
					Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => break,
					Err(e) => return Err(Error::TransportError(e.to_string())),
				};

				if let Some(value) = value {
					if self.message_tx.send(value).is_err() {
						break;
					}
				}
			}
			Ok(())
		})
	}
}
