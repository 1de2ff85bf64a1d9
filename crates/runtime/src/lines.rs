//! Line pumps for child process output.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawns a task forwarding every line of `reader` into a channel.
///
/// The channel closes when the stream reaches EOF or fails with an I/O
/// error, which callers treat as the writing process having exited.
/// Trailing `\r` is stripped and invalid UTF-8 is decoded lossily.
pub fn spawn_line_reader<R>(reader: R, label: &'static str) -> (mpsc::UnboundedReceiver<String>, JoinHandle<()>)
where
	R: AsyncRead + Unpin + Send + 'static,
{
	let (tx, rx) = mpsc::unbounded_channel();
	(rx, spawn_line_forwarder(reader, label, tx))
}

/// Like [`spawn_line_reader`] but feeds an existing channel, so several
/// streams can share one receiver. The receiver sees EOF only once every
/// forwarder has finished.
pub fn spawn_line_forwarder<R>(reader: R, label: &'static str, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		let mut reader = BufReader::new(reader);
		let mut buf = Vec::new();
		loop {
			buf.clear();
			match reader.read_until(b'\n', &mut buf).await {
				Ok(0) => break,
				Ok(_) => {
					let line = decode_line(&buf);
					tracing::trace!(stream = label, %line, "line");
					if tx.send(line).is_err() {
						break;
					}
				}
				Err(e) => {
					tracing::debug!(stream = label, error = %e, "line reader failed");
					break;
				}
			}
		}
		tracing::debug!(stream = label, "line reader finished");
	})
}

/// Program output is not guaranteed to be UTF-8; bad bytes become U+FFFD.
fn decode_line(raw: &[u8]) -> String {
	let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
	let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
	String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
	use tokio::io::AsyncWriteExt;

	use super::*;

	#[tokio::test]
	async fn forwards_lines_until_eof() {
		let (read, mut write) = tokio::io::duplex(256);
		let (mut rx, handle) = spawn_line_reader(read, "test");

		write.write_all(b"first\r\nsecond\npartial").await.unwrap();
		drop(write);

		assert_eq!(rx.recv().await.as_deref(), Some("first"));
		assert_eq!(rx.recv().await.as_deref(), Some("second"));
		assert_eq!(rx.recv().await.as_deref(), Some("partial"));
		assert_eq!(rx.recv().await, None);
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn invalid_utf8_line_does_not_end_the_stream() {
		let (read, mut write) = tokio::io::duplex(256);
		let (mut rx, handle) = spawn_line_reader(read, "test");

		write
			.write_all(b"before\n\xff\xfe caf\xe9\r\nBreakpoint hit: \"thread=main\", Main.main(), line=5 bci=0\n")
			.await
			.unwrap();
		drop(write);

		assert_eq!(rx.recv().await.as_deref(), Some("before"));
		assert_eq!(rx.recv().await.as_deref(), Some("\u{FFFD}\u{FFFD} caf\u{FFFD}"));
		assert_eq!(
			rx.recv().await.as_deref(),
			Some("Breakpoint hit: \"thread=main\", Main.main(), line=5 bci=0")
		);
		assert_eq!(rx.recv().await, None);
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn merged_streams_close_after_both_finish() {
		let (out_read, mut out_write) = tokio::io::duplex(64);
		let (err_read, mut err_write) = tokio::io::duplex(64);
		let (tx, mut rx) = mpsc::unbounded_channel();
		spawn_line_forwarder(out_read, "stdout", tx.clone());
		spawn_line_forwarder(err_read, "stderr", tx);

		out_write.write_all(b"out\n").await.unwrap();
		drop(out_write);
		assert_eq!(rx.recv().await.as_deref(), Some("out"));

		err_write.write_all(b"err\n").await.unwrap();
		drop(err_write);
		assert_eq!(rx.recv().await.as_deref(), Some("err"));
		assert_eq!(rx.recv().await, None);
	}
}
