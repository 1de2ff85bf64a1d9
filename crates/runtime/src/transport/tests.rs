use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::*;

#[tokio::test]
async fn test_send_message_is_newline_framed() {
	let (stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, _stdout_write) = tokio::io::duplex(1024);

	let (transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
	let (mut sender, _receiver) = transport.into_parts();

	let test_message = serde_json::json!({
		"id": 1,
		"method": "Debugger.enable",
		"params": {}
	});
	sender.send(test_message.clone()).await.unwrap();

	let mut reader = BufReader::new(stdin_read);
	let mut line = String::new();
	reader.read_line(&mut line).await.unwrap();

	assert!(line.ends_with('\n'));
	let received: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
	assert_eq!(received, test_message);
}

#[tokio::test]
async fn test_multiple_messages_in_sequence() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(4096);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(4096);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let messages = vec![
		serde_json::json!({"id": 1, "result": {}}),
		serde_json::json!({"method": "Debugger.paused", "params": {"reason": "other"}}),
		serde_json::json!({"id": 2, "result": {"breakpointId": "1:1:0"}}),
	];

	for msg in &messages {
		let mut line = serde_json::to_string(msg).unwrap();
		line.push('\n');
		stdout_write.write_all(line.as_bytes()).await.unwrap();
	}
	stdout_write.flush().await.unwrap();

	for expected in &messages {
		let received = rx.recv().await.unwrap();
		assert_eq!(&received, expected);
	}

	drop(stdout_write);
	let result = read_task.await.unwrap();
	assert!(result.is_ok());
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	stdout_write.write_all(b"not json at all\n\n").await.unwrap();
	stdout_write
		.write_all(b"{\"id\": 7, \"result\": {}}\n")
		.await
		.unwrap();
	stdout_write.flush().await.unwrap();

	let received = rx.recv().await.unwrap();
	assert_eq!(received["id"], 7);

	drop(stdout_write);
	assert!(read_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_eof_ends_reader_cleanly() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, stdout_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	drop(stdout_write);

	let result = transport.run().await;
	assert!(result.is_ok());
	drop(transport);
	assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_close_is_idempotent() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, _stdout_write) = tokio::io::duplex(1024);

	let (transport, message_rx) = PipeTransport::new(stdin_write, stdout_read);
	let mut parts = transport.into_transport_parts(message_rx);

	assert!(parts.sender.close().await.is_ok());
	assert!(parts.sender.close().await.is_ok());
}

#[tokio::test]
async fn test_websocket_connect_failure_is_connection_error() {
	// Bind then drop a listener so the port is very likely closed.
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	drop(listener);

	let result = WebSocketTransport::connect(&format!("ws://127.0.0.1:{port}/dead")).await;
	assert!(matches!(result, Err(Error::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_websocket_round_trip_with_inspector_peer() {
	use futures_util::{SinkExt, StreamExt};

	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();

	let peer = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let request = match ws.next().await.unwrap().unwrap() {
			WsMessage::Text(text) => serde_json::from_str::<Value>(&text).unwrap(),
			other => panic!("Expected a text frame, got {other:?}"),
		};
		let reply = serde_json::json!({"id": request["id"], "result": {"debuggerId": "peer"}});
		ws.send(WsMessage::Text(reply.to_string())).await.unwrap();
		ws.send(WsMessage::Text(
			serde_json::json!({"method": "Debugger.resumed", "params": {}}).to_string(),
		))
		.await
		.unwrap();
		ws.close(None).await.unwrap();
		request
	});

	let (transport, message_rx) = WebSocketTransport::connect(&format!("ws://127.0.0.1:{port}/session"))
		.await
		.unwrap();
	let mut parts = transport.into_transport_parts(message_rx);
	parts
		.sender
		.send(serde_json::json!({"id": 1, "method": "Debugger.enable"}))
		.await
		.unwrap();
	parts.receiver.run().await.unwrap();

	let request = peer.await.unwrap();
	assert_eq!(request["method"], "Debugger.enable");
	assert_eq!(parts.message_rx.recv().await.unwrap()["result"]["debuggerId"], "peer");
	assert_eq!(parts.message_rx.recv().await.unwrap()["method"], "Debugger.resumed");
}
