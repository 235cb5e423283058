//! Connection Tests
//!
//! Drives a connection task against scripted servers on loopback.

use std::sync::Arc;
use std::time::Duration;

use nairkv::network::{ConnectionEvent, ConnectionHandle, ConnectionState, Endpoint};
use nairkv::protocol::{decode_command, encode_response, Command, FrameHeader, Response, HEADER_SIZE};
use nairkv::{Config, NairError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

const TEST_DEADLINE: Duration = Duration::from_secs(5);

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder()
        .host("127.0.0.1")
        .request_timeout_ms(1000)
        .connect_timeout_ms(1000)
        .initial_backoff_ms(10)
        .max_backoff_ms(100)
        .build()
}

fn spawn(port: u16, config: Config) -> (ConnectionHandle, broadcast::Receiver<ConnectionEvent>) {
    let (events, receiver) = broadcast::channel(64);
    let (handle, _task) = ConnectionHandle::spawn(Endpoint::new("127.0.0.1", port), Arc::new(config), events);
    (handle, receiver)
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port with nothing listening on it
async fn closed_port() -> u16 {
    let (listener, port) = listener().await;
    drop(listener);
    port
}

/// Read one command frame from the client
async fn read_command(stream: &mut TcpStream) -> Option<(FrameHeader, Command)> {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).await.ok()?;
    let size = FrameHeader::decode(&header)?.payload_size as usize;

    let mut frame = header.to_vec();
    frame.resize(HEADER_SIZE + size, 0);
    stream.read_exact(&mut frame[HEADER_SIZE..]).await.ok()?;
    decode_command(&frame).ok()
}

fn set_ok(area: u32) -> Response {
    Response::Set { code: 0, area }
}

async fn wait_for_event<F>(events: &mut broadcast::Receiver<ConnectionEvent>, mut matches: F) -> ConnectionEvent
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    timeout(TEST_DEADLINE, async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

// =============================================================================
// Request Tests
// =============================================================================

#[tokio::test]
async fn test_request_reply_roundtrip() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        while let Some((header, command)) = read_command(&mut stream).await {
            let reply = encode_response(&set_ok(command.area()), header.request_id);
            stream.write_all(&reply).await.unwrap();
        }
    });

    let (conn, _events) = spawn(port, test_config());
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let response = timeout(TEST_DEADLINE, conn.request(Command::set(4, "k", "v", 60)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, set_ok(4));
    assert_eq!(conn.pending(), 0);
}

#[tokio::test]
async fn test_request_ids_start_at_one_and_increase() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let (conn, _events) = spawn(port, test_config());
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let first = conn.send(Command::get(1, "a")).unwrap();
    let second = conn.send(Command::get(1, "b")).unwrap();
    assert_eq!(first.request_id(), 1);
    assert_eq!(second.request_id(), 2);
}

#[tokio::test]
async fn test_encoding_error_returned_before_sending() {
    let (conn, _events) = spawn(closed_port().await, test_config());
    let result = conn.send(Command::get(1, ""));
    assert!(matches!(result, Err(NairError::Encoding(_))));
}

#[tokio::test]
async fn test_replies_resolve_in_send_order() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Collect three requests, then answer them back to back in one write
        let mut batch = Vec::new();
        for _ in 0..3 {
            let (header, command) = read_command(&mut stream).await.unwrap();
            batch.extend_from_slice(&encode_response(&set_ok(command.area()), header.request_id));
        }
        stream.write_all(&batch).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let (conn, _events) = spawn(port, test_config());
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let futures: Vec<_> = (1..=3)
        .map(|area| conn.send(Command::set(area, "k", "v", 1)).unwrap())
        .collect();
    for (area, future) in (1..=3).zip(futures) {
        let response = timeout(TEST_DEADLINE, future).await.unwrap().unwrap();
        assert_eq!(response, set_ok(area));
    }
}

#[tokio::test]
async fn test_stale_reply_is_reported_and_skipped() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (header, command) = read_command(&mut stream).await.unwrap();
        let stale = encode_response(&set_ok(command.area()), header.request_id + 100);
        let good = encode_response(&set_ok(command.area()), header.request_id);
        stream.write_all(&stale).await.unwrap();
        stream.write_all(&good).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let (conn, mut events) = spawn(port, test_config());
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let response = timeout(TEST_DEADLINE, conn.request(Command::set(2, "k", "v", 1)))
        .await
        .unwrap()
        .unwrap();
    assert!(response.success());

    let event = wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::StaleReply { .. })).await;
    assert!(matches!(
        event,
        ConnectionEvent::StaleReply {
            request_id: 101,
            head: Some(1),
            ..
        }
    ));
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[tokio::test]
async fn test_silent_server_times_out() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Read but never answer
        while read_command(&mut stream).await.is_some() {}
    });

    let config = Config::builder()
        .host("127.0.0.1")
        .request_timeout_ms(100)
        .build();
    let (conn, mut events) = spawn(port, config);
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let result = timeout(TEST_DEADLINE, conn.request(Command::get(1, "k"))).await.unwrap();
    match result {
        Err(NairError::Timeout { request_id, elapsed_ms }) => {
            assert_eq!(request_id, 1);
            assert!(elapsed_ms >= 100);
        }
        other => panic!("Expected timeout, got {:?}", other),
    }

    wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::RequestTimedOut { request_id: 1, .. })).await;
    assert!(conn.is_connected());
}

#[tokio::test]
async fn test_blocked_writes_do_not_stall_timeouts() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        // Accept, then never read: the client's socket buffer fills up
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let config = Config::builder()
        .host("127.0.0.1")
        .request_timeout_ms(200)
        .build();
    let (conn, _events) = spawn(port, config);
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let value = "v".repeat(900_000);
    let futures: Vec<_> = (0..40)
        .map(|i| conn.send(Command::set(1, format!("big:{}", i), value.as_str(), 60)).unwrap())
        .collect();

    for future in futures {
        let result = timeout(TEST_DEADLINE, future).await.unwrap();
        assert!(matches!(result, Err(NairError::Timeout { .. })), "got {:?}", result);
    }
    assert!(conn.is_connected());
    assert_eq!(conn.pending(), 0);
}

#[tokio::test]
async fn test_pending_counts_requests_at_submit_time() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        while read_command(&mut stream).await.is_some() {}
    });

    let (conn, _events) = spawn(port, test_config());
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let first = conn.send(Command::get(1, "a")).unwrap();
    assert_eq!(conn.pending(), 1);
    let second = conn.send(Command::get(1, "b")).unwrap();
    assert_eq!(conn.pending(), 2);
    assert_eq!(conn.status().pending, 2);

    conn.shutdown();
    let _ = first.await;
    let _ = second.await;
    assert_eq!(conn.pending(), 0);
}

#[tokio::test]
async fn test_rejected_request_releases_load() {
    let config = Config::builder()
        .host("127.0.0.1")
        .initial_backoff_ms(1000)
        .max_backoff_ms(5000)
        .build();
    let (conn, _events) = spawn(closed_port().await, config);

    let result = timeout(TEST_DEADLINE, conn.request(Command::get(1, "k"))).await.unwrap();
    assert!(result.is_err());
    assert_eq!(conn.pending(), 0);
}

// =============================================================================
// Disconnect Tests
// =============================================================================

#[tokio::test]
async fn test_shutdown_fails_pending_requests() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        while read_command(&mut stream).await.is_some() {}
    });

    let (conn, _events) = spawn(port, test_config());
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let first = conn.send(Command::get(1, "a")).unwrap();
    let second = conn.send(Command::get(1, "b")).unwrap();
    conn.shutdown();

    for future in [first, second] {
        let result = timeout(TEST_DEADLINE, future).await.unwrap();
        assert!(matches!(result, Err(NairError::Connection(_))));
    }
    conn.wait_for_state(ConnectionState::Closed).await.unwrap();
}

#[tokio::test]
async fn test_peer_close_fails_pending_and_reconnects() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        // First generation: take one request and hang up
        let (mut stream, _) = listener.accept().await.unwrap();
        read_command(&mut stream).await;
        drop(stream);

        // Second generation: answer everything
        let (mut stream, _) = listener.accept().await.unwrap();
        while let Some((header, command)) = read_command(&mut stream).await {
            let reply = encode_response(&set_ok(command.area()), header.request_id);
            stream.write_all(&reply).await.unwrap();
        }
    });

    let (conn, mut events) = spawn(port, test_config());
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let lost = timeout(TEST_DEADLINE, conn.request(Command::set(1, "k", "v", 1))).await.unwrap();
    assert!(matches!(lost, Err(NairError::Connection(_))));

    let disconnected = wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
    assert!(matches!(disconnected, ConnectionEvent::Disconnected { flushed: 1, .. }));
    wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::Connected { generation: 2, .. })).await;

    let response = timeout(TEST_DEADLINE, conn.request(Command::set(1, "k", "v", 1)))
        .await
        .unwrap()
        .unwrap();
    assert!(response.success());
    assert_eq!(conn.status().generation, 2);
    assert_eq!(conn.status().reconnect_attempts, 0);
}

#[tokio::test]
async fn test_oversized_frame_drops_socket() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (header, _) = read_command(&mut stream).await.unwrap();
        let mut bogus = Vec::new();
        bogus.extend_from_slice(&4u32.to_le_bytes());
        bogus.extend_from_slice(&header.request_id.to_le_bytes());
        bogus.extend_from_slice(&u32::MAX.to_le_bytes());
        stream.write_all(&bogus).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = Config::builder()
        .host("127.0.0.1")
        .max_payload_size(1024)
        .initial_backoff_ms(1000)
        .max_backoff_ms(5000)
        .build();
    let (conn, mut events) = spawn(port, config);
    conn.wait_for_state(ConnectionState::Connected).await.unwrap();

    let result = timeout(TEST_DEADLINE, conn.request(Command::get(1, "k"))).await.unwrap();
    assert!(matches!(result, Err(NairError::Connection(_))));

    wait_for_event(&mut events, |e| {
        matches!(e, ConnectionEvent::ProtocolViolation { request_id: None, .. })
    })
    .await;
}

// =============================================================================
// Reconnect Tests
// =============================================================================

#[tokio::test]
async fn test_rejects_while_not_connected() {
    let config = Config::builder()
        .host("127.0.0.1")
        .initial_backoff_ms(1000)
        .max_backoff_ms(5000)
        .build();
    let (conn, _events) = spawn(closed_port().await, config);

    let result = timeout(TEST_DEADLINE, conn.request(Command::get(1, "k"))).await.unwrap();
    assert!(matches!(result, Err(NairError::Connection(_))));
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn test_retries_exhausted_is_terminal() {
    let config = Config::builder()
        .host("127.0.0.1")
        .initial_backoff_ms(5)
        .max_backoff_ms(20)
        .max_reconnect_attempts(Some(2))
        .build();
    let (conn, mut events) = spawn(closed_port().await, config);

    let event = wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::RetriesExhausted { .. })).await;
    assert!(matches!(event, ConnectionEvent::RetriesExhausted { attempts: 2, .. }));
    conn.wait_for_state(ConnectionState::Failed).await.unwrap();

    let result = timeout(TEST_DEADLINE, conn.request(Command::get(1, "k"))).await.unwrap();
    assert!(matches!(result, Err(NairError::RetriesExhausted { attempts: 2, .. })));
}

#[tokio::test]
async fn test_reconnect_schedule_is_reported() {
    let config = Config::builder()
        .host("127.0.0.1")
        .initial_backoff_ms(10)
        .backoff_factor(2.0)
        .max_backoff_ms(1000)
        .max_reconnect_attempts(Some(2))
        .build();
    let (_conn, mut events) = spawn(closed_port().await, config);

    let first = wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::ReconnectScheduled { .. })).await;
    assert!(matches!(
        first,
        ConnectionEvent::ReconnectScheduled { attempt: 1, delay, .. } if delay == Duration::from_millis(20)
    ));
    let second = wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::ReconnectScheduled { .. })).await;
    assert!(matches!(
        second,
        ConnectionEvent::ReconnectScheduled { attempt: 2, delay, .. } if delay == Duration::from_millis(40)
    ));
}
