//! Connection
//!
//! One connection task per server endpoint. The task exclusively owns the
//! socket, the pending queue and the receive parser; callers talk to it
//! through a [`ConnectionHandle`].
//!
//! ## Lifecycle
//! ```text
//!   Connecting ──ok──► Connected ──error/close──► Disconnected
//!       ▲                                              │
//!       └──────────── Backoff ◄────── next delay ──────┘
//!                        │
//!                        └── attempts exhausted ──► Failed
//! ```
//! Every disconnect fails all pending requests before the next socket
//! generation starts. Requests reaching a connection that is not
//! `Connected` are rejected right away.
//!
//! Within a generation the write half belongs to a separate writer task, so
//! a peer that stops reading never stalls replies or the timeout sweep.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::backoff::Backoff;
use super::endpoint::Endpoint;
use super::events::{ConnectionEvent, ConnectionState, ConnectionStatus};
use super::pending::{Completion, LoadGuard, PendingQueue, PendingRequest, ReplyOutcome};
use crate::config::Config;
use crate::error::{NairError, Result};
use crate::protocol::{encode_command, Command, Reply, Response, StreamParser};

/// Bytes requested from the socket per read
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// A request on its way to the connection task
struct Submission {
    request_id: u32,
    command: Command,
    frame: Bytes,
    submitted_at: Instant,
    completion: Completion,
    load: LoadGuard,
}

enum Message {
    Request(Submission),
    Shutdown,
}

/// Why a socket generation ended
enum Disconnect {
    /// Socket failed or the peer went away; reconnect
    Lost(String),
    /// Owner asked the connection to stop
    Shutdown,
}

// =============================================================================
// Handle
// =============================================================================

/// Cheap, cloneable handle to a connection task
#[derive(Clone)]
pub struct ConnectionHandle {
    endpoint: Endpoint,
    messages: mpsc::UnboundedSender<Message>,
    status: watch::Receiver<ConnectionStatus>,
    next_request_id: Arc<AtomicU32>,
    /// Submitted and not yet resolved, including requests still in the channel
    in_flight: Arc<AtomicUsize>,
}

impl ConnectionHandle {
    /// Spawn the connection task. The first connect starts immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        endpoint: Endpoint,
        config: Arc<Config>,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::new(
            endpoint.to_string(),
            ConnectionState::Connecting,
        ));

        let task = ConnectionTask {
            observer: Observer {
                endpoint: endpoint.to_string(),
                events,
                debug: config.debug,
            },
            endpoint: endpoint.clone(),
            backoff: Backoff::from_config(&config),
            parser: StreamParser::new(config.max_payload_size),
            pending: PendingQueue::new(),
            messages: messages_rx,
            status: status_tx,
            state: ConnectionState::Connecting,
            generation: 0,
            config,
        };
        let join = tokio::spawn(task.run());

        let handle = Self {
            endpoint,
            messages: messages_tx,
            status: status_rx,
            next_request_id: Arc::new(AtomicU32::new(1)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        };
        (handle, join)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Latest published status, with the current in-flight count
    pub fn status(&self) -> ConnectionStatus {
        let mut status = self.status.borrow().clone();
        status.pending = self.pending();
        status
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    /// Requests submitted through this handle (or its clones) and not yet resolved
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Encode and submit a command.
    ///
    /// Encoding errors are returned here; everything that happens after the
    /// command is handed to the connection arrives through the returned
    /// future.
    pub fn send(&self, command: Command) -> Result<ResponseFuture> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_command(&command, request_id)?;
        let (completion, receiver) = oneshot::channel();

        let submission = Submission {
            request_id,
            command,
            frame,
            submitted_at: Instant::now(),
            completion,
            load: LoadGuard::acquire(&self.in_flight),
        };
        self.messages
            .send(Message::Request(submission))
            .map_err(|_| NairError::connection(format!("connection to {} is closed", self.endpoint)))?;

        Ok(ResponseFuture {
            request_id,
            receiver,
        })
    }

    /// Submit a command and wait for its reply
    pub async fn request(&self, command: Command) -> Result<Response> {
        self.send(command)?.await
    }

    /// Ask the task to fail its pending requests and stop
    pub fn shutdown(&self) {
        let _ = self.messages.send(Message::Shutdown);
    }

    /// Wait until the connection reaches `state`
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<()> {
        let mut status = self.status.clone();
        status
            .wait_for(|s| s.state == state)
            .await
            .map(|_| ())
            .map_err(|_| NairError::connection(format!("connection to {} is closed", self.endpoint)))
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status())
            .finish()
    }
}

/// Completion handle for one submitted command
#[derive(Debug)]
pub struct ResponseFuture {
    request_id: u32,
    receiver: oneshot::Receiver<Result<Response>>,
}

impl ResponseFuture {
    pub fn request_id(&self) -> u32 {
        self.request_id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let request_id = self.request_id;
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(NairError::connection(format!(
                    "request {} dropped by its connection",
                    request_id
                )))
            })
        })
    }
}

// =============================================================================
// Task
// =============================================================================

/// Logging and event emission for one connection
struct Observer {
    endpoint: String,
    events: broadcast::Sender<ConnectionEvent>,
    debug: bool,
}

impl Observer {
    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn on_reply_error(&self, request_id: u32, error: &NairError) {
        tracing::warn!(endpoint = %self.endpoint, request_id, "Undecodable frame: {}", error);
        self.emit(ConnectionEvent::ProtocolViolation {
            endpoint: self.endpoint.clone(),
            request_id: Some(request_id),
            detail: error.to_string(),
        });
    }

    fn on_outcome(&self, outcome: ReplyOutcome) {
        match outcome {
            ReplyOutcome::Delivered { request_id } => {
                if self.debug {
                    tracing::debug!(endpoint = %self.endpoint, request_id, "Reply delivered");
                }
            }
            ReplyOutcome::Stale { request_id, head } => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    request_id,
                    head = ?head,
                    "Discarding reply that does not match the oldest pending request"
                );
                self.emit(ConnectionEvent::StaleReply {
                    endpoint: self.endpoint.clone(),
                    request_id,
                    head,
                });
            }
        }
    }
}

struct ConnectionTask {
    endpoint: Endpoint,
    config: Arc<Config>,
    observer: Observer,
    messages: mpsc::UnboundedReceiver<Message>,
    status: watch::Sender<ConnectionStatus>,
    pending: PendingQueue,
    parser: StreamParser,
    backoff: Backoff,
    state: ConnectionState,
    generation: u64,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let reason = match self.connect().await {
                None => break,
                Some(Ok(stream)) => {
                    self.on_connected();
                    match self.serve(stream).await {
                        Disconnect::Lost(reason) => reason,
                        Disconnect::Shutdown => break,
                    }
                }
                Some(Err(e)) => e.to_string(),
            };

            self.on_disconnected(&reason);

            match self.backoff.next_delay() {
                Some(delay) => {
                    self.set_state(ConnectionState::Backoff);
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        attempt = self.backoff.attempts(),
                        "Retry connection in {} ms",
                        delay.as_millis()
                    );
                    self.observer.emit(ConnectionEvent::ReconnectScheduled {
                        endpoint: self.observer.endpoint.clone(),
                        attempt: self.backoff.attempts(),
                        delay,
                    });
                    if !self.wait_rejecting(delay).await {
                        break;
                    }
                }
                None => {
                    self.give_up().await;
                    break;
                }
            }
        }

        self.close("connection closed by owner");
    }

    /// Open a socket while rejecting incoming requests.
    ///
    /// Returns `None` when the owner shut the connection down meanwhile.
    async fn connect(&mut self) -> Option<Result<TcpStream>> {
        let connect = open_stream(self.endpoint.to_string(), self.config.connect_timeout());
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return Some(result),
                message = self.messages.recv() => match message {
                    Some(Message::Request(submission)) => self.reject(submission),
                    Some(Message::Shutdown) | None => return None,
                },
            }
        }
    }

    /// Sleep for `delay` while rejecting incoming requests.
    ///
    /// Returns `false` when the owner shut the connection down meanwhile.
    async fn wait_rejecting(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                message = self.messages.recv() => match message {
                    Some(Message::Request(submission)) => self.reject(submission),
                    Some(Message::Shutdown) | None => return false,
                },
            }
        }
    }

    /// Drive one socket generation until it ends
    async fn serve(&mut self, stream: TcpStream) -> Disconnect {
        let (reader, writer) = stream.into_split();
        let (frames, outbound) = mpsc::unbounded_channel();
        let mut writer_task = tokio::spawn(write_frames(writer, outbound));

        let disconnect = self.pump(reader, &frames, &mut writer_task).await;
        writer_task.abort();
        disconnect
    }

    /// Multiplex submissions, socket reads, writer failure and the sweep
    async fn pump(
        &mut self,
        mut reader: OwnedReadHalf,
        frames: &mpsc::UnboundedSender<Bytes>,
        writer_task: &mut JoinHandle<std::io::Result<()>>,
    ) -> Disconnect {
        let period = self.config.request_timeout();
        let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            tokio::select! {
                message = self.messages.recv() => {
                    let submission = match message {
                        Some(Message::Request(submission)) => submission,
                        Some(Message::Shutdown) | None => return Disconnect::Shutdown,
                    };
                    let frame = submission.frame.clone();
                    self.enqueue(submission);
                    if frames.send(frame).is_err() {
                        return Disconnect::Lost("writer stopped".to_string());
                    }
                }
                written = &mut *writer_task => {
                    return match written {
                        Ok(Ok(())) => Disconnect::Lost("writer stopped".to_string()),
                        Ok(Err(e)) => Disconnect::Lost(format!("write failed: {}", e)),
                        Err(e) => Disconnect::Lost(format!("writer task failed: {}", e)),
                    };
                }
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => return Disconnect::Lost("connection closed by peer".to_string()),
                    Ok(n) => {
                        if let Err(e) = self.on_data(&chunk[..n]) {
                            self.observer.emit(ConnectionEvent::ProtocolViolation {
                                endpoint: self.observer.endpoint.clone(),
                                request_id: None,
                                detail: e.to_string(),
                            });
                            return Disconnect::Lost(e.to_string());
                        }
                    }
                    Err(e) => return Disconnect::Lost(format!("read failed: {}", e)),
                },
                _ = sweep.tick() => self.sweep_timeouts(),
            }
        }
    }

    fn enqueue(&mut self, submission: Submission) {
        if self.config.debug {
            tracing::debug!(
                endpoint = %self.endpoint,
                request_id = submission.request_id,
                command = submission.command.name(),
                area = submission.command.area(),
                key = submission.command.key(),
                "Send command"
            );
        }
        self.pending.push(
            PendingRequest::new(
                submission.request_id,
                submission.command,
                submission.submitted_at,
                submission.completion,
            )
            .with_load(submission.load),
        );
        self.publish();
    }

    /// Feed a socket read to the parser and correlate every completed frame
    fn on_data(&mut self, chunk: &[u8]) -> Result<()> {
        if self.config.debug {
            tracing::debug!(endpoint = %self.endpoint, len = chunk.len(), "Socket read");
        }

        let Self {
            parser,
            pending,
            observer,
            ..
        } = self;
        parser.execute(chunk, |reply: Reply| {
            tracing::trace!(
                endpoint = %observer.endpoint,
                request_id = reply.request_id,
                message_type = reply.message_type,
                "Frame complete"
            );
            if let Err(e) = &reply.response {
                observer.on_reply_error(reply.request_id, e);
            }
            observer.on_outcome(pending.resolve(reply));
        })?;

        self.publish();
        Ok(())
    }

    fn sweep_timeouts(&mut self) {
        let expired = self
            .pending
            .expire(Instant::now(), self.config.request_timeout());
        if expired.is_empty() {
            return;
        }

        for request_id in expired {
            tracing::warn!(endpoint = %self.endpoint, request_id, "Request timed out");
            self.observer.emit(ConnectionEvent::RequestTimedOut {
                endpoint: self.observer.endpoint.clone(),
                request_id,
            });
        }
        self.publish();
    }

    fn on_connected(&mut self) {
        self.backoff.reset();
        self.generation += 1;
        self.parser.reset();
        self.set_state(ConnectionState::Connected);

        tracing::debug!(endpoint = %self.endpoint, generation = self.generation, "Stream connected");
        self.observer.emit(ConnectionEvent::Connected {
            endpoint: self.observer.endpoint.clone(),
            generation: self.generation,
        });
    }

    fn on_disconnected(&mut self, reason: &str) {
        let endpoint = &self.endpoint;
        let flushed = self.pending.fail_all(|request| {
            NairError::connection(format!(
                "connection to {} lost before request {} was answered: {}",
                endpoint, request.request_id, reason
            ))
        });
        self.parser.reset();
        self.set_state(ConnectionState::Disconnected);

        tracing::warn!(endpoint = %self.endpoint, flushed, "Connection is gone: {}", reason);
        self.observer.emit(ConnectionEvent::Disconnected {
            endpoint: self.observer.endpoint.clone(),
            reason: reason.to_string(),
            flushed,
        });
    }

    /// Terminal failure: reject everything until the owner lets go
    async fn give_up(&mut self) {
        self.set_state(ConnectionState::Failed);
        let attempts = self.backoff.attempts();
        tracing::error!(
            endpoint = %self.endpoint,
            "Couldn't get connection after {} attempts",
            attempts
        );
        self.observer.emit(ConnectionEvent::RetriesExhausted {
            endpoint: self.observer.endpoint.clone(),
            attempts,
        });

        while let Some(Message::Request(submission)) = self.messages.recv().await {
            self.reject(submission);
        }
    }

    fn close(&mut self, reason: &str) {
        let endpoint = &self.endpoint;
        self.pending.fail_all(|request| {
            NairError::connection(format!(
                "{}: request {} to {} abandoned",
                reason, request.request_id, endpoint
            ))
        });
        self.set_state(ConnectionState::Closed);
        tracing::debug!(endpoint = %self.endpoint, "Connection closed");
        self.observer.emit(ConnectionEvent::Closed {
            endpoint: self.observer.endpoint.clone(),
        });
    }

    fn reject(&self, submission: Submission) {
        let error = match self.state {
            ConnectionState::Failed => NairError::RetriesExhausted {
                endpoint: self.endpoint.to_string(),
                attempts: self.backoff.attempts(),
            },
            state => NairError::connection(format!(
                "connection to {} is not connected ({:?})",
                self.endpoint, state
            )),
        };
        let Submission { completion, load, .. } = submission;
        drop(load);
        let _ = completion.send(Err(error));
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        let attempts = self.backoff.attempts();
        self.status.send_modify(|status| {
            status.state = self.state;
            status.reconnect_attempts = attempts;
            status.generation = self.generation;
        });
    }
}

/// Write queued frames in order until the channel closes or a write fails
async fn write_frames(mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Bytes>) -> std::io::Result<()> {
    while let Some(frame) = frames.recv().await {
        writer.write_all(&frame).await?;
    }
    Ok(())
}

async fn open_stream(addr: String, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr.as_str()))
        .await
        .map_err(|_| {
            NairError::connection(format!(
                "connect to {} timed out after {} ms",
                addr,
                timeout.as_millis()
            ))
        })??;
    stream.set_nodelay(true)?;
    Ok(stream)
}
