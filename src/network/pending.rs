//! Pending request queue
//!
//! Strict FIFO by send order. Replies are correlated with the head only:
//! a reply whose request id is not the head's is stale (typically the late
//! answer to a request that already timed out) and is handed back to the caller
//! of `resolve` for reporting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{NairError, Result};
use crate::protocol::{Command, Reply, Response};

/// Sending half of a caller's completion handle
pub type Completion = oneshot::Sender<Result<Response>>;

/// One unit of a connection's in-flight count.
///
/// Taken when a request is submitted and given back when the guard drops,
/// which happens right before the request's completion is resolved.
#[derive(Debug)]
pub struct LoadGuard {
    counter: Arc<AtomicUsize>,
}

impl LoadGuard {
    pub fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An in-flight request awaiting its reply
#[derive(Debug)]
pub struct PendingRequest {
    pub request_id: u32,
    pub command: Command,
    pub submitted_at: Instant,
    completion: Completion,
    load: Option<LoadGuard>,
}

impl PendingRequest {
    pub fn new(request_id: u32, command: Command, submitted_at: Instant, completion: Completion) -> Self {
        Self {
            request_id,
            command,
            submitted_at,
            completion,
            load: None,
        }
    }

    /// Hold `guard` until this request is resolved
    pub fn with_load(mut self, guard: LoadGuard) -> Self {
        self.load = Some(guard);
        self
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_at)
    }

    /// Resolve the caller's handle. A caller that stopped waiting is not an error.
    fn complete(self, result: Result<Response>) {
        let Self { completion, load, .. } = self;
        drop(load);
        let _ = completion.send(result);
    }
}

/// What happened to a reply handed to [`PendingQueue::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Matched the head and resolved it
    Delivered { request_id: u32 },

    /// Did not match the head; nothing was resolved
    Stale { request_id: u32, head: Option<u32> },
}

/// FIFO of pending requests for one connection
#[derive(Debug, Default)]
pub struct PendingQueue {
    queue: VecDeque<PendingRequest>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PendingRequest) {
        self.queue.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Request id of the oldest unresolved request
    pub fn head_id(&self) -> Option<u32> {
        self.queue.front().map(|req| req.request_id)
    }

    /// Correlate a reply with the head of the queue.
    ///
    /// A matching reply of the wrong message type resolves the head with a
    /// protocol error.
    pub fn resolve(&mut self, reply: Reply) -> ReplyOutcome {
        let head = self.head_id();
        if head != Some(reply.request_id) {
            return ReplyOutcome::Stale {
                request_id: reply.request_id,
                head,
            };
        }

        let Some(request) = self.queue.pop_front() else {
            return ReplyOutcome::Stale {
                request_id: reply.request_id,
                head,
            };
        };

        let expected = request.command.response_type();
        let result = match reply.response {
            Ok(response) if response.message_type() != expected => Err(NairError::protocol(format!(
                "request {} ({}) answered with message type {}",
                request.request_id,
                request.command.name(),
                reply.message_type
            ))),
            other => other,
        };

        request.complete(result);
        ReplyOutcome::Delivered {
            request_id: reply.request_id,
        }
    }

    /// Evict requests older than `timeout`, oldest first.
    ///
    /// Stops at the first request still inside the window. Returns the ids
    /// of the evicted requests.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<u32> {
        let mut expired = Vec::new();
        while let Some(head) = self.queue.front() {
            let age = head.age(now);
            if age <= timeout {
                break;
            }
            if let Some(request) = self.queue.pop_front() {
                let request_id = request.request_id;
                request.complete(Err(NairError::Timeout {
                    request_id,
                    elapsed_ms: age.as_millis() as u64,
                }));
                expired.push(request_id);
            }
        }
        expired
    }

    /// Fail every pending request, each with its own error.
    ///
    /// Returns how many requests were failed. The queue is empty afterwards.
    pub fn fail_all<F>(&mut self, mut make_error: F) -> usize
    where
        F: FnMut(&PendingRequest) -> NairError,
    {
        let count = self.queue.len();
        for request in self.queue.drain(..) {
            let error = make_error(&request);
            request.complete(Err(error));
        }
        count
    }
}
