//! Connection status and notifications
//!
//! Status is published per connection through a watch channel so the pool
//! can read it without touching connection internals. Events go to a
//! broadcast channel shared by every connection of a pool.

use std::time::Duration;

use serde::Serialize;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Socket lost, reconnect not yet scheduled
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the reconnect delay
    Backoff,
    /// Reconnect attempts exhausted; terminal
    Failed,
    /// Shut down by its owner; terminal
    Closed,
}

/// Snapshot of a connection, as seen by the pool
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub endpoint: String,
    pub state: ConnectionState,
    /// Requests submitted and not yet resolved
    pub pending: usize,
    /// Reconnect attempts since the last successful connect
    pub reconnect_attempts: u32,
    /// Number of sockets successfully opened so far
    pub generation: u64,
}

impl ConnectionStatus {
    pub fn new(endpoint: impl Into<String>, state: ConnectionState) -> Self {
        Self {
            endpoint: endpoint.into(),
            state,
            pending: 0,
            reconnect_attempts: 0,
            generation: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Notification emitted by a connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected {
        endpoint: String,
        generation: u64,
    },
    Disconnected {
        endpoint: String,
        reason: String,
        /// Pending requests failed by this disconnect
        flushed: usize,
    },
    ReconnectScheduled {
        endpoint: String,
        attempt: u32,
        delay: Duration,
    },
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
    },
    RequestTimedOut {
        endpoint: String,
        request_id: u32,
    },
    StaleReply {
        endpoint: String,
        request_id: u32,
        head: Option<u32>,
    },
    ProtocolViolation {
        endpoint: String,
        request_id: Option<u32>,
        detail: String,
    },
    Closed {
        endpoint: String,
    },
}
