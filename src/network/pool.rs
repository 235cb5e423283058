//! Connection pool
//!
//! One connection per configured endpoint. Any connection may serve any
//! request: partitioning happens server-side, so selection only looks at
//! load.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::connection::ConnectionHandle;
use super::endpoint::Endpoint;
use super::events::{ConnectionEvent, ConnectionStatus};
use crate::config::Config;
use crate::error::{NairError, Result};

/// Capacity of the shared event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pick the least-loaded connected candidate.
///
/// An idle connected candidate wins immediately; otherwise the connected
/// candidate with the shortest queue wins, first one on ties. Returns `None`
/// when nothing is connected.
pub fn select_least_loaded<'a, I>(candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a ConnectionStatus>,
{
    let mut best: Option<(usize, usize)> = None;
    for (index, status) in candidates.into_iter().enumerate() {
        if !status.is_connected() {
            continue;
        }
        if status.pending == 0 {
            return Some(index);
        }
        match best {
            Some((_, pending)) if pending <= status.pending => {}
            _ => best = Some((index, status.pending)),
        }
    }
    best.map(|(index, _)| index)
}

/// Set of connections, one per endpoint
pub struct Pool {
    connections: Vec<ConnectionHandle>,
    tasks: Vec<JoinHandle<()>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Pool {
    /// Parse the configured hosts and start one connection per endpoint.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoint::parse_all(&config.hosts, config.default_port)?;
        let config = Arc::new(config.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut connections = Vec::with_capacity(endpoints.len());
        let mut tasks = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            tracing::debug!(endpoint = %endpoint, "Opening connection");
            let (handle, task) = ConnectionHandle::spawn(endpoint, Arc::clone(&config), events.clone());
            connections.push(handle);
            tasks.push(task);
        }

        Ok(Self {
            connections,
            tasks,
            events,
        })
    }

    /// The least-loaded connected connection
    pub fn get_connection(&self) -> Result<&ConnectionHandle> {
        let statuses: Vec<ConnectionStatus> = self.connections.iter().map(|c| c.status()).collect();
        select_least_loaded(&statuses)
            .map(|index| &self.connections[index])
            .ok_or(NairError::PoolExhausted)
    }

    pub fn connections(&self) -> &[ConnectionHandle] {
        &self.connections
    }

    /// Snapshot of every connection
    pub fn status(&self) -> Vec<ConnectionStatus> {
        self.connections.iter().map(|c| c.status()).collect()
    }

    /// Receive events from every connection of this pool
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Wait until at least one connection is connected
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut events = self.events.subscribe();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            if self.connections.iter().any(|c| c.is_connected()) {
                return Ok(());
            }
            tokio::select! {
                _ = &mut deadline => return Err(NairError::PoolExhausted),
                event = events.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = event {
                        return Err(NairError::PoolExhausted);
                    }
                }
            }
        }
    }

    /// Shut every connection down, failing whatever is still pending
    pub async fn close(self) {
        for connection in &self.connections {
            connection.shutdown();
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Connection task ended abnormally: {}", e);
            }
        }
    }
}
