//! Client
//!
//! Typed operations on top of the pool. A `NairClient` is the only state a
//! caller needs: there is no process-wide registry.
//!
//! ## TTL Handling
//! - `None` applies `Config::default_ttl_secs`
//! - a negative TTL maps to `u32::MAX`, which the server treats as "never expires"
//! - a TTL above `u32::MAX` is rejected before sending

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{NairError, Result};
use crate::network::{ConnectionEvent, ConnectionStatus, Pool};
use crate::protocol::{Command, Response, Value};

/// TTL sent for negative caller TTLs
pub const NEVER_EXPIRE_TTL: u32 = u32::MAX;

/// Metadata of a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub version: u32,
    pub ttl_remaining: u32,
}

/// Cache client bound to one pool of connections
pub struct NairClient {
    pool: Pool,
    default_ttl_secs: u32,
}

impl NairClient {
    /// Validate the config and start connecting to every host.
    ///
    /// Must be called from within a tokio runtime. Connections come up in
    /// the background; see [`NairClient::wait_ready`].
    pub fn connect(config: Config) -> Result<Self> {
        let pool = Pool::connect(&config)?;
        Ok(Self {
            pool,
            default_ttl_secs: config.default_ttl_secs,
        })
    }

    /// Fetch a value. A missing key is `Ok(None)`, not an error.
    pub async fn get(&self, area: u32, key: &str) -> Result<Option<Value>> {
        match self.execute(Command::get(area, key)).await? {
            Response::Get { code, value, .. } => Ok((code == 0).then_some(value)),
            other => Err(unexpected("get", &other)),
        }
    }

    /// Fetch version and remaining TTL. A missing key is `Ok(None)`.
    pub async fn get_meta(&self, area: u32, key: &str) -> Result<Option<Meta>> {
        match self.execute(Command::get_meta(area, key)).await? {
            Response::Meta {
                code,
                version,
                ttl_remaining,
                ..
            } => Ok((code == 0).then_some(Meta {
                version,
                ttl_remaining,
            })),
            other => Err(unexpected("get_meta", &other)),
        }
    }

    /// Store a value
    pub async fn set(&self, area: u32, key: &str, value: impl Into<Value>, ttl: Option<i64>) -> Result<()> {
        let ttl_secs = self.ttl_secs(ttl)?;
        match self.execute(Command::set(area, key, value, ttl_secs)).await? {
            Response::Set { code: 0, .. } => Ok(()),
            Response::Set { code, .. } => Err(NairError::OperationFailed { operation: "set", code }),
            other => Err(unexpected("set", &other)),
        }
    }

    /// Add `delta` to a counter and return the new value.
    ///
    /// A missing counter starts at `default`.
    pub async fn incr(&self, area: u32, key: &str, delta: u32, default: u32, ttl: Option<i64>) -> Result<u32> {
        let ttl_secs = self.ttl_secs(ttl)?;
        match self.execute(Command::incr(area, key, delta, default, ttl_secs)).await? {
            Response::Incr { code: 0, value, .. } => Ok(value),
            Response::Incr { code, .. } => Err(NairError::OperationFailed { operation: "incr", code }),
            other => Err(unexpected("incr", &other)),
        }
    }

    /// Delete a key
    pub async fn del(&self, area: u32, key: &str) -> Result<()> {
        match self.execute(Command::del(area, key)).await? {
            Response::Del { code: 0, .. } => Ok(()),
            Response::Del { code, .. } => Err(NairError::OperationFailed { operation: "del", code }),
            other => Err(unexpected("del", &other)),
        }
    }

    /// Send a raw command on the least-loaded connection
    pub async fn execute(&self, command: Command) -> Result<Response> {
        let connection = self.pool.get_connection()?;
        connection.request(command).await
    }

    /// Resolve a caller TTL to the value sent on the wire
    pub fn ttl_secs(&self, ttl: Option<i64>) -> Result<u32> {
        match ttl {
            None => Ok(self.default_ttl_secs),
            Some(secs) if secs < 0 => Ok(NEVER_EXPIRE_TTL),
            Some(secs) => u32::try_from(secs)
                .map_err(|_| NairError::Encoding(format!("ttl {} exceeds {} seconds", secs, u32::MAX))),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn status(&self) -> Vec<ConnectionStatus> {
        self.pool.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.pool.subscribe()
    }

    /// Wait until at least one connection is usable
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        self.pool.wait_ready(timeout).await
    }

    /// Shut down every connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn unexpected(operation: &str, response: &Response) -> NairError {
    NairError::Protocol(format!(
        "{} answered with {:?} message",
        operation,
        response.message_type()
    ))
}
