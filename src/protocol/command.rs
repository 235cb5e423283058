//! Command definitions
//!
//! Represents requests sent to the server.

use super::{MessageType, Value};

/// A request for one key in one area
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Get a value by key
    Get { area: u32, key: String },

    /// Get version and remaining TTL of a key
    GetMeta { area: u32, key: String },

    /// Store a value
    Set {
        area: u32,
        key: String,
        value: Value,
        ttl_secs: u32,
        version: u32,
    },

    /// Add `delta` to a counter, creating it with `default` when missing
    Incr {
        area: u32,
        key: String,
        delta: u32,
        default: u32,
        ttl_secs: u32,
    },

    /// Delete a key
    Del { area: u32, key: String },
}

impl Command {
    pub fn get(area: u32, key: impl Into<String>) -> Self {
        Command::Get {
            area,
            key: key.into(),
        }
    }

    pub fn get_meta(area: u32, key: impl Into<String>) -> Self {
        Command::GetMeta {
            area,
            key: key.into(),
        }
    }

    /// Unversioned set
    pub fn set(area: u32, key: impl Into<String>, value: impl Into<Value>, ttl_secs: u32) -> Self {
        Command::Set {
            area,
            key: key.into(),
            value: value.into(),
            ttl_secs,
            version: 0,
        }
    }

    pub fn incr(area: u32, key: impl Into<String>, delta: u32, default: u32, ttl_secs: u32) -> Self {
        Command::Incr {
            area,
            key: key.into(),
            delta,
            default,
            ttl_secs,
        }
    }

    pub fn del(area: u32, key: impl Into<String>) -> Self {
        Command::Del {
            area,
            key: key.into(),
        }
    }

    /// Message type of the request frame
    pub fn message_type(&self) -> MessageType {
        match self {
            Command::Get { .. } => MessageType::GetRequest,
            Command::GetMeta { .. } => MessageType::GetMetaRequest,
            Command::Set { .. } => MessageType::SetRequest,
            Command::Incr { .. } => MessageType::IncrRequest,
            Command::Del { .. } => MessageType::DelRequest,
        }
    }

    /// Message type the server answers with
    pub fn response_type(&self) -> MessageType {
        match self {
            Command::Get { .. } => MessageType::GetResponse,
            Command::GetMeta { .. } => MessageType::GetMetaResponse,
            Command::Set { .. } => MessageType::SetResponse,
            Command::Incr { .. } => MessageType::IncrResponse,
            Command::Del { .. } => MessageType::DelResponse,
        }
    }

    pub fn area(&self) -> u32 {
        match self {
            Command::Get { area, .. }
            | Command::GetMeta { area, .. }
            | Command::Set { area, .. }
            | Command::Incr { area, .. }
            | Command::Del { area, .. } => *area,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Command::Get { key, .. }
            | Command::GetMeta { key, .. }
            | Command::Set { key, .. }
            | Command::Incr { key, .. }
            | Command::Del { key, .. } => key,
        }
    }

    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::GetMeta { .. } => "get_meta",
            Command::Set { .. } => "set",
            Command::Incr { .. } => "incr",
            Command::Del { .. } => "del",
        }
    }
}
