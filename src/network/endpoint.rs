//! Server endpoints

use std::fmt;
use std::str::FromStr;

use crate::config::DEFAULT_PORT;
use crate::error::{NairError, Result};

/// A `host:port` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` or bare `host`, applying `default_port` to the latter
    pub fn parse(entry: &str, default_port: u16) -> Result<Self> {
        let entry = entry.trim();
        let mut parts = entry.split(':');
        let host = parts.next().unwrap_or_default();
        let port = parts.next();

        if parts.next().is_some() {
            return Err(NairError::Config(format!("invalid host entry {}", entry)));
        }
        if host.is_empty() {
            return Err(NairError::Config(format!("missing host in entry '{}'", entry)));
        }

        let port = match port {
            None | Some("") => default_port,
            Some(port) => port.parse().map_err(|_| {
                NairError::Config(format!("invalid port '{}' in host entry {}", port, entry))
            })?,
        };

        Ok(Self::new(host, port))
    }

    /// Parse every non-empty entry of a host list
    pub fn parse_all<S: AsRef<str>>(entries: &[S], default_port: u16) -> Result<Vec<Self>> {
        let endpoints = entries
            .iter()
            .map(AsRef::as_ref)
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| Self::parse(entry, default_port))
            .collect::<Result<Vec<_>>>()?;

        if endpoints.is_empty() {
            return Err(NairError::Config("no usable host entries".to_string()));
        }
        Ok(endpoints)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = NairError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, DEFAULT_PORT)
    }
}
