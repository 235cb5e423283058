//! Response definitions
//!
//! Represents decoded server replies.

use super::{MessageType, Value};

/// Status code of a successful reply
pub const CODE_SUCCESS: u16 = 0;

/// A decoded reply
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Get {
        code: u16,
        area: u32,
        version: u32,
        key: String,
        value: Value,
    },

    Meta {
        code: u16,
        area: u32,
        version: u32,
        ttl_remaining: u32,
    },

    Set { code: u16, area: u32 },

    Incr {
        code: u16,
        area: u32,
        key: String,
        value: u32,
    },

    Del { code: u16, area: u32 },
}

impl Response {
    pub fn code(&self) -> u16 {
        match self {
            Response::Get { code, .. }
            | Response::Meta { code, .. }
            | Response::Set { code, .. }
            | Response::Incr { code, .. }
            | Response::Del { code, .. } => *code,
        }
    }

    pub fn success(&self) -> bool {
        self.code() == CODE_SUCCESS
    }

    pub fn area(&self) -> u32 {
        match self {
            Response::Get { area, .. }
            | Response::Meta { area, .. }
            | Response::Set { area, .. }
            | Response::Incr { area, .. }
            | Response::Del { area, .. } => *area,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Response::Get { .. } => MessageType::GetResponse,
            Response::Meta { .. } => MessageType::GetMetaResponse,
            Response::Set { .. } => MessageType::SetResponse,
            Response::Incr { .. } => MessageType::IncrResponse,
            Response::Del { .. } => MessageType::DelResponse,
        }
    }
}
