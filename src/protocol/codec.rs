//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Frame Format
//! ```text
//! ┌───────────┬────────────┬───────────┬──────────────────────┐
//! │ Type (4)  │ ReqId (4)  │ Size (4)  │   Payload (Size)     │
//! └───────────┴────────────┴───────────┴──────────────────────┘
//! ```
//!
//! ### Request Payload by Command Type
//! - GET / GETMETA / DEL: area (4) + key_len (4) + key
//! - SET:  area (4) + ttl (4) + version (4) + key_len (4) + value_len (4) + key + value
//! - INCR: area (4) + ttl (4) + delta (4) + default (4) + key_len (4) + key
//!
//! ### Response Payload by Type
//! - GET:     code (2) + area (4) + version (4) + key_len (4) + value_len (4) + key + value
//! - GETMETA: code (2) + area (4) + version (4) + ttl_remaining (4)
//! - SET/DEL: code (2) + area (4) + key_len (4)
//! - INCR:    code (2) + area (4) + key_len (4) + key + value (4)
//!
//! All integers are little-endian. A failed reply may stop right after the
//! area; the missing fields then decode as empty.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Command, FrameHeader, MessageType, Response, Value, CODE_SUCCESS, HEADER_SIZE};
use crate::error::{NairError, Result};

/// Longest key the server accepts (in bytes)
pub const MAX_KEY_SIZE: usize = 1024;

/// Largest value the server accepts (in bytes)
pub const MAX_VALUE_SIZE: usize = 1_000_000;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to a complete frame
///
/// Fails with `NairError::Encoding` when the arguments cannot be sent.
pub fn encode_command(command: &Command, request_id: u32) -> Result<Bytes> {
    let key = command.key().as_bytes();
    validate_key(key)?;

    let mut body = BytesMut::with_capacity(20 + key.len());
    match command {
        Command::Get { area, .. } | Command::GetMeta { area, .. } | Command::Del { area, .. } => {
            body.put_u32_le(*area);
            body.put_u32_le(key.len() as u32);
            body.put_slice(key);
        }
        Command::Set {
            area,
            value,
            ttl_secs,
            version,
            ..
        } => {
            let value = value.to_wire()?;
            if value.len() > MAX_VALUE_SIZE {
                return Err(NairError::encoding(format!(
                    "value too large: {} bytes (max {})",
                    value.len(),
                    MAX_VALUE_SIZE
                )));
            }
            body.reserve(value.len());
            body.put_u32_le(*area);
            body.put_u32_le(*ttl_secs);
            body.put_u32_le(*version);
            body.put_u32_le(key.len() as u32);
            body.put_u32_le(value.len() as u32);
            body.put_slice(key);
            body.put_slice(&value);
        }
        Command::Incr {
            area,
            delta,
            default,
            ttl_secs,
            ..
        } => {
            body.put_u32_le(*area);
            body.put_u32_le(*ttl_secs);
            body.put_u32_le(*delta);
            body.put_u32_le(*default);
            body.put_u32_le(key.len() as u32);
            body.put_slice(key);
        }
    }

    Ok(frame(command.message_type(), request_id, &body))
}

/// Decode a command frame
///
/// Used by servers and test doubles; the client only sends commands.
pub fn decode_command(bytes: &[u8]) -> Result<(FrameHeader, Command)> {
    let (header, payload) = split_frame(bytes)?;
    let mut body = BodyReader::new(payload, "command");

    let command = match header.kind() {
        Some(MessageType::GetRequest) => {
            let area = body.u32()?;
            let key = body.sized_string()?;
            Command::Get { area, key }
        }
        Some(MessageType::GetMetaRequest) => {
            let area = body.u32()?;
            let key = body.sized_string()?;
            Command::GetMeta { area, key }
        }
        Some(MessageType::DelRequest) => {
            let area = body.u32()?;
            let key = body.sized_string()?;
            Command::Del { area, key }
        }
        Some(MessageType::SetRequest) => {
            let area = body.u32()?;
            let ttl_secs = body.u32()?;
            let version = body.u32()?;
            let key_len = body.u32()? as usize;
            let value_len = body.u32()? as usize;
            let key = body.string(key_len)?;
            let value = Value::from_wire(body.bytes(value_len)?)?;
            Command::Set {
                area,
                key,
                value,
                ttl_secs,
                version,
            }
        }
        Some(MessageType::IncrRequest) => {
            let area = body.u32()?;
            let ttl_secs = body.u32()?;
            let delta = body.u32()?;
            let default = body.u32()?;
            let key = body.sized_string()?;
            Command::Incr {
                area,
                key,
                delta,
                default,
                ttl_secs,
            }
        }
        _ => {
            return Err(NairError::protocol(format!(
                "Unknown command type: {}",
                header.message_type
            )))
        }
    };

    Ok((header, command))
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to a complete frame
pub fn encode_response(response: &Response, request_id: u32) -> Bytes {
    let mut body = BytesMut::with_capacity(32);
    body.put_u16_le(response.code());
    body.put_u32_le(response.area());

    match response {
        Response::Get {
            version, key, value, ..
        } => {
            // Serializing an in-memory JSON value cannot fail
            let value = value.to_wire().unwrap_or_default();
            body.put_u32_le(*version);
            body.put_u32_le(key.len() as u32);
            body.put_u32_le(value.len() as u32);
            body.put_slice(key.as_bytes());
            body.put_slice(&value);
        }
        Response::Meta {
            version,
            ttl_remaining,
            ..
        } => {
            body.put_u32_le(*version);
            body.put_u32_le(*ttl_remaining);
        }
        Response::Set { .. } | Response::Del { .. } => {
            body.put_u32_le(0);
        }
        Response::Incr { key, value, .. } => {
            body.put_u32_le(key.len() as u32);
            body.put_slice(key.as_bytes());
            body.put_u32_le(*value);
        }
    }

    frame(response.message_type(), request_id, &body)
}

/// Decode a response body
///
/// Dispatches on the header's message type. `body` must hold exactly the
/// header's declared payload; bytes past the known fields are ignored.
pub fn decode_response(header: &FrameHeader, body: &[u8]) -> Result<Response> {
    let mut body = BodyReader::new(body, "response");
    let code = body.u16()?;
    let area = body.u32()?;
    let failed_short = code != CODE_SUCCESS && body.is_empty();

    let response = match header.kind() {
        Some(MessageType::GetResponse) if failed_short => Response::Get {
            code,
            area,
            version: 0,
            key: String::new(),
            value: Value::Raw(String::new()),
        },
        Some(MessageType::GetResponse) => {
            let version = body.u32()?;
            let key_len = body.u32()? as usize;
            let value_len = body.u32()? as usize;
            let key = body.string(key_len)?;
            let value = Value::from_wire(body.bytes(value_len)?)?;
            Response::Get {
                code,
                area,
                version,
                key,
                value,
            }
        }
        Some(MessageType::GetMetaResponse) if failed_short => Response::Meta {
            code,
            area,
            version: 0,
            ttl_remaining: 0,
        },
        Some(MessageType::GetMetaResponse) => Response::Meta {
            code,
            area,
            version: body.u32()?,
            ttl_remaining: body.u32()?,
        },
        Some(MessageType::SetResponse) => Response::Set { code, area },
        Some(MessageType::DelResponse) => Response::Del { code, area },
        Some(MessageType::IncrResponse) if failed_short => Response::Incr {
            code,
            area,
            key: String::new(),
            value: 0,
        },
        Some(MessageType::IncrResponse) => {
            let key = body.sized_string()?;
            let value = body.u32()?;
            Response::Incr {
                code,
                area,
                key,
                value,
            }
        }
        _ => {
            return Err(NairError::protocol(format!(
                "Unexpected message type {} for request {}",
                header.message_type, header.request_id
            )))
        }
    };

    Ok(response)
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(NairError::encoding("key must not be empty"));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(NairError::encoding(format!(
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}

fn frame(kind: MessageType, request_id: u32, body: &[u8]) -> Bytes {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + body.len());
    FrameHeader::new(kind, request_id, body.len() as u32).encode_into(&mut message);
    message.put_slice(body);
    message.freeze()
}

fn split_frame(bytes: &[u8]) -> Result<(FrameHeader, &[u8])> {
    let header = FrameHeader::decode(bytes).ok_or_else(|| {
        NairError::protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        ))
    })?;

    let total_len = HEADER_SIZE + header.payload_size as usize;
    if bytes.len() < total_len {
        return Err(NairError::protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    Ok((header, &bytes[HEADER_SIZE..total_len]))
}

/// Bounds-checked little-endian reader over one frame body
struct BodyReader<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> BodyReader<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, len: usize) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(NairError::protocol(format!(
                "Truncated {} body: need {} more bytes, have {}",
                self.what,
                len,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.need(len)?;
        let buf: &'a [u8] = self.buf;
        let (head, tail) = buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn string(&mut self, len: usize) -> Result<String> {
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| NairError::protocol(format!("{} key is not valid UTF-8: {}", self.what, e)))
    }

    /// A `len (4) + bytes` string
    fn sized_string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        self.string(len)
    }
}
