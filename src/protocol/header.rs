//! Frame header definitions
//!
//! Every frame, in both directions, starts with the same 12 byte header.

use bytes::{Buf, BufMut};

/// Header size: message type (4) + request id (4) + payload size (4)
pub const HEADER_SIZE: usize = 12;

/// Message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    SetRequest = 1,
    SetResponse = 2,
    GetRequest = 3,
    GetResponse = 4,
    DelRequest = 5,
    DelResponse = 6,
    IncrRequest = 161,
    IncrResponse = 162,
    GetMetaRequest = 163,
    GetMetaResponse = 164,
}

impl MessageType {
    pub fn from_u32(value: u32) -> Option<Self> {
        let kind = match value {
            1 => MessageType::SetRequest,
            2 => MessageType::SetResponse,
            3 => MessageType::GetRequest,
            4 => MessageType::GetResponse,
            5 => MessageType::DelRequest,
            6 => MessageType::DelResponse,
            161 => MessageType::IncrRequest,
            162 => MessageType::IncrResponse,
            163 => MessageType::GetMetaRequest,
            164 => MessageType::GetMetaResponse,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_response(self) -> bool {
        matches!(
            self,
            MessageType::SetResponse
                | MessageType::GetResponse
                | MessageType::DelResponse
                | MessageType::IncrResponse
                | MessageType::GetMetaResponse
        )
    }
}

/// Decoded frame header.
///
/// The message type is kept raw so that frames of an unknown type can still
/// be skipped and reported with their request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: u32,
    pub request_id: u32,
    pub payload_size: u32,
}

impl FrameHeader {
    pub fn new(kind: MessageType, request_id: u32, payload_size: u32) -> Self {
        Self {
            message_type: kind as u32,
            request_id,
            payload_size,
        }
    }

    /// The known message type, if any
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u32(self.message_type)
    }

    pub fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u32_le(self.message_type);
        out.put_u32_le(self.request_id);
        out.put_u32_le(self.payload_size);
    }

    /// Decode a header from the first `HEADER_SIZE` bytes.
    ///
    /// Returns `None` when fewer bytes are available.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let mut buf = &bytes[..HEADER_SIZE];
        Some(Self {
            message_type: buf.get_u32_le(),
            request_id: buf.get_u32_le(),
            payload_size: buf.get_u32_le(),
        })
    }
}
