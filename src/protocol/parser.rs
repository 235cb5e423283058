//! Stream parser
//!
//! Reassembles response frames from arbitrarily fragmented socket reads.
//!
//! ## Buffer Layout
//! ```text
//! ┌──────────────────┬─────────────────────────────────────┐
//! │ consumed         │ unconsumed (partial frame, if any)  │
//! └──────────────────┴─────────────────────────────────────┘
//!                    ^ cursor
//! ```
//! Consumed bytes are compacted away on the next append, so a partial frame
//! is always carried over and prefixed to the following chunk.

use bytes::{Buf, BytesMut};

use super::{decode_response, FrameHeader, Response, HEADER_SIZE};
use crate::error::{NairError, Result};

/// One complete frame, decoded
#[derive(Debug)]
pub struct Reply {
    /// Request id echoed in the frame header
    pub request_id: u32,

    /// Raw message type from the header
    pub message_type: u32,

    /// Decoded body, or why it could not be decoded
    pub response: Result<Response>,
}

/// Incremental frame reassembler
pub struct StreamParser {
    /// Accumulated bytes from socket reads
    buffer: BytesMut,

    /// Start of the first unconsumed byte in `buffer`
    cursor: usize,

    /// Maximum allowed payload size
    max_payload_size: u32,
}

impl StreamParser {
    pub fn new(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            cursor: 0,
            max_payload_size,
        }
    }

    /// Feed one chunk and emit every frame it completes, in wire order.
    ///
    /// `emit` is called synchronously once per frame. A frame whose body
    /// does not decode is still consumed and emitted with an error, so the
    /// stream stays aligned. Returns the number of frames emitted.
    ///
    /// # Errors
    ///
    /// Returns a protocol error when a header declares a payload larger than
    /// the configured maximum. The stream cannot be trusted after that.
    pub fn execute<F>(&mut self, chunk: &[u8], mut emit: F) -> Result<usize>
    where
        F: FnMut(Reply),
    {
        self.append(chunk);

        let mut emitted = 0;
        loop {
            let Some(header) = FrameHeader::decode(&self.buffer[self.cursor..]) else {
                break;
            };

            if header.payload_size > self.max_payload_size {
                return Err(NairError::protocol(format!(
                    "Payload too large: {} bytes (max {}) in frame for request {}",
                    header.payload_size, self.max_payload_size, header.request_id
                )));
            }

            self.cursor += HEADER_SIZE;
            let size = header.payload_size as usize;
            if self.remaining() < size {
                // Undo the header parse and wait for the rest of the body
                self.cursor -= HEADER_SIZE;
                break;
            }

            let body = &self.buffer[self.cursor..self.cursor + size];
            let response = decode_response(&header, body);
            self.cursor += size;

            emit(Reply {
                request_id: header.request_id,
                message_type: header.message_type,
                response,
            });
            emitted += 1;
        }

        Ok(emitted)
    }

    /// Number of buffered bytes not yet consumed by a complete frame
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Drop everything buffered, e.g. when the socket is replaced
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    fn append(&mut self, chunk: &[u8]) {
        if self.cursor > 0 {
            self.buffer.advance(self.cursor);
            self.cursor = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }
}
