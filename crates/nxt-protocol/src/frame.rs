//! Length-prefixed framing for the USB/Bluetooth serial channel.
//!
//! Each payload on the serial channel is prefixed with a 2-byte
//! little-endian length. The length never exceeds 64, so anything larger
//! means the stream is out of step.
//!
//! ```text
//! +--------+--------+-------------------+
//! | len_lo | len_hi | payload[0..len]   |
//! +--------+--------+-------------------+
//! ```

use crate::commands::Command;
use crate::constants::{FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// Accumulates channel bytes and splits them into payloads.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Bytes received but not yet split into payloads.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Empty codec sized for a few back-to-back frames.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(4 * (FRAME_HEADER_SIZE + MAX_PAYLOAD_SIZE)),
        }
    }

    /// Append bytes read from the channel.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete payload from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. A length prefix above the
    /// payload limit is an error; the buffer is left untouched so the caller
    /// decides how to resynchronize.
    pub fn decode(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let len = u16::from_le_bytes([self.buffer[0], self.buffer[1]]) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_PAYLOAD_SIZE,
                actual: len,
            });
        }

        if self.buffer.len() < FRAME_HEADER_SIZE + len {
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_SIZE);
        Ok(Some(self.buffer.split_to(len).to_vec()))
    }

    /// Prefix a payload with its length.
    pub fn encode(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.put_u16_le(payload.len() as u16);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Encode and frame a command in one step.
pub fn frame_command(command: &Command) -> Result<Vec<u8>, crate::EncodeError> {
    let payload = command.encode()?;
    // `encode` already enforces the payload limit.
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u16_le(payload.len() as u16);
    buf.extend_from_slice(&payload);
    Ok(buf)
}
