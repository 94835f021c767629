//! Length-prefixed binary IPC between parent and hound
//!
//! Wire format: a 4-byte big-endian length prefix followed by the payload,
//! capped at 1 MiB. Two structured message types ride inside frames:
//! status (`0x01` | state byte | optional UTF-8 error suffix) and metrics
//! (`0x02` | two 8-byte big-endian doubles). The streaming parser
//! accumulates arbitrary chunks and emits frames as they complete.

use crate::error::{HoundError, HoundResult};
use bytes::{Buf, BytesMut};

/// Maximum frame payload: 1 MiB
pub const MAX_FRAME_PAYLOAD: usize = 1024 * 1024;

/// Length prefix width
pub const FRAME_HEADER_LEN: usize = 4;

/// Message type byte for status frames
pub const MSG_STATUS: u8 = 0x01;

/// Message type byte for metrics frames
pub const MSG_METRICS: u8 = 0x02;

/// Frame one payload
pub fn encode_frame(payload: &[u8]) -> HoundResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(HoundError::FrameTooLarge {
            size: payload.len(),
            limit: MAX_FRAME_PAYLOAD,
        });
    }
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Streaming frame parser; partial frames stay buffered between feeds
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Bytes currently buffered awaiting frame completion
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard buffered bytes
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Accumulate a chunk and emit every frame that completed
    pub fn feed(&mut self, chunk: &[u8]) -> HoundResult<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            if self.buf.len() < FRAME_HEADER_LEN {
                break;
            }
            let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
                as usize;
            if len > MAX_FRAME_PAYLOAD {
                return Err(HoundError::FrameTooLarge {
                    size: len,
                    limit: MAX_FRAME_PAYLOAD,
                });
            }
            if self.buf.len() < FRAME_HEADER_LEN + len {
                break;
            }
            self.buf.advance(FRAME_HEADER_LEN);
            let frame = self.buf.split_to(len);
            frames.push(frame.to_vec());
        }
        Ok(frames)
    }
}

/// Hound processing state carried by status messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoundState {
    Processing,
    Complete,
    Error,
}

impl HoundState {
    fn to_byte(self) -> u8 {
        match self {
            HoundState::Processing => 0x01,
            HoundState::Complete => 0x02,
            HoundState::Error => 0x03,
        }
    }

    fn from_byte(byte: u8) -> HoundResult<Self> {
        match byte {
            0x01 => Ok(HoundState::Processing),
            0x02 => Ok(HoundState::Complete),
            0x03 => Ok(HoundState::Error),
            other => Err(HoundError::MessageDecode(format!(
                "unknown state byte 0x{:02x}",
                other
            ))),
        }
    }
}

/// Structured messages exchanged with a hound
#[derive(Debug, Clone, PartialEq)]
pub enum HoundMessage {
    Status {
        state: HoundState,
        error: Option<String>,
    },
    Metrics {
        processing_time_ms: f64,
        memory_used_bytes: f64,
    },
}

impl HoundMessage {
    pub fn status(state: HoundState) -> Self {
        HoundMessage::Status { state, error: None }
    }

    pub fn status_error(message: impl Into<String>) -> Self {
        HoundMessage::Status {
            state: HoundState::Error,
            error: Some(message.into()),
        }
    }

    /// Minimal binary encoding; never structured text
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HoundMessage::Status { state, error } => {
                let mut out = vec![MSG_STATUS, state.to_byte()];
                if let Some(message) = error {
                    out.extend_from_slice(message.as_bytes());
                }
                out
            }
            HoundMessage::Metrics {
                processing_time_ms,
                memory_used_bytes,
            } => {
                let mut out = Vec::with_capacity(17);
                out.push(MSG_METRICS);
                out.extend_from_slice(&processing_time_ms.to_be_bytes());
                out.extend_from_slice(&memory_used_bytes.to_be_bytes());
                out
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> HoundResult<Self> {
        let (&kind, rest) = bytes
            .split_first()
            .ok_or_else(|| HoundError::MessageDecode("empty message".to_string()))?;
        match kind {
            MSG_STATUS => {
                let (&state_byte, suffix) = rest.split_first().ok_or_else(|| {
                    HoundError::MessageDecode("status message missing state byte".to_string())
                })?;
                let state = HoundState::from_byte(state_byte)?;
                let error = if suffix.is_empty() {
                    None
                } else {
                    let message = std::str::from_utf8(suffix).map_err(|_| {
                        HoundError::MessageDecode("status suffix is not UTF-8".to_string())
                    })?;
                    Some(message.to_string())
                };
                Ok(HoundMessage::Status { state, error })
            }
            MSG_METRICS => {
                if rest.len() != 16 {
                    return Err(HoundError::MessageDecode(format!(
                        "metrics message has {} payload bytes, expected 16",
                        rest.len()
                    )));
                }
                let mut time = [0u8; 8];
                time.copy_from_slice(&rest[0..8]);
                let mut memory = [0u8; 8];
                memory.copy_from_slice(&rest[8..16]);
                Ok(HoundMessage::Metrics {
                    processing_time_ms: f64::from_be_bytes(time),
                    memory_used_bytes: f64::from_be_bytes(memory),
                })
            }
            other => Err(HoundError::MessageDecode(format!(
                "unknown message type 0x{:02x}",
                other
            ))),
        }
    }
}
