//! Frame encoding and incremental decoding.
//!
//! Pure byte manipulation; no I/O. Every limit violation is fatal to the
//! connection that produced the bytes.

use crate::error::{Error, Result};

/// Header size: length (4) + type (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Frame types carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Opaque binary payload.
    Binary = 0x01,
    /// Keep-alive; no payload, never delivered.
    Heartbeat = 0x02,
    /// UTF-8 JSON payload.
    Message = 0x03,
}

impl FrameType {
    /// Parse frame type from byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::Binary),
            0x02 => Ok(Self::Heartbeat),
            0x03 => Ok(Self::Message),
            _ => Err(Error::Protocol(format!("unknown frame type: {:#04x}", byte))),
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Bounds applied while decoding one connection's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest payload a single frame may declare.
    pub max_payload_bytes: usize,
    /// Ceiling on undecoded tail plus a newly received chunk.
    pub max_buffered_bytes: usize,
    /// Most frames a single `decode_frames` call may yield.
    pub max_frames_per_chunk: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 8 * 1024 * 1024,
            max_buffered_bytes: 16 * 1024 * 1024,
            max_frames_per_chunk: 1024,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub frame_type: FrameType,
    /// Frame payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    /// A heartbeat frame.
    pub fn heartbeat() -> Self {
        Self::new(FrameType::Heartbeat, Vec::new())
    }

    /// Serialize frame to bytes for transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_frame(Some(&self.payload), self.frame_type)
    }
}

/// Encode one frame: 4-byte big-endian length, 1-byte type, payload.
///
/// A missing payload encodes as length 0.
pub fn encode_frame(payload: Option<&[u8]>, frame_type: FrameType) -> Result<Vec<u8>> {
    let payload = payload.unwrap_or_default();
    let length = u32::try_from(payload.len())
        .map_err(|_| Error::LimitExceeded("payload does not fit in a frame".into()))?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.push(frame_type.to_byte());
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Decode every complete frame in `tail || chunk`.
///
/// Returns the frames in wire order and the bytes of any trailing partial
/// frame, to be passed back as `tail` with the next chunk.
pub fn decode_frames(
    tail: &[u8],
    chunk: &[u8],
    limits: &FrameLimits,
) -> Result<(Vec<Frame>, Vec<u8>)> {
    check_buffered(tail.len() + chunk.len(), limits)?;

    let mut buffer = Vec::with_capacity(tail.len() + chunk.len());
    buffer.extend_from_slice(tail);
    buffer.extend_from_slice(chunk);

    let (frames, consumed) = decode_buffer(&buffer, limits)?;
    buffer.drain(..consumed);
    Ok((frames, buffer))
}

fn check_buffered(len: usize, limits: &FrameLimits) -> Result<()> {
    if len > limits.max_buffered_bytes {
        return Err(Error::LimitExceeded(format!(
            "receive buffer would hold {} bytes (limit {})",
            len, limits.max_buffered_bytes
        )));
    }
    Ok(())
}

/// Parse complete frames from the front of `buffer`; returns them with the
/// number of bytes they occupied.
fn decode_buffer(buffer: &[u8], limits: &FrameLimits) -> Result<(Vec<Frame>, usize)> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while buffer.len() - offset >= HEADER_SIZE {
        let header = &buffer[offset..offset + HEADER_SIZE];
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

        if length > limits.max_payload_bytes {
            return Err(Error::Protocol(format!(
                "frame declares {} bytes (limit {})",
                length, limits.max_payload_bytes
            )));
        }

        let frame_type = FrameType::from_byte(header[4])?;

        let total = HEADER_SIZE + length;
        if buffer.len() - offset < total {
            break;
        }

        if frames.len() == limits.max_frames_per_chunk {
            return Err(Error::LimitExceeded(format!(
                "more than {} frames in one chunk",
                limits.max_frames_per_chunk
            )));
        }

        let payload = buffer[offset + HEADER_SIZE..offset + total].to_vec();
        frames.push(Frame::new(frame_type, payload));
        offset += total;
    }

    Ok((frames, offset))
}

/// Frame decoder for streaming data.
///
/// Keeps one receive buffer across reads. Chunks are appended in place, so
/// a large frame arriving in many reads is not re-copied per read.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    limits: FrameLimits,
}

impl FrameDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: FrameLimits) -> Self {
        Self {
            buffer: Vec::new(),
            limits,
        }
    }

    /// Feed a received chunk and return every frame it completes.
    ///
    /// On error the buffer is cleared; the connection must be closed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        if let Err(e) = check_buffered(self.buffer.len() + chunk.len(), &self.limits) {
            self.buffer.clear();
            return Err(e);
        }
        self.buffer.extend_from_slice(chunk);

        match decode_buffer(&self.buffer, &self.limits) {
            Ok((frames, consumed)) => {
                if consumed == self.buffer.len() {
                    self.buffer.clear();
                } else if consumed > 0 {
                    self.buffer.drain(..consumed);
                }
                self.reserve_partial_frame();
                Ok(frames)
            }
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Get current buffer size.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Once a partial frame's header is in, grow the buffer to hold the
    /// whole frame so later chunks append without reallocating.
    fn reserve_partial_frame(&mut self) {
        if self.buffer.len() < HEADER_SIZE {
            return;
        }
        // decode_buffer already rejected lengths over the payload limit.
        let header = &self.buffer[..HEADER_SIZE];
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let total = HEADER_SIZE + length;
        if total > self.buffer.len() {
            self.buffer.reserve(total - self.buffer.len());
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(FrameLimits::default())
    }
}
