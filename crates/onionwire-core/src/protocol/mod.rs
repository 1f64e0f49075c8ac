//! Wire protocol for onionwire.
//!
//! A length-prefixed binary framing over any reliable byte stream.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────┬─────────┬───────────────────┐
//! │      Length      │  Type   │     Payload       │
//! │ (4 bytes, BE u32)│ (1 byte)│   (length bytes)  │
//! └──────────────────┴─────────┴───────────────────┘
//! ```
//!
//! Types: `1` BINARY, `2` HEARTBEAT, `3` MESSAGE (UTF-8 JSON).

mod frame;
mod message;

pub use frame::{
    decode_frames, encode_frame, Frame, FrameDecoder, FrameLimits, FrameType, HEADER_SIZE,
};
pub use message::{Delivery, MessagePayload, Outgoing};
