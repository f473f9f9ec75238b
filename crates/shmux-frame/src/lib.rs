//! Fixed-header framing for the shared-memory multiplexer.
//!
//! Every unit carried over the transport is prefixed with an 8-byte
//! little-endian header:
//! - A 2-byte magic number for buffer validation
//! - A signal byte (reserved, carried verbatim)
//! - A command byte (DATA/OPEN/CLOSE)
//! - A padding count so the payload stays word-aligned
//! - A 1-byte channel id and a 2-byte payload length
//!
//! The header is validated magic-first: a mismatched magic invalidates the
//! whole buffer, not just the command.

pub mod channel;
pub mod codec;
pub mod error;

pub use channel::{ChannelId, NUM_CHANNELS, NUM_DATA_CHANNELS};
pub use codec::{
    decode_frame, decode_header, encode_frame, padding_for, Command, FrameHeader, HEADER_SIZE,
    MAGIC,
};
pub use error::{FrameError, Result};
