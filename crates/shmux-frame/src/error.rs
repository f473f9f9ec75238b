/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic {found:#06x} (expected {expected:#06x})")]
    InvalidMagic { found: u16, expected: u16 },

    /// The buffer is too short to hold a frame header.
    #[error("buffer too short for frame header ({len} bytes, need {need})")]
    Truncated { len: usize, need: usize },

    /// The header describes a payload that overruns the buffer.
    #[error("frame overruns buffer (payload {payload_len} + padding {padding} bytes, {available} available after header)")]
    OutOfBounds {
        payload_len: u16,
        padding: u8,
        available: usize,
    },

    /// The payload exceeds what the header's length field can describe.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
