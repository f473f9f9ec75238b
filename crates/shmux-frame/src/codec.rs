use bytes::{BufMut, BytesMut};

use crate::channel::ChannelId;
use crate::error::{FrameError, Result};

/// Frame header: magic (2) + signal (1) + command (1) + padding (1) +
/// channel (1) + payload length (2) = 8 bytes, little-endian.
pub const HEADER_SIZE: usize = 8;

/// Magic sentinel every valid header starts with.
pub const MAGIC: u16 = 0x33fc;

/// Payload lengths are word-aligned on the wire.
const WORD_SIZE: usize = 4;

/// Frame command byte.
///
/// Unknown values survive decoding so the demultiplexer can log and drop
/// them instead of failing the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Payload bytes for an open channel.
    Data,
    /// Remote requests the channel be opened.
    Open,
    /// Remote requests the channel be closed.
    Close,
    /// Anything else; carried for diagnostics.
    Unknown(u8),
}

impl Command {
    /// Parse the raw command byte. Never fails.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Command::Data,
            1 => Command::Open,
            2 => Command::Close,
            other => Command::Unknown(other),
        }
    }

    /// The raw byte carried in the frame header.
    pub fn raw(self) -> u8 {
        match self {
            Command::Data => 0,
            Command::Open => 1,
            Command::Close => 2,
            Command::Unknown(other) => other,
        }
    }
}

/// A decoded frame header.
///
/// The channel is kept raw here; range validation belongs to the
/// demultiplexer, which needs to log out-of-range ids rather than error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Reserved signal bits, carried verbatim and never interpreted.
    pub signal: u8,
    /// Frame command.
    pub command: Command,
    /// Trailing pad bytes (0..=3) appended after the payload.
    pub padding: u8,
    /// Raw channel id byte.
    pub channel: u8,
    /// Payload length in bytes, excluding padding.
    pub payload_len: u16,
}

impl FrameHeader {
    /// Total wire size of the frame this header describes.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize + self.padding as usize
    }
}

/// Pad bytes needed to word-align a payload of `len` bytes.
pub fn padding_for(len: usize) -> u8 {
    (len.wrapping_neg() % WORD_SIZE) as u8
}

/// Decode and validate a frame header from the start of `src`.
///
/// The magic is checked before any other field is trusted; a mismatch
/// invalidates the whole buffer.
pub fn decode_header(src: &[u8]) -> Result<FrameHeader> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            len: src.len(),
            need: HEADER_SIZE,
        });
    }

    let magic = u16::from_le_bytes([src[0], src[1]]);
    if magic != MAGIC {
        return Err(FrameError::InvalidMagic {
            found: magic,
            expected: MAGIC,
        });
    }

    Ok(FrameHeader {
        signal: src[2],
        command: Command::from_raw(src[3]),
        padding: src[4],
        channel: src[5],
        payload_len: u16::from_le_bytes([src[6], src[7]]),
    })
}

/// Decode a complete frame from a receive buffer.
///
/// Returns the header and the payload slice (padding excluded). The payload
/// must fit within `src` together with its padding; a header that overruns
/// the buffer is rejected.
pub fn decode_frame(src: &[u8]) -> Result<(FrameHeader, &[u8])> {
    let header = decode_header(src)?;

    let available = src.len() - HEADER_SIZE;
    if header.payload_len as usize + header.padding as usize > available {
        return Err(FrameError::OutOfBounds {
            payload_len: header.payload_len,
            padding: header.padding,
            available,
        });
    }

    let payload = &src[HEADER_SIZE..HEADER_SIZE + header.payload_len as usize];
    Ok((header, payload))
}

/// Encode a frame into `dst`: header, payload, then zero padding up to the
/// next word boundary.
pub fn encode_frame(channel: ChannelId, command: Command, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u16::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        });
    }

    let padding = padding_for(payload.len());
    dst.reserve(HEADER_SIZE + payload.len() + padding as usize);
    dst.put_u16_le(MAGIC);
    dst.put_u8(0); // signal: transmitted as zero
    dst.put_u8(command.raw());
    dst.put_u8(padding);
    dst.put_u8(channel.raw());
    dst.put_u16_le(payload.len() as u16);
    dst.put_slice(payload);
    dst.put_bytes(0, padding as usize);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"hello, shmux!"; // 13 bytes -> 3 pad bytes
        encode_frame(ChannelId::Data(3), Command::Data, payload, &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + payload.len() + 3);
        assert_eq!(buf.len() % 4, 0);

        let (header, decoded) = decode_frame(&buf).unwrap();
        assert_eq!(header.command, Command::Data);
        assert_eq!(header.channel, 3);
        assert_eq!(header.padding, 3);
        assert_eq!(header.payload_len, payload.len() as u16);
        assert_eq!(header.signal, 0);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn padding_values() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(1), 3);
        assert_eq!(padding_for(2), 2);
        assert_eq!(padding_for(3), 1);
        assert_eq!(padding_for(4), 0);
        assert_eq!(padding_for(100), 0);
        assert_eq!(padding_for(101), 3);
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut buf = BytesMut::new();
        encode_frame(ChannelId::Data(0), Command::Open, b"", &mut buf).unwrap();
        buf[0] = 0xde;
        buf[1] = 0xad;

        let err = decode_frame(&buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic { found: 0xadde, .. }));
    }

    #[test]
    fn truncated_header_rejected() {
        let err = decode_header(&[0xfc, 0x33, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { len: 3, .. }));
    }

    #[test]
    fn payload_overrun_rejected() {
        let mut buf = BytesMut::new();
        encode_frame(ChannelId::Data(1), Command::Data, b"abcd", &mut buf).unwrap();
        // Claim a payload longer than the buffer holds.
        buf[6] = 0xff;
        buf[7] = 0x01;

        let err = decode_frame(&buf).unwrap_err();
        assert!(matches!(err, FrameError::OutOfBounds { .. }));
    }

    #[test]
    fn unknown_command_survives_decode() {
        let mut buf = BytesMut::new();
        encode_frame(ChannelId::Data(0), Command::Unknown(9), b"", &mut buf).unwrap();

        let (header, _) = decode_frame(&buf).unwrap();
        assert_eq!(header.command, Command::Unknown(9));
        assert_eq!(header.command.raw(), 9);
    }

    #[test]
    fn out_of_range_channel_byte_preserved() {
        // Channel range is the demultiplexer's concern; decode keeps the
        // raw byte so it can be logged.
        let mut buf = BytesMut::new();
        encode_frame(ChannelId::Data(0), Command::Data, b"", &mut buf).unwrap();
        buf[5] = 200;

        let (header, _) = decode_frame(&buf).unwrap();
        assert_eq!(header.channel, 200);
    }

    #[test]
    fn payload_too_large_rejected() {
        let payload = vec![0u8; u16::MAX as usize + 1];
        let mut buf = BytesMut::new();
        let err = encode_frame(ChannelId::Data(0), Command::Data, &payload, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn magic_checked_before_length() {
        // Bad magic plus an absurd length: magic must win.
        let buf = [0x00u8, 0x00, 0, 0, 0, 0, 0xff, 0xff];
        let err = decode_frame(&buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic { .. }));
    }
}
