//! Frame demultiplexer.
//!
//! Entered once per completed receive buffer. Validation order matters:
//! the magic is checked before any other field is trusted, then the
//! channel range, then the command. Protocol violations are absorbed
//! locally; nothing on this path is fatal.

use std::sync::Arc;

use bytes::Bytes;
use shmux_frame::{decode_frame, ChannelId, Command, FrameError};
use tracing::{debug, error, trace, warn};

use crate::mux::Mux;

pub(crate) fn dispatch(mux: &Arc<Mux>, data: &[u8]) {
    let (header, payload) = match decode_frame(data) {
        Ok(frame) => frame,
        Err(err @ FrameError::InvalidMagic { .. }) => {
            error!(%err, "dropping receive buffer");
            return;
        }
        Err(err) => {
            warn!(%err, "dropping malformed receive buffer");
            return;
        }
    };

    let Some(channel) = ChannelId::from_raw(header.channel) else {
        warn!(channel = header.channel, "unsupported channel");
        return;
    };

    trace!(
        signal = header.signal,
        command = ?header.command,
        %channel,
        len = header.payload_len,
        pad = header.padding,
        "frame received"
    );

    match header.command {
        Command::Data => match mux.channel(channel) {
            Some(handle) if handle.is_attached() => {
                mux.adapter().deliver(&handle, Bytes::copy_from_slice(payload));
            }
            _ => debug!(%channel, "data for unattached channel dropped"),
        },
        Command::Open => mux.channels().open(mux, channel),
        Command::Close => mux.channels().close(mux.adapter().as_ref(), channel),
        Command::Unknown(raw) => {
            warn!(command = raw, %channel, "unsupported command");
        }
    }
}
