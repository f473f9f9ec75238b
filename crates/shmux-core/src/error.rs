use std::time::Duration;

use shmux_frame::ChannelId;

/// Errors that can occur in multiplexer operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Link-level error.
    #[error("link error: {0}")]
    Link(#[from] shmux_link::LinkError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] shmux_frame::FrameError),

    /// The wakeup handshake timed out; the local vote has been withdrawn.
    #[error("wakeup timed out after {0:?}")]
    WakeupTimeout(Duration),

    /// The channel is closed or detached ("device absent").
    #[error("channel {0} not ready")]
    NotReady(ChannelId),

    /// The transport went down while the operation was in flight.
    #[error("transport down")]
    TransportDown,

    /// The external network layer rejected channel registration.
    #[error("adapter rejected channel {channel}: {reason}")]
    Adapter { channel: ChannelId, reason: String },

    /// The multiplexer instance has been shut down.
    #[error("multiplexer shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, MuxError>;
