/// Transfer direction, host-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    /// Device to memory (receive).
    Rx,
    /// Memory to device (transmit).
    Tx,
}

impl std::fmt::Display for Dir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dir::Rx => write!(f, "rx"),
            Dir::Tx => write!(f, "tx"),
        }
    }
}

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Requesting a DMA channel from the link failed.
    #[error("failed to request {dir} DMA channel: {reason}")]
    ChannelUnavailable { dir: Dir, reason: String },

    /// Preparing or queueing a transfer failed.
    #[error("failed to prepare {dir} transfer: {reason}")]
    Prepare { dir: Dir, reason: String },

    /// The link has been shut down.
    #[error("link shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, LinkError>;
