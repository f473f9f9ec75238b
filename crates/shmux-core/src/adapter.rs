//! Collaborator surface toward the external network layer.
//!
//! The core never owns network devices. It hands the adapter one
//! [`ChannelHandle`] per open channel and reports availability changes;
//! the adapter (or anything holding the handle) transmits through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use shmux_frame::ChannelId;

use crate::error::Result;
use crate::mux::Mux;

/// The external network layer could not register a channel.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RegistrationError(pub String);

/// Callbacks into the external network-interface layer.
///
/// `channel_available` and `channel_unavailable` run with the channel table
/// locked; implementations must not call back into the registry from them.
/// `deliver` runs on the receive completion context and must not block.
pub trait NetAdapter: Send + Sync {
    /// A channel became available. Called on first OPEN (registration) and
    /// again when a closed channel is re-attached.
    ///
    /// Returning an error on first OPEN destroys the handle and leaves the
    /// channel slot empty; on re-attach it leaves the channel detached.
    fn channel_available(&self, handle: &Arc<ChannelHandle>) -> std::result::Result<(), RegistrationError>;

    /// The channel was closed at the transport level. In-flight operations
    /// on the handle now fail with a not-ready condition.
    fn channel_unavailable(&self, handle: &Arc<ChannelHandle>);

    /// Payload received on an attached channel. Padding is already
    /// stripped.
    fn deliver(&self, handle: &Arc<ChannelHandle>, payload: Bytes);
}

/// Per-channel presentation object handed to the adapter.
///
/// Created on the first OPEN for a channel and kept for the lifetime of the
/// multiplexer; CLOSE only detaches it, so a later OPEN re-attaches the
/// same handle.
pub struct ChannelHandle {
    channel: ChannelId,
    name: String,
    attached: AtomicBool,
    mux: Weak<Mux>,
}

impl ChannelHandle {
    pub(crate) fn new(channel: ChannelId, mux: Weak<Mux>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            name: channel.interface_name(),
            attached: AtomicBool::new(false),
            mux,
        })
    }

    /// The channel this handle presents.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Interface name derived from the channel id (`mux0`..`mux7`,
    /// `muxalt0`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the channel is currently attached (device present).
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn attach(&self) {
        self.attached.store(true, Ordering::Release);
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// Transmit a payload on this channel.
    ///
    /// Wakes the transport if it is down, which may block for the bounded
    /// handshake waits. Fails with a not-ready condition when the channel
    /// is detached and with a shutdown error when the multiplexer is gone.
    pub fn transmit(&self, payload: &[u8]) -> Result<()> {
        let Some(mux) = self.mux.upgrade() else {
            return Err(crate::error::MuxError::Shutdown);
        };
        if !self.is_attached() {
            return Err(crate::error::MuxError::NotReady(self.channel));
        }
        mux.transmit(self.channel, payload)
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("channel", &self.channel)
            .field("name", &self.name)
            .field("attached", &self.is_attached())
            .finish()
    }
}
