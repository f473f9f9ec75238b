use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::Result;

/// One-shot completion callback for a submitted transfer.
///
/// Invoked with the number of bytes the remote wrote into the buffer.
/// Runs on the link's completion context and must not block.
pub type TransferCallback = Box<dyn FnOnce(usize) + Send>;

/// A fixed-size buffer shared between the multiplexer core and the link.
///
/// Stands in for one slot of the coherent DMA region: the link (device
/// side) fills it, the core reads it back out. Cloning the handle shares
/// the same storage.
#[derive(Clone)]
pub struct SharedBuffer {
    size: usize,
    data: Arc<Mutex<Box<[u8]>>>,
}

impl SharedBuffer {
    /// Allocate a zeroed buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            data: Arc::new(Mutex::new(vec![0u8; size].into_boxed_slice())),
        }
    }

    /// Buffer capacity in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Device-side fill: copy `src` into the start of the buffer.
    ///
    /// Returns the number of bytes copied (truncated at capacity).
    pub fn fill(&self, src: &[u8]) -> usize {
        let mut data = self.data.lock().expect("buffer lock poisoned");
        let n = src.len().min(self.size);
        data[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Host-side view of the buffer contents.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.data.lock().expect("buffer lock poisoned");
        f(&data)
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer").field("size", &self.size).finish()
    }
}

/// A device-to-memory DMA channel.
///
/// Dropping the handle releases the channel and cancels any transfers that
/// have not completed.
pub trait RxChannel: Send {
    /// Queue a transfer into `buf`; `done` fires once when the remote has
    /// filled the buffer.
    fn submit(&mut self, buf: SharedBuffer, done: TransferCallback) -> Result<()>;

    /// Start servicing queued transfers.
    fn issue_pending(&mut self);
}

/// A memory-to-device DMA channel.
///
/// Dropping the handle releases the channel.
pub trait TxChannel: Send {
    /// Queue an encoded frame for transmission to the remote.
    fn transmit(&mut self, frame: Bytes) -> Result<()>;
}

/// The shared transport connecting host and remote co-processor.
///
/// Channel acquisition is per direction and fallible; the power handshake
/// decides when each side may be held. The two `set_*` methods drive the
/// local out-of-band signal lines observed by the remote.
pub trait DmaLink: Send + Sync {
    /// Request the receive DMA channel.
    fn request_rx(&self) -> Result<Box<dyn RxChannel>>;

    /// Request the transmit DMA channel.
    fn request_tx(&self) -> Result<Box<dyn TxChannel>>;

    /// Drive the local power-vote line.
    fn set_power_vote(&self, level: bool) -> Result<()>;

    /// Drive the local vote-acknowledgement line.
    fn set_power_ack(&self, level: bool) -> Result<()>;

    /// Sample the current level of the remote-driven power-state line.
    ///
    /// Used once at instance start to catch a remote that finished its own
    /// initialization before the local side came up.
    fn power_state_level(&self) -> bool;
}

/// Remote-driven interrupt entry points, implemented by the multiplexer
/// core and invoked by the link (or by whatever wires real interrupts to
/// it).
///
/// Both handlers perform bounded work and must not be called while the
/// link holds internal locks.
pub trait LinkEvents: Send + Sync {
    /// The remote changed its power-state line to `level`.
    fn power_state_changed(&self, level: bool);

    /// The remote toggled its vote-acknowledgement line.
    fn power_ack(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_buffer_fill_and_read() {
        let buf = SharedBuffer::new(16);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.fill(b"abc"), 3);
        buf.with_bytes(|bytes| {
            assert_eq!(&bytes[..3], b"abc");
            assert_eq!(bytes.len(), 16);
        });
    }

    #[test]
    fn shared_buffer_fill_truncates() {
        let buf = SharedBuffer::new(4);
        assert_eq!(buf.fill(b"abcdefgh"), 4);
        buf.with_bytes(|bytes| assert_eq!(bytes, b"abcd"));
    }

    #[test]
    fn shared_buffer_clones_share_storage() {
        let buf = SharedBuffer::new(8);
        let alias = buf.clone();
        buf.fill(b"xyz");
        alias.with_bytes(|bytes| assert_eq!(&bytes[..3], b"xyz"));
    }
}
