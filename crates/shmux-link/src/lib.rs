//! Transport abstraction for the shared-memory multiplexer.
//!
//! Provides the seam between the multiplexer core and whatever moves bytes
//! to the remote co-processor:
//! - [`DmaLink`]: per-direction DMA channel acquisition and the two
//!   out-of-band power signal lines (vote and vote-acknowledgement)
//! - [`RxChannel`] / [`TxChannel`]: transfer submission with one-shot
//!   completion callbacks
//! - [`LinkEvents`]: the two remote-driven interrupt entry points
//!
//! The signal lines are modeled as an asynchronous two-message exchange
//! rather than GPIO wiring, so the power handshake above is testable
//! without hardware. The [`loopback`] module ships an in-memory link with a
//! scriptable remote endpoint for exactly that.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{Dir, LinkError, Result};
pub use loopback::{LoopbackLink, RemoteHandle};
pub use traits::{DmaLink, LinkEvents, RxChannel, SharedBuffer, TransferCallback, TxChannel};
