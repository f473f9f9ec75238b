//! Core of the shared-memory channel multiplexer.
//!
//! One [`Mux`] instance multiplexes the fixed channel space over a single
//! DMA link and coordinates powering the link up and down:
//! - a descriptor ring of receive buffers kept perpetually posted,
//! - a two-sided power-vote/acknowledgement handshake with bounded waits,
//! - a frame demultiplexer routing control commands and channel payloads,
//! - a channel lifecycle registry handing presentation objects to the
//!   external network layer via the [`NetAdapter`] trait.
//!
//! The instance has an explicit lifecycle: construct with [`Mux::new`],
//! wire the link's events to it, call [`Mux::start`], and tear down with
//! [`Mux::shutdown`].

pub mod adapter;
pub mod completion;
mod demux;
pub mod error;
pub mod mux;
mod pm;
mod registry;
mod ring;

use std::time::Duration;

pub use adapter::{ChannelHandle, NetAdapter, RegistrationError};
pub use completion::Completion;
pub use error::{MuxError, Result};
pub use mux::Mux;

/// Number of descriptor ring slots.
pub const NUM_DESC: usize = 32;

/// Size of each receive buffer in bytes.
pub const BUFFER_SIZE: usize = 2048;

/// Largest payload the transmit path accepts.
pub const MAX_TX_PAYLOAD: usize = BUFFER_SIZE - shmux_frame::HEADER_SIZE;

/// Idle delay before the local power vote is withdrawn.
pub const AUTOSUSPEND_DELAY: Duration = Duration::from_millis(1000);

/// Bound on each blocking wait in the wakeup handshake.
pub const WAKEUP_TIMEOUT: Duration = Duration::from_millis(2000);
