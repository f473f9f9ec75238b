//! Channel lifecycle registry.
//!
//! A fixed array indexed by channel id; the id space is closed at compile
//! time. One mutex guards open/close/lookup, since receive-context dispatch
//! and administrative teardown can race.

use std::sync::{Arc, Mutex};

use shmux_frame::{ChannelId, NUM_CHANNELS};
use tracing::{error, info, warn};

use crate::adapter::{ChannelHandle, NetAdapter};
use crate::mux::Mux;

pub(crate) struct ChannelTable {
    slots: Mutex<Vec<Option<Arc<ChannelHandle>>>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(vec![None; NUM_CHANNELS as usize]),
        }
    }

    pub fn lookup(&self, channel: ChannelId) -> Option<Arc<ChannelHandle>> {
        self.slots.lock().expect("channel table lock poisoned")[channel.index()].clone()
    }

    /// Handle an OPEN command for `channel`.
    ///
    /// Duplicate OPEN on an attached slot is a protocol error (logged, no
    /// state change). A populated but detached slot is re-attached in
    /// place. An empty slot gets a fresh handle registered with the
    /// adapter; registration failure leaves the slot empty.
    pub fn open(&self, mux: &Arc<Mux>, channel: ChannelId) {
        let mut slots = self.slots.lock().expect("channel table lock poisoned");
        match &slots[channel.index()] {
            Some(handle) if handle.is_attached() => {
                error!(%channel, "channel already open");
            }
            Some(handle) => {
                handle.attach();
                if let Err(err) = mux.adapter().channel_available(handle) {
                    warn!(%channel, %err, "re-attach rejected by adapter");
                    handle.detach();
                } else {
                    info!(name = handle.name(), %channel, "channel re-attached");
                }
            }
            None => {
                let handle = ChannelHandle::new(channel, Arc::downgrade(mux));
                handle.attach();
                match mux.adapter().channel_available(&handle) {
                    Ok(()) => {
                        info!(name = handle.name(), %channel, "channel open");
                        slots[channel.index()] = Some(handle);
                    }
                    Err(err) => {
                        error!(%channel, %err, "failed to register channel");
                        // Handle dropped; the slot stays empty.
                    }
                }
            }
        }
    }

    /// Handle a CLOSE command for `channel`.
    ///
    /// CLOSE on an empty or already-detached slot is a protocol error. An
    /// attached slot is detached and reported unavailable exactly once; the
    /// handle stays in the slot so a later OPEN re-attaches it.
    pub fn close(&self, adapter: &dyn NetAdapter, channel: ChannelId) {
        let slots = self.slots.lock().expect("channel table lock poisoned");
        match &slots[channel.index()] {
            Some(handle) if handle.is_attached() => {
                handle.detach();
                adapter.channel_unavailable(handle);
                info!(name = handle.name(), %channel, "channel closed");
            }
            _ => error!(%channel, "channel not open"),
        }
    }

    /// Detach every attached channel (instance teardown).
    pub fn detach_all(&self, adapter: &dyn NetAdapter) {
        let slots = self.slots.lock().expect("channel table lock poisoned");
        for handle in slots.iter().flatten() {
            if handle.is_attached() {
                handle.detach();
                adapter.channel_unavailable(handle);
            }
        }
    }
}
