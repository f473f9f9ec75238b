//! Descriptor ring manager.
//!
//! A fixed pool of receive buffers allocated once for the lifetime of the
//! instance and kept perpetually posted to the link. Descriptors are never
//! freed individually; the whole pool goes away with the instance.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;

use shmux_link::{RxChannel, SharedBuffer};

use crate::mux::Mux;

pub(crate) struct Ring {
    buffers: Vec<SharedBuffer>,
    outstanding: AtomicUsize,
}

impl Ring {
    pub fn new(slots: usize, buffer_size: usize) -> Self {
        Self {
            buffers: (0..slots).map(|_| SharedBuffer::new(buffer_size)).collect(),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn buffer(&self, index: usize) -> &SharedBuffer {
        &self.buffers[index]
    }

    /// Submissions currently posted and not yet completed.
    pub fn occupancy(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn note_completed(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    /// Forget all outstanding submissions (the channel was released and
    /// cancelled them).
    pub fn reset(&self) {
        self.outstanding.store(0, Ordering::Release);
    }

    /// Submit one descriptor. The completion callback re-enters the
    /// multiplexer, which dispatches the buffer and re-arms the slot.
    pub fn submit_one(
        &self,
        mux: &Weak<Mux>,
        rx: &mut dyn RxChannel,
        index: usize,
    ) -> shmux_link::Result<()> {
        let buf = self.buffers[index].clone();
        let mux = mux.clone();
        rx.submit(
            buf,
            Box::new(move |len| {
                if let Some(mux) = mux.upgrade() {
                    mux.rx_complete(index, len);
                }
            }),
        )?;
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Post every descriptor and start the channel. Fails on the first
    /// descriptor the link refuses; the caller releases the channel, which
    /// cancels whatever was already queued.
    pub fn post_all(&self, mux: &Weak<Mux>, rx: &mut dyn RxChannel) -> shmux_link::Result<()> {
        for index in 0..self.buffers.len() {
            self.submit_one(mux, rx, index)?;
        }
        rx.issue_pending();
        Ok(())
    }
}
