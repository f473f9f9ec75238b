//! The multiplexer instance.
//!
//! Owns the descriptor ring, the channel table, and the power-vote state.
//! The two [`LinkEvents`] entry points are the interrupt handlers; the
//! wakeup sequence runs on whatever caller thread needs transmit
//! capability and is the only path allowed to block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::BytesMut;
use shmux_frame::{encode_frame, ChannelId, Command};
use shmux_link::{DmaLink, LinkEvents, RxChannel, TxChannel};
use tracing::{debug, error, info, warn};

use crate::adapter::{ChannelHandle, NetAdapter};
use crate::completion::Completion;
use crate::demux;
use crate::error::{MuxError, Result};
use crate::pm::PowerPolicy;
use crate::registry::ChannelTable;
use crate::ring::Ring;
use crate::{AUTOSUSPEND_DELAY, BUFFER_SIZE, MAX_TX_PAYLOAD, NUM_DESC, WAKEUP_TIMEOUT};

/// One multiplexer over one link.
///
/// Lifecycle: [`Mux::new`], wire the link's interrupt delivery to the
/// instance (it implements [`LinkEvents`]), then [`Mux::start`]. Tear down
/// with [`Mux::shutdown`]; dropping the last reference does the same
/// best-effort.
pub struct Mux {
    weak: Weak<Mux>,
    link: Arc<dyn DmaLink>,
    adapter: Arc<dyn NetAdapter>,
    ring: Ring,
    channels: ChannelTable,
    rx: Mutex<Option<Box<dyn RxChannel>>>,
    tx: Mutex<Option<Box<dyn TxChannel>>>,
    power_state: AtomicBool,
    ack_level: AtomicBool,
    transport_up: Completion,
    ack_received: Completion,
    // Serializes rising/falling edge handling so acquisition and release
    // never interleave.
    edge_lock: Mutex<()>,
    // Serializes the multi-stage wakeup sequence.
    wakeup_lock: Mutex<()>,
    pm: PowerPolicy,
    down: AtomicBool,
}

impl Mux {
    /// Construct an instance over `link`, reporting channel events to
    /// `adapter`. The descriptor pool is allocated here, once, for the
    /// lifetime of the instance.
    pub fn new(link: Arc<dyn DmaLink>, adapter: Arc<dyn NetAdapter>) -> Arc<Mux> {
        Arc::new_cyclic(|weak| Mux {
            weak: weak.clone(),
            link,
            adapter,
            ring: Ring::new(NUM_DESC, BUFFER_SIZE),
            channels: ChannelTable::new(),
            rx: Mutex::new(None),
            tx: Mutex::new(None),
            power_state: AtomicBool::new(false),
            ack_level: AtomicBool::new(false),
            transport_up: Completion::new(),
            // A fresh instance has no withdrawal outstanding.
            ack_received: Completion::completed(),
            edge_lock: Mutex::new(()),
            wakeup_lock: Mutex::new(()),
            pm: PowerPolicy::new(AUTOSUSPEND_DELAY),
            down: AtomicBool::new(false),
        })
    }

    /// Start the idle-policy worker and probe the remote power-state line.
    ///
    /// Call after interrupt delivery is wired up: if the remote finished
    /// its own initialization first, the rising-edge path runs here.
    pub fn start(self: &Arc<Self>) {
        self.pm.start(Arc::downgrade(self));
        if self.link.power_state_level() {
            debug!("remote ready before local start");
            self.power_state_changed(true);
        }
    }

    /// Look up the presentation handle for `channel`, if one exists.
    pub fn channel(&self, channel: ChannelId) -> Option<Arc<ChannelHandle>> {
        self.channels.lookup(channel)
    }

    /// Whether the remote has signaled the transport up.
    pub fn is_up(&self) -> bool {
        self.transport_up.is_complete()
    }

    /// Receive submissions currently posted to the link.
    pub fn ring_occupancy(&self) -> usize {
        self.ring.occupancy()
    }

    /// Withdraw the local power vote (forced suspend, and the idle-policy
    /// target). The remote answers by dropping the power-state line, which
    /// releases the DMA channels on the falling edge.
    pub fn suspend(&self) {
        debug!("suspend: withdrawing power vote");
        self.pm.mark_suspended();
        self.vote(false);
    }

    /// Run the wakeup handshake and acquire transmit capability (forced
    /// resume). No-op when the transport is already up for transmit.
    pub fn resume(&self) -> Result<()> {
        debug!("resume");
        self.pm.mark_active();
        self.wakeup()
    }

    /// Tear the instance down: stop the idle worker, release the DMA
    /// channels, detach every channel, withdraw the vote.
    pub fn shutdown(&self) {
        if self.down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down multiplexer");
        self.pm.stop();
        self.power_off();
        self.channels.detach_all(self.adapter.as_ref());
        self.vote(false);
    }

    pub(crate) fn adapter(&self) -> &Arc<dyn NetAdapter> {
        &self.adapter
    }

    pub(crate) fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub(crate) fn autosuspend(&self) {
        debug!("idle timeout");
        self.vote(false);
    }

    /// Transmit `payload` as a DATA frame on `channel`, waking the
    /// transport first if necessary.
    pub(crate) fn transmit(&self, channel: ChannelId, payload: &[u8]) -> Result<()> {
        if self.down.load(Ordering::Acquire) {
            return Err(MuxError::Shutdown);
        }
        if payload.len() > MAX_TX_PAYLOAD {
            return Err(shmux_frame::FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_TX_PAYLOAD,
            }
            .into());
        }
        self.pm.get();
        let result = self.transmit_inner(channel, payload);
        self.pm.put();
        result
    }

    fn transmit_inner(&self, channel: ChannelId, payload: &[u8]) -> Result<()> {
        self.wakeup()?;

        let mut frame = BytesMut::new();
        encode_frame(channel, Command::Data, payload, &mut frame)?;

        let mut guard = self.tx.lock().expect("tx lock poisoned");
        let tx = guard.as_mut().ok_or(MuxError::TransportDown)?;
        tx.transmit(frame.freeze())?;
        Ok(())
    }

    /// The three-stage wakeup sequence.
    ///
    /// "My withdrawal was seen", "my vote was seen", and "the remote
    /// finished powering up" are distinct events the remote may reorder;
    /// each gets its own bounded wait. Any timeout withdraws the vote and
    /// fails the whole request.
    fn wakeup(&self) -> Result<()> {
        let _wake = self.wakeup_lock.lock().expect("wakeup lock poisoned");
        if self.tx.lock().expect("tx lock poisoned").is_some() {
            return Ok(());
        }

        // Wait until a previous power-down was acked.
        if !self.ack_received.wait_timeout(WAKEUP_TIMEOUT) {
            return Err(MuxError::WakeupTimeout(WAKEUP_TIMEOUT));
        }

        self.vote(true);

        // Wait for the ack of our vote.
        if !self.ack_received.wait_timeout(WAKEUP_TIMEOUT) {
            self.vote(false);
            return Err(MuxError::WakeupTimeout(WAKEUP_TIMEOUT));
        }

        // Wait until the remote is actually up.
        if !self.transport_up.wait_timeout(WAKEUP_TIMEOUT) {
            self.vote(false);
            return Err(MuxError::WakeupTimeout(WAKEUP_TIMEOUT));
        }

        let tx = match self.link.request_tx() {
            Ok(tx) => tx,
            Err(err) => {
                error!(%err, "failed to request tx channel");
                self.vote(false);
                return Err(err.into());
            }
        };
        *self.tx.lock().expect("tx lock poisoned") = Some(tx);
        Ok(())
    }

    /// Raise or withdraw the local vote. Re-arms `ack_received` first so a
    /// stale completion cannot satisfy the next wait.
    fn vote(&self, enable: bool) {
        self.ack_received.reinit();
        if let Err(err) = self.link.set_power_vote(enable) {
            warn!(%err, enable, "failed to drive vote line");
        }
    }

    /// Toggle the local acknowledgement line.
    fn ack(&self) {
        let level = !self.ack_level.load(Ordering::Acquire);
        if let Err(err) = self.link.set_power_ack(level) {
            warn!(%err, "failed to drive ack line");
            return;
        }
        self.ack_level.store(level, Ordering::Release);
    }

    fn power_on(&self) -> bool {
        let mut rx = match self.link.request_rx() {
            Ok(rx) => rx,
            Err(err) => {
                error!(%err, "failed to request rx channel");
                return false;
            }
        };

        let mut guard = self.rx.lock().expect("rx lock poisoned");
        if let Err(err) = self.ring.post_all(&self.weak, rx.as_mut()) {
            error!(%err, "failed to post receive ring");
            self.ring.reset();
            return false;
        }
        *guard = Some(rx);
        true
    }

    fn power_off(&self) {
        // Dropping a channel handle releases it and cancels outstanding
        // transfers. Tx goes first, matching acquisition in reverse.
        self.tx.lock().expect("tx lock poisoned").take();
        self.rx.lock().expect("rx lock poisoned").take();
        self.ring.reset();
    }

    pub(crate) fn rx_complete(self: &Arc<Self>, index: usize, len: usize) {
        self.ring.note_completed();

        let n = len.min(BUFFER_SIZE);
        self.ring
            .buffer(index)
            .with_bytes(|data| demux::dispatch(self, &data[..n]));

        // Re-arm the slot so the pool never drains.
        let mut guard = self.rx.lock().expect("rx lock poisoned");
        if let Some(rx) = guard.as_mut() {
            match self.ring.submit_one(&self.weak, rx.as_mut(), index) {
                Ok(()) => rx.issue_pending(),
                Err(err) => warn!(index, %err, "failed to re-arm descriptor"),
            }
        }
    }
}

impl LinkEvents for Mux {
    fn power_state_changed(&self, level: bool) {
        let _edge = self.edge_lock.lock().expect("edge lock poisoned");
        self.power_state.store(level, Ordering::Release);
        debug!(level, "power state edge");

        if level {
            if self.power_on() {
                self.ack();
                self.transport_up.complete();
            } else {
                self.power_off();
            }
        } else {
            self.transport_up.reinit();
            if self.pm.is_active() {
                warn!("transport released while local side active");
            }
            self.power_off();
            self.ack();
        }
    }

    fn power_ack(&self) {
        debug!("power ack");
        self.ack_received.complete();
    }
}

impl Drop for Mux {
    fn drop(&mut self) {
        self.shutdown();
    }
}
