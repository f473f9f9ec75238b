//! In-memory link with a scriptable remote endpoint.
//!
//! [`LoopbackLink`] implements [`DmaLink`] entirely in process;
//! [`RemoteHandle`] plays the remote co-processor: it raises and lowers the
//! power-state line, acknowledges votes, fills pending receive submissions
//! with frames, and observes everything the host drives (vote/ack levels,
//! transmitted frames, channel holds). Failure injection covers channel
//! requests and individual submissions.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::trace;

use crate::error::{Dir, LinkError, Result};
use crate::traits::{DmaLink, LinkEvents, RxChannel, SharedBuffer, TransferCallback, TxChannel};

struct PendingRx {
    buf: SharedBuffer,
    done: TransferCallback,
}

#[derive(Default)]
struct State {
    // Host-driven line levels, observed by the remote.
    vote_level: bool,
    ack_level: bool,
    vote_changes: usize,
    ack_changes: usize,
    // Remote-driven power-state line level.
    power_level: bool,
    // Channel holds.
    rx_held: bool,
    tx_held: bool,
    // Receive submissions awaiting remote delivery, in submission order.
    pending_rx: VecDeque<PendingRx>,
    issued: bool,
    submit_count: usize,
    // Frames the host transmitted.
    sent: Vec<Bytes>,
    // Failure injection.
    fail_rx_request: bool,
    fail_tx_request: bool,
    fail_submit_at: Option<usize>,
}

struct Shared {
    state: Mutex<State>,
    cv: Condvar,
    events: Mutex<Option<Arc<dyn LinkEvents>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("loopback state lock poisoned")
    }

    fn notify(&self) {
        self.cv.notify_all();
    }

    fn events(&self) -> Option<Arc<dyn LinkEvents>> {
        self.events.lock().expect("events lock poisoned").clone()
    }
}

/// An in-process [`DmaLink`] for tests and demos.
pub struct LoopbackLink {
    shared: Arc<Shared>,
}

impl LoopbackLink {
    /// Create a link and the handle scripting its remote side.
    pub fn new() -> (Arc<LoopbackLink>, RemoteHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            cv: Condvar::new(),
            events: Mutex::new(None),
        });
        (
            Arc::new(LoopbackLink {
                shared: Arc::clone(&shared),
            }),
            RemoteHandle { shared },
        )
    }

    /// Register the interrupt entry points the remote will drive.
    pub fn register_events(&self, events: Arc<dyn LinkEvents>) {
        *self.shared.events.lock().expect("events lock poisoned") = Some(events);
    }
}

impl DmaLink for LoopbackLink {
    fn request_rx(&self) -> Result<Box<dyn RxChannel>> {
        let mut state = self.shared.lock();
        if state.fail_rx_request {
            return Err(LinkError::ChannelUnavailable {
                dir: Dir::Rx,
                reason: "injected request failure".to_string(),
            });
        }
        if state.rx_held {
            return Err(LinkError::ChannelUnavailable {
                dir: Dir::Rx,
                reason: "channel already held".to_string(),
            });
        }
        state.rx_held = true;
        self.shared.notify();
        Ok(Box::new(LoopbackRx {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn request_tx(&self) -> Result<Box<dyn TxChannel>> {
        let mut state = self.shared.lock();
        if state.fail_tx_request {
            return Err(LinkError::ChannelUnavailable {
                dir: Dir::Tx,
                reason: "injected request failure".to_string(),
            });
        }
        if state.tx_held {
            return Err(LinkError::ChannelUnavailable {
                dir: Dir::Tx,
                reason: "channel already held".to_string(),
            });
        }
        state.tx_held = true;
        self.shared.notify();
        Ok(Box::new(LoopbackTx {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn set_power_vote(&self, level: bool) -> Result<()> {
        let mut state = self.shared.lock();
        trace!(level, "loopback: vote line");
        state.vote_level = level;
        state.vote_changes += 1;
        self.shared.notify();
        Ok(())
    }

    fn set_power_ack(&self, level: bool) -> Result<()> {
        let mut state = self.shared.lock();
        trace!(level, "loopback: ack line");
        state.ack_level = level;
        state.ack_changes += 1;
        self.shared.notify();
        Ok(())
    }

    fn power_state_level(&self) -> bool {
        self.shared.lock().power_level
    }
}

struct LoopbackRx {
    shared: Arc<Shared>,
}

impl RxChannel for LoopbackRx {
    fn submit(&mut self, buf: SharedBuffer, done: TransferCallback) -> Result<()> {
        let mut state = self.shared.lock();
        let index = state.submit_count;
        state.submit_count += 1;
        if state.fail_submit_at == Some(index) {
            return Err(LinkError::Prepare {
                dir: Dir::Rx,
                reason: format!("injected failure at submission {index}"),
            });
        }
        state.pending_rx.push_back(PendingRx { buf, done });
        self.shared.notify();
        Ok(())
    }

    fn issue_pending(&mut self) {
        let mut state = self.shared.lock();
        state.issued = true;
        self.shared.notify();
    }
}

impl Drop for LoopbackRx {
    // Releasing the channel cancels outstanding submissions.
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.rx_held = false;
        state.issued = false;
        state.pending_rx.clear();
        self.shared.notify();
    }
}

struct LoopbackTx {
    shared: Arc<Shared>,
}

impl TxChannel for LoopbackTx {
    fn transmit(&mut self, frame: Bytes) -> Result<()> {
        let mut state = self.shared.lock();
        state.sent.push(frame);
        self.shared.notify();
        Ok(())
    }
}

impl Drop for LoopbackTx {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.tx_held = false;
        self.shared.notify();
    }
}

/// Scripting surface for the simulated remote co-processor.
#[derive(Clone)]
pub struct RemoteHandle {
    shared: Arc<Shared>,
}

impl RemoteHandle {
    /// Drive the remote power-state line and fire the host's edge handler.
    pub fn set_power_state(&self, level: bool) {
        {
            let mut state = self.shared.lock();
            state.power_level = level;
            self.shared.notify();
        }
        if let Some(events) = self.shared.events() {
            events.power_state_changed(level);
        }
    }

    /// Toggle the remote acknowledgement line (edge delivered to the host).
    pub fn ack(&self) {
        if let Some(events) = self.shared.events() {
            events.power_ack();
        }
    }

    /// Complete the oldest pending receive submission with `frame`.
    ///
    /// Returns `false` if the host has no submission outstanding (the ring
    /// is exhausted or the transport is down).
    pub fn deliver(&self, frame: &[u8]) -> bool {
        let pending = {
            let mut state = self.shared.lock();
            state.pending_rx.pop_front()
        };
        let Some(pending) = pending else {
            return false;
        };
        let n = pending.buf.fill(frame);
        (pending.done)(n);
        true
    }

    /// Number of receive submissions awaiting delivery.
    pub fn pending_rx(&self) -> usize {
        self.shared.lock().pending_rx.len()
    }

    /// Whether the host has issued pending transfers on the rx channel.
    pub fn rx_issued(&self) -> bool {
        self.shared.lock().issued
    }

    /// Current level of the host vote line.
    pub fn vote_level(&self) -> bool {
        self.shared.lock().vote_level
    }

    /// Current level of the host acknowledgement line.
    pub fn ack_level(&self) -> bool {
        self.shared.lock().ack_level
    }

    /// Number of times the host drove the vote line.
    pub fn vote_changes(&self) -> usize {
        self.shared.lock().vote_changes
    }

    /// Number of times the host drove the acknowledgement line.
    pub fn ack_changes(&self) -> usize {
        self.shared.lock().ack_changes
    }

    /// Whether the host currently holds the rx channel.
    pub fn rx_held(&self) -> bool {
        self.shared.lock().rx_held
    }

    /// Whether the host currently holds the tx channel.
    pub fn tx_held(&self) -> bool {
        self.shared.lock().tx_held
    }

    /// Total submissions attempted on the rx channel so far.
    pub fn submit_count(&self) -> usize {
        self.shared.lock().submit_count
    }

    /// Frames the host has transmitted, in order.
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.shared.lock().sent.clone()
    }

    /// Drain the transmitted-frame log.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut self.shared.lock().sent)
    }

    /// Fail the next rx channel request.
    pub fn set_fail_rx_request(&self, fail: bool) {
        self.shared.lock().fail_rx_request = fail;
    }

    /// Fail the next tx channel request.
    pub fn set_fail_tx_request(&self, fail: bool) {
        self.shared.lock().fail_tx_request = fail;
    }

    /// Fail the submission with the given absolute index.
    pub fn set_fail_submit_at(&self, index: Option<usize>) {
        self.shared.lock().fail_submit_at = index;
    }

    /// Block until the host vote line reaches `level`.
    pub fn wait_vote(&self, level: bool, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.vote_level == level)
    }

    /// Block until the host has driven the acknowledgement line at least
    /// `count` times in total.
    pub fn wait_ack_changes(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.ack_changes >= count)
    }

    /// Block until the host has at least `count` receive submissions
    /// outstanding.
    pub fn wait_pending_rx(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.pending_rx.len() >= count)
    }

    /// Block until the host has transmitted at least `count` frames.
    pub fn wait_sent(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.sent.len() >= count)
    }

    fn wait_until(&self, timeout: Duration, pred: impl Fn(&State) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while !pred(&state) {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, result) = self
                .shared
                .cv
                .wait_timeout(state, remaining)
                .expect("loopback state lock poisoned");
            state = guard;
            if result.timed_out() && !pred(&state) {
                return false;
            }
        }
        true
    }
}
