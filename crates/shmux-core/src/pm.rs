//! Idle-timeout power policy.
//!
//! Usage-counted auto-suspend: the transmit path holds a usage reference
//! around each send; once the count drops to zero and the idle delay
//! elapses, a worker thread withdraws the local power vote. Starts in the
//! suspended state, like the transport itself.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::mux::Mux;

struct PmState {
    usage: usize,
    suspended: bool,
    last_idle: Instant,
    shutdown: bool,
}

struct PmInner {
    state: Mutex<PmState>,
    cv: Condvar,
    delay: Duration,
}

pub(crate) struct PowerPolicy {
    inner: Arc<PmInner>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PowerPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(PmInner {
                state: Mutex::new(PmState {
                    usage: 0,
                    suspended: true,
                    last_idle: Instant::now(),
                    shutdown: false,
                }),
                cv: Condvar::new(),
                delay,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self, mux: Weak<Mux>) {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("shmux-pm".to_string())
            .spawn(move || run(inner, mux))
            .expect("failed to spawn power policy worker");
        *self.worker.lock().expect("pm worker lock poisoned") = Some(handle);
    }

    /// Take a usage reference; marks the instance active.
    pub fn get(&self) {
        let mut state = self.inner.state.lock().expect("pm state lock poisoned");
        state.usage += 1;
        state.suspended = false;
    }

    /// Drop a usage reference; the idle clock starts when the count hits
    /// zero.
    pub fn put(&self) {
        let mut state = self.inner.state.lock().expect("pm state lock poisoned");
        state.usage = state.usage.saturating_sub(1);
        if state.usage == 0 {
            state.last_idle = Instant::now();
            self.inner.cv.notify_all();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.inner.state.lock().expect("pm state lock poisoned").suspended
    }

    pub fn mark_suspended(&self) {
        self.inner
            .state
            .lock()
            .expect("pm state lock poisoned")
            .suspended = true;
    }

    pub fn mark_active(&self) {
        let mut state = self.inner.state.lock().expect("pm state lock poisoned");
        state.suspended = false;
        state.last_idle = Instant::now();
        self.inner.cv.notify_all();
    }

    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock().expect("pm state lock poisoned");
            state.shutdown = true;
            self.inner.cv.notify_all();
        }
        let handle = self.worker.lock().expect("pm worker lock poisoned").take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run(inner: Arc<PmInner>, mux: Weak<Mux>) {
    let mut state = inner.state.lock().expect("pm state lock poisoned");
    loop {
        if state.shutdown {
            return;
        }
        if state.usage == 0 && !state.suspended {
            let elapsed = state.last_idle.elapsed();
            if elapsed >= inner.delay {
                state.suspended = true;
                drop(state);
                if let Some(mux) = mux.upgrade() {
                    mux.autosuspend();
                }
                state = inner.state.lock().expect("pm state lock poisoned");
            } else {
                let (guard, _) = inner
                    .cv
                    .wait_timeout(state, inner.delay - elapsed)
                    .expect("pm state lock poisoned");
                state = guard;
            }
        } else {
            state = inner.cv.wait(state).expect("pm state lock poisoned");
        }
    }
}
