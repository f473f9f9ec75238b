//! One-shot completion signal with timed waits.
//!
//! Once completed, every current and future waiter is released until the
//! completion is re-armed with [`Completion::reinit`]. The power handshake
//! uses two of these: "transport up" and "acknowledgement received".

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Completion {
    /// A completion that has not fired yet.
    pub fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// A completion that starts in the completed state.
    pub fn completed() -> Self {
        Self {
            done: Mutex::new(true),
            cv: Condvar::new(),
        }
    }

    /// Release all current and future waiters.
    pub fn complete(&self) {
        let mut done = self.done.lock().expect("completion lock poisoned");
        *done = true;
        self.cv.notify_all();
    }

    /// Re-arm the completion.
    pub fn reinit(&self) {
        let mut done = self.done.lock().expect("completion lock poisoned");
        *done = false;
    }

    /// Whether the completion has fired and not been re-armed.
    pub fn is_complete(&self) -> bool {
        *self.done.lock().expect("completion lock poisoned")
    }

    /// Wait for the completion, bounded by `timeout`.
    ///
    /// Returns `false` if the bound expired first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock().expect("completion lock poisoned");
        while !*done {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, result) = self
                .cv
                .wait_timeout(done, remaining)
                .expect("completion lock poisoned");
            done = guard;
            if result.timed_out() && !*done {
                return false;
            }
        }
        true
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn wait_returns_immediately_when_completed() {
        let completion = Completion::completed();
        assert!(completion.is_complete());
        assert!(completion.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn wait_times_out() {
        let completion = Completion::new();
        let start = Instant::now();
        assert!(!completion.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn complete_releases_waiter() {
        let completion = Arc::new(Completion::new());
        let waiter = {
            let completion = Arc::clone(&completion);
            thread::spawn(move || completion.wait_timeout(Duration::from_secs(2)))
        };
        thread::sleep(Duration::from_millis(20));
        completion.complete();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn reinit_rearms() {
        let completion = Completion::completed();
        completion.reinit();
        assert!(!completion.is_complete());
        assert!(!completion.wait_timeout(Duration::from_millis(10)));
        completion.complete();
        assert!(completion.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn complete_is_sticky_for_late_waiters() {
        let completion = Completion::new();
        completion.complete();
        completion.complete();
        assert!(completion.wait_timeout(Duration::from_millis(1)));
        assert!(completion.wait_timeout(Duration::from_millis(1)));
    }
}
