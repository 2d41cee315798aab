//! Cancellable delayed tasks
//!
//! A task waits on its own thread. Cancelling (or dropping) the handle
//! closes the channel the thread waits on, so the action never runs. A task
//! that already fired is unaffected; callers that need exactly-once semantics
//! check [`ScheduledTask::id`] against what they expect under their own lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct ScheduledTask {
    id: u64,
    _cancel: Sender<()>,
}

impl ScheduledTask {
    /// Run `action` after `delay` unless cancelled first
    pub fn spawn<F>(name: &str, delay: Duration, action: F) -> std::io::Result<Self>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);
        thread::Builder::new().name(name.to_string()).spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(delay) {
                action(id);
            }
        })?;
        Ok(Self {
            id,
            _cancel: cancel_tx,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(self) {}
}
