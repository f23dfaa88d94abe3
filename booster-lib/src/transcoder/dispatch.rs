//! Execution contexts for completion callbacks.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A unit of work handed to a [`Dispatch`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where a completion callback runs.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, task: Task);
}

/// Runs callbacks inline on the transcode worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerDispatch;

impl Dispatch for WorkerDispatch {
    fn dispatch(&self, task: Task) {
        task();
    }
}

/// Queue drained by a caller-owned thread, such as a UI or main loop.
pub struct CallbackQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// A dispatcher that posts tasks to this queue.
    pub fn dispatcher(&self) -> QueueDispatch {
        QueueDispatch {
            sender: Mutex::new(self.sender.clone()),
        }
    }

    /// Run every task already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one task and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Dispatch`] handle for a [`CallbackQueue`].
pub struct QueueDispatch {
    sender: Mutex<Sender<Task>>,
}

impl Dispatch for QueueDispatch {
    fn dispatch(&self, task: Task) {
        let sent = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(task);
        // A dropped queue still gets its callback delivered, inline.
        if let Err(mpsc::SendError(task)) = sent {
            task();
        }
    }
}
