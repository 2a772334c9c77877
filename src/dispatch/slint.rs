// Slint event loop as an affinity executor
//
// Slint widgets may only be touched from the thread running the event loop.
// This adapter lets the dispatcher treat that thread as its affinity thread.

use crate::dispatch::executor::{AffinityExecutor, AffinityTask, ExecutorClosed};
use std::thread::{self, ThreadId};

/// Executor backed by `slint::invoke_from_event_loop`.
///
/// Construct it on the thread that will run the Slint event loop (usually
/// `main`, before `run()`); that thread becomes the affinity thread.
#[derive(Debug, Clone)]
pub struct SlintExecutor {
    event_loop_thread: ThreadId,
}

impl SlintExecutor {
    pub fn new() -> Self {
        Self {
            event_loop_thread: thread::current().id(),
        }
    }
}

impl Default for SlintExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl AffinityExecutor for SlintExecutor {
    fn is_affinity_thread(&self) -> bool {
        thread::current().id() == self.event_loop_thread
    }

    fn execute(&self, task: AffinityTask) -> Result<(), ExecutorClosed> {
        ::slint::invoke_from_event_loop(task).map_err(|e| {
            tracing::warn!("Failed to queue task to the Slint event loop: {:?}", e);
            ExecutorClosed
        })
    }
}
