// Affinity executors - the threads that thread-confined work runs on
//
// An executor answers two questions for the dispatcher:
// 1. Is the calling thread the affinity thread?
// 2. Can this task be queued to run there later?
//
// AffinityThread is a dedicated single-consumer thread, InlineExecutor is a
// synchronous test double, and SlintExecutor (feature "slint") adapts the
// Slint event loop.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use thiserror::Error;
use tokio::sync::mpsc;

/// A zero-argument unit of work queued onto the affinity thread.
pub type AffinityTask = Box<dyn FnOnce() + Send + 'static>;

/// The executor no longer accepts tasks.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("affinity executor is closed")]
pub struct ExecutorClosed;

/// Capability to run work on one designated thread.
///
/// Implementations must run accepted tasks on the affinity thread, in
/// submission order, one at a time. A task that is accepted but never run
/// must be dropped, which is how waiting callers learn it was discarded.
#[cfg_attr(test, mockall::automock)]
pub trait AffinityExecutor: Send + Sync {
    /// Whether the calling thread is the affinity thread.
    fn is_affinity_thread(&self) -> bool;

    /// Queue a task to run later on the affinity thread.
    fn execute(&self, task: AffinityTask) -> Result<(), ExecutorClosed>;
}

/// A dedicated, long-lived thread that runs queued tasks in order.
///
/// The queue is unbounded so that enqueueing never blocks, including when the
/// affinity thread enqueues onto itself. Panicking tasks are caught and
/// logged; the thread keeps serving.
///
/// # Example
/// ```ignore
/// let affinity = AffinityThread::spawn("ui")?;
/// affinity.execute(Box::new(|| println!("on the affinity thread")))?;
/// affinity.shutdown();
/// ```
pub struct AffinityThread {
    name: String,
    thread_id: ThreadId,

    /// `None` once shut down
    task_tx: Mutex<Option<mpsc::UnboundedSender<AffinityTask>>>,

    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AffinityThread {
    /// Spawn the affinity thread with the given name.
    pub fn spawn(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<AffinityTask>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!("Affinity thread {} started", thread_name);

            while let Some(task) = task_rx.blocking_recv() {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    tracing::error!(
                        "Task panicked on affinity thread {}: {}",
                        thread_name,
                        panic_message(payload.as_ref())
                    );
                }
            }

            tracing::debug!("Affinity thread {} terminated", thread_name);
        })?;

        let thread_id = handle.thread().id();
        tracing::info!("Affinity thread {} spawned ({:?})", name, thread_id);

        Ok(Self {
            name,
            thread_id,
            task_tx: Mutex::new(Some(task_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stop accepting tasks, let queued tasks finish, and join the thread.
    ///
    /// Called from the affinity thread itself, the join is skipped; the
    /// thread exits on its own once the queue is empty.
    pub fn shutdown(&self) {
        let sender = self
            .task_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        if self.is_affinity_thread() {
            tracing::warn!(
                "Affinity thread {} shut down from itself - not joining",
                self.name
            );
            return;
        }

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Affinity thread {} exited abnormally", self.name);
            }
        }

        tracing::info!("Affinity thread {} shut down", self.name);
    }
}

impl AffinityExecutor for AffinityThread {
    fn is_affinity_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn execute(&self, task: AffinityTask) -> Result<(), ExecutorClosed> {
        let guard = self.task_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| ExecutorClosed),
            None => Err(ExecutorClosed),
        }
    }
}

impl Drop for AffinityThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Executor that treats every thread as the affinity thread.
///
/// Tasks run synchronously inside `execute`. Meant for tests and for hosts
/// that have no thread confinement at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl AffinityExecutor for InlineExecutor {
    fn is_affinity_thread(&self) -> bool {
        true
    }

    fn execute(&self, task: AffinityTask) -> Result<(), ExecutorClosed> {
        task();
        Ok(())
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn test_tasks_run_in_submission_order() {
        let affinity = AffinityThread::spawn("order-test").unwrap();
        let (tx, rx) = std_mpsc::channel();

        for i in 0..20 {
            let tx = tx.clone();
            affinity
                .execute(Box::new(move || {
                    tx.send(i).unwrap();
                }))
                .unwrap();
        }

        let received: Vec<i32> = (0..20)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(received, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_is_affinity_thread_inside_task() {
        let affinity = Arc::new(AffinityThread::spawn("identity-test").unwrap());
        let (tx, rx) = std_mpsc::channel();

        assert!(!affinity.is_affinity_thread());

        let inner = Arc::clone(&affinity);
        affinity
            .execute(Box::new(move || {
                tx.send((inner.is_affinity_thread(), thread::current().name().map(String::from)))
                    .unwrap();
            }))
            .unwrap();

        let (is_affinity, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(is_affinity);
        assert_eq!(name.as_deref(), Some("identity-test"));
    }

    #[test]
    fn test_execute_after_shutdown_is_rejected() {
        let affinity = AffinityThread::spawn("shutdown-test").unwrap();
        affinity.shutdown();

        let result = affinity.execute(Box::new(|| {}));
        assert_eq!(result, Err(ExecutorClosed));

        // A second shutdown is a no-op
        affinity.shutdown();
    }

    #[test]
    fn test_shutdown_runs_queued_tasks() {
        let affinity = AffinityThread::spawn("drain-on-shutdown").unwrap();
        let (tx, rx) = std_mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            affinity
                .execute(Box::new(move || {
                    thread::sleep(Duration::from_millis(2));
                    tx.send(i).unwrap();
                }))
                .unwrap();
        }
        drop(tx);
        affinity.shutdown();

        assert_eq!(rx.iter().count(), 5);
    }

    #[test]
    fn test_panicking_task_does_not_kill_thread() {
        let affinity = AffinityThread::spawn("panic-test").unwrap();
        let (tx, rx) = std_mpsc::channel();

        fn exploding_task() {
            panic!("task blew up");
        }

        affinity.execute(Box::new(exploding_task)).unwrap();
        affinity
            .execute(Box::new(move || tx.send("still alive").unwrap()))
            .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "still alive"
        );
    }

    #[test]
    fn test_inline_executor_runs_synchronously() {
        let executor = InlineExecutor;
        let caller = thread::current().id();
        let (tx, rx) = std_mpsc::channel();

        executor
            .execute(Box::new(move || tx.send(thread::current().id()).unwrap()))
            .unwrap();

        assert!(executor.is_affinity_thread());
        assert_eq!(rx.try_recv().unwrap(), caller);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
