use crate::dispatch::executor::{AffinityExecutor, AffinityTask, ExecutorClosed, panic_message};
use crate::metrics::Metrics;
use crate::models::DispatchSettings;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread;
use thiserror::Error;
use tokio::sync::oneshot;

/// Failure of a dispatched task, or of the dispatch itself.
///
/// Only [`DispatchError::Task`] carries the task's own error; every other
/// variant is a fatal condition that callers should not try to recover from
/// as if the task had failed normally.
#[derive(Error, Debug)]
pub enum DispatchError<E> {
    /// The task returned its error; this is the original value, unchanged.
    #[error("{0}")]
    Task(E),

    /// The caller stopped waiting without a result: the executor refused the
    /// task, or discarded it without running it.
    #[error("dispatch interrupted: {0}")]
    Interrupted(String),

    /// The task panicked instead of returning.
    #[error("dispatched task failed unexpectedly: {0}")]
    Unexpected(String),

    /// `run_thriftily` could not start its off-affinity worker.
    #[error("failed to spawn off-affinity worker thread")]
    WorkerSpawn(#[source] io::Error),
}

impl<E> DispatchError<E> {
    /// Whether this error is something other than the task's own failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Task(_))
    }

    /// The task's own error, if that is what this is.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            Self::Task(error) => Some(error),
            _ => None,
        }
    }
}

/// How a single task execution ended.
enum TaskOutcome<R, E> {
    Completed(R),
    Failed(E),
    Panicked(String),
}

fn run_guarded<R, E>(task: impl FnOnce() -> Result<R, E>) -> TaskOutcome<R, E> {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => TaskOutcome::Completed(value),
        Ok(Err(error)) => TaskOutcome::Failed(error),
        Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
    }
}

/// Runs work on an affinity thread, synchronously from the caller's side.
///
/// Cheap to clone; clones share the executor and metrics.
///
/// # Blocking
///
/// `run_blocking` and `run_thriftily` park the calling thread. Do not call
/// them from inside an async runtime; use `spawn_blocking` there.
///
/// # Example
/// ```ignore
/// let affinity = Arc::new(AffinityThread::spawn("ui")?);
/// let dispatcher = AffinityDispatcher::new(affinity);
///
/// let title = dispatcher.run_blocking(|| window_title())?;
/// ```
#[derive(Clone)]
pub struct AffinityDispatcher {
    executor: Arc<dyn AffinityExecutor>,
    worker_thread_name: String,
    metrics: Arc<Metrics>,
}

impl AffinityDispatcher {
    pub fn new(executor: Arc<dyn AffinityExecutor>) -> Self {
        Self::with_settings(executor, &DispatchSettings::default())
    }

    pub fn with_settings(executor: Arc<dyn AffinityExecutor>, settings: &DispatchSettings) -> Self {
        Self {
            executor,
            worker_thread_name: settings.worker_thread_name.clone(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Record into shared metrics instead of a private instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn executor(&self) -> &Arc<dyn AffinityExecutor> {
        &self.executor
    }

    pub fn is_affinity_thread(&self) -> bool {
        self.executor.is_affinity_thread()
    }

    /// Run `task` on the affinity thread and wait for it.
    ///
    /// On the affinity thread itself the task runs in place. Elsewhere it is
    /// queued and the caller blocks on a one-shot gate until the affinity
    /// thread has run it.
    ///
    /// # Errors
    /// - [`DispatchError::Task`] with the task's own error
    /// - [`DispatchError::Unexpected`] if the task panicked
    /// - [`DispatchError::Interrupted`] if the executor is closed or dropped the
    ///   task without running it
    pub fn run_blocking<R, E, F>(&self, task: F) -> Result<R, DispatchError<E>>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        if self.executor.is_affinity_thread() {
            self.metrics.record_task_inline();
            return self.settle(run_guarded(task));
        }

        let (gate_tx, gate_rx) = oneshot::channel::<TaskOutcome<R, E>>();
        let dispatched: AffinityTask = Box::new(move || {
            let outcome = run_guarded(task);
            // Nobody to tell if the caller is gone
            let _ = gate_tx.send(outcome);
        });

        if let Err(ExecutorClosed) = self.executor.execute(dispatched) {
            self.metrics.record_dispatch_interruption();
            tracing::warn!("Cannot dispatch task - affinity executor is closed");
            return Err(DispatchError::Interrupted(
                "affinity executor is closed".to_string(),
            ));
        }
        self.metrics.record_task_dispatched();

        match gate_rx.blocking_recv() {
            Ok(outcome) => self.settle(outcome),
            Err(_) => {
                self.metrics.record_dispatch_interruption();
                tracing::warn!("Dispatched task was discarded before it ran");
                Err(DispatchError::Interrupted(
                    "task was discarded before it ran".to_string(),
                ))
            }
        }
    }

    /// Queue `task` on the affinity thread without waiting for it.
    ///
    /// Always queues, even when called from the affinity thread.
    pub fn run_later<F>(&self, task: F) -> Result<(), ExecutorClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.execute(Box::new(task))?;
        self.metrics.record_task_dispatched();
        Ok(())
    }

    /// Three-phase dispatch: `pre` off the affinity thread, `on_affinity` on
    /// it, `post` off it again.
    ///
    /// Keeps the affinity thread's share of the work to `on_affinity` while
    /// long-running preparation and follow-up never run there.
    ///
    /// - Called off the affinity thread, all phases run on the caller with
    ///   `on_affinity` going through [`run_blocking`](Self::run_blocking).
    /// - Called on the affinity thread, `pre` and `post` run on a fresh worker
    ///   thread while `on_affinity` runs in place between them.
    ///
    /// The first failing phase aborts the rest. Its error is returned once
    /// every phase (and the worker, if any) has finished.
    pub fn run_thriftily<R, S, E, Pre, OnAffinity, Post>(
        &self,
        pre: Pre,
        on_affinity: OnAffinity,
        post: Post,
    ) -> Result<(), DispatchError<E>>
    where
        Pre: FnOnce() -> Result<R, E> + Send,
        OnAffinity: FnOnce(R) -> Result<S, E> + Send + 'static,
        Post: FnOnce(S) -> Result<(), E> + Send,
        R: Send + 'static,
        S: Send + 'static,
        E: Send + 'static,
    {
        if self.executor.is_affinity_thread() {
            return self.run_thriftily_from_affinity(pre, on_affinity, post);
        }

        let staged = pre().map_err(DispatchError::Task)?;
        let transformed = self.run_blocking(move || on_affinity(staged))?;
        post(transformed).map_err(DispatchError::Task)
    }

    fn run_thriftily_from_affinity<R, S, E, Pre, OnAffinity, Post>(
        &self,
        pre: Pre,
        on_affinity: OnAffinity,
        post: Post,
    ) -> Result<(), DispatchError<E>>
    where
        Pre: FnOnce() -> Result<R, E> + Send,
        OnAffinity: FnOnce(R) -> Result<S, E>,
        Post: FnOnce(S) -> Result<(), E> + Send,
        R: Send,
        S: Send,
        E: Send,
    {
        let (staged_tx, staged_rx) = std_mpsc::channel::<R>();
        let (transformed_tx, transformed_rx) = std_mpsc::channel::<S>();

        thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name(self.worker_thread_name.clone())
                .spawn_scoped(scope, move || -> Result<(), DispatchError<E>> {
                    let staged = pre().map_err(DispatchError::Task)?;
                    if staged_tx.send(staged).is_err() {
                        return Ok(());
                    }
                    drop(staged_tx);

                    match transformed_rx.recv() {
                        Ok(transformed) => post(transformed).map_err(DispatchError::Task),
                        // on_affinity failed; the affinity side reports it
                        Err(_) => Ok(()),
                    }
                })
                .map_err(DispatchError::WorkerSpawn)?;

            let affinity_outcome = match staged_rx.recv() {
                Ok(staged) => {
                    self.metrics.record_task_inline();
                    match self.settle(run_guarded(move || on_affinity(staged))) {
                        Ok(transformed) => {
                            let _ = transformed_tx.send(transformed);
                            Ok(())
                        }
                        Err(error) => Err(error),
                    }
                }
                // pre failed or panicked; the worker reports it
                Err(_) => Ok(()),
            };
            drop(transformed_tx);

            let worker_outcome = worker.join().unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!("Off-affinity worker panicked: {}", message);
                self.metrics.record_task_panic();
                Err(DispatchError::Unexpected(message))
            });

            worker_outcome.and(affinity_outcome)
        })
    }

    fn settle<R, E>(&self, outcome: TaskOutcome<R, E>) -> Result<R, DispatchError<E>> {
        match outcome {
            TaskOutcome::Completed(value) => Ok(value),
            TaskOutcome::Failed(error) => {
                self.metrics.record_task_failure();
                Err(DispatchError::Task(error))
            }
            TaskOutcome::Panicked(message) => {
                self.metrics.record_task_panic();
                tracing::error!("Dispatched task panicked: {}", message);
                Err(DispatchError::Unexpected(message))
            }
        }
    }
}
