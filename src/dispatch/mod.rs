//! Affinity-thread dispatch.
//!
//! Some work must run on one particular thread: a GUI toolkit's event-loop
//! thread, or any other thread-confined resource. This module marshals that
//! work from arbitrary caller threads and hands results (or typed failures)
//! back to the caller.
//!
//! # Components
//!
//! - [`AffinityExecutor`]: the capability the host provides. It answers "is
//!   this the affinity thread?" and queues tasks to run there.
//!   - [`AffinityThread`]: a dedicated FIFO thread
//!   - [`InlineExecutor`]: synchronous test double
//!   - `SlintExecutor` (feature `slint`): the Slint event loop
//! - [`AffinityDispatcher`]: blocking dispatch (`run_blocking`), three-phase
//!   dispatch (`run_thriftily`) and fire-and-forget (`run_later`).
//! - [`DispatchError`]: the task's own error, kept apart from fatal
//!   dispatch failures.
//!
//! # Deadlock freedom
//!
//! A caller that already is the affinity thread never waits on the affinity
//! queue: `run_blocking` runs in place, and `run_thriftily` runs its
//! affinity phase in place while a worker handles the other two.

pub mod dispatcher;
pub mod executor;
#[cfg(feature = "slint")]
pub mod slint;

pub use dispatcher::{AffinityDispatcher, DispatchError};
pub use executor::{AffinityExecutor, AffinityTask, AffinityThread, ExecutorClosed, InlineExecutor};
#[cfg(feature = "slint")]
pub use slint::SlintExecutor;
