//! Task runner abstraction
//!
//! The cache never blocks a caller thread on statement creation or
//! destruction while it holds its own lock. Instead it posts the work to a
//! `TaskRunner` and waits for the result to be posted back.

use std::sync::Arc;

use crate::Result;

/// A unit of deferred, possibly blocking work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes posted tasks on threads other than the caller's
pub trait TaskRunner: Send + Sync + 'static {
    /// Submit a task for execution
    ///
    /// Fire-and-forget: results travel back through whatever the task itself
    /// captured. Returns an error if the runner no longer accepts work, in
    /// which case the task has been dropped without running.
    fn post(&self, task: Task) -> Result<()>;
}

impl<T: TaskRunner + ?Sized> TaskRunner for Arc<T> {
    fn post(&self, task: Task) -> Result<()> {
        (**self).post(task)
    }
}
