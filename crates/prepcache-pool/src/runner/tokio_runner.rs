//! Runner backed by a tokio runtime's blocking pool

use prepcache_core::{CacheError, Result, Task, TaskRunner};
use tokio::runtime::Handle;

/// Posts tasks to `spawn_blocking` on a tokio runtime
///
/// Useful when the application already runs tokio. Cache operations block the
/// calling thread, so call them from blocking contexts (for example inside
/// `spawn_blocking`), never directly from an async task.
#[derive(Clone)]
pub struct TokioRunner {
    handle: Handle,
}

impl TokioRunner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running in
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| CacheError::Runner(format!("No tokio runtime available: {}", e)))
    }
}

impl TaskRunner for TokioRunner {
    fn post(&self, task: Task) -> Result<()> {
        // A shut-down runtime drops the task unexecuted; tasks clean up on drop
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}
