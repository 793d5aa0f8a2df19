//! Runner configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a thread pool task runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of worker threads
    num_threads: usize,
    /// Tasks running longer than this are reported as overrunning
    max_task_time_ms: Option<u64>,
    /// Prefix for worker thread names
    thread_name: String,
}

impl RunnerConfig {
    /// Create a new runner configuration with the given number of threads
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> Self {
        assert!(
            num_threads > 0,
            "num_threads must be greater than 0, got {}",
            num_threads
        );

        Self {
            num_threads,
            max_task_time_ms: None,
            thread_name: "prepcache-runner".to_string(),
        }
    }

    /// Set the maximum task time in milliseconds
    pub fn with_max_task_time_ms(mut self, max_ms: u64) -> Self {
        self.max_task_time_ms = Some(max_ms);
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Get the number of worker threads
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Get the maximum task time as a Duration if set
    pub fn max_task_time(&self) -> Option<Duration> {
        self.max_task_time_ms.map(Duration::from_millis)
    }

    /// Get the worker thread name prefix
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

impl Default for RunnerConfig {
    /// Create a default runner configuration
    ///
    /// Defaults:
    /// - num_threads: 3
    /// - max_task_time: None
    /// - thread_name: "prepcache-runner"
    fn default() -> Self {
        Self::new(3)
    }
}
