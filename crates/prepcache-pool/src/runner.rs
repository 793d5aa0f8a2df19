//! Task runners for blocking statement work
//!
//! This module provides the `TaskRunner` implementations the statement cache
//! posts statement creation and destruction to.
//!
//! # Example
//!
//! ```ignore
//! use prepcache_pool::runner::{RunnerConfig, ThreadPoolRunner};
//!
//! let config = RunnerConfig::new(3).with_max_task_time_ms(30_000);
//! let runner = ThreadPoolRunner::new(config)?;
//!
//! // Or reuse an existing tokio runtime's blocking pool
//! let runner = TokioRunner::current()?;
//! ```

mod config;
mod thread_pool;
mod tokio_runner;


pub use config::RunnerConfig;
pub use thread_pool::ThreadPoolRunner;
pub use tokio_runner::TokioRunner;
