//! prepcache Pool - Statement caching on top of pooled connections
//!
//! This crate holds the bounded statement cache and the task runners it uses
//! to move blocking statement creation and destruction off caller threads.

pub mod cache;
pub mod runner;

pub use cache::{
    CachePolicy, ResultSetConcurrency, ResultSetType, StatementArg, StatementCache,
    StatementCacheConfig, StatementCacheStats, StatementKey, StatementKind,
};
pub use prepcache_core::{
    CacheError, ConnectionRef, Result, Statement, StatementHandle, Task, TaskRunner,
};
pub use runner::{RunnerConfig, ThreadPoolRunner, TokioRunner};
