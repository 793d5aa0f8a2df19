//! Statement caching for pooled connections
//!
//! This module provides a bounded cache of prepared and callable statements
//! with a global limit and an optional per-connection limit. Idle statements
//! are evicted strictly in the order they were checked in.
//!
//! # Example
//!
//! ```ignore
//! use prepcache_pool::cache::{StatementCache, StatementCacheConfig, StatementKey};
//!
//! let config = StatementCacheConfig::new(100).with_max_statements_per_connection(20);
//! let cache = StatementCache::new(config, runner)?;
//!
//! let key = StatementKey::prepared(connection.clone(), "SELECT * FROM users WHERE id = ?");
//! let stmt = cache.checkout(key, |conn| conn.prepare("SELECT * FROM users WHERE id = ?"))?;
//! // Use statement...
//! cache.checkin(stmt)?;
//! ```

mod config;
mod deathmarch;
mod engine;
mod key;
mod manager;
mod policy;
mod stats;


pub use config::StatementCacheConfig;
pub use engine::StatementCache;
pub use key::{ResultSetConcurrency, ResultSetType, StatementArg, StatementKey, StatementKind};
pub use policy::CachePolicy;
pub use stats::StatementCacheStats;
