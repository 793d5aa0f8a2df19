//! Statement cache configuration types

use serde::{Deserialize, Serialize};

use super::policy::CachePolicy;

/// Configuration for a statement cache
///
/// Controls the global and per-connection statement limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementCacheConfig {
    /// Maximum number of statements cached across all connections (0 = caching disabled)
    max_statements: usize,
    /// Maximum number of statements cached for any single connection (0 = unbounded)
    #[serde(default)]
    max_statements_per_connection: usize,
}

impl StatementCacheConfig {
    /// Create a new configuration bounding only the global statement count
    pub fn new(max_statements: usize) -> Self {
        Self {
            max_statements,
            max_statements_per_connection: 0,
        }
    }

    /// Set the per-connection statement limit
    pub fn with_max_statements_per_connection(mut self, max: usize) -> Self {
        self.max_statements_per_connection = max;
        self
    }

    /// Get the global statement limit
    pub fn max_statements(&self) -> usize {
        self.max_statements
    }

    /// Get the per-connection statement limit, if one is configured
    pub fn max_statements_per_connection(&self) -> Option<usize> {
        (self.max_statements_per_connection > 0).then_some(self.max_statements_per_connection)
    }

    /// Whether statement caching is enabled at all
    ///
    /// Callers are expected to bypass the cache entirely when this is false.
    pub fn is_enabled(&self) -> bool {
        self.max_statements > 0
    }

    /// Derive the admission policy
    pub fn policy(&self) -> CachePolicy {
        match self.max_statements_per_connection() {
            None => CachePolicy::GlobalOnly {
                max_statements: self.max_statements,
            },
            Some(per_connection) => CachePolicy::GlobalAndPerConnection {
                max_statements: self.max_statements,
                max_statements_per_connection: per_connection,
            },
        }
    }
}

impl Default for StatementCacheConfig {
    /// Create a default configuration
    ///
    /// Defaults:
    /// - max_statements: 100
    /// - max_statements_per_connection: unbounded
    fn default() -> Self {
        Self::new(100)
    }
}
