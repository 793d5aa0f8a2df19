//! Statement cache statistics types

use serde::{Deserialize, Serialize};

/// Statistics about a statement cache's current state
///
/// Provides insight into cache utilization and effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatementCacheStats {
    /// Number of cached statements (idle + checked out)
    pub statements: usize,
    /// Number of cached statements currently checked out
    pub checked_out: usize,
    /// Number of connections with at least one cached statement
    pub connections: usize,
    /// Configured global limit
    pub max_statements: usize,
    /// Checkouts served from an idle statement
    pub hits: u64,
    /// Checkouts that had to create a statement
    pub misses: u64,
    /// Created statements the cache could not admit
    pub overloads: u64,
    /// Idle statements evicted to make room
    pub evictions: u64,
}

impl StatementCacheStats {
    /// Number of idle statements available for reuse
    pub fn idle(&self) -> usize {
        self.statements.saturating_sub(self.checked_out)
    }

    /// Fraction of checkouts served from the cache (0.0 to 1.0)
    ///
    /// Returns 0.0 before the first checkout.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Check if the cache holds as many statements as it may
    pub fn is_full(&self) -> bool {
        self.statements >= self.max_statements
    }
}
