//! Admission policy for newly created statements

use serde::{Deserialize, Serialize};

/// Decides whether a freshly created statement may enter the cache
///
/// At a boundary the cache tries to evict exactly one idle statement to make
/// room. If nothing is evictable the new statement is used once as an
/// overload statement and destroyed on checkin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    /// Bound only the total number of cached statements
    GlobalOnly { max_statements: usize },
    /// Bound the total and, first, each connection's share
    GlobalAndPerConnection {
        max_statements: usize,
        max_statements_per_connection: usize,
    },
}

/// What the cache has to do before it can admit a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Room is available
    Admit,
    /// Admit only if the oldest idle statement of the whole cache can be evicted
    EvictGlobal,
    /// Admit only if the oldest idle statement of this connection can be evicted
    EvictConnection,
    Reject,
}

impl CachePolicy {
    pub fn max_statements(&self) -> usize {
        match self {
            CachePolicy::GlobalOnly { max_statements }
            | CachePolicy::GlobalAndPerConnection { max_statements, .. } => *max_statements,
        }
    }

    pub fn max_statements_per_connection(&self) -> Option<usize> {
        match self {
            CachePolicy::GlobalOnly { .. } => None,
            CachePolicy::GlobalAndPerConnection {
                max_statements_per_connection,
                ..
            } => Some(*max_statements_per_connection),
        }
    }

    pub fn is_per_connection_limited(&self) -> bool {
        matches!(self, CachePolicy::GlobalAndPerConnection { .. })
    }

    /// Classify the admission of one more statement
    ///
    /// The connection-local bound is checked first. A connection under its
    /// local limit falls through to the global check; a connection at its
    /// local limit may only make room by evicting one of its own statements.
    pub(crate) fn admission(&self, global_count: usize, connection_count: usize) -> Admission {
        if let Some(local_max) = self.max_statements_per_connection() {
            if connection_count == local_max {
                return Admission::EvictConnection;
            }
            if connection_count > local_max {
                tracing::error!(
                    connection_count,
                    local_max,
                    "connection holds more cached statements than allowed"
                );
                return Admission::Reject;
            }
        }

        let max = self.max_statements();
        if global_count < max {
            Admission::Admit
        } else if global_count == max {
            Admission::EvictGlobal
        } else {
            tracing::error!(
                global_count,
                max,
                "statement cache holds more statements than allowed"
            );
            Admission::Reject
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_global_only() {
        let policy = CachePolicy::GlobalOnly { max_statements: 2 };
        assert_eq!(policy.admission(0, 0), Admission::Admit);
        assert_eq!(policy.admission(1, 1), Admission::Admit);
        assert_eq!(policy.admission(2, 2), Admission::EvictGlobal);
        assert_eq!(policy.max_statements_per_connection(), None);
    }

    #[test]
    fn test_global_only_ignores_connection_count() {
        let policy = CachePolicy::GlobalOnly { max_statements: 10 };
        assert_eq!(policy.admission(3, 500), Admission::Admit);
    }

    #[test]
    fn test_double_max_checks_connection_first() {
        let policy = CachePolicy::GlobalAndPerConnection {
            max_statements: 4,
            max_statements_per_connection: 2,
        };

        assert_eq!(policy.admission(0, 0), Admission::Admit);
        assert_eq!(policy.admission(3, 1), Admission::Admit);
        // local room, global full
        assert_eq!(policy.admission(4, 1), Admission::EvictGlobal);
        // local full wins even when global has room
        assert_eq!(policy.admission(2, 2), Admission::EvictConnection);
        assert_eq!(policy.admission(4, 2), Admission::EvictConnection);
    }

    #[test]
    fn test_over_capacity_rejects() {
        let policy = CachePolicy::GlobalOnly { max_statements: 1 };
        assert_eq!(policy.admission(2, 0), Admission::Reject);
    }

    #[test]
    fn test_serde_tagging() {
        let policy = CachePolicy::GlobalAndPerConnection {
            max_statements: 50,
            max_statements_per_connection: 5,
        };
        let json = serde_json::to_value(policy).expect("serialize");
        assert_eq!(json["kind"], "global_and_per_connection");
        let back: CachePolicy = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, policy);
    }
}
