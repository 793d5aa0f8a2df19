//! Cache key identity
//!
//! A `StatementKey` names "a statement produced from this physical connection
//! with this SQL text, in this mode". Connection identity is by object, the
//! remaining components compare by value.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use prepcache_core::{CacheError, ConnectionRef, Result};

/// How the statement was produced from the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Produced by `prepareStatement`-style calls
    Prepared,
    /// Produced by `prepareCall`-style calls (stored procedures)
    Callable,
}

/// Scrollability of result sets produced by the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultSetType {
    #[default]
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

impl ResultSetType {
    /// Driver-level numeric code
    pub fn code(self) -> i32 {
        match self {
            ResultSetType::ForwardOnly => 1003,
            ResultSetType::ScrollInsensitive => 1004,
            ResultSetType::ScrollSensitive => 1005,
        }
    }

    /// Parse a driver-level numeric code
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1003 => Ok(ResultSetType::ForwardOnly),
            1004 => Ok(ResultSetType::ScrollInsensitive),
            1005 => Ok(ResultSetType::ScrollSensitive),
            other => Err(CacheError::InvalidArgument(format!(
                "Unknown result set type: {}",
                other
            ))),
        }
    }
}

/// Whether result sets produced by the statement may be updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultSetConcurrency {
    #[default]
    ReadOnly,
    Updatable,
}

impl ResultSetConcurrency {
    /// Driver-level numeric code
    pub fn code(self) -> i32 {
        match self {
            ResultSetConcurrency::ReadOnly => 1007,
            ResultSetConcurrency::Updatable => 1008,
        }
    }

    /// Parse a driver-level numeric code
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1007 => Ok(ResultSetConcurrency::ReadOnly),
            1008 => Ok(ResultSetConcurrency::Updatable),
            other => Err(CacheError::InvalidArgument(format!(
                "Unknown result set concurrency: {}",
                other
            ))),
        }
    }
}

/// A raw argument of a statement-producing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementArg {
    Sql(String),
    Int(i32),
}

impl From<&str> for StatementArg {
    fn from(sql: &str) -> Self {
        StatementArg::Sql(sql.to_string())
    }
}

impl From<String> for StatementArg {
    fn from(sql: String) -> Self {
        StatementArg::Sql(sql)
    }
}

impl From<i32> for StatementArg {
    fn from(code: i32) -> Self {
        StatementArg::Int(code)
    }
}

/// Canonical identity of a cacheable statement
pub struct StatementKey<C> {
    connection: ConnectionRef<C>,
    sql: Arc<str>,
    kind: StatementKind,
    result_set_type: ResultSetType,
    concurrency: ResultSetConcurrency,
}

impl<C> StatementKey<C> {
    /// Key for a prepared statement with default result set settings
    pub fn prepared(connection: ConnectionRef<C>, sql: impl Into<Arc<str>>) -> Self {
        Self::new(connection, StatementKind::Prepared, sql)
    }

    /// Key for a callable statement with default result set settings
    pub fn callable(connection: ConnectionRef<C>, sql: impl Into<Arc<str>>) -> Self {
        Self::new(connection, StatementKind::Callable, sql)
    }

    fn new(connection: ConnectionRef<C>, kind: StatementKind, sql: impl Into<Arc<str>>) -> Self {
        Self {
            connection,
            sql: sql.into(),
            kind,
            result_set_type: ResultSetType::default(),
            concurrency: ResultSetConcurrency::default(),
        }
    }

    /// Set explicit result set type and concurrency
    pub fn with_result_set(
        mut self,
        result_set_type: ResultSetType,
        concurrency: ResultSetConcurrency,
    ) -> Self {
        self.result_set_type = result_set_type;
        self.concurrency = concurrency;
        self
    }

    /// Build a key from the raw arguments of a statement-producing call
    ///
    /// One argument is the SQL text with forward-only, read-only defaults.
    /// Three arguments are the SQL text, the result set type code and the
    /// concurrency code. Any other shape is rejected.
    pub fn find(
        connection: ConnectionRef<C>,
        kind: StatementKind,
        args: &[StatementArg],
    ) -> Result<Self> {
        match args {
            [StatementArg::Sql(sql)] => Ok(Self::new(connection, kind, sql.as_str())),
            [
                StatementArg::Sql(sql),
                StatementArg::Int(result_set_type),
                StatementArg::Int(concurrency),
            ] => Ok(Self::new(connection, kind, sql.as_str()).with_result_set(
                ResultSetType::from_code(*result_set_type)?,
                ResultSetConcurrency::from_code(*concurrency)?,
            )),
            [_] | [_, _, _] => Err(CacheError::InvalidArgument(format!(
                "Unexpected argument types for a statement-producing call: {:?}",
                args
            ))),
            _ => Err(CacheError::InvalidArgument(format!(
                "Cannot cache statements produced with {} arguments; expected 1 or 3",
                args.len()
            ))),
        }
    }

    /// Get the connection this statement belongs to
    pub fn connection(&self) -> &ConnectionRef<C> {
        &self.connection
    }

    /// Get the SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get how the statement is produced
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Check if this is a callable statement
    pub fn is_callable(&self) -> bool {
        self.kind == StatementKind::Callable
    }

    /// Get the result set type
    pub fn result_set_type(&self) -> ResultSetType {
        self.result_set_type
    }

    /// Get the result set concurrency
    pub fn concurrency(&self) -> ResultSetConcurrency {
        self.concurrency
    }
}

impl<C> Clone for StatementKey<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            sql: Arc::clone(&self.sql),
            kind: self.kind,
            result_set_type: self.result_set_type,
            concurrency: self.concurrency,
        }
    }
}

impl<C> PartialEq for StatementKey<C> {
    fn eq(&self, other: &Self) -> bool {
        self.connection == other.connection
            && self.sql == other.sql
            && self.kind == other.kind
            && self.result_set_type == other.result_set_type
            && self.concurrency == other.concurrency
    }
}

impl<C> Eq for StatementKey<C> {}

impl<C> Hash for StatementKey<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut sql_hasher = DefaultHasher::new();
        self.sql.hash(&mut sql_hasher);

        let combined = self.connection.id() as u64
            ^ sql_hasher.finish()
            ^ u64::from(self.is_callable())
            ^ self.result_set_type.code() as u64
            ^ self.concurrency.code() as u64;
        state.write_u64(combined);
    }
}

impl<C> fmt::Debug for StatementKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementKey")
            .field("connection", &self.connection)
            .field("sql", &self.sql)
            .field("kind", &self.kind)
            .field("result_set_type", &self.result_set_type)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}
