//! Statement trait and handle identity

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::Result;

/// A prepared or callable statement produced against a physical connection
///
/// The cache only drives the statement's lifecycle. Creation happens in a
/// caller-supplied closure, everything else goes through this trait.
pub trait Statement: Send + Sync + 'static {
    /// Return the statement to a reusable state before it goes back to the cache
    ///
    /// Typically clears bound parameters. A failure here makes the cache
    /// destroy the statement instead of reusing it. Default implementation
    /// does nothing.
    fn reset(&self) -> Result<()> {
        Ok(())
    }

    /// Release the statement's server-side resources
    ///
    /// May block. Must tolerate being called more than once.
    fn close(&self) -> Result<()>;
}

/// A shared handle to a statement, compared by identity
///
/// Handles are what the cache hands out on checkout and expects back on
/// checkin. Cloning a handle never clones the statement.
pub struct StatementHandle<S> {
    inner: Arc<S>,
}

impl<S> StatementHandle<S> {
    /// Wrap a newly created statement
    pub fn new(statement: S) -> Self {
        Self {
            inner: Arc::new(statement),
        }
    }

    /// Get the underlying shared statement
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Address used as the handle's identity
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl<S: Statement> StatementHandle<S> {
    /// Close the statement, logging instead of failing
    ///
    /// Destruction is best-effort cleanup and never surfaces as an error.
    pub fn destroy(&self) {
        if let Err(e) = self.inner.close() {
            tracing::warn!(statement = self.id(), error = %e, "failed to close statement");
        }
    }
}

impl<S> Clone for StatementHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Deref for StatementHandle<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S> PartialEq for StatementHandle<S> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S> Eq for StatementHandle<S> {}

impl<S> Hash for StatementHandle<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.id());
    }
}

impl<S> fmt::Debug for StatementHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatementHandle({:#x})", self.id())
    }
}
