//! Physical connection identity

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// A shared reference to a physical connection, compared by identity.
///
/// The cache never inspects or mutates the connection. It only uses it to
/// group statements and hands it to statement creators. Two `ConnectionRef`s
/// are equal only when they point at the same connection object, no matter
/// how the connection type itself implements equality.
pub struct ConnectionRef<C> {
    inner: Arc<C>,
}

impl<C> ConnectionRef<C> {
    /// Wrap a freshly opened connection
    pub fn new(connection: C) -> Self {
        Self {
            inner: Arc::new(connection),
        }
    }

    /// Get the underlying shared connection
    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }

    /// Address used as the connection's identity
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl<C> From<Arc<C>> for ConnectionRef<C> {
    fn from(inner: Arc<C>) -> Self {
        Self { inner }
    }
}

impl<C> Clone for ConnectionRef<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Deref for ConnectionRef<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<C> PartialEq for ConnectionRef<C> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C> Eq for ConnectionRef<C> {}

impl<C> Hash for ConnectionRef<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.id());
    }
}

impl<C> fmt::Debug for ConnectionRef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionRef({:#x})", self.id())
    }
}
