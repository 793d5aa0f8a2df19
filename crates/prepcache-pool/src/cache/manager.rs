//! Connection to statement bookkeeping

use std::collections::{HashMap, HashSet};

use prepcache_core::{ConnectionRef, StatementHandle};

use super::deathmarch::Deathmarch;

/// Tracks which cached statements belong to which connection
///
/// The per-connection-limited variant also keeps one deathmarch per
/// connection so that a connection at its own limit can evict its oldest
/// idle statement.
pub(crate) struct ConnectionStatementManager<C, S> {
    statements: HashMap<ConnectionRef<C>, HashSet<StatementHandle<S>>>,
    deathmarches: Option<HashMap<ConnectionRef<C>, Deathmarch<StatementHandle<S>>>>,
}

impl<C, S> ConnectionStatementManager<C, S> {
    pub fn simple() -> Self {
        Self {
            statements: HashMap::new(),
            deathmarches: None,
        }
    }

    pub fn per_connection_limited() -> Self {
        Self {
            statements: HashMap::new(),
            deathmarches: Some(HashMap::new()),
        }
    }

    pub fn add(&mut self, handle: StatementHandle<S>, connection: &ConnectionRef<C>) {
        self.statements
            .entry(connection.clone())
            .or_default()
            .insert(handle);
        if let Some(deathmarches) = self.deathmarches.as_mut() {
            deathmarches.entry(connection.clone()).or_default();
        }
    }

    /// Returns false if the handle was not attributed to the connection
    pub fn remove(&mut self, handle: &StatementHandle<S>, connection: &ConnectionRef<C>) -> bool {
        let Some(handles) = self.statements.get_mut(connection) else {
            return false;
        };
        let removed = handles.remove(handle);
        if handles.is_empty() {
            self.statements.remove(connection);
            if let Some(deathmarches) = self.deathmarches.as_mut() {
                deathmarches.remove(connection);
            }
        }
        removed
    }

    pub fn count_for_connection(&self, connection: &ConnectionRef<C>) -> usize {
        self.statements.get(connection).map_or(0, HashSet::len)
    }

    pub fn connections_with_cached_statements(&self) -> impl Iterator<Item = &ConnectionRef<C>> {
        self.statements.keys()
    }

    pub fn num_connections(&self) -> usize {
        self.statements.len()
    }

    pub fn handles_for_connection(&self, connection: &ConnectionRef<C>) -> Vec<StatementHandle<S>> {
        self.statements
            .get(connection)
            .map(|handles| handles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Per-connection deathmarch; `None` for the simple variant or unknown connections
    pub fn deathmarch_for(
        &self,
        connection: &ConnectionRef<C>,
    ) -> Option<&Deathmarch<StatementHandle<S>>> {
        self.deathmarches.as_ref()?.get(connection)
    }

    pub fn deathmarch_for_mut(
        &mut self,
        connection: &ConnectionRef<C>,
    ) -> Option<&mut Deathmarch<StatementHandle<S>>> {
        self.deathmarches.as_mut()?.get_mut(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Conn;
    struct Stmt;

    #[test]
    fn test_simple_add_remove() {
        let conn = ConnectionRef::new(Conn);
        let a = StatementHandle::new(Stmt);
        let b = StatementHandle::new(Stmt);
        let mut manager = ConnectionStatementManager::simple();

        manager.add(a.clone(), &conn);
        manager.add(b.clone(), &conn);
        assert_eq!(manager.count_for_connection(&conn), 2);
        assert_eq!(manager.num_connections(), 1);
        assert!(manager.deathmarch_for(&conn).is_none());

        assert!(manager.remove(&a, &conn));
        assert!(!manager.remove(&a, &conn));
        assert!(manager.remove(&b, &conn));
        assert_eq!(manager.count_for_connection(&conn), 0);
        assert_eq!(manager.connections_with_cached_statements().count(), 0);
    }

    #[test]
    fn test_remove_from_unknown_connection() {
        let mut manager: ConnectionStatementManager<Conn, Stmt> =
            ConnectionStatementManager::simple();
        let conn = ConnectionRef::new(Conn);
        assert!(!manager.remove(&StatementHandle::new(Stmt), &conn));
    }

    #[test]
    fn test_deathmarch_lifecycle_follows_statements() {
        let conn = ConnectionRef::new(Conn);
        let other = ConnectionRef::new(Conn);
        let a = StatementHandle::new(Stmt);
        let mut manager = ConnectionStatementManager::per_connection_limited();

        assert!(manager.deathmarch_for(&conn).is_none());
        manager.add(a.clone(), &conn);
        assert!(manager.deathmarch_for(&conn).is_some());
        assert!(manager.deathmarch_for(&other).is_none());

        manager
            .deathmarch_for_mut(&conn)
            .expect("deathmarch")
            .record(a.clone())
            .unwrap();

        assert!(manager.remove(&a, &conn));
        assert!(manager.deathmarch_for(&conn).is_none());
    }

    #[test]
    fn test_handles_for_connection() {
        let conn = ConnectionRef::new(Conn);
        let other = ConnectionRef::new(Conn);
        let a = StatementHandle::new(Stmt);
        let b = StatementHandle::new(Stmt);
        let mut manager = ConnectionStatementManager::simple();
        manager.add(a.clone(), &conn);
        manager.add(b.clone(), &other);

        assert_eq!(manager.handles_for_connection(&conn), vec![a]);
        assert_eq!(manager.handles_for_connection(&other), vec![b]);
        assert!(
            manager
                .handles_for_connection(&ConnectionRef::new(Conn))
                .is_empty()
        );
    }
}
