//! Statement cache implementation

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use prepcache_core::{
    CacheError, ConnectionRef, Result, Statement, StatementHandle, TaskRunner, inconsistency,
};

use super::config::StatementCacheConfig;
use super::deathmarch::Deathmarch;
use super::key::{StatementArg, StatementKey, StatementKind};
use super::manager::ConnectionStatementManager;
use super::policy::{Admission, CachePolicy};
use super::stats::StatementCacheStats;

/// Per-key bookkeeping
struct KeyRecord<S> {
    /// Every cached statement created for the key, checked out or not
    all: HashSet<StatementHandle<S>>,
    /// Statements checked in and ready for reuse
    idle: VecDeque<StatementHandle<S>>,
}

impl<S> KeyRecord<S> {
    fn new() -> Self {
        Self {
            all: HashSet::new(),
            idle: VecDeque::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    overloads: u64,
    evictions: u64,
}

/// All registries of an open cache
struct Registry<C, S> {
    policy: CachePolicy,
    key_for_handle: HashMap<StatementHandle<S>, StatementKey<C>>,
    records: HashMap<StatementKey<C>, KeyRecord<S>>,
    checked_out: HashSet<StatementHandle<S>>,
    connections: ConnectionStatementManager<C, S>,
    /// Idle statements of the whole cache in check-in order
    deathmarch: Deathmarch<StatementHandle<S>>,
    counters: Counters,
}

impl<C, S> Registry<C, S> {
    fn new(policy: CachePolicy) -> Self {
        let connections = if policy.is_per_connection_limited() {
            ConnectionStatementManager::per_connection_limited()
        } else {
            ConnectionStatementManager::simple()
        };
        Self {
            policy,
            key_for_handle: HashMap::new(),
            records: HashMap::new(),
            checked_out: HashSet::new(),
            connections,
            deathmarch: Deathmarch::new(),
            counters: Counters::default(),
        }
    }
}

struct CacheState<C, S> {
    /// `None` once the cache is closed
    registry: Option<Registry<C, S>>,
    /// Creation results posted back by runner tasks, by request id
    completed: HashMap<u64, Result<S>>,
    next_request: u64,
}

struct Shared<C, S> {
    state: Mutex<CacheState<C, S>>,
    /// Signalled whenever a creation result is posted to `completed`
    creation_done: Condvar,
    /// Statements whose removal has started but whose destruction has not finished
    removing: Mutex<HashSet<StatementHandle<S>>>,
}

/// How a removed statement gets destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destroy {
    /// Post a destroy task to the runner
    Async,
    /// The caller destroys it after releasing the cache lock
    Deferred,
}

/// Posts a creation result back to the waiting checkout, even if the task
/// is dropped unexecuted or the creator panics.
struct Completion<C, S> {
    shared: Arc<Shared<C, S>>,
    request: u64,
    result: Option<Result<S>>,
}

impl<C, S> Drop for Completion<C, S> {
    fn drop(&mut self) {
        let result = self.result.take().unwrap_or(Err(CacheError::Cancelled));
        let mut state = self.shared.state.lock();
        state.completed.insert(self.request, result);
        self.shared.creation_done.notify_all();
    }
}

/// Destroys a statement marked as removing and clears the mark, whether the
/// destroy task runs or the runner drops it unexecuted.
struct PendingDestroy<C, S: Statement> {
    shared: Arc<Shared<C, S>>,
    handle: StatementHandle<S>,
}

impl<C, S: Statement> Drop for PendingDestroy<C, S> {
    fn drop(&mut self) {
        self.handle.destroy();
        self.shared.removing.lock().remove(&self.handle);
    }
}

/// A bounded cache of prepared and callable statements
///
/// Statements are keyed by connection, SQL text and result set mode. A
/// checkout either reuses an idle statement for the key or creates a new one
/// on the task runner. Creation runs without the cache lock held so that
/// slow prepares on one connection never stall the rest of the cache.
///
/// When the cache is at its limit, the statement that has been idle the
/// longest is evicted. If every cached statement is checked out, the new
/// statement is handed out uncached and destroyed on checkin.
pub struct StatementCache<C, S> {
    shared: Arc<Shared<C, S>>,
    runner: Arc<dyn TaskRunner>,
    policy: CachePolicy,
}

impl<C, S> StatementCache<C, S>
where
    C: Send + Sync + 'static,
    S: Statement,
{
    /// Create a new statement cache with the given configuration and runner
    ///
    /// Returns a configuration error if caching is disabled
    /// (`max_statements == 0`); callers should bypass the cache in that case.
    pub fn new<R: TaskRunner>(config: StatementCacheConfig, runner: R) -> Result<Self> {
        if !config.is_enabled() {
            return Err(CacheError::Configuration(
                "max_statements must be greater than 0 to enable statement caching".into(),
            ));
        }
        let policy = config.policy();
        tracing::debug!(?policy, "creating statement cache");

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState {
                    registry: Some(Registry::new(policy)),
                    completed: HashMap::new(),
                    next_request: 0,
                }),
                creation_done: Condvar::new(),
                removing: Mutex::new(HashSet::new()),
            }),
            runner: Arc::new(runner),
            policy,
        })
    }

    /// Get the admission policy
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Check out a statement for the given key
    ///
    /// Reuses an idle statement if one exists. Otherwise runs `create` on the
    /// task runner against the key's connection, waiting for it with the
    /// cache lock released, and caches the result if the admission policy
    /// allows. Creation errors are returned unchanged.
    pub fn checkout<F>(&self, key: StatementKey<C>, create: F) -> Result<StatementHandle<S>>
    where
        F: FnOnce(&C) -> Result<S> + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        let request = {
            let reg = state.registry.as_mut().ok_or(CacheError::Closed)?;

            let idle = reg
                .records
                .get_mut(&key)
                .and_then(|record| record.idle.pop_front());
            if let Some(handle) = idle {
                let released = reg.deathmarch.release(&handle).and_then(|()| {
                    match reg.connections.deathmarch_for_mut(key.connection()) {
                        Some(march) => march.release(&handle),
                        None => Ok(()),
                    }
                });
                if let Err(e) = released {
                    self.remove_statement(reg, &handle, Destroy::Async);
                    return Err(e);
                }
                if !reg.checked_out.insert(handle.clone()) {
                    return Err(inconsistency(
                        "an idle statement was already marked checked out",
                    ));
                }
                reg.counters.hits += 1;
                tracing::debug!(sql = %key.sql(), statement = handle.id(), "statement cache hit");
                return Ok(handle);
            }

            state.next_request += 1;
            state.next_request
        };

        tracing::debug!(sql = %key.sql(), "statement cache miss, creating statement");
        let connection = key.connection().clone();
        let mut completion = Completion {
            shared: Arc::clone(&self.shared),
            request,
            result: None,
        };
        let task = Box::new(move || {
            completion.result = Some(create(&*connection));
        });

        let posted = MutexGuard::unlocked(&mut state, || self.runner.post(task));
        if let Err(e) = posted {
            state.completed.remove(&request);
            return Err(e);
        }

        let result = loop {
            if let Some(result) = state.completed.remove(&request) {
                break result;
            }
            self.shared.creation_done.wait(&mut state);
        };

        let Some(reg) = state.registry.as_mut() else {
            drop(state);
            if let Ok(statement) = result {
                tracing::debug!("cache closed while creating statement, destroying it");
                StatementHandle::new(statement).destroy();
            }
            return Err(CacheError::Closed);
        };

        reg.counters.misses += 1;
        let handle = StatementHandle::new(result?);
        if self.admit(reg, key.connection()) {
            Self::assimilate(reg, key, handle.clone())?;
        } else {
            reg.counters.overloads += 1;
            tracing::debug!(
                sql = %key.sql(),
                statement = handle.id(),
                "statement cache full, handing out uncached statement"
            );
        }
        Ok(handle)
    }

    /// Check out a statement described by the raw arguments of a
    /// statement-producing call
    ///
    /// See [`StatementKey::find`] for how the arguments are classified.
    pub fn checkout_with_args<F>(
        &self,
        connection: &ConnectionRef<C>,
        kind: StatementKind,
        args: &[StatementArg],
        create: F,
    ) -> Result<StatementHandle<S>>
    where
        F: FnOnce(&C) -> Result<S> + Send + 'static,
    {
        let key = StatementKey::find(connection.clone(), kind, args)?;
        self.checkout(key, create)
    }

    /// Return a statement to the cache
    ///
    /// Statements the cache does not track (overload statements, foreign
    /// statements) are destroyed. Checking in a statement twice is a no-op.
    /// After close the statement is destroyed synchronously and `Closed` is
    /// returned.
    pub fn checkin(&self, handle: StatementHandle<S>) -> Result<()> {
        let mut state = self.shared.state.lock();
        let Some(reg) = state.registry.as_mut() else {
            drop(state);
            handle.destroy();
            return Err(CacheError::Closed);
        };
        self.checkin_locked(reg, &handle);
        Ok(())
    }

    /// Check in every statement of `connection` that is still checked out
    pub fn checkin_all(&self, connection: &ConnectionRef<C>) -> Result<()> {
        let mut state = self.shared.state.lock();
        let reg = state.registry.as_mut().ok_or(CacheError::Closed)?;

        for handle in reg.connections.handles_for_connection(connection) {
            if reg.checked_out.contains(&handle) {
                self.checkin_locked(reg, &handle);
            }
        }
        Ok(())
    }

    /// Remove and destroy every cached statement of `connection`
    ///
    /// Statements are unregistered under the cache lock and destroyed only
    /// after it is released.
    #[tracing::instrument(skip_all, fields(connection = connection.id()))]
    pub fn close_all(&self, connection: &ConnectionRef<C>) -> Result<()> {
        let doomed: Vec<_> = {
            let mut state = self.shared.state.lock();
            let reg = state.registry.as_mut().ok_or(CacheError::Closed)?;
            let removed: Vec<_> = reg
                .connections
                .handles_for_connection(connection)
                .into_iter()
                .filter(|handle| self.remove_statement(reg, handle, Destroy::Deferred))
                .collect();
            removed
        };

        tracing::debug!(count = doomed.len(), "destroying statements of connection");
        for handle in &doomed {
            handle.destroy();
            self.shared.removing.lock().remove(handle);
        }
        Ok(())
    }

    /// Close the cache, destroying every cached statement
    ///
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        let handles: Vec<_> = {
            let mut state = self.shared.state.lock();
            let Some(reg) = state.registry.take() else {
                tracing::debug!("statement cache already closed");
                return;
            };
            reg.key_for_handle.into_keys().collect()
        };

        tracing::debug!(count = handles.len(), "closing statement cache");
        for handle in handles {
            handle.destroy();
        }
    }

    /// Check if the cache has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().registry.is_none()
    }

    /// Number of cached statements, `None` once closed
    pub fn num_statements(&self) -> Option<usize> {
        self.with_registry(|reg| reg.key_for_handle.len())
    }

    /// Number of cached statements currently checked out, `None` once closed
    pub fn num_checked_out(&self) -> Option<usize> {
        self.with_registry(|reg| reg.checked_out.len())
    }

    /// Number of connections with at least one cached statement, `None` once closed
    pub fn num_connections_with_cached_statements(&self) -> Option<usize> {
        self.with_registry(|reg| reg.connections.num_connections())
    }

    /// Number of cached statements of `connection`, `None` once closed
    pub fn num_statements_for_connection(&self, connection: &ConnectionRef<C>) -> Option<usize> {
        self.with_registry(|reg| reg.connections.count_for_connection(connection))
    }

    /// Snapshot of the cache's statistics, `None` once closed
    pub fn stats(&self) -> Option<StatementCacheStats> {
        self.with_registry(|reg| StatementCacheStats {
            statements: reg.key_for_handle.len(),
            checked_out: reg.checked_out.len(),
            connections: reg.connections.num_connections(),
            max_statements: reg.policy.max_statements(),
            hits: reg.counters.hits,
            misses: reg.counters.misses,
            overloads: reg.counters.overloads,
            evictions: reg.counters.evictions,
        })
    }

    /// Human-readable listing of the cache's contents
    pub fn dump(&self) -> String {
        let state = self.shared.state.lock();
        let Some(reg) = state.registry.as_ref() else {
            return "StatementCache [closed]".to_string();
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "StatementCache [{:?}] statements: {}, checked out: {}, idle: {}, connections: {}",
            reg.policy,
            reg.key_for_handle.len(),
            reg.checked_out.len(),
            reg.deathmarch.len(),
            reg.connections.num_connections()
        );
        for connection in reg.connections.connections_with_cached_statements() {
            let _ = writeln!(out, "  {:?}:", connection);
            for handle in reg.connections.handles_for_connection(connection) {
                let status = if reg.checked_out.contains(&handle) {
                    "checked out"
                } else {
                    "idle"
                };
                let sql = reg.key_for_handle.get(&handle).map_or("<unknown>", |k| k.sql());
                let _ = writeln!(out, "    {:#x} [{}] {}", handle.id(), status, sql);
            }
        }
        out
    }

    fn with_registry<T>(&self, f: impl FnOnce(&Registry<C, S>) -> T) -> Option<T> {
        self.shared.state.lock().registry.as_ref().map(f)
    }

    fn checkin_locked(&self, reg: &mut Registry<C, S>, handle: &StatementHandle<S>) {
        if !reg.checked_out.contains(handle) {
            if reg.key_for_handle.contains_key(handle) {
                tracing::debug!(statement = handle.id(), "statement already checked in");
            } else if self.mark_removing(handle) {
                tracing::debug!(statement = handle.id(), "destroying uncached statement");
                self.destroy_async(handle.clone());
            } else {
                tracing::debug!(statement = handle.id(), "statement removal already in progress");
            }
            return;
        }

        if let Err(e) = handle.reset() {
            tracing::warn!(
                statement = handle.id(),
                error = %e,
                "failed to reset statement, removing it from the cache"
            );
            self.remove_statement(reg, handle, Destroy::Async);
            return;
        }

        let Some(key) = reg.key_for_handle.get(handle) else {
            let _ = inconsistency("checked out statement has no cache key");
            reg.checked_out.remove(handle);
            if self.mark_removing(handle) {
                self.destroy_async(handle.clone());
            }
            return;
        };
        let Some(record) = reg.records.get_mut(key) else {
            let _ = inconsistency("cache key of a checked out statement has no record");
            self.remove_statement(reg, handle, Destroy::Async);
            return;
        };
        reg.checked_out.remove(handle);
        record.idle.push_back(handle.clone());

        let _ = reg.deathmarch.record(handle.clone());
        if let Some(march) = reg.connections.deathmarch_for_mut(key.connection()) {
            let _ = march.record(handle.clone());
        }
    }

    /// Make room for one more statement of `connection` if the policy allows
    fn admit(&self, reg: &mut Registry<C, S>, connection: &ConnectionRef<C>) -> bool {
        let connection_count = reg.connections.count_for_connection(connection);
        match reg
            .policy
            .admission(reg.key_for_handle.len(), connection_count)
        {
            Admission::Admit => true,
            Admission::EvictGlobal => self.evict_oldest(reg, None),
            Admission::EvictConnection => self.evict_oldest(reg, Some(connection)),
            Admission::Reject => false,
        }
    }

    /// Evict the longest-idle statement of the cache, or of one connection
    ///
    /// Returns false if there is nothing idle to evict.
    fn evict_oldest(&self, reg: &mut Registry<C, S>, connection: Option<&ConnectionRef<C>>) -> bool {
        let oldest = match connection {
            None => reg.deathmarch.oldest().cloned(),
            Some(connection) => reg
                .connections
                .deathmarch_for(connection)
                .and_then(|march| march.oldest().cloned()),
        };
        let Some(victim) = oldest else {
            return false;
        };

        tracing::debug!(statement = victim.id(), "evicting oldest idle statement");
        let removed = self.remove_statement(reg, &victim, Destroy::Async);
        if removed {
            reg.counters.evictions += 1;
        }
        removed
    }

    fn assimilate(
        reg: &mut Registry<C, S>,
        key: StatementKey<C>,
        handle: StatementHandle<S>,
    ) -> Result<()> {
        if !reg.checked_out.insert(handle.clone()) {
            return Err(inconsistency("a freshly created statement was already checked out"));
        }
        reg.connections.add(handle.clone(), key.connection());
        reg.records
            .entry(key.clone())
            .or_insert_with(KeyRecord::new)
            .all
            .insert(handle.clone());
        if reg.key_for_handle.insert(handle, key).is_some() {
            return Err(inconsistency("a freshly created statement was already cached"));
        }
        Ok(())
    }

    /// Unconditionally remove a statement from every registry
    ///
    /// Returns false if another removal of the same statement is in progress
    /// or the statement is not cached.
    fn remove_statement(
        &self,
        reg: &mut Registry<C, S>,
        handle: &StatementHandle<S>,
        destroy: Destroy,
    ) -> bool {
        if !self.mark_removing(handle) {
            tracing::debug!(statement = handle.id(), "statement removal already in progress");
            return false;
        }

        let Some(key) = reg.key_for_handle.remove(handle) else {
            self.shared.removing.lock().remove(handle);
            let _ = inconsistency("removing a statement the cache does not track");
            return false;
        };

        let was_checked_out = reg.checked_out.remove(handle);
        match reg.records.get_mut(&key) {
            Some(record) => {
                record.all.remove(handle);
                if !was_checked_out {
                    record.idle.retain(|idle| idle != handle);
                }
                if record.all.is_empty() {
                    reg.records.remove(&key);
                }
            }
            None => {
                let _ = inconsistency("cache key of a removed statement has no record");
            }
        }

        if reg.deathmarch.contains(handle) {
            let _ = reg.deathmarch.release(handle);
        }
        if let Some(march) = reg.connections.deathmarch_for_mut(key.connection())
            && march.contains(handle)
        {
            let _ = march.release(handle);
        }
        if !reg.connections.remove(handle, key.connection()) {
            tracing::warn!(
                statement = handle.id(),
                connection = key.connection().id(),
                "removed statement was not attributed to its connection"
            );
        }

        if destroy == Destroy::Async {
            self.destroy_async(handle.clone());
        }
        true
    }

    /// Returns false if the statement is already being removed
    fn mark_removing(&self, handle: &StatementHandle<S>) -> bool {
        self.shared.removing.lock().insert(handle.clone())
    }

    /// Destroy a statement marked as removing on the runner
    ///
    /// A task the runner rejects or drops destroys the statement on the
    /// thread that drops it.
    fn destroy_async(&self, handle: StatementHandle<S>) {
        let statement = handle.id();
        let pending = PendingDestroy {
            shared: Arc::clone(&self.shared),
            handle,
        };
        let task = Box::new(move || drop(pending));

        if let Err(e) = self.runner.post(task) {
            tracing::warn!(
                statement,
                error = %e,
                "runner rejected destroy task, statement destroyed synchronously"
            );
        }
    }

    /// Verify that every cached statement sits in exactly one place
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let state = self.shared.state.lock();
        let Some(reg) = state.registry.as_ref() else {
            return;
        };

        let mut idle_count = 0;
        for (handle, key) in &reg.key_for_handle {
            let record = reg.records.get(key).expect("cached statement without record");
            assert!(record.all.contains(handle));
            let idle = record.idle.iter().filter(|h| *h == handle).count();
            let checked_out = usize::from(reg.checked_out.contains(handle));
            assert_eq!(
                idle + checked_out,
                1,
                "statement {:#x} must be either idle or checked out",
                handle.id()
            );
            assert_eq!(reg.deathmarch.contains(handle), idle == 1);
            idle_count += idle;
        }
        assert_eq!(reg.deathmarch.len(), idle_count);
        assert_eq!(
            reg.records.values().map(|r| r.all.len()).sum::<usize>(),
            reg.key_for_handle.len()
        );
        assert!(reg.checked_out.iter().all(|h| reg.key_for_handle.contains_key(h)));
        assert!(reg.key_for_handle.len() <= reg.policy.max_statements());
        if let Some(local_max) = reg.policy.max_statements_per_connection() {
            for connection in reg.connections.connections_with_cached_statements() {
                assert!(reg.connections.count_for_connection(connection) <= local_max);
            }

            let mut local_idle = 0;
            for connection in reg.connections.connections_with_cached_statements() {
                let march = reg
                    .connections
                    .deathmarch_for(connection)
                    .expect("connection with cached statements has no deathmarch");
                for handle in reg.connections.handles_for_connection(connection) {
                    assert_eq!(
                        march.contains(&handle),
                        reg.deathmarch.contains(&handle),
                        "statement {:#x} disagrees between connection and global eviction order",
                        handle.id()
                    );
                }
                local_idle += march.len();
            }
            assert_eq!(local_idle, reg.deathmarch.len());
        }
    }

    /// Drop an idle statement from the global eviction order behind the
    /// engine's back
    #[cfg(test)]
    pub(crate) fn forget_eviction_order(&self, handle: &StatementHandle<S>) {
        let mut state = self.shared.state.lock();
        let reg = state.registry.as_mut().expect("open cache");
        reg.deathmarch.release(handle).expect("idle statement");
    }

    /// Drop the key record of a cached statement behind the engine's back
    #[cfg(test)]
    pub(crate) fn forget_key_record(&self, handle: &StatementHandle<S>) {
        let mut state = self.shared.state.lock();
        let reg = state.registry.as_mut().expect("open cache");
        let key = reg.key_for_handle.get(handle).expect("cached statement").clone();
        reg.records.remove(&key);
    }
}
