//! Eviction order tracking
//!
//! A deathmarch orders idle statements by the moment they were checked in.
//! The oldest entry is always the next one to be evicted.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use prepcache_core::{Result, inconsistency};

/// FIFO eviction ledger over idle handles
#[derive(Debug)]
pub(crate) struct Deathmarch<H> {
    /// Last counter value handed out
    last: u64,
    by_time: BTreeMap<u64, H>,
    by_handle: HashMap<H, u64>,
}

impl<H: Clone + Eq + Hash> Deathmarch<H> {
    pub fn new() -> Self {
        Self {
            last: 0,
            by_time: BTreeMap::new(),
            by_handle: HashMap::new(),
        }
    }

    /// Record a handle as checked in now
    pub fn record(&mut self, handle: H) -> Result<()> {
        if self.by_handle.contains_key(&handle) {
            return Err(inconsistency(
                "handle recorded in a deathmarch twice without an intervening release",
            ));
        }
        self.last += 1;
        self.by_time.insert(self.last, handle.clone());
        self.by_handle.insert(handle, self.last);
        Ok(())
    }

    /// Forget a handle, typically because it was checked out or removed
    pub fn release(&mut self, handle: &H) -> Result<()> {
        match self.by_handle.remove(handle) {
            Some(time) => {
                self.by_time.remove(&time);
                Ok(())
            }
            None => Err(inconsistency(
                "released a handle that was not recorded in the deathmarch",
            )),
        }
    }

    /// The handle that has been idle the longest
    pub fn oldest(&self) -> Option<&H> {
        self.by_time.values().next()
    }

    pub fn contains(&self, handle: &H) -> bool {
        self.by_handle.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }
}

impl<H: Clone + Eq + Hash> Default for Deathmarch<H> {
    fn default() -> Self {
        Self::new()
    }
}
