//! Per-watcher set of tracked quotes, keyed by quote hash.
//!
//! Only the owning watcher loop mutates a [`WorkingSet`]. Anything else gets
//! a [`WorkingSetReader`], which hands out copies.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub struct WorkingSet<T> {
    inner: Arc<RwLock<HashMap<String, T>>>,
}

impl<T: Clone> WorkingSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Inserts or replaces. Returns `true` when the hash was not tracked yet.
    pub fn insert(&mut self, quote_hash: impl Into<String>, value: T) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(quote_hash.into(), value)
            .is_none()
    }

    pub fn remove(&mut self, quote_hash: &str) -> Option<T> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(quote_hash)
    }

    pub fn get(&self, quote_hash: &str) -> Option<T> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(quote_hash)
            .cloned()
    }

    pub fn contains(&self, quote_hash: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(quote_hash)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every tracked value, ordered by quote hash.
    pub fn snapshot(&self) -> Vec<T> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(&String, &T)> = guard.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn reader(&self) -> WorkingSetReader<T> {
        WorkingSetReader {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Default for WorkingSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a watcher's working set.
#[derive(Clone)]
pub struct WorkingSetReader<T> {
    inner: Arc<RwLock<HashMap<String, T>>>,
}

impl<T: Clone> WorkingSetReader<T> {
    pub fn get(&self, quote_hash: &str) -> Option<T> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(quote_hash)
            .cloned()
    }

    pub fn contains(&self, quote_hash: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(quote_hash)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hashes(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        hashes.sort();
        hashes
    }
}
