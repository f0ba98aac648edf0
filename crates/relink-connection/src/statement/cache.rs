use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relink_core::{RelinkError, Result};

use super::{Fingerprint, StatementProxy};

/// Fingerprint-keyed map of statement proxies, at most one per fingerprint.
#[derive(Default)]
pub struct StatementCache {
    entries: Mutex<HashMap<Fingerprint, Arc<StatementProxy>>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<StatementProxy>> {
        self.entries.lock().get(fingerprint).cloned()
    }

    /// Register `proxy` under its fingerprint.
    ///
    /// Registering the same proxy twice is a no-op. A different proxy under an
    /// occupied fingerprint is rejected with `CacheConflict`.
    pub fn insert(&self, proxy: Arc<StatementProxy>) -> Result<()> {
        let mut entries = self.entries.lock();
        match entries.get(proxy.fingerprint()) {
            Some(existing) if Arc::ptr_eq(existing, &proxy) => Ok(()),
            Some(_) => Err(RelinkError::CacheConflict {
                fingerprint: proxy.fingerprint().to_string(),
            }),
            None => {
                entries.insert(proxy.fingerprint().clone(), proxy);
                Ok(())
            }
        }
    }

    /// Register `proxy` unless its fingerprint is already taken, returning
    /// whichever proxy owns the slot afterwards.
    pub fn get_or_insert(&self, proxy: Arc<StatementProxy>) -> Arc<StatementProxy> {
        let mut entries = self.entries.lock();
        Arc::clone(
            entries
                .entry(proxy.fingerprint().clone())
                .or_insert(proxy),
        )
    }

    /// Put `proxy` back under its fingerprint after it was re-prepared.
    ///
    /// Proxies dropped by [`clear`](Self::clear) or [`remove`](Self::remove)
    /// stay detached, and an occupied slot is never taken over. Returns
    /// whether `proxy` owns the slot afterwards.
    pub(crate) fn reregister(&self, proxy: &Arc<StatementProxy>) -> bool {
        let mut entries = self.entries.lock();
        if proxy.is_detached() {
            return false;
        }
        match entries.get(proxy.fingerprint()) {
            Some(existing) => Arc::ptr_eq(existing, proxy),
            None => {
                entries.insert(proxy.fingerprint().clone(), Arc::clone(proxy));
                true
            }
        }
    }

    /// Evict `proxy` if it is the one registered under its fingerprint.
    ///
    /// `proxy` is detached either way.
    pub fn remove(&self, proxy: &StatementProxy) -> bool {
        let mut entries = self.entries.lock();
        let owns_slot = entries
            .get(proxy.fingerprint())
            .is_some_and(|existing| std::ptr::eq(Arc::as_ptr(existing), proxy));
        if owns_slot {
            entries.remove(proxy.fingerprint());
        }
        proxy.detach();
        owns_slot
    }

    /// Drop every entry, returning how many there were
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        for (_, proxy) in entries.drain() {
            proxy.detach();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("len", &self.len())
            .finish()
    }
}
