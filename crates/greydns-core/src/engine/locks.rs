//! Per-domain async locks
//!
//! Every decision that reads the cache for a domain and then mutates the
//! provider holds that domain's lock, so two resources racing for the same
//! name are decided one after the other. Entries are dropped from the table
//! once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = HashMap<String, Arc<AsyncMutex<()>>>;

/// Table of named async locks
#[derive(Debug, Clone, Default)]
pub struct DomainLocks {
    table: Arc<Mutex<LockTable>>,
}

/// Holds one or more domain locks until dropped
#[derive(Debug)]
pub struct DomainGuard {
    held: Vec<(String, OwnedMutexGuard<()>)>,
    table: Arc<Mutex<LockTable>>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a single domain
    pub async fn lock(&self, domain: &str) -> DomainGuard {
        self.lock_all(&[domain]).await
    }

    /// Lock several domains
    ///
    /// Locks are taken in sorted order and duplicates are collapsed, so
    /// concurrent callers with overlapping sets cannot deadlock.
    pub async fn lock_all(&self, domains: &[&str]) -> DomainGuard {
        let mut names: Vec<&str> = domains.to_vec();
        names.sort_unstable();
        names.dedup();

        let mut held = Vec::with_capacity(names.len());
        for name in names {
            let mutex = {
                let mut table = lock_table(&self.table);
                Arc::clone(table.entry(name.to_string()).or_default())
            };
            held.push((name.to_string(), mutex.lock_owned().await));
        }

        DomainGuard {
            held,
            table: Arc::clone(&self.table),
        }
    }

    /// Number of domains with a live lock entry
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DomainGuard {
    fn drop(&mut self) {
        let names: Vec<String> = self
            .held
            .drain(..)
            .map(|(name, guard)| {
                drop(guard);
                name
            })
            .collect();

        let mut table = lock_table(&self.table);
        for name in names {
            // Only the table itself still references an idle lock
            let idle = table
                .get(&name)
                .is_some_and(|mutex| Arc::strong_count(mutex) == 1);
            if idle {
                table.remove(&name);
            }
        }
    }
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}
