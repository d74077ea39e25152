// # Record Cache
//
// In-memory view of every greydns-managed record at the provider, keyed by
// domain name, plus the zone name → ID table.
//
// ## Consistency
//
// - Only records whose comment carries an ownership tag are admitted.
// - A full refresh replaces the contents wholesale, and only on success.
//   A failed refresh leaves the previous contents untouched.
// - Incremental mutations made while a refresh is in flight are journaled and
//   replayed on top of the refreshed listing, so a listing taken before a
//   create (or a delete) cannot undo it.
//
// ## Locking
//
// All state sits behind one `tokio::sync::RwLock`. Lock scopes are short and
// never span a provider call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ownership;
use crate::types::{DnsRecord, RecordMap, ZoneTable};

/// A mutation recorded while a refresh is in flight
#[derive(Debug, Clone)]
enum CacheMutation {
    Upsert(DnsRecord),
    Remove(String),
}

#[derive(Debug, Default)]
struct CacheState {
    records: RecordMap,
    zones: ZoneTable,
    last_refreshed: Option<DateTime<Utc>>,
    journal: Option<Vec<CacheMutation>>,
}

impl CacheState {
    fn record(&mut self, mutation: CacheMutation) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(mutation);
        }
    }
}

/// Shared record cache
///
/// Cloning is cheap and yields a handle to the same cache.
///
/// # Example
///
/// ```rust,no_run
/// use greydns_core::cache::RecordCache;
/// use greydns_core::types::{DnsRecord, RecordType};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = RecordCache::new();
///     cache.insert(DnsRecord {
///         id: "rec-1".into(),
///         name: "api.example.com".into(),
///         record_type: RecordType::A,
///         content: "10.0.0.5".into(),
///         ttl: 60,
///         comment: greydns_core::ownership::tag_for("default", "svc-a"),
///         proxied: None,
///         zone_id: "zone123".into(),
///     }).await;
///     assert!(cache.get("api.example.com").await.is_some());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    inner: Arc<RwLock<CacheState>>,
}

impl RecordCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-populated with zones and records
    ///
    /// Untagged records are dropped, exactly as during a refresh.
    pub fn with_contents(zones: ZoneTable, records: RecordMap) -> Self {
        let state = CacheState {
            records: managed_only(records),
            zones,
            last_refreshed: None,
            journal: None,
        };
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Look up the record for a domain
    pub async fn get(&self, name: &str) -> Option<DnsRecord> {
        self.inner.read().await.records.get(name).cloned()
    }

    /// Insert or replace the record stored under its own name
    ///
    /// Returns `false` (and stores nothing) when the record carries no
    /// ownership tag.
    pub async fn insert(&self, record: DnsRecord) -> bool {
        if !ownership::is_managed(&record.comment) {
            warn!("Refusing to cache untagged record {}", record.name);
            return false;
        }
        let mut guard = self.inner.write().await;
        guard.record(CacheMutation::Upsert(record.clone()));
        guard.records.insert(record.name.clone(), record);
        true
    }

    /// Evict a domain
    pub async fn remove(&self, name: &str) -> Option<DnsRecord> {
        let mut guard = self.inner.write().await;
        guard.record(CacheMutation::Remove(name.to_string()));
        guard.records.remove(name)
    }

    /// Move an entry from `old_name` to the record's (possibly new) name
    ///
    /// The old key is only deleted when the name actually changed.
    pub async fn rename(&self, old_name: &str, record: DnsRecord) -> bool {
        if !ownership::is_managed(&record.comment) {
            warn!("Refusing to cache untagged record {}", record.name);
            return false;
        }
        let mut guard = self.inner.write().await;
        if old_name != record.name {
            guard.record(CacheMutation::Remove(old_name.to_string()));
            guard.records.remove(old_name);
        }
        guard.record(CacheMutation::Upsert(record.clone()));
        guard.records.insert(record.name.clone(), record);
        true
    }

    /// All records whose tag names `(namespace, name)` as owner
    pub async fn owned_by(&self, namespace: &str, name: &str) -> Vec<DnsRecord> {
        let guard = self.inner.read().await;
        let mut owned: Vec<DnsRecord> = guard
            .records
            .values()
            .filter(|r| ownership::owner_matches(&r.comment, namespace, name))
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.name.cmp(&b.name));
        owned
    }

    /// Copy of every cached record
    pub async fn snapshot(&self) -> RecordMap {
        self.inner.read().await.records.clone()
    }

    /// Copy of the zone table
    pub async fn zones(&self) -> ZoneTable {
        self.inner.read().await.zones.clone()
    }

    /// Get the number of cached records
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// Time of the last successful refresh
    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_refreshed
    }

    /// Start journaling mutations ahead of a full refresh
    ///
    /// A refresh that is still pending is superseded.
    pub async fn begin_refresh(&self) {
        let mut guard = self.inner.write().await;
        if guard.journal.is_some() {
            debug!("Superseding an unfinished cache refresh");
        }
        guard.journal = Some(Vec::new());
    }

    /// Swap in a freshly listed provider state
    ///
    /// Mutations journaled since [`RecordCache::begin_refresh`] are replayed
    /// on top of `records`. Returns the number of cached records afterwards.
    pub async fn commit_refresh(&self, zones: ZoneTable, records: RecordMap) -> usize {
        let mut records = managed_only(records);
        let mut guard = self.inner.write().await;

        for mutation in guard.journal.take().unwrap_or_default() {
            match mutation {
                CacheMutation::Upsert(record) => {
                    records.insert(record.name.clone(), record);
                }
                CacheMutation::Remove(name) => {
                    records.remove(&name);
                }
            }
        }

        guard.records = records;
        guard.zones = zones;
        guard.last_refreshed = Some(Utc::now());
        guard.records.len()
    }

    /// Abandon a refresh; the current contents stay as they are
    pub async fn abort_refresh(&self) {
        self.inner.write().await.journal = None;
    }
}

fn managed_only(records: RecordMap) -> RecordMap {
    records
        .into_iter()
        .filter(|(name, record)| {
            let keep = ownership::is_managed(&record.comment);
            if !keep {
                debug!("Skipping unmanaged record {}", name);
            }
            keep
        })
        .collect()
}
