//! Test doubles and common utilities for contract tests
//!
//! [`MockDnsProvider`] keeps an in-memory copy of the "remote" zone contents
//! and records every call, so tests can assert on exactly which provider
//! operations a reconciliation issued.

#![allow(dead_code)]

use async_trait::async_trait;
use greydns_core::config::ControllerConfig;
use greydns_core::error::{Error, Result};
use greydns_core::ownership;
use greydns_core::traits::{DnsProvider, MemoryNotifier};
use greydns_core::types::{
    CreateRecordParams, DnsRecord, RecordMap, RecordType, UpdateRecordParams, Zone, ZoneTable,
};
use greydns_core::{RecordCache, Reconciler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const ZONE_NAME: &str = "example.com";
pub const ZONE_ID: &str = "zone123";

/// A provider operation as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListZones,
    GetZone(String),
    Create(String),
    Update { id: String, name: String },
    Delete(String),
    ListRecords(String),
}

impl Call {
    /// Whether the call changes provider state
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Create(_) | Call::Update { .. } | Call::Delete(_))
    }
}

#[derive(Default)]
struct MockState {
    zones: Mutex<ZoneTable>,
    /// Remote records keyed by ID
    records: Mutex<HashMap<String, DnsRecord>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    fail_list: AtomicBool,
    create_delay: Mutex<Duration>,
}

/// A mock DnsProvider backed by an in-memory zone
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Clone)]
pub struct MockDnsProvider {
    state: Arc<MockState>,
}

impl MockDnsProvider {
    /// Provider with the single zone `example.com`
    pub fn new() -> Self {
        let provider = Self {
            state: Arc::new(MockState::default()),
        };
        provider.add_zone(ZONE_NAME, ZONE_ID);
        provider
    }

    pub fn add_zone(&self, name: &str, id: &str) {
        self.state.zones.lock().unwrap().insert(name.to_string(), id.to_string());
    }

    /// Put a record at the provider without going through the API
    pub fn seed(&self, record: DnsRecord) {
        self.state
            .records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn create_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Create(_))).count()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().unwrap().clear();
    }

    /// Remote records with the given name
    pub fn remote_named(&self, name: &str) -> Vec<DnsRecord> {
        self.state
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }

    pub fn remote_count(&self) -> usize {
        self.state.records.lock().unwrap().len()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.state.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.state.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Slow down creates to widen race windows
    pub fn set_create_delay(&self, delay: Duration) {
        *self.state.create_delay.lock().unwrap() = delay;
    }

    fn record_call(&self, call: Call) {
        self.state.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_zones(&self) -> Result<ZoneTable> {
        self.record_call(Call::ListZones);
        if self.state.fail_list.load(Ordering::SeqCst) {
            return Err(Error::backend("mock", "list_zones", "listing disabled"));
        }
        Ok(self.state.zones.lock().unwrap().clone())
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Zone> {
        self.record_call(Call::GetZone(zone_id.to_string()));
        self.state
            .zones
            .lock()
            .unwrap()
            .iter()
            .find(|(_, id)| id.as_str() == zone_id)
            .map(|(name, id)| Zone {
                id: id.clone(),
                name: name.clone(),
            })
            .ok_or_else(|| Error::not_found("mock", "get_zone", zone_id))
    }

    async fn create_record(&self, params: CreateRecordParams) -> Result<DnsRecord> {
        self.record_call(Call::Create(params.name.clone()));
        let delay = *self.state.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(Error::backend("mock", "create_record", "create disabled"));
        }

        let id = format!("rec-{}", self.state.next_id.fetch_add(1, Ordering::SeqCst));
        let record = DnsRecord {
            id: id.clone(),
            name: params.name,
            record_type: params.record_type,
            content: params.content,
            ttl: params.ttl,
            comment: params.comment,
            proxied: params.proxied,
            zone_id: params.zone_id,
        };
        self.state.records.lock().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn update_record(&self, params: UpdateRecordParams) -> Result<DnsRecord> {
        self.record_call(Call::Update {
            id: params.record_id.clone(),
            name: params.name.clone(),
        });
        if self.state.fail_update.load(Ordering::SeqCst) {
            return Err(Error::backend("mock", "update_record", "update disabled"));
        }

        let mut records = self.state.records.lock().unwrap();
        if !records.contains_key(&params.record_id) {
            return Err(Error::not_found("mock", "update_record", params.record_id));
        }
        let record = DnsRecord {
            id: params.record_id.clone(),
            name: params.name,
            record_type: params.record_type,
            content: params.content,
            ttl: params.ttl,
            comment: params.comment,
            proxied: params.proxied,
            zone_id: params.zone_id,
        };
        records.insert(params.record_id, record.clone());
        Ok(record)
    }

    async fn delete_record(&self, record_id: &str, _zone_id: &str) -> Result<()> {
        self.record_call(Call::Delete(record_id.to_string()));
        if self.state.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::backend("mock", "delete_record", "delete disabled"));
        }
        self.state
            .records
            .lock()
            .unwrap()
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("mock", "delete_record", record_id))
    }

    async fn list_records(&self, zone_id: &str) -> Result<RecordMap> {
        self.record_call(Call::ListRecords(zone_id.to_string()));
        if self.state.fail_list.load(Ordering::SeqCst) {
            return Err(Error::backend("mock", "list_records", "listing disabled"));
        }
        Ok(self
            .state
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.zone_id == zone_id && ownership::is_managed(&r.comment))
            .map(|r| (r.name.clone(), r.clone()))
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Settings used by every test
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        record_ttl: 60,
        record_type: RecordType::A,
        proxy_enabled: false,
        cache_refresh_seconds: 3600,
        ingress_destination: "10.0.0.5".to_string(),
        provider: "mock".to_string(),
    }
}

/// Live settings channel holding [`test_config`]
pub fn config_channel() -> (watch::Sender<ControllerConfig>, watch::Receiver<ControllerConfig>) {
    watch::channel(test_config())
}

/// Record tagged as owned by `namespace/name`
pub fn owned_record(id: &str, domain: &str, namespace: &str, name: &str) -> DnsRecord {
    DnsRecord {
        id: id.to_string(),
        name: domain.to_string(),
        record_type: RecordType::A,
        content: "10.0.0.5".to_string(),
        ttl: 60,
        comment: ownership::tag_for(namespace, name),
        proxied: Some(false),
        zone_id: ZONE_ID.to_string(),
    }
}

/// Everything a reconciler test needs, wired together
pub struct Harness {
    pub provider: MockDnsProvider,
    pub notifier: Arc<MemoryNotifier>,
    pub cache: RecordCache,
    pub config_tx: watch::Sender<ControllerConfig>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    /// Reconciler over `provider`, with the cache primed by a refresh
    pub async fn new(provider: MockDnsProvider) -> Self {
        let notifier = Arc::new(MemoryNotifier::new());
        let cache = RecordCache::new();
        let (config_tx, config_rx) = config_channel();

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(provider.clone()),
            cache.clone(),
            notifier.clone(),
            config_rx,
        ));
        reconciler.refresh_cache().await.expect("initial refresh succeeds");
        provider.clear_calls();

        Self {
            provider,
            notifier,
            cache,
            config_tx,
            reconciler,
        }
    }
}
