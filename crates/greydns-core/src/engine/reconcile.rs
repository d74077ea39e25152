//! Reconciliation decisions
//!
//! For each `(namespace, name, domain)` the reconciler works out which of four
//! states applies and issues the minimal provider calls:
//!
//! - **Unmanaged**: DNS disabled or no record. Create when enabled.
//! - **Owned-Current**: record at the desired domain carries our tag. No-op,
//!   apart from cleaning up records we own under other names.
//! - **Owned-Stale**: our record sits under the previous domain (update events
//!   only). Rename it in place.
//! - **Conflicted**: the desired domain carries someone else's tag. Notify,
//!   never touch the foreign record.
//!
//! The enablement gate is checked before anything else; a disabled resource
//! never causes a provider call.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::RecordCache;
use crate::config::ControllerConfig;
use crate::engine::locks::DomainLocks;
use crate::error::Result;
use crate::ownership;
use crate::resource::{DnsIntent, ResourceEvent, ResourceSnapshot};
use crate::traits::{DnsProvider, Notification, Notifier};
use crate::types::{CreateRecordParams, DnsRecord, UpdateRecordParams, Zone};
use crate::zones::ZoneResolver;

/// What a single reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// DNS disabled, or nothing of ours to act on
    Skipped,
    /// A record was created for the domain
    Created(String),
    /// The domain was already ours
    Unchanged(String),
    /// Our record moved from one domain to another
    Renamed { from: String, to: String },
    /// Our record was deleted
    Deleted(String),
    /// The domain belongs to another resource
    Conflict(String),
    /// The event was dropped after a failure
    Failed(String),
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Skipped => write!(f, "skipped"),
            ReconcileOutcome::Created(d) => write!(f, "created {}", d),
            ReconcileOutcome::Unchanged(d) => write!(f, "unchanged {}", d),
            ReconcileOutcome::Renamed { from, to } => write!(f, "renamed {} -> {}", from, to),
            ReconcileOutcome::Deleted(d) => write!(f, "deleted {}", d),
            ReconcileOutcome::Conflict(d) => write!(f, "conflict on {}", d),
            ReconcileOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Reconciles resource events against the record cache
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    cache: RecordCache,
    notifier: Arc<dyn Notifier>,
    config: watch::Receiver<ControllerConfig>,
    locks: DomainLocks,
}

impl Reconciler {
    /// Create a reconciler
    ///
    /// `config` is read afresh on every event, so a hot-reloaded
    /// configuration applies from the next event on.
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        cache: RecordCache,
        notifier: Arc<dyn Notifier>,
        config: watch::Receiver<ControllerConfig>,
    ) -> Self {
        Self {
            provider,
            cache,
            notifier,
            config,
            locks: DomainLocks::new(),
        }
    }

    /// The cache this reconciler reads and mutates
    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Reconcile one resource event
    pub async fn handle(&self, event: &ResourceEvent) -> ReconcileOutcome {
        match event {
            ResourceEvent::Create(resource) => self.on_create(resource).await,
            ResourceEvent::Update { old, new } => self.on_update(old, new).await,
            ResourceEvent::Delete(resource) => self.on_delete(resource).await,
        }
    }

    /// Resource appeared (or is seen for the first time)
    pub async fn on_create(&self, resource: &ResourceSnapshot) -> ReconcileOutcome {
        let Some(intent) = self.intent(resource) else {
            return ReconcileOutcome::Skipped;
        };
        let intent = match intent {
            Ok(intent) => intent,
            Err(outcome) => return outcome,
        };

        let zone = match self.resolve_zone(resource, &intent).await {
            Ok(zone) => zone,
            Err(outcome) => return outcome,
        };

        let _guard = self.locks.lock(&intent.domain).await;
        self.claim(resource, &intent.domain, &zone).await
    }

    /// Resource changed; `old` is the snapshot before the change
    pub async fn on_update(&self, old: &ResourceSnapshot, new: &ResourceSnapshot) -> ReconcileOutcome {
        let Some(intent) = self.intent(new) else {
            return ReconcileOutcome::Skipped;
        };
        let intent = match intent {
            Ok(intent) => intent,
            Err(outcome) => return outcome,
        };

        let old_domain = match DnsIntent::from_snapshot(old) {
            Ok(Some(old_intent)) if old_intent.domain != intent.domain => old_intent.domain,
            // Same domain, or nothing usable before: plain claim
            _ => return self.on_create(new).await,
        };

        let zone = match self.resolve_zone(new, &intent).await {
            Ok(zone) => zone,
            Err(outcome) => return outcome,
        };

        let _guard = self.locks.lock_all(&[&old_domain, &intent.domain]).await;

        let stale = self
            .cache
            .get(&old_domain)
            .await
            .filter(|r| ownership::owner_matches(&r.comment, &new.namespace, &new.name));

        let Some(stale) = stale else {
            debug!(
                "[{}/{}] No owned record under {}, treating as create",
                new.namespace, new.name, old_domain
            );
            return self.claim(new, &intent.domain, &zone).await;
        };

        if self.cache.get(&intent.domain).await.is_some() {
            // Either ours already (cleanup retires the stale record) or a conflict
            return self.claim(new, &intent.domain, &zone).await;
        }

        if !stale.zone_id.is_empty() && stale.zone_id != zone.id {
            // Records cannot move between zones: create anew, cleanup drops the old one
            info!(
                "[{}/{}] Zone changed for {} ({} -> {}), recreating",
                new.namespace, new.name, intent.domain, stale.zone_id, zone.id
            );
            return self.claim(new, &intent.domain, &zone).await;
        }

        self.rename(new, stale, &intent.domain, &zone).await
    }

    /// Resource is gone
    pub async fn on_delete(&self, resource: &ResourceSnapshot) -> ReconcileOutcome {
        let Some(intent) = self.intent(resource) else {
            return ReconcileOutcome::Skipped;
        };
        let intent = match intent {
            Ok(intent) => intent,
            Err(outcome) => return outcome,
        };

        let zone = match self.resolve_zone(resource, &intent).await {
            Ok(zone) => zone,
            Err(outcome) => return outcome,
        };

        let _guard = self.locks.lock(&intent.domain).await;

        let Some(record) = self.cache.get(&intent.domain).await else {
            debug!("[{}/{}] Record does not exist", resource.namespace, resource.name);
            return ReconcileOutcome::Skipped;
        };

        if !ownership::owner_matches(&record.comment, &resource.namespace, &resource.name) {
            debug!(
                "[{}/{}] Record {} does not belong to this resource",
                resource.namespace, resource.name, record.name
            );
            return ReconcileOutcome::Skipped;
        }

        info!(
            "[{}/{}] Record {} exists, attempting to delete",
            resource.namespace, resource.name, record.name
        );

        let zone_id = if record.zone_id.is_empty() {
            zone.id.as_str()
        } else {
            record.zone_id.as_str()
        };

        match self.provider.delete_record(&record.id, zone_id).await {
            Ok(()) => {
                self.cache.remove(&record.name).await;
                info!("[{}/{}] Record {} deleted", resource.namespace, resource.name, record.name);
                ReconcileOutcome::Deleted(record.name)
            }
            Err(e) => {
                error!(
                    "[{}/{}] Failed to delete record {}: {}",
                    resource.namespace, resource.name, record.name, e
                );
                ReconcileOutcome::Failed(e.to_string())
            }
        }
    }

    /// Rebuild the cache and zone table from the provider
    ///
    /// On failure the previous contents stay in place.
    pub async fn refresh_cache(&self) -> Result<usize> {
        self.cache.begin_refresh().await;

        let zones = match self.provider.list_zones().await {
            Ok(zones) => zones,
            Err(e) => {
                self.cache.abort_refresh().await;
                return Err(e);
            }
        };

        let records = match self.provider.refresh_records(&zones).await {
            Ok(records) => records,
            Err(e) => {
                self.cache.abort_refresh().await;
                return Err(e);
            }
        };

        Ok(self.cache.commit_refresh(zones, records).await)
    }

    /// Enablement gate plus annotation validation
    ///
    /// `None` means the resource is unmanaged.
    fn intent(&self, resource: &ResourceSnapshot) -> Option<std::result::Result<DnsIntent, ReconcileOutcome>> {
        match DnsIntent::from_snapshot(resource) {
            Ok(None) => None,
            Ok(Some(intent)) => {
                info!(
                    "[{}/{}] Resource has DNS enabled for {}",
                    resource.namespace, resource.name, intent.domain
                );
                Some(Ok(intent))
            }
            Err(e) => {
                warn!("[{}/{}] Ignoring resource: {}", resource.namespace, resource.name, e);
                Some(Err(ReconcileOutcome::Failed(e.to_string())))
            }
        }
    }

    async fn resolve_zone(
        &self,
        resource: &ResourceSnapshot,
        intent: &DnsIntent,
    ) -> std::result::Result<Zone, ReconcileOutcome> {
        let zones = self.cache.zones().await;
        match ZoneResolver::resolve(&intent.zone, &zones) {
            Ok(zone) => {
                debug!("[{}/{}] Belongs to zone: {}", resource.namespace, resource.name, zone.name);
                Ok(zone)
            }
            Err(e) => {
                error!("[{}/{}] Zone does not exist: {}", resource.namespace, resource.name, e);
                Err(ReconcileOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Claim `domain` for `resource`; the caller holds the domain lock
    async fn claim(&self, resource: &ResourceSnapshot, domain: &str, zone: &Zone) -> ReconcileOutcome {
        match self.cache.get(domain).await {
            Some(existing) if ownership::owner_matches(&existing.comment, &resource.namespace, &resource.name) => {
                debug!("[{}/{}] Record {} exists", resource.namespace, resource.name, domain);
                self.cleanup(resource, domain, zone).await;
                ReconcileOutcome::Unchanged(domain.to_string())
            }
            Some(_) => {
                warn!(
                    "[{}/{}] Duplicate domain entry, {} is already owned by another resource",
                    resource.namespace, resource.name, domain
                );
                let notification = Notification::duplicate_domain(resource, domain);
                if let Err(e) = self.notifier.notify(notification).await {
                    error!(
                        "[{}/{}] Failed to publish duplicate domain notification: {}",
                        resource.namespace, resource.name, e
                    );
                }
                ReconcileOutcome::Conflict(domain.to_string())
            }
            None => self.create(resource, domain, zone).await,
        }
    }

    async fn create(&self, resource: &ResourceSnapshot, domain: &str, zone: &Zone) -> ReconcileOutcome {
        info!(
            "[{}/{}] Record {} does not exist, attempting to create",
            resource.namespace, resource.name, domain
        );

        let config = self.config.borrow().clone();
        let tag = ownership::tag_for(&resource.namespace, &resource.name);
        let params = CreateRecordParams {
            name: domain.to_string(),
            record_type: config.record_type,
            content: config.ingress_destination,
            ttl: config.record_ttl,
            comment: tag.clone(),
            proxied: Some(config.proxy_enabled),
            zone_id: zone.id.clone(),
        };

        match self.provider.create_record(params).await {
            Ok(record) => {
                let record = stamp(record, domain, &tag, zone);
                self.cache.insert(record).await;
                info!("[{}/{}] Record {} created", resource.namespace, resource.name, domain);
                self.cleanup(resource, domain, zone).await;
                ReconcileOutcome::Created(domain.to_string())
            }
            Err(e) => {
                error!(
                    "[{}/{}] Failed to create record {}: {}",
                    resource.namespace, resource.name, domain, e
                );
                ReconcileOutcome::Failed(e.to_string())
            }
        }
    }

    async fn rename(
        &self,
        resource: &ResourceSnapshot,
        stale: DnsRecord,
        domain: &str,
        zone: &Zone,
    ) -> ReconcileOutcome {
        info!(
            "[{}/{}] Domain changed {} -> {}, updating record",
            resource.namespace, resource.name, stale.name, domain
        );

        let config = self.config.borrow().clone();
        let tag = ownership::tag_for(&resource.namespace, &resource.name);
        let params = UpdateRecordParams {
            record_id: stale.id.clone(),
            name: domain.to_string(),
            record_type: config.record_type,
            content: config.ingress_destination,
            ttl: config.record_ttl,
            comment: tag.clone(),
            proxied: Some(config.proxy_enabled),
            zone_id: zone.id.clone(),
        };

        match self.provider.update_record(params).await {
            Ok(record) => {
                let record = stamp(record, domain, &tag, zone);
                self.cache.rename(&stale.name, record).await;
                info!(
                    "[{}/{}] Record updated {} -> {}",
                    resource.namespace, resource.name, stale.name, domain
                );
                self.cleanup(resource, domain, zone).await;
                ReconcileOutcome::Renamed {
                    from: stale.name,
                    to: domain.to_string(),
                }
            }
            Err(e) => {
                error!(
                    "[{}/{}] Failed to update record {}: {}",
                    resource.namespace, resource.name, stale.name, e
                );
                ReconcileOutcome::Failed(e.to_string())
            }
        }
    }

    /// Retire records this resource owns under other names
    ///
    /// Failures are logged; the next event or refresh gets another chance.
    async fn cleanup(&self, resource: &ResourceSnapshot, domain: &str, zone: &Zone) {
        if let Err(e) = self
            .provider
            .cleanup_records(&self.cache, &resource.namespace, &resource.name, &zone.id, domain)
            .await
        {
            error!(
                "[{}/{}] Failed to clean up old records: {}",
                resource.namespace, resource.name, e
            );
        }
    }
}

/// Fill in what a provider response may leave out
fn stamp(mut record: DnsRecord, domain: &str, tag: &str, zone: &Zone) -> DnsRecord {
    if record.name.is_empty() {
        record.name = domain.to_string();
    }
    if record.comment.is_empty() {
        record.comment = tag.to_string();
    }
    if record.zone_id.is_empty() {
        record.zone_id = zone.id.clone();
    }
    record
}
