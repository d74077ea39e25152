// # DNS Provider Trait
//
// Defines the capability set every DNS backend implements.
//
// ## Implementations
//
// - Cloudflare: `greydns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use greydns_core::DnsProvider;
//
// let provider: Box<dyn DnsProvider> = registry.connect("cloudflare", &credentials)?;
// let zones = provider.list_zones().await?;
// let records = provider.refresh_records(&zones).await?;
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{error, info};

use crate::cache::RecordCache;
use crate::error::Result;
use crate::types::{CreateRecordParams, DnsRecord, RecordMap, UpdateRecordParams, Zone, ZoneTable};

/// Credentials handed to a provider factory (secret key → value)
pub type Credentials = HashMap<String, String>;

/// Trait for DNS provider implementations
///
/// Implementations translate between the provider-independent types in
/// [`crate::types`] and the backend's API, and map every backend failure to
/// [`crate::Error::Provider`] with the provider name and operation.
///
/// # Thread Safety
///
/// The client handle is read-only once connected; the engine calls a single
/// provider from many tasks concurrently without extra locking.
///
/// # Retries
///
/// Providers never retry. A failed call is reported and the triggering event
/// is dropped.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every zone visible to the credentials
    ///
    /// Pages until exhausted. Any page failure fails the whole listing.
    async fn list_zones(&self) -> Result<ZoneTable>;

    /// Fetch one zone by ID
    async fn get_zone(&self, zone_id: &str) -> Result<Zone>;

    /// Look `zone_name` up in `zones` and fetch it from the provider
    ///
    /// Fails with a `NotFound` provider error when the name is not in the table.
    async fn check_zone_exists(&self, zone_name: &str, zones: &ZoneTable) -> Result<Zone> {
        let zone_id = zones.get(zone_name).ok_or_else(|| {
            crate::Error::not_found(
                self.provider_name(),
                "check_zone_exists",
                format!("Zone not found: {}", zone_name),
            )
        })?;
        self.get_zone(zone_id).await
    }

    /// Create a record
    ///
    /// Unsupported record types fail with `InvalidInput`.
    async fn create_record(&self, params: CreateRecordParams) -> Result<DnsRecord>;

    /// Update an existing record in place (name, content, TTL may all change)
    async fn update_record(&self, params: UpdateRecordParams) -> Result<DnsRecord>;

    /// Delete a record
    async fn delete_record(&self, record_id: &str, zone_id: &str) -> Result<()>;

    /// List the greydns-managed records in a zone, keyed by name
    ///
    /// Records whose comment lacks an ownership tag are left out.
    async fn list_records(&self, zone_id: &str) -> Result<RecordMap>;

    /// List managed records across every zone in `zones`
    ///
    /// No partial result: the first failing zone fails the whole refresh.
    async fn refresh_records(&self, zones: &ZoneTable) -> Result<RecordMap> {
        let mut records = RecordMap::new();
        for zone_id in zones.values() {
            records.extend(self.list_records(zone_id).await?);
        }
        info!(
            "[{}] Refresh found {} records",
            self.provider_name(),
            records.len()
        );
        Ok(records)
    }

    /// Delete every cached record owned by `(namespace, name)` except `current_domain`
    ///
    /// Keeps a resource that changed its domain from leaking the old record.
    /// Each record is deleted from the zone it was listed in, falling back to
    /// `zone_id`, and evicted from the cache on success. The first failure
    /// stops the pass and is returned.
    async fn cleanup_records(
        &self,
        cache: &RecordCache,
        namespace: &str,
        name: &str,
        zone_id: &str,
        current_domain: &str,
    ) -> Result<usize> {
        let mut removed = 0;
        for record in cache.owned_by(namespace, name).await {
            if record.name == current_domain {
                continue;
            }

            info!(
                "[{}] [{}/{}] Found old record {}, cleaning up",
                self.provider_name(),
                namespace,
                name,
                record.name
            );

            let target_zone = if record.zone_id.is_empty() {
                zone_id
            } else {
                record.zone_id.as_str()
            };

            if let Err(e) = self.delete_record(&record.id, target_zone).await {
                error!(
                    "[{}] [{}/{}] Failed to delete record {}: {}",
                    self.provider_name(),
                    namespace,
                    name,
                    record.name,
                    e
                );
                return Err(e);
            }

            cache.remove(&record.name).await;
            removed += 1;
        }
        Ok(removed)
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing connected DNS providers
pub trait DnsProviderFactory: Send + Sync {
    /// Validate credentials and build a connected provider
    ///
    /// Fails with [`crate::Error::Config`] when a required credential is absent.
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DnsProvider>>;
}
