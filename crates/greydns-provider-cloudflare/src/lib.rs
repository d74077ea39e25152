// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare implementation of greydns' `DnsProvider`.
//
// ## Behaviour
//
// - One HTTP request per provider operation (listings page until exhausted)
// - Full error propagation to the engine; no retry, no backoff
// - HTTP timeout configured (30 seconds)
// - Status mapping: 400 → InvalidInput, 404 → NotFound, everything else → Backend
// - Dry-run mode for safe testing
// - A, AAAA and CNAME records; TXT and MX are rejected before any request
// - Listings only return records whose comment carries a greydns ownership tag
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - API token comes from the credentials secret only
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?page=..&per_page=50`
// - Zone Details: GET `/zones/:zone_id`
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=..&per_page=100`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use greydns_core::ownership;
use greydns_core::traits::{Credentials, DnsProvider, DnsProviderFactory};
use greydns_core::types::{
    CreateRecordParams, DnsRecord, RecordMap, RecordType, UpdateRecordParams, Zone, ZoneTable,
};
use greydns_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const ZONES_PER_PAGE: u32 = 50;
const RECORDS_PER_PAGE: u32 = 100;

const PROVIDER_NAME: &str = "cloudflare";

/// Credentials key holding the API token
pub const CREDENTIALS_KEY: &str = "cloudflare";

/// Environment variable selecting dry-run mode (`GREYDNS_MODE=dry-run`)
pub const MODE_ENV: &str = "GREYDNS_MODE";

/// Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ZoneBody {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordBody {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    ttl: u32,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    proxied: Option<bool>,
}

impl RecordBody {
    fn into_record(self, zone_id: &str) -> Result<DnsRecord> {
        Ok(DnsRecord {
            record_type: self.record_type.parse()?,
            id: self.id,
            name: self.name,
            content: self.content,
            ttl: self.ttl,
            comment: self.comment.unwrap_or_default(),
            proxied: self.proxied,
            zone_id: zone_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct RecordFields {
    name: String,
    content: String,
    ttl: u32,
    comment: String,
    proxied: bool,
}

/// Create/update request body, tagged by record type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
enum RecordRequest {
    #[serde(rename = "A")]
    A(RecordFields),
    #[serde(rename = "AAAA")]
    Aaaa(RecordFields),
    #[serde(rename = "CNAME")]
    Cname(RecordFields),
}

impl RecordRequest {
    fn build(record_type: RecordType, fields: RecordFields, operation: &'static str) -> Result<Self> {
        match record_type {
            RecordType::A => Ok(RecordRequest::A(fields)),
            RecordType::Aaaa => Ok(RecordRequest::Aaaa(fields)),
            RecordType::Cname => Ok(RecordRequest::Cname(fields)),
            unsupported => Err(Error::invalid_input(
                PROVIDER_NAME,
                operation,
                format!("unsupported record type: {}", unsupported),
            )),
        }
    }
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone and record listings)
/// - Log the intended create/update/delete
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API root, without trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:Read and DNS:Edit permissions
    /// - `dry_run`: If true, perform GET requests but skip mutations
    ///
    /// # Errors
    ///
    /// `Error::Config` when the token is empty or the HTTP client cannot be built.
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether mutations are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and unwrap the v4 envelope
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<(T, Option<ResultInfo>)> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::backend(PROVIDER_NAME, operation, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let message = format!("{} - {}", status, error_text);

            return Err(match status.as_u16() {
                400 => Error::invalid_input(PROVIDER_NAME, operation, message),
                404 => Error::not_found(PROVIDER_NAME, operation, message),
                _ => Error::backend(PROVIDER_NAME, operation, message),
            });
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::backend(PROVIDER_NAME, operation, format!("Failed to parse response: {}", e)))?;

        if !envelope.success {
            let reasons: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect();
            return Err(Error::backend(
                PROVIDER_NAME,
                operation,
                format!("API reported failure: {}", reasons.join("; ")),
            ));
        }

        let result = envelope
            .result
            .ok_or_else(|| Error::backend(PROVIDER_NAME, operation, "Invalid response format: missing result"))?;

        Ok((result, envelope.result_info))
    }

    /// Fetch every page of a listing
    async fn paginate<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        per_page: u32,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let request = self
                .client
                .get(self.url(path))
                .query(&[("page", page), ("per_page", per_page)]);
            let (batch, info): (Vec<T>, _) = self.send(operation, request).await?;

            let total_pages = info.map(|i| i.total_pages).unwrap_or(0);
            let exhausted = batch.is_empty() || page >= total_pages;
            items.extend(batch);

            if exhausted {
                return Ok(items);
            }
            page += 1;
        }
    }

    fn dry_run_record(id: String, fields: &RecordFields, record_type: RecordType, zone_id: &str) -> DnsRecord {
        DnsRecord {
            id,
            name: fields.name.clone(),
            record_type,
            content: fields.content.clone(),
            ttl: fields.ttl,
            comment: fields.comment.clone(),
            proxied: Some(fields.proxied),
            zone_id: zone_id.to_string(),
        }
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_zones(&self) -> Result<ZoneTable> {
        let zones: Vec<ZoneBody> = self.paginate("list_zones", "/zones", ZONES_PER_PAGE).await?;

        tracing::debug!("Cloudflare returned {} zones", zones.len());
        Ok(zones.into_iter().map(|z| (z.name, z.id)).collect())
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Zone> {
        let request = self.client.get(self.url(&format!("/zones/{}", zone_id)));
        let (zone, _): (ZoneBody, _) = self.send("get_zone", request).await?;
        Ok(Zone {
            id: zone.id,
            name: zone.name,
        })
    }

    async fn create_record(&self, params: CreateRecordParams) -> Result<DnsRecord> {
        let fields = RecordFields {
            name: params.name,
            content: params.content,
            ttl: params.ttl,
            comment: params.comment,
            proxied: params.proxied.unwrap_or(false),
        };
        let body = RecordRequest::build(params.record_type, fields.clone(), "create_record")?;

        tracing::info!(
            "{} Cloudflare DNS record: {} -> {} ({}) [mode: {}]",
            if self.dry_run { "Would create" } else { "Creating" },
            fields.name,
            fields.content,
            params.record_type,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request with payload: {}",
                serde_json::to_string(&body)?
            );
            let id = format!("dry-run-{}", fields.name);
            return Ok(Self::dry_run_record(id, &fields, params.record_type, &params.zone_id));
        }

        let request = self
            .client
            .post(self.url(&format!("/zones/{}/dns_records", params.zone_id)))
            .json(&body);
        let (created, _): (RecordBody, _) = self.send("create_record", request).await?;

        tracing::info!("DNS record created successfully: {}", created.name);
        created.into_record(&params.zone_id)
    }

    async fn update_record(&self, params: UpdateRecordParams) -> Result<DnsRecord> {
        let fields = RecordFields {
            name: params.name,
            content: params.content,
            ttl: params.ttl,
            comment: params.comment,
            proxied: params.proxied.unwrap_or(false),
        };
        let body = RecordRequest::build(params.record_type, fields.clone(), "update_record")?;

        tracing::info!(
            "{} Cloudflare DNS record {}: {} -> {} [mode: {}]",
            if self.dry_run { "Would update" } else { "Updating" },
            params.record_id,
            fields.name,
            fields.content,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT request with payload: {}",
                serde_json::to_string(&body)?
            );
            return Ok(Self::dry_run_record(
                params.record_id,
                &fields,
                params.record_type,
                &params.zone_id,
            ));
        }

        let request = self
            .client
            .put(self.url(&format!(
                "/zones/{}/dns_records/{}",
                params.zone_id, params.record_id
            )))
            .json(&body);
        let (updated, _): (RecordBody, _) = self.send("update_record", request).await?;

        tracing::info!("DNS record updated successfully: {}", updated.name);
        updated.into_record(&params.zone_id)
    }

    async fn delete_record(&self, record_id: &str, zone_id: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would delete DNS record {} in zone {}", record_id, zone_id);
            return Ok(());
        }

        let request = self
            .client
            .delete(self.url(&format!("/zones/{}/dns_records/{}", zone_id, record_id)));
        let _: (serde_json::Value, _) = self.send("delete_record", request).await?;

        tracing::info!("DNS record {} deleted", record_id);
        Ok(())
    }

    async fn list_records(&self, zone_id: &str) -> Result<RecordMap> {
        let path = format!("/zones/{}/dns_records", zone_id);
        let bodies: Vec<RecordBody> = self.paginate("list_records", &path, RECORDS_PER_PAGE).await?;

        let mut records = RecordMap::new();
        for body in bodies {
            if !body.comment.as_deref().is_some_and(ownership::is_managed) {
                continue;
            }
            match body.into_record(zone_id) {
                Ok(record) => {
                    records.insert(record.name.clone(), record);
                }
                Err(e) => tracing::warn!("Skipping managed record in zone {}: {}", zone_id, e),
            }
        }

        tracing::debug!("Zone {} has {} managed records", zone_id, records.len());
        Ok(records)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl CloudflareFactory {
    /// Whether `GREYDNS_MODE` asks for dry-run
    pub fn dry_run_from_env() -> bool {
        std::env::var(MODE_ENV)
            .unwrap_or_default()
            .eq_ignore_ascii_case("dry-run")
    }
}

impl DnsProviderFactory for CloudflareFactory {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DnsProvider>> {
        let api_token = credentials
            .get(CREDENTIALS_KEY)
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::config(format!("Required key {} does not exist in secret", CREDENTIALS_KEY))
            })?;

        let dry_run = Self::dry_run_from_env();
        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Box::new(CloudflareProvider::new(api_token, dry_run)?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// This function should be called during initialization to make the
/// Cloudflare provider available.
///
/// # Example
///
/// ```rust
/// use greydns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// greydns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &greydns_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use greydns_core::ProviderErrorKind;

    fn fields() -> RecordFields {
        RecordFields {
            name: "api.example.com".to_string(),
            content: "10.0.0.5".to_string(),
            ttl: 60,
            comment: "[greydns - Do not manually edit]default/svc-a".to_string(),
            proxied: false,
        }
    }

    #[test]
    fn test_factory_creation() {
        let credentials = Credentials::from([(CREDENTIALS_KEY.to_string(), "test_token".to_string())]);
        let provider = CloudflareFactory.connect(&credentials);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "cloudflare");
    }

    #[test]
    fn test_factory_missing_token() {
        let provider = CloudflareFactory.connect(&Credentials::new());
        assert!(matches!(provider, Err(Error::Config(ref m)) if m.contains("cloudflare")));

        let blank = Credentials::from([(CREDENTIALS_KEY.to_string(), "  ".to_string())]);
        assert!(CloudflareFactory.connect(&blank).is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(CloudflareProvider::new("", false), Err(Error::Config(_))));
    }

    #[test]
    fn test_dry_run_mode() {
        let provider_dry = CloudflareProvider::new("token", true).unwrap();
        let provider_live = CloudflareProvider::new("token", false).unwrap();

        assert!(provider_dry.is_dry_run(), "Dry-run provider should have dry_run=true");
        assert!(!provider_live.is_dry_run(), "Live provider should have dry_run=false");
    }

    #[test]
    fn test_base_url_override() {
        let provider = CloudflareProvider::new("token", false)
            .unwrap()
            .with_base_url("http://127.0.0.1:9999/");
        assert_eq!(provider.url("/zones"), "http://127.0.0.1:9999/zones");
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", false).unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_request_body_is_tagged_by_type() {
        let body = RecordRequest::build(RecordType::Aaaa, fields(), "create_record").unwrap();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["type"], "AAAA");
        assert_eq!(json["name"], "api.example.com");
        assert_eq!(json["proxied"], false);
        assert_eq!(json["comment"], "[greydns - Do not manually edit]default/svc-a");
    }

    #[test]
    fn test_txt_and_mx_rejected() {
        for record_type in [RecordType::Txt, RecordType::Mx] {
            let err = RecordRequest::build(record_type, fields(), "create_record").unwrap_err();
            assert_eq!(err.provider_kind(), Some(ProviderErrorKind::InvalidInput));
        }
    }

    #[tokio::test]
    async fn test_unsupported_type_fails_before_http() {
        // Nothing listens here; reaching the network would give a Backend error
        let provider = CloudflareProvider::new("token", false)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        let err = provider
            .create_record(CreateRecordParams {
                name: "api.example.com".to_string(),
                record_type: RecordType::Txt,
                content: "hello".to_string(),
                ttl: 60,
                comment: String::new(),
                proxied: None,
                zone_id: "zone123".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::InvalidInput));
    }

    #[test]
    fn test_record_body_conversion() {
        let body: RecordBody = serde_json::from_value(serde_json::json!({
            "id": "rec-1",
            "name": "api.example.com",
            "type": "CNAME",
            "content": "lb.example.net",
            "ttl": 1,
            "proxied": true
        }))
        .unwrap();

        let record = body.into_record("zone123").unwrap();
        assert_eq!(record.record_type, RecordType::Cname);
        assert_eq!(record.comment, "");
        assert_eq!(record.zone_id, "zone123");
        assert_eq!(record.proxied, Some(true));
    }
}
