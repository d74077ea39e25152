//! Controller configuration
//!
//! The controller is configured through a string map (the data of the
//! `greydns-config` ConfigMap). [`ControllerConfig::from_data`] parses and
//! validates it; every key except `provider` is required.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::RecordType;

/// TTL in seconds for every managed record
pub const KEY_RECORD_TTL: &str = "record-ttl";
/// Record type for every managed record
pub const KEY_RECORD_TYPE: &str = "record-type";
/// Whether records are proxied (providers that support it)
pub const KEY_PROXY_ENABLED: &str = "proxy-enabled";
/// Interval between full cache refreshes
pub const KEY_CACHE_REFRESH_SECONDS: &str = "cache-refresh-seconds";
/// Content written into every managed record
pub const KEY_INGRESS_DESTINATION: &str = "ingress-destination";
/// Provider backend name
pub const KEY_PROVIDER: &str = "provider";

/// Provider used when the `provider` key is absent or empty
pub const DEFAULT_PROVIDER: &str = "cloudflare";

/// Parsed controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerConfig {
    /// TTL of managed records, in seconds
    pub record_ttl: u32,

    /// Type of managed records
    pub record_type: RecordType,

    /// Whether managed records are proxied
    pub proxy_enabled: bool,

    /// Seconds between full cache refreshes
    pub cache_refresh_seconds: u64,

    /// Content of every managed record
    pub ingress_destination: String,

    /// Provider backend name
    #[serde(default = "default_provider")]
    pub provider: String,
}

impl ControllerConfig {
    /// Parse configuration from ConfigMap-style data
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self> {
        let record_ttl = required(data, KEY_RECORD_TTL)?
            .parse::<u32>()
            .map_err(|e| Error::config(format!("{} is not a valid integer: {}", KEY_RECORD_TTL, e)))?;

        let record_type: RecordType = required(data, KEY_RECORD_TYPE)?.parse()?;

        // Anything other than the literal "true" disables proxying
        let proxy_enabled = required(data, KEY_PROXY_ENABLED)? == "true";

        let cache_refresh_seconds = required(data, KEY_CACHE_REFRESH_SECONDS)?
            .parse::<u64>()
            .map_err(|e| {
                Error::config(format!(
                    "{} is not a valid integer: {}",
                    KEY_CACHE_REFRESH_SECONDS, e
                ))
            })?;

        let ingress_destination = required(data, KEY_INGRESS_DESTINATION)?.to_string();

        let provider = data
            .get(KEY_PROVIDER)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_provider);

        let config = Self {
            record_ttl,
            record_type,
            proxy_enabled,
            cache_refresh_seconds,
            ingress_destination,
            provider,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.record_ttl == 0 {
            return Err(Error::config(format!("{} must be > 0", KEY_RECORD_TTL)));
        }
        if self.cache_refresh_seconds == 0 {
            return Err(Error::config(format!(
                "{} must be > 0",
                KEY_CACHE_REFRESH_SECONDS
            )));
        }
        if self.ingress_destination.trim().is_empty() {
            return Err(Error::config(format!(
                "{} cannot be empty",
                KEY_INGRESS_DESTINATION
            )));
        }
        Ok(())
    }

    /// Interval between full cache refreshes
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cache_refresh_seconds)
    }
}

fn required<'a>(data: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str> {
    data.get(key)
        .map(|v| v.trim())
        .ok_or_else(|| Error::config(format!("Required key {} does not exist in configmap", key)))
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> BTreeMap<String, String> {
        BTreeMap::from([
            (KEY_RECORD_TTL.to_string(), "60".to_string()),
            (KEY_RECORD_TYPE.to_string(), "A".to_string()),
            (KEY_PROXY_ENABLED.to_string(), "true".to_string()),
            (KEY_CACHE_REFRESH_SECONDS.to_string(), "300".to_string()),
            (KEY_INGRESS_DESTINATION.to_string(), "10.0.0.5".to_string()),
        ])
    }

    #[test]
    fn test_parse_complete_config() {
        let config = ControllerConfig::from_data(&data()).unwrap();
        assert_eq!(config.record_ttl, 60);
        assert_eq!(config.record_type, RecordType::A);
        assert!(config.proxy_enabled);
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.ingress_destination, "10.0.0.5");
        assert_eq!(config.provider, "cloudflare");
    }

    #[test]
    fn test_missing_required_key() {
        for key in [
            KEY_RECORD_TTL,
            KEY_RECORD_TYPE,
            KEY_PROXY_ENABLED,
            KEY_CACHE_REFRESH_SECONDS,
            KEY_INGRESS_DESTINATION,
        ] {
            let mut d = data();
            d.remove(key);
            let err = ControllerConfig::from_data(&d).unwrap_err();
            assert!(
                matches!(err, Error::Config(ref m) if m.contains(key)),
                "missing {} should be reported, got {:?}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_invalid_ttl() {
        let mut d = data();
        d.insert(KEY_RECORD_TTL.to_string(), "sixty".to_string());
        assert!(matches!(ControllerConfig::from_data(&d), Err(Error::Config(_))));

        d.insert(KEY_RECORD_TTL.to_string(), "0".to_string());
        assert!(matches!(ControllerConfig::from_data(&d), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_record_type() {
        let mut d = data();
        d.insert(KEY_RECORD_TYPE.to_string(), "SRV".to_string());
        assert!(matches!(ControllerConfig::from_data(&d), Err(Error::Config(_))));
    }

    #[test]
    fn test_proxy_enabled_requires_literal_true() {
        let mut d = data();
        d.insert(KEY_PROXY_ENABLED.to_string(), "yes".to_string());
        assert!(!ControllerConfig::from_data(&d).unwrap().proxy_enabled);
    }

    #[test]
    fn test_explicit_provider() {
        let mut d = data();
        d.insert(KEY_PROVIDER.to_string(), "route53".to_string());
        assert_eq!(ControllerConfig::from_data(&d).unwrap().provider, "route53");

        d.insert(KEY_PROVIDER.to_string(), "".to_string());
        assert_eq!(ControllerConfig::from_data(&d).unwrap().provider, "cloudflare");
    }

    #[test]
    fn test_empty_destination_rejected() {
        let mut d = data();
        d.insert(KEY_INGRESS_DESTINATION.to_string(), "  ".to_string());
        assert!(ControllerConfig::from_data(&d).is_err());
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let config = ControllerConfig::from_data(&data()).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["record-ttl"], 60);
        assert_eq!(json["record-type"], "A");
        assert_eq!(json["ingress-destination"], "10.0.0.5");
    }
}
